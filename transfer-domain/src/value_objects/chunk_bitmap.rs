// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Bitmap
//!
//! A compact received-chunk bitmap, word-packed into `u64`s rather than
//! pulling in a bitset crate for something this small and stable.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkBitmap {
    bits: Vec<u64>,
    len: u64,
    popcount: u64,
}

impl ChunkBitmap {
    pub fn new(total_chunks: u64) -> Self {
        let words = total_chunks.div_ceil(64) as usize;
        Self {
            bits: vec![0u64; words],
            len: total_chunks,
            popcount: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn popcount(&self) -> u64 {
        self.popcount
    }

    pub fn is_complete(&self) -> bool {
        self.popcount == self.len
    }

    pub fn get(&self, index: u64) -> bool {
        if index >= self.len {
            return false;
        }
        let word = (index / 64) as usize;
        let bit = index % 64;
        (self.bits[word] >> bit) & 1 == 1
    }

    /// Sets the bit for `index`. Returns `true` if this call actually
    /// flipped a previously-unset bit (i.e. wasn't a duplicate).
    pub fn set(&mut self, index: u64) -> bool {
        if index >= self.len {
            return false;
        }
        let word = (index / 64) as usize;
        let bit = index % 64;
        let mask = 1u64 << bit;
        if self.bits[word] & mask != 0 {
            return false;
        }
        self.bits[word] |= mask;
        self.popcount += 1;
        true
    }

    /// Indices of every unset bit, in ascending order.
    pub fn missing(&self) -> Vec<u64> {
        (0..self.len).filter(|&i| !self.get(i)).collect()
    }

    /// Packs the bitmap into big-endian bytes for the wire (`UPLOAD_ACCEPT`,
    /// `RESUME_RESPONSE`). An empty bitmap (no chunks received) serializes
    /// to an empty byte vector, matching those messages' "empty means none
    /// received yet" convention.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.popcount == 0 {
            return Vec::new();
        }
        self.bits.iter().flat_map(|word| word.to_be_bytes()).collect()
    }

    /// Reconstructs a bitmap of `total_chunks` bits from wire bytes. An
    /// empty slice yields an all-unset bitmap.
    pub fn from_bytes(bytes: &[u8], total_chunks: u64) -> Self {
        let mut bitmap = Self::new(total_chunks);
        if bytes.is_empty() {
            return bitmap;
        }
        for (word_index, chunk) in bytes.chunks(8).enumerate() {
            let mut word_bytes = [0u8; 8];
            word_bytes[..chunk.len()].copy_from_slice(chunk);
            let word = u64::from_be_bytes(word_bytes);
            for bit in 0..64 {
                if (word >> bit) & 1 == 1 {
                    let index = (word_index as u64) * 64 + bit;
                    bitmap.set(index);
                }
            }
        }
        bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let bm = ChunkBitmap::new(10);
        assert_eq!(bm.popcount(), 0);
        assert!(!bm.is_complete());
        assert_eq!(bm.missing().len(), 10);
    }

    #[test]
    fn set_is_idempotent() {
        let mut bm = ChunkBitmap::new(4);
        assert!(bm.set(2));
        assert!(!bm.set(2));
        assert_eq!(bm.popcount(), 1);
    }

    #[test]
    fn becomes_complete_when_all_bits_set() {
        let mut bm = ChunkBitmap::new(3);
        for i in 0..3 {
            bm.set(i);
        }
        assert!(bm.is_complete());
        assert!(bm.missing().is_empty());
    }

    #[test]
    fn out_of_range_set_is_ignored() {
        let mut bm = ChunkBitmap::new(2);
        assert!(!bm.set(5));
        assert_eq!(bm.popcount(), 0);
    }

    #[test]
    fn crosses_word_boundary() {
        let mut bm = ChunkBitmap::new(130);
        assert!(bm.set(63));
        assert!(bm.set(64));
        assert!(bm.set(129));
        assert_eq!(bm.popcount(), 3);
        assert!(bm.get(63));
        assert!(bm.get(64));
        assert!(bm.get(129));
        assert!(!bm.get(65));
    }

    #[test]
    fn empty_bitmap_round_trips_as_empty_bytes() {
        let bm = ChunkBitmap::new(10);
        assert!(bm.to_bytes().is_empty());
        let restored = ChunkBitmap::from_bytes(&[], 10);
        assert_eq!(restored.popcount(), 0);
    }

    #[test]
    fn non_empty_bitmap_round_trips_through_bytes() {
        let mut bm = ChunkBitmap::new(130);
        bm.set(0);
        bm.set(63);
        bm.set(64);
        bm.set(129);
        let bytes = bm.to_bytes();
        let restored = ChunkBitmap::from_bytes(&bytes, 130);
        assert_eq!(restored, bm);
    }
}
