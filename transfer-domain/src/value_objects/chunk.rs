// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Header & Chunk
//!
//! [`ChunkHeader`] is the per-chunk metadata carried on the wire and held in
//! memory; [`Chunk`] pairs it with the payload bytes. Both are immutable
//! value objects - a transform (compress/encrypt) produces a new `Chunk`
//! rather than mutating one in place.

use serde::{Deserialize, Serialize};

use crate::TransferId;

bitflags::bitflags! {
    /// Per-chunk wire flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChunkFlags: u32 {
        const FIRST_CHUNK = 1 << 0;
        const LAST_CHUNK  = 1 << 1;
        const COMPRESSED  = 1 << 2;
        const ENCRYPTED   = 1 << 3;
    }
}

/// Per-chunk metadata, exactly as carried on the wire (§3 Data Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHeader {
    pub transfer_id: TransferId,
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub chunk_offset: u64,
    /// Payload length after compression/encryption (the on-wire length).
    pub payload_length: u32,
    /// Payload length before any transform (used to size decode buffers).
    pub original_length: u32,
    pub flags: ChunkFlags,
    /// CRC32 over the on-wire (post-transform) payload bytes.
    pub crc32: u32,
}

impl ChunkHeader {
    pub fn is_first(&self) -> bool {
        self.flags.contains(ChunkFlags::FIRST_CHUNK)
    }

    pub fn is_last(&self) -> bool {
        self.flags.contains(ChunkFlags::LAST_CHUNK)
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(ChunkFlags::COMPRESSED)
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags.contains(ChunkFlags::ENCRYPTED)
    }
}

/// A chunk header plus its on-wire payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub header: ChunkHeader,
    pub payload: Vec<u8>,
}

impl Chunk {
    pub fn new(header: ChunkHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(index: u64, total: u64, flags: ChunkFlags) -> ChunkHeader {
        ChunkHeader {
            transfer_id: TransferId::new(),
            chunk_index: index,
            total_chunks: total,
            chunk_offset: index * 4096,
            payload_length: 4096,
            original_length: 4096,
            flags,
            crc32: 0,
        }
    }

    #[test]
    fn first_and_last_flag_predicates() {
        let h = header(0, 3, ChunkFlags::FIRST_CHUNK);
        assert!(h.is_first());
        assert!(!h.is_last());
        assert!(!h.is_compressed());
        assert!(!h.is_encrypted());
    }

    #[test]
    fn flags_compose() {
        let h = header(0, 1, ChunkFlags::FIRST_CHUNK | ChunkFlags::LAST_CHUNK | ChunkFlags::ENCRYPTED);
        assert!(h.is_first());
        assert!(h.is_last());
        assert!(h.is_encrypted());
        assert!(!h.is_compressed());
    }
}
