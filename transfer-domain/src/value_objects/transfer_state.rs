// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Transfer State (Resume Record)
//!
//! Persistent per-transfer bookkeeping that lets a transfer resume after a
//! process restart: which chunks have been received, how many bytes have
//! landed, and the file's expected hash.

use serde::{Deserialize, Serialize};

use crate::value_objects::chunk_bitmap::ChunkBitmap;
use crate::TransferId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferState {
    pub transfer_id: TransferId,
    pub filename: String,
    pub total_size: u64,
    pub total_chunks: u64,
    pub transferred_bytes: u64,
    pub chunk_bitmap: ChunkBitmap,
    pub sha256: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

impl TransferState {
    pub fn new(transfer_id: TransferId, filename: String, total_size: u64, total_chunks: u64, sha256: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            transfer_id,
            filename,
            total_size,
            total_chunks,
            transferred_bytes: 0,
            chunk_bitmap: ChunkBitmap::new(total_chunks),
            sha256,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn received_chunk_count(&self) -> u64 {
        self.chunk_bitmap.popcount()
    }

    pub fn is_complete(&self) -> bool {
        self.chunk_bitmap.is_complete()
    }

    /// Completion percentage (0.0-100.0), a convenience carried over from
    /// the system this spec was distilled from.
    pub fn completion_percentage(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        (self.received_chunk_count() as f64 / self.total_chunks as f64) * 100.0
    }

    pub fn missing_chunks(&self) -> Vec<u64> {
        self.chunk_bitmap.missing()
    }

    pub fn is_expired(&self, ttl: chrono::Duration) -> bool {
        chrono::Utc::now() - self.last_activity > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_transferred_bytes_never_exceeds_total() {
        let state = TransferState::new(TransferId::new(), "f.bin".into(), 100, 4, "abc".into());
        assert!(state.transferred_bytes <= state.total_size);
    }

    #[test]
    fn completion_percentage_tracks_bitmap() {
        let mut state = TransferState::new(TransferId::new(), "f.bin".into(), 400, 4, "abc".into());
        assert_eq!(state.completion_percentage(), 0.0);
        state.chunk_bitmap.set(0);
        state.chunk_bitmap.set(1);
        assert_eq!(state.completion_percentage(), 50.0);
    }

    #[test]
    fn empty_file_is_immediately_complete_after_one_chunk() {
        let mut state = TransferState::new(TransferId::new(), "empty.bin".into(), 0, 1, "e3b0c4".into());
        assert!(!state.is_complete());
        state.chunk_bitmap.set(0);
        assert!(state.is_complete());
    }
}
