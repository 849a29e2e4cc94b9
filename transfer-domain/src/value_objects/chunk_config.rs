// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Configuration
//!
//! Validated chunk-size configuration for the splitter. Unlike a generic
//! byte-size value object, this one enforces the protocol-wide bounds from
//! the wire spec rather than an arbitrary memory ceiling.

use serde::{Deserialize, Serialize};

use crate::TransferError;

/// Validated chunk-size configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    nominal_chunk_size: usize,
}

impl ChunkConfig {
    /// Smallest chunk size the wire protocol allows (64 KiB).
    pub const MIN_SIZE: usize = 64 * 1024;
    /// Largest chunk size the wire protocol allows (1 MiB).
    pub const MAX_SIZE: usize = 1024 * 1024;
    /// Default chunk size used when callers don't specify one.
    pub const DEFAULT_SIZE: usize = 256 * 1024;

    /// Validates `nominal_chunk_size` against `[MIN_SIZE, MAX_SIZE]`.
    pub fn new(nominal_chunk_size: usize) -> Result<Self, TransferError> {
        if nominal_chunk_size < Self::MIN_SIZE || nominal_chunk_size > Self::MAX_SIZE {
            return Err(TransferError::InvalidChunkSize(format!(
                "chunk size {nominal_chunk_size} outside [{}, {}]",
                Self::MIN_SIZE,
                Self::MAX_SIZE
            )));
        }
        Ok(Self { nominal_chunk_size })
    }

    pub fn nominal_chunk_size(&self) -> usize {
        self.nominal_chunk_size
    }

    /// Number of chunks a file of `file_size` bytes splits into (1 for an
    /// empty file, matching the "empty file still yields one chunk" rule).
    pub fn total_chunks(&self, file_size: u64) -> u64 {
        if file_size == 0 {
            return 1;
        }
        file_size.div_ceil(self.nominal_chunk_size as u64)
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            nominal_chunk_size: Self::DEFAULT_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_bounds() {
        assert!(ChunkConfig::new(ChunkConfig::MIN_SIZE).is_ok());
        assert!(ChunkConfig::new(ChunkConfig::MAX_SIZE).is_ok());
    }

    #[test]
    fn rejects_outside_bounds() {
        assert!(ChunkConfig::new(ChunkConfig::MIN_SIZE - 1).is_err());
        assert!(ChunkConfig::new(ChunkConfig::MAX_SIZE + 1).is_err());
    }

    #[test]
    fn total_chunks_matches_ceiling_division() {
        let cfg = ChunkConfig::new(ChunkConfig::MIN_SIZE).unwrap();
        assert_eq!(cfg.total_chunks(0), 1);
        assert_eq!(cfg.total_chunks(ChunkConfig::MIN_SIZE as u64), 1);
        assert_eq!(cfg.total_chunks(ChunkConfig::MIN_SIZE as u64 + 1), 2);
    }
}
