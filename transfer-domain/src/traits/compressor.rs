// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Compressor Port

use serde::{Deserialize, Serialize};

use crate::TransferError;

/// Speed/ratio tradeoff for a compression pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    /// Fastest encode, lower ratio (LZ4 default mode).
    Fast,
    /// Slower encode, higher ratio (LZ4 high-compression mode).
    High,
}

/// Pure, per-chunk compression transform. `decompress(compress(x, L)) == x`
/// for any level `L`.
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>, TransferError>;

    /// Decompresses `data` into a buffer of exactly `original_len` bytes.
    fn decompress(&self, data: &[u8], original_len: usize) -> Result<Vec<u8>, TransferError>;

    /// Heuristic: would attempting to compress `data` likely help? Used to
    /// skip known-incompressible formats before spending CPU on a trial
    /// compression.
    fn is_compressible(&self, data: &[u8]) -> bool;
}
