// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # LZ4 Compressor
//!
//! Pure-Rust LZ4 block compression via `lz4_flex`. Adaptive compression
//! (§4.6) decides per chunk whether compressing is worth it: a magic-byte
//! sniff rules out formats that are already compressed, and a
//! trial-compression ratio check catches high-entropy data the sniff
//! misses.

use transfer_domain::{traits::CompressionLevel, Compressor, TransferError};

/// Magic byte prefixes of incompressible formats the adaptive heuristic
/// checks for: ZIP, GZIP, ZSTD, XZ, BZIP2, LZ4-frame, JPEG, PNG, GIF,
/// WEBP/RIFF, MP3, PDF, 7z, MP4 `ftyp`.
const KNOWN_COMPRESSED_MAGICS: &[&[u8]] = &[
    &[0x50, 0x4b, 0x03, 0x04],             // zip / docx / jar
    &[0x1f, 0x8b],                         // gzip
    &[0x28, 0xb5, 0x2f, 0xfd],             // zstd
    &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00], // xz
    &[0x42, 0x5a, 0x68],                   // bzip2
    &[0x04, 0x22, 0x4d, 0x18],             // lz4 frame
    &[0xff, 0xd8, 0xff],                   // jpeg
    &[0x89, 0x50, 0x4e, 0x47],             // png
    &[0x47, 0x49, 0x46, 0x38],             // gif
    &[0x52, 0x49, 0x46, 0x46],             // riff (webp container)
    &[0x49, 0x44, 0x33],                   // mp3 (ID3)
    &[0xff, 0xfb],                         // mp3 (no ID3 tag)
    &[0x25, 0x50, 0x44, 0x46],             // pdf
    &[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c], // 7z
];

/// `ftyp` box marker at offset 4 in an MP4 container.
const MP4_FTYP_OFFSET: usize = 4;
const MP4_FTYP_MAGIC: &[u8] = b"ftyp";

/// Minimum size worth the per-chunk compression overhead.
const MIN_COMPRESSIBLE_LEN: usize = 256;

/// Trial compression must hit at least this ratio (original:compressed)
/// for the full chunk to be considered worth compressing.
const MIN_USEFUL_RATIO: f64 = 1.1;

const TRIAL_SAMPLE_LEN: usize = 4 * 1024;

pub struct Lz4Compressor;

impl Lz4Compressor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for Lz4Compressor {
    fn compress(&self, data: &[u8], _level: CompressionLevel) -> Result<Vec<u8>, TransferError> {
        Ok(lz4_flex::block::compress(data))
    }

    fn decompress(&self, data: &[u8], original_len: usize) -> Result<Vec<u8>, TransferError> {
        lz4_flex::block::decompress(data, original_len)
            .map_err(|e| TransferError::DecompressionFailure(e.to_string()))
    }

    fn is_compressible(&self, data: &[u8]) -> bool {
        if data.len() < MIN_COMPRESSIBLE_LEN {
            return false;
        }
        if KNOWN_COMPRESSED_MAGICS.iter().any(|magic| data.starts_with(magic)) {
            return false;
        }
        if data.len() > MP4_FTYP_OFFSET + MP4_FTYP_MAGIC.len()
            && &data[MP4_FTYP_OFFSET..MP4_FTYP_OFFSET + MP4_FTYP_MAGIC.len()] == MP4_FTYP_MAGIC
        {
            return false;
        }

        let sample = &data[..data.len().min(TRIAL_SAMPLE_LEN)];
        let trial = lz4_flex::block::compress(sample);
        if trial.is_empty() {
            return false;
        }
        (sample.len() as f64) / (trial.len() as f64) >= MIN_USEFUL_RATIO
    }
}
