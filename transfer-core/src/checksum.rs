// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Checksums
//!
//! CRC-32 (per-chunk, throughput-sensitive) and SHA-256 (per-file,
//! integrity-sensitive) hashing used across the transfer core. File hashing
//! streams through a fixed-size buffer so whole files never have to sit in
//! memory at once.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use subtle::ConstantTimeEq;
use transfer_domain::TransferError;

const FILE_READ_BUF_SIZE: usize = 64 * 1024;

/// IEEE CRC-32 over `bytes`. Zero for empty input.
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// SHA-256 digest of `bytes`.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// SHA-256 digest of a file, streamed through fixed-size reads rather than
/// loaded whole.
pub fn sha256_file(path: &Path) -> Result<[u8; 32], TransferError> {
    let mut file = std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TransferError::FileNotFound(path.display().to_string())
        } else {
            TransferError::IoError(e.to_string())
        }
    })?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; FILE_READ_BUF_SIZE];
    loop {
        let read = file.read(&mut buf).map_err(|e| TransferError::IoError(e.to_string()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finalize().into())
}

/// Constant-time CRC-32 comparison.
pub fn verify_crc32(actual: u32, expected: u32) -> bool {
    actual.to_be_bytes().ct_eq(&expected.to_be_bytes()).into()
}

/// Constant-time SHA-256 digest comparison.
pub fn verify_sha256(actual: &[u8; 32], expected: &[u8; 32]) -> bool {
    actual.ct_eq(expected).into()
}

/// Hex-encodes a SHA-256 digest, the form persisted in `TransferState` and
/// put on the wire in `UPLOAD_REQUEST`.
pub fn sha256_hex(digest: &[u8; 32]) -> String {
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn crc32_of_empty_is_zero() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn crc32_is_deterministic() {
        let data = b"the quick brown fox";
        assert_eq!(crc32(data), crc32(data));
    }

    #[test]
    fn sha256_matches_known_vector() {
        // SHA-256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        let digest = sha256(b"");
        assert_eq!(
            sha256_hex(&digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_file_matches_in_memory_hash() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data = vec![7u8; 200_000];
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let expected = sha256(&data);
        let actual = sha256_file(file.path()).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn sha256_file_missing_is_file_not_found() {
        let err = sha256_file(Path::new("/no/such/file/here")).unwrap_err();
        assert!(matches!(err, TransferError::FileNotFound(_)));
    }

    #[test]
    fn verify_functions_detect_mismatch() {
        assert!(verify_crc32(42, 42));
        assert!(!verify_crc32(42, 43));
        let d1 = sha256(b"a");
        let d2 = sha256(b"b");
        assert!(verify_sha256(&d1, &d1));
        assert!(!verify_sha256(&d1, &d2));
    }
}
