// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Transfer Error System
//!
//! A single typed error enum classifies every failure that can occur in the
//! transfer core. Callers observe errors via a `Result`-shaped return; the
//! core never raises out-of-band.

use thiserror::Error;

/// Every failure mode of the transfer core, grouped by concern.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    // --- Configuration ---
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid file path: {0}")]
    InvalidFilePath(String),

    // --- Lifecycle ---
    #[error("not initialized: {0}")]
    NotInitialized(String),
    #[error("already initialized: {0}")]
    AlreadyInitialized(String),

    // --- Transport ---
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("transfer timed out: {0}")]
    TransferTimeout(String),
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("protocol version mismatch: {0}")]
    ProtocolVersionMismatch(String),
    #[error("retransmission limit exceeded: {0}")]
    RetransmissionLimitExceeded(String),

    // --- I/O & filesystem ---
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("file access denied: {0}")]
    FileAccessDenied(String),
    #[error("file write error: {0}")]
    FileWriteError(String),
    #[error("file too large: {0}")]
    FileTooLarge(String),
    #[error("io error: {0}")]
    IoError(String),

    // --- Integrity ---
    #[error("chunk checksum error: {0}")]
    ChunkChecksumError(String),
    #[error("invalid chunk index: {0}")]
    InvalidChunkIndex(String),
    #[error("missing chunks: {0}")]
    MissingChunks(String),
    #[error("file hash mismatch: {0}")]
    FileHashMismatch(String),

    // --- Compression / Encryption ---
    #[error("compression failure: {0}")]
    CompressionFailure(String),
    #[error("decompression failure: {0}")]
    DecompressionFailure(String),
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),
    #[error("decryption failure: {0}")]
    DecryptionFailure(String),
    #[error("key derivation failure: {0}")]
    KeyDerivationFailure(String),

    // --- Quota / Policy ---
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("file locked: {0}")]
    FileLocked(String),
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    // --- Internal ---
    #[error("internal error: {0}")]
    InternalError(String),
}

impl TransferError {
    /// Whether retrying the same operation might succeed without
    /// intervention (transient I/O, timeouts).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransferError::TransferTimeout(_)
                | TransferError::ConnectionLost(_)
                | TransferError::IoError(_)
                | TransferError::RetransmissionLimitExceeded(_)
        )
    }

    /// Whether the failure indicates a data-integrity or security concern.
    pub fn is_security_error(&self) -> bool {
        matches!(
            self,
            TransferError::ChunkChecksumError(_)
                | TransferError::FileHashMismatch(_)
                | TransferError::DecryptionFailure(_)
        )
    }

    /// Coarse category, useful for logging and metrics labeling.
    pub fn category(&self) -> &'static str {
        match self {
            TransferError::InvalidChunkSize(_)
            | TransferError::InvalidConfiguration(_)
            | TransferError::InvalidFilePath(_) => "configuration",
            TransferError::NotInitialized(_) | TransferError::AlreadyInitialized(_) => "lifecycle",
            TransferError::ConnectionFailed(_)
            | TransferError::ConnectionLost(_)
            | TransferError::TransferTimeout(_)
            | TransferError::ProtocolError(_)
            | TransferError::ProtocolVersionMismatch(_)
            | TransferError::RetransmissionLimitExceeded(_) => "transport",
            TransferError::FileNotFound(_)
            | TransferError::FileAccessDenied(_)
            | TransferError::FileWriteError(_)
            | TransferError::FileTooLarge(_)
            | TransferError::IoError(_) => "io",
            TransferError::ChunkChecksumError(_)
            | TransferError::InvalidChunkIndex(_)
            | TransferError::MissingChunks(_)
            | TransferError::FileHashMismatch(_) => "integrity",
            TransferError::CompressionFailure(_)
            | TransferError::DecompressionFailure(_)
            | TransferError::EncryptionFailure(_)
            | TransferError::DecryptionFailure(_)
            | TransferError::KeyDerivationFailure(_) => "crypto",
            TransferError::QuotaExceeded(_) | TransferError::FileLocked(_) | TransferError::PolicyDenied(_) => {
                "policy"
            }
            TransferError::InternalError(_) => "internal",
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => TransferError::FileNotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => TransferError::FileAccessDenied(err.to_string()),
            _ => TransferError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::InvalidConfiguration(format!("json: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
