// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Storage Backend Port
//!
//! An opaque key/value object store. Concrete cloud backends and tiering
//! policies are out of scope for the core (see spec Non-goals) - `transfer-
//! core` ships only a local-filesystem implementation of this trait.

use async_trait::async_trait;

use crate::TransferError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub modified_at: chrono::DateTime<chrono::Utc>,
}

/// Independent key/value object operations - no ordering or transactional
/// guarantees are assumed across calls.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), TransferError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, TransferError>;
    async fn delete(&self, key: &str) -> Result<(), TransferError>;
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMetadata>, TransferError>;
    async fn stat(&self, key: &str) -> Result<ObjectMetadata, TransferError>;
}
