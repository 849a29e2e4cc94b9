// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Transfer Domain
//!
//! Pure business logic for the chunked, resumable file-transfer core:
//! value objects, the error taxonomy, and the collaborator traits
//! (`Transport`, `Compressor`, `Cipher`, `Kdf`, `StorageBackend`) consumed
//! by `transfer-core`. This crate has no tokio runtime dependency and no
//! concrete I/O - it describes shapes and contracts only.

pub mod error;
pub mod traits;
pub mod value_objects;

pub use error::TransferError;
pub use traits::{Cipher, Compressor, Kdf, StorageBackend, Transport};
pub use value_objects::{
    Chunk, ChunkBitmap, ChunkConfig, ChunkFlags, ChunkHeader, FileMetadata, TransferId, TransferState,
};
