// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Value Objects
//!
//! Immutable, self-validating objects with no identity of their own:
//! [`TransferId`], [`ChunkConfig`], [`ChunkHeader`] / [`Chunk`],
//! [`TransferState`], and [`FileMetadata`].

pub mod chunk;
pub mod chunk_bitmap;
pub mod chunk_config;
pub mod file_metadata;
pub mod transfer_id;
pub mod transfer_state;

pub use chunk::{Chunk, ChunkFlags, ChunkHeader};
pub use chunk_bitmap::ChunkBitmap;
pub use chunk_config::ChunkConfig;
pub use file_metadata::FileMetadata;
pub use transfer_id::TransferId;
pub use transfer_state::TransferState;
