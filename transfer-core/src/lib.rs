// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Transfer Core
//!
//! The chunk pipeline, wire protocol, flow control, resume subsystem, and
//! server-side coordination for the chunked, resumable file-transfer
//! system. Built on the value objects and collaborator traits in
//! `transfer-domain`.

pub mod batch;
pub mod checksum;
pub mod config;
pub mod coordinator;
pub mod flowcontrol;
pub mod infra;
pub mod logging;
pub mod pipeline;
pub mod protocol;
pub mod resume;
pub mod server;
pub mod transform;
pub mod wire;

pub use transfer_domain::{
    error::Result, Chunk, ChunkConfig, ChunkFlags, ChunkHeader, TransferError, TransferId, TransferState,
};
