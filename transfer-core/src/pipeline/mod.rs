// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline
//!
//! [`splitter`] turns a file into an ordered stream of [`transfer_domain::Chunk`]s;
//! [`assembler`] turns a (possibly out-of-order) stream of chunks back into a
//! file.

pub mod assembler;
pub mod splitter;

pub use assembler::ChunkAssembler;
pub use splitter::ChunkSplitter;
