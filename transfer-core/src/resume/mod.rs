// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Resume Subsystem
//!
//! Persists per-transfer [`TransferState`](transfer_domain::TransferState)
//! records so an interrupted transfer can resume after a process restart.

pub mod store;

pub use store::ResumeStore;
