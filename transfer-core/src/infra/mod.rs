// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Adapters
//!
//! Concrete implementations of the collaborator traits in `transfer-domain`
//! that talk to the local machine. Cloud backends and tiering policies are
//! out of scope (see spec Non-goals); this crate ships a local filesystem
//! adapter only.

mod local_storage;

pub use local_storage::LocalStorageBackend;
