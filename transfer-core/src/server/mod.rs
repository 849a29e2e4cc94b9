// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Server-Side Session Plumbing
//!
//! The pieces a listener (whatever accepts raw connections and hands each
//! one a [`transfer_domain::Transport`] - out of scope here, see spec
//! Non-goals) needs to run a multi-client upload/download server: a
//! [`quota::QuotaCoordinator`] shared across sessions, and a
//! [`session_manager::ServerSessionManager`] that owns one session per
//! connection.

pub mod quota;
pub mod session_manager;

pub use quota::{QuotaCoordinator, QuotaUsage, WarningCallback};
pub use session_manager::{
    DownloadPolicy, PolicyDecision, ServerSessionConfig, ServerSessionManager, UploadPolicy,
};
