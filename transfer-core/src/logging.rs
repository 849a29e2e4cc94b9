// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Logging
//!
//! `tracing`-subscriber wiring for the process. Deliberately thin: a
//! metrics/alerting pipeline is an external collaborator this system
//! doesn't build (see spec Non-goals), so this module's only job is to
//! get structured, level-filtered logs onto stdout. Per-transfer and
//! per-session spans are created at the call sites that hold a
//! `transfer_id`/`session_id` (`#[tracing::instrument]` on
//! `TransferCoordinator::run_upload`/`run_download`, `ServerSessionManager`),
//! not here.

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber. `RUST_LOG` overrides
/// `default_level` if set (`EnvFilter::from_default_env` precedence);
/// callers that want JSON output for log aggregation should set
/// `RUST_LOG_FORMAT=json` before calling this, rather than this function
/// growing a format argument for every possible sink.
///
/// Safe to call more than once; later calls are no-ops (matching
/// `tracing::subscriber::set_global_default`'s own idempotence contract -
/// it returns `Err` if a subscriber is already installed, which this
/// function swallows).
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_when_called_twice() {
        init("info");
        init("debug");
    }
}
