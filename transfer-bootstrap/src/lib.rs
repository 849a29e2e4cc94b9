// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap
//!
//! The composition root: loads a [`transfer_core::config::TransferConfig`],
//! wires it together with a [`shutdown::ShutdownCoordinator`] and a
//! [`signals::SystemSignals`] handler, and exposes [`run_server`] /
//! [`run_client`] for an external driver to call. Deliberately carries no
//! CLI argument parsing - that's the driver's job, not this crate's.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example(incoming: mpsc::Receiver<Arc<dyn transfer_domain::Transport>>) -> Result<(), transfer_domain::TransferError> {
//! let config = transfer_core::config::TransferConfig::load("transfer.toml").await?;
//! transfer_bootstrap::logging::init("info");
//! let shutdown = transfer_bootstrap::shutdown::ShutdownCoordinator::default();
//!
//! let signal_shutdown = shutdown.clone();
//! tokio::spawn(async move {
//!     transfer_bootstrap::signals::create_signal_handler()
//!         .wait_for_signal(Box::new(move || signal_shutdown.initiate_shutdown()))
//!         .await;
//! });
//!
//! transfer_bootstrap::run_server(
//!     config,
//!     PathBuf::from("/srv/transfers"),
//!     PathBuf::from("/srv/transfers/.resume"),
//!     None,
//!     incoming,
//!     shutdown,
//! )
//! .await
//! # }
//! ```

pub mod entrypoint;
pub mod shutdown;
pub mod signals;

pub use entrypoint::{run_client, run_server, ClientRequest, Runtime};

/// Re-exported so a driver only needs to depend on this crate, not also on
/// `transfer-core`, to initialize logging.
pub use transfer_core::logging;
