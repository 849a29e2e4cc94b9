// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Protocol State Machine
//!
//! Session and per-transfer lifecycle states for both ends of the
//! connection, with explicit `match`-driven transition functions - no
//! unwinding, every illegal transition is a typed `TransferError`.

pub mod client;
pub mod server;

pub use client::{ClientState, ReconnectPolicy};
pub use server::{ReceiverTransferState, SenderTransferState, ServerSessionState};
