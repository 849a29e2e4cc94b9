// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Flow Control
//!
//! Token-bucket bandwidth limiting shared across a transfer's chunks.

pub mod limiter;

pub use limiter::BandwidthLimiter;
