// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Transport Port
//!
//! Abstracts a reliable, ordered byte stream. Concrete TCP/QUIC socket
//! implementations are out of scope for the core - this trait is the only
//! surface the protocol layer touches.

use async_trait::async_trait;

use crate::TransferError;

/// A reliable, ordered, connection-oriented byte stream.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a complete framed message. Fails with `ConnectionLost` if the
    /// peer has gone away.
    async fn send(&self, bytes: &[u8]) -> Result<(), TransferError>;

    /// Receives the next complete framed message.
    async fn recv(&self) -> Result<Vec<u8>, TransferError>;

    /// Closes the stream. Idempotent.
    async fn close(&self) -> Result<(), TransferError>;
}

/// Factory side of the transport port: establishes an outbound connection.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    type Transport: Transport;

    async fn connect(&self, endpoint: &str) -> Result<Self::Transport, TransferError>;
}
