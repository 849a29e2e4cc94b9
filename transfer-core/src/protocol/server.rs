// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Server Session & Per-Transfer State Machines
//!
//! `ServerSessionState` tracks one connection: accept -> `Connected`
//! (awaiting a request) <-> `TransferActive` (one or more concurrent
//! transfers) -> `Disconnecting` -> `Closed`. `SenderTransferState` and
//! `ReceiverTransferState` track one transfer within that session - the
//! receiver side substitutes `Assembling` for the sender's `Transferring`.

use transfer_domain::TransferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSessionState {
    Connected,
    TransferActive,
    Disconnecting,
    Closed,
}

impl ServerSessionState {
    pub fn accept() -> Self {
        ServerSessionState::Connected
    }

    pub fn transfer_started(self) -> Result<Self, TransferError> {
        match self {
            ServerSessionState::Connected | ServerSessionState::TransferActive => Ok(ServerSessionState::TransferActive),
            other => Err(TransferError::ProtocolError(format!("cannot start a transfer from {other:?}"))),
        }
    }

    /// `remaining_transfers` is the count of transfers still active on this
    /// session after the one that just finished; the session only falls
    /// back to `Connected` once that count is zero.
    pub fn transfer_finished(self, remaining_transfers: usize) -> Result<Self, TransferError> {
        match self {
            ServerSessionState::TransferActive if remaining_transfers == 0 => Ok(ServerSessionState::Connected),
            ServerSessionState::TransferActive => Ok(ServerSessionState::TransferActive),
            other => Err(TransferError::ProtocolError(format!("no transfer active in {other:?}"))),
        }
    }

    pub fn begin_disconnect(self) -> Result<Self, TransferError> {
        match self {
            ServerSessionState::Connected | ServerSessionState::TransferActive => Ok(ServerSessionState::Disconnecting),
            other => Err(TransferError::ProtocolError(format!("cannot disconnect from {other:?}"))),
        }
    }

    pub fn closed(self) -> Self {
        ServerSessionState::Closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderTransferState {
    Pending,
    Accepted,
    Transferring,
    Paused,
    Completing,
    Completed,
    Failed,
    Cancelled,
}

impl SenderTransferState {
    pub fn accepted(self) -> Result<Self, TransferError> {
        match self {
            SenderTransferState::Pending => Ok(SenderTransferState::Accepted),
            other => Err(TransferError::ProtocolError(format!("cannot accept from {other:?}"))),
        }
    }

    pub fn rejected(self) -> Result<Self, TransferError> {
        match self {
            SenderTransferState::Pending => Ok(SenderTransferState::Failed),
            other => Err(TransferError::ProtocolError(format!("cannot reject from {other:?}"))),
        }
    }

    pub fn start_transferring(self) -> Result<Self, TransferError> {
        match self {
            SenderTransferState::Accepted | SenderTransferState::Paused => Ok(SenderTransferState::Transferring),
            other => Err(TransferError::ProtocolError(format!("cannot transfer from {other:?}"))),
        }
    }

    /// `TRANSFER_PAUSE` is not immediately effective: per the in-flight
    /// window tolerance, the sender may still emit chunks already queued
    /// before the pause takes hold (see the coordinator's send loop).
    pub fn paused(self) -> Result<Self, TransferError> {
        match self {
            SenderTransferState::Transferring => Ok(SenderTransferState::Paused),
            other => Err(TransferError::ProtocolError(format!("cannot pause from {other:?}"))),
        }
    }

    pub fn completing(self) -> Result<Self, TransferError> {
        match self {
            SenderTransferState::Transferring => Ok(SenderTransferState::Completing),
            other => Err(TransferError::ProtocolError(format!("cannot complete from {other:?}"))),
        }
    }

    pub fn completed(self) -> Result<Self, TransferError> {
        match self {
            SenderTransferState::Completing => Ok(SenderTransferState::Completed),
            other => Err(TransferError::ProtocolError(format!("cannot finish from {other:?}"))),
        }
    }

    pub fn failed(self) -> Self {
        SenderTransferState::Failed
    }

    /// `TRANSFER_CANCEL` is unilateral and valid from any non-terminal state.
    pub fn cancelled(self) -> Result<Self, TransferError> {
        match self {
            SenderTransferState::Completed | SenderTransferState::Failed | SenderTransferState::Cancelled => {
                Err(TransferError::ProtocolError(format!("cannot cancel a terminal transfer in {self:?}")))
            }
            _ => Ok(SenderTransferState::Cancelled),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SenderTransferState::Completed | SenderTransferState::Failed | SenderTransferState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverTransferState {
    Pending,
    Accepted,
    Assembling,
    Paused,
    Completing,
    Completed,
    Failed,
    Cancelled,
}

impl ReceiverTransferState {
    pub fn accepted(self) -> Result<Self, TransferError> {
        match self {
            ReceiverTransferState::Pending => Ok(ReceiverTransferState::Accepted),
            other => Err(TransferError::ProtocolError(format!("cannot accept from {other:?}"))),
        }
    }

    pub fn rejected(self) -> Result<Self, TransferError> {
        match self {
            ReceiverTransferState::Pending => Ok(ReceiverTransferState::Failed),
            other => Err(TransferError::ProtocolError(format!("cannot reject from {other:?}"))),
        }
    }

    pub fn start_assembling(self) -> Result<Self, TransferError> {
        match self {
            ReceiverTransferState::Accepted | ReceiverTransferState::Paused => Ok(ReceiverTransferState::Assembling),
            other => Err(TransferError::ProtocolError(format!("cannot assemble from {other:?}"))),
        }
    }

    pub fn paused(self) -> Result<Self, TransferError> {
        match self {
            ReceiverTransferState::Assembling => Ok(ReceiverTransferState::Paused),
            other => Err(TransferError::ProtocolError(format!("cannot pause from {other:?}"))),
        }
    }

    pub fn completing(self) -> Result<Self, TransferError> {
        match self {
            ReceiverTransferState::Assembling => Ok(ReceiverTransferState::Completing),
            other => Err(TransferError::ProtocolError(format!("cannot complete from {other:?}"))),
        }
    }

    pub fn completed(self) -> Result<Self, TransferError> {
        match self {
            ReceiverTransferState::Completing => Ok(ReceiverTransferState::Completed),
            other => Err(TransferError::ProtocolError(format!("cannot finish from {other:?}"))),
        }
    }

    pub fn failed(self) -> Self {
        ReceiverTransferState::Failed
    }

    pub fn cancelled(self) -> Result<Self, TransferError> {
        match self {
            ReceiverTransferState::Completed | ReceiverTransferState::Failed | ReceiverTransferState::Cancelled => {
                Err(TransferError::ProtocolError(format!("cannot cancel a terminal transfer in {self:?}")))
            }
            _ => Ok(ReceiverTransferState::Cancelled),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReceiverTransferState::Completed | ReceiverTransferState::Failed | ReceiverTransferState::Cancelled
        )
    }
}
