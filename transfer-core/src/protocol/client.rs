// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Client Session State Machine
//!
//! `Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected`,
//! with `Reconnecting` entered from `Connected` when the transport is lost
//! and auto-reconnect is enabled.

use transfer_domain::TransferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

impl ClientState {
    pub fn begin_connect(self) -> Result<Self, TransferError> {
        match self {
            ClientState::Disconnected => Ok(ClientState::Connecting),
            other => Err(TransferError::ProtocolError(format!("cannot connect from {other:?}"))),
        }
    }

    pub fn connected(self) -> Result<Self, TransferError> {
        match self {
            ClientState::Connecting | ClientState::Reconnecting => Ok(ClientState::Connected),
            other => Err(TransferError::ProtocolError(format!("cannot become connected from {other:?}"))),
        }
    }

    /// The transport dropped. `auto_reconnect` gates whether this is
    /// recoverable or terminal.
    pub fn connection_lost(self, auto_reconnect: bool) -> Result<Self, TransferError> {
        match self {
            ClientState::Connected | ClientState::Reconnecting if auto_reconnect => Ok(ClientState::Reconnecting),
            ClientState::Connected | ClientState::Connecting => Ok(ClientState::Disconnected),
            other => Err(TransferError::ProtocolError(format!("cannot lose connection from {other:?}"))),
        }
    }

    pub fn begin_disconnect(self) -> Result<Self, TransferError> {
        match self {
            ClientState::Connected => Ok(ClientState::Disconnecting),
            other => Err(TransferError::ProtocolError(format!("cannot disconnect from {other:?}"))),
        }
    }

    pub fn disconnected(self) -> Result<Self, TransferError> {
        match self {
            ClientState::Disconnecting | ClientState::Reconnecting | ClientState::Connecting => {
                Ok(ClientState::Disconnected)
            }
            other => Err(TransferError::ProtocolError(format!("cannot finish disconnecting from {other:?}"))),
        }
    }
}

/// Bounded exponential backoff for the `Reconnecting` state.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(initial_delay_ms: u64, max_delay_ms: u64, multiplier: f64, max_attempts: u32) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
            max_attempts,
        }
    }

    /// Delay before reconnect attempt number `attempt` (1-based). Returns
    /// `None` once `max_attempts` has been exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<std::time::Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let scaled = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32 - 1);
        let capped = scaled.min(self.max_delay_ms as f64) as u64;
        Some(std::time::Duration::from_millis(capped))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(500, 30_000, 2.0, 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_connect_and_disconnect() {
        let state = ClientState::Disconnected;
        let state = state.begin_connect().unwrap();
        assert_eq!(state, ClientState::Connecting);
        let state = state.connected().unwrap();
        assert_eq!(state, ClientState::Connected);
        let state = state.begin_disconnect().unwrap();
        assert_eq!(state, ClientState::Disconnecting);
        let state = state.disconnected().unwrap();
        assert_eq!(state, ClientState::Disconnected);
    }

    #[test]
    fn connection_lost_with_auto_reconnect_enters_reconnecting() {
        let state = ClientState::Connected.connection_lost(true).unwrap();
        assert_eq!(state, ClientState::Reconnecting);
    }

    #[test]
    fn connection_lost_without_auto_reconnect_goes_disconnected() {
        let state = ClientState::Connected.connection_lost(false).unwrap();
        assert_eq!(state, ClientState::Disconnected);
    }

    #[test]
    fn cannot_connect_twice() {
        let state = ClientState::Connecting;
        assert!(state.begin_connect().is_err());
    }

    #[test]
    fn reconnect_delay_grows_then_caps() {
        let policy = ReconnectPolicy::new(100, 1000, 2.0, 4);
        assert_eq!(policy.delay_for_attempt(1).unwrap().as_millis(), 100);
        assert_eq!(policy.delay_for_attempt(2).unwrap().as_millis(), 200);
        assert_eq!(policy.delay_for_attempt(3).unwrap().as_millis(), 400);
        assert_eq!(policy.delay_for_attempt(4).unwrap().as_millis(), 800);
        assert!(policy.delay_for_attempt(5).is_none());
    }

    #[test]
    fn reconnect_delay_never_exceeds_max() {
        let policy = ReconnectPolicy::new(1000, 1500, 3.0, 10);
        for attempt in 1..=10 {
            let delay = policy.delay_for_attempt(attempt).unwrap();
            assert!(delay.as_millis() <= 1500);
        }
    }
}
