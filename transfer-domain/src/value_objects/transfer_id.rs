// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Transfer Identifier
//!
//! A 128-bit opaque identifier generated client-side for each transfer. It
//! stays stable across pauses and resumes and is the key under which resume
//! state, temp files, and active coordinators are tracked.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::TransferError;

/// Unique identifier for one end-to-end file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Generates a new, random transfer id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Renders the id as lowercase hex (no dashes) - the form used for
    /// resume-state filenames (`<transfer_id_hex>.json`).
    pub fn as_hex(&self) -> String {
        self.0.simple().to_string()
    }

    /// Parses a transfer id from its hex form.
    pub fn from_hex(s: &str) -> Result<Self, TransferError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TransferError::InvalidConfiguration(format!("bad transfer id {s}: {e}")))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Wraps a caller-supplied UUID, e.g. one decoded off the wire.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_hex() {
        let id = TransferId::new();
        let parsed = TransferId::from_hex(&id.as_hex()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn two_fresh_ids_differ() {
        assert_ne!(TransferId::new(), TransferId::new());
    }

    #[test]
    fn rejects_garbage_hex() {
        assert!(TransferId::from_hex("not-a-uuid").is_err());
    }
}
