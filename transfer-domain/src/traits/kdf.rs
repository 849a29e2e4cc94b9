// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Key Derivation Port

use serde::{Deserialize, Serialize};

use crate::TransferError;

/// Parameters for a key-derivation pass. `iterations` is each KDF's own
/// primary cost knob - PBKDF2 rounds, or Argon2's time cost - so its
/// sensible magnitude differs by algorithm; use [`KdfParams::for_pbkdf2`]
/// or [`KdfParams::for_argon2`] rather than [`KdfParams::default`] when the
/// target KDF is known. `memory_cost`/`parallel_cost` are ignored by KDFs
/// that don't use them (PBKDF2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    pub key_size: usize,
    pub iterations: u32,
    pub memory_cost: Option<u32>,
    pub parallel_cost: Option<u32>,
}

impl KdfParams {
    /// NIST SP 800-132 minimum rounds for PBKDF2-HMAC-SHA256.
    pub fn for_pbkdf2(key_size: usize) -> Self {
        Self {
            key_size,
            iterations: 600_000,
            memory_cost: None,
            parallel_cost: None,
        }
    }

    /// OWASP-recommended baseline for Argon2id: time cost 2, 19 MiB, one lane.
    pub fn for_argon2(key_size: usize) -> Self {
        Self {
            key_size,
            iterations: 2,
            memory_cost: Some(19 * 1024),
            parallel_cost: Some(1),
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::for_pbkdf2(32)
    }
}

/// Deterministic password-based key derivation. Salts are freshly random
/// per derivation; given the same password, salt, and params, `derive`
/// always returns the same key.
pub trait Kdf: Send + Sync {
    fn derive(&self, password: &[u8], salt: &[u8], params: &KdfParams) -> Result<Vec<u8>, TransferError>;
}
