// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Key Derivation
//!
//! Two `Kdf` implementations: [`Argon2Kdf`] (memory-hard, the default for
//! interactive passphrase entry) and [`Pbkdf2Kdf`] (lighter weight, kept
//! for interop with peers that only support it). Both derive raw key
//! bytes directly rather than going through a PHC-formatted hash string.

use argon2::Argon2;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use transfer_domain::traits::KdfParams;
use transfer_domain::{Kdf, TransferError};

pub struct Argon2Kdf;

impl Argon2Kdf {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Argon2Kdf {
    fn default() -> Self {
        Self::new()
    }
}

impl Kdf for Argon2Kdf {
    fn derive(&self, password: &[u8], salt: &[u8], params: &KdfParams) -> Result<Vec<u8>, TransferError> {
        let memory_cost = params.memory_cost.unwrap_or(19 * 1024);
        let parallel_cost = params.parallel_cost.unwrap_or(1);

        let argon2_params = argon2::Params::new(memory_cost, params.iterations, parallel_cost, Some(params.key_size))
            .map_err(|e| TransferError::KeyDerivationFailure(e.to_string()))?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, argon2_params);

        let mut output = vec![0u8; params.key_size];
        argon2
            .hash_password_into(password, salt, &mut output)
            .map_err(|e| TransferError::KeyDerivationFailure(e.to_string()))?;
        Ok(output)
    }
}

pub struct Pbkdf2Kdf;

impl Pbkdf2Kdf {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Pbkdf2Kdf {
    fn default() -> Self {
        Self::new()
    }
}

impl Kdf for Pbkdf2Kdf {
    fn derive(&self, password: &[u8], salt: &[u8], params: &KdfParams) -> Result<Vec<u8>, TransferError> {
        if params.iterations == 0 {
            return Err(TransferError::KeyDerivationFailure("iterations must be non-zero".into()));
        }
        let mut output = vec![0u8; params.key_size];
        pbkdf2_hmac::<Sha256>(password, salt, params.iterations, &mut output);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2_is_deterministic_for_same_inputs() {
        let kdf = Argon2Kdf::new();
        let params = KdfParams::for_argon2(32);
        let salt = b"0123456789abcdef";
        let key1 = kdf.derive(b"correct horse battery staple", salt, &params).unwrap();
        let key2 = kdf.derive(b"correct horse battery staple", salt, &params).unwrap();
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), params.key_size);
    }

    #[test]
    fn argon2_differs_per_salt() {
        let kdf = Argon2Kdf::new();
        let params = KdfParams::for_argon2(32);
        let key1 = kdf.derive(b"password", b"salt-one-abcdefg", &params).unwrap();
        let key2 = kdf.derive(b"password", b"salt-two-abcdefg", &params).unwrap();
        assert_ne!(key1, key2);
    }

    #[test]
    fn pbkdf2_is_deterministic_for_same_inputs() {
        let kdf = Pbkdf2Kdf::new();
        let params = KdfParams::for_pbkdf2(32);
        let salt = b"0123456789abcdef";
        let key1 = kdf.derive(b"password", salt, &params).unwrap();
        let key2 = kdf.derive(b"password", salt, &params).unwrap();
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), params.key_size);
    }

    #[test]
    fn pbkdf2_rejects_zero_iterations() {
        let kdf = Pbkdf2Kdf::new();
        let params = KdfParams {
            iterations: 0,
            ..KdfParams::for_pbkdf2(32)
        };
        let err = kdf.derive(b"password", b"salt", &params).unwrap_err();
        assert!(matches!(err, TransferError::KeyDerivationFailure(_)));
    }
}
