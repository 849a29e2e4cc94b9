// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Transform
//!
//! Concrete implementations of the `transfer_domain` collaborator traits
//! that touch chunk bytes: [`compression`] (`Compressor`), [`encryption`]
//! (`Cipher`), and [`kdf`] (`Kdf`).

pub mod compression;
pub mod encryption;
pub mod kdf;

pub use compression::Lz4Compressor;
pub use encryption::AesGcmCipher;
pub use kdf::{Argon2Kdf, Pbkdf2Kdf};
