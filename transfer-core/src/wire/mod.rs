// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Wire Layer
//!
//! Bit-exact framing for chunk payloads ([`chunk_codec`]) and for the
//! envelope + message types of the control protocol ([`protocol_codec`],
//! [`messages`]).

pub mod chunk_codec;
pub mod messages;
pub mod protocol_codec;

pub use messages::{Message, MessageType};
pub use protocol_codec::{ProtocolVersion, PROTOCOL_MAGIC};
