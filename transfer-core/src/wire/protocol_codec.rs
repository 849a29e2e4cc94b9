// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Protocol Codec
//!
//! The envelope every wire message is framed in: `magic(4) | version(4) |
//! msg_type(1) | payload_len(4) | payload`. JSON-encoded message payloads
//! (everything but `CHUNK_DATA`, whose payload is the raw
//! [`crate::wire::chunk_codec`] frame) are carried opaquely here; this
//! layer only validates and frames, it does not interpret payload bytes.

use serde::{Deserialize, Serialize};

use transfer_domain::TransferError;

use super::messages::{Message, MessageType};

pub const PROTOCOL_MAGIC: u32 = 0x4654_5331; // "FTS1"

pub const ENVELOPE_HEADER_LEN: usize = 4 + 4 + 1 + 4;

/// `major.minor.patch.build`, packed big-endian into a `u32` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub build: u8,
}

impl ProtocolVersion {
    pub const CURRENT: ProtocolVersion = ProtocolVersion {
        major: 0,
        minor: 2,
        patch: 0,
        build: 0,
    };

    pub fn to_u32(self) -> u32 {
        (self.major as u32) << 24 | (self.minor as u32) << 16 | (self.patch as u32) << 8 | self.build as u32
    }

    pub fn from_u32(v: u32) -> Self {
        Self {
            major: (v >> 24) as u8,
            minor: (v >> 16) as u8,
            patch: (v >> 8) as u8,
            build: v as u8,
        }
    }

    /// Two versions are wire-compatible when their major numbers match;
    /// minor/patch/build are additive and backward compatible.
    pub fn is_compatible_with(self, other: ProtocolVersion) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}

/// Largest payload length a peer will accept; guards against a hostile or
/// corrupt length field asking for an unbounded allocation.
pub const DEFAULT_MAX_PAYLOAD_LEN: u32 = 8 * 1024 * 1024;

/// Encodes the envelope header for a message whose payload is `payload`.
pub fn encode_envelope(msg_type: MessageType, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + payload.len());
    out.extend_from_slice(&PROTOCOL_MAGIC.to_be_bytes());
    out.extend_from_slice(&ProtocolVersion::CURRENT.to_u32().to_be_bytes());
    out.push(msg_type.as_byte());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// The envelope header, decoded and validated, before its payload bytes
/// have necessarily all arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub version: ProtocolVersion,
    pub msg_type: MessageType,
    pub payload_len: u32,
}

/// Decodes and validates the fixed-size envelope header. Does not require
/// the payload to be present.
pub fn decode_envelope_header(bytes: &[u8], max_payload_len: u32) -> Result<EnvelopeHeader, TransferError> {
    if bytes.len() < ENVELOPE_HEADER_LEN {
        return Err(TransferError::ProtocolError("envelope header truncated".into()));
    }

    let magic = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    if magic != PROTOCOL_MAGIC {
        return Err(TransferError::ProtocolError(format!("bad magic {magic:#x}")));
    }

    let version = ProtocolVersion::from_u32(u32::from_be_bytes(bytes[4..8].try_into().unwrap()));
    if !version.is_compatible_with(ProtocolVersion::CURRENT) {
        return Err(TransferError::ProtocolVersionMismatch(format!(
            "peer version {version}, expected major {}",
            ProtocolVersion::CURRENT.major
        )));
    }

    let msg_type = MessageType::from_byte(bytes[8]).ok_or_else(|| {
        TransferError::ProtocolError(format!("unknown message type byte {:#x}", bytes[8]))
    })?;

    let payload_len = u32::from_be_bytes(bytes[9..13].try_into().unwrap());
    if payload_len > max_payload_len {
        return Err(TransferError::ProtocolError(format!(
            "payload_len {payload_len} exceeds maximum {max_payload_len}"
        )));
    }

    Ok(EnvelopeHeader {
        version,
        msg_type,
        payload_len,
    })
}

/// Encodes a non-chunk message: JSON-serializes its payload (or an empty
/// payload for variants that carry none) and frames it.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, TransferError> {
    let msg_type = message.message_type();
    let payload = match message {
        Message::Disconnect | Message::Heartbeat | Message::HeartbeatAck => Vec::new(),
        Message::ChunkData { frame } => frame.clone(),
        other => serde_json::to_vec(other).map_err(|e| TransferError::ProtocolError(e.to_string()))?,
    };
    Ok(encode_envelope(msg_type, &payload))
}

/// Decodes a full frame (header already known to be present and
/// `payload_len` bytes of payload available in `bytes`) into a [`Message`].
pub fn decode_message(bytes: &[u8], max_payload_len: u32) -> Result<Message, TransferError> {
    let header = decode_envelope_header(bytes, max_payload_len)?;
    let payload_end = ENVELOPE_HEADER_LEN + header.payload_len as usize;
    if bytes.len() < payload_end {
        return Err(TransferError::ProtocolError("envelope payload truncated".into()));
    }
    let payload = &bytes[ENVELOPE_HEADER_LEN..payload_end];

    Ok(match header.msg_type {
        MessageType::Disconnect => Message::Disconnect,
        MessageType::Heartbeat => Message::Heartbeat,
        MessageType::HeartbeatAck => Message::HeartbeatAck,
        MessageType::ChunkData => Message::ChunkData { frame: payload.to_vec() },
        other => decode_json_payload(other, payload)?,
    })
}

fn decode_json_payload(msg_type: MessageType, payload: &[u8]) -> Result<Message, TransferError> {
    use super::messages::*;

    let map_err = |e: serde_json::Error| TransferError::ProtocolError(e.to_string());
    Ok(match msg_type {
        MessageType::Connect => Message::Connect(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::ConnectAck => Message::ConnectAck(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::UploadRequest => Message::UploadRequest(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::UploadAccept => Message::UploadAccept(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::UploadReject => Message::UploadReject(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::UploadComplete => {
            #[derive(Deserialize)]
            struct P {
                transfer_id: transfer_domain::TransferId,
            }
            let p: P = serde_json::from_slice(payload).map_err(map_err)?;
            Message::UploadComplete { transfer_id: p.transfer_id }
        }
        MessageType::UploadAck => Message::UploadAck(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::ChunkAck => Message::ChunkAck(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::ChunkNack => Message::ChunkNack(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::ResumeRequest => Message::ResumeRequest(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::ResumeResponse => Message::ResumeResponse(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::TransferCancel => Message::TransferCancel(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::TransferPause => Message::TransferPause(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::TransferResume => Message::TransferResume(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::TransferVerify => Message::TransferVerify(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::DownloadRequest => Message::DownloadRequest(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::DownloadAccept => Message::DownloadAccept(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::DownloadReject => Message::DownloadReject(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::DownloadComplete => {
            #[derive(Deserialize)]
            struct P {
                transfer_id: transfer_domain::TransferId,
            }
            let p: P = serde_json::from_slice(payload).map_err(map_err)?;
            Message::DownloadComplete { transfer_id: p.transfer_id }
        }
        MessageType::DownloadAck => Message::DownloadAck(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::ListRequest => Message::ListRequest(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::ListResponse => Message::ListResponse(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::Error => Message::Error(serde_json::from_slice(payload).map_err(map_err)?),
        MessageType::Disconnect | MessageType::Heartbeat | MessageType::HeartbeatAck | MessageType::ChunkData => {
            unreachable!("handled before decode_json_payload")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::messages::{ChunkAckPayload, ConnectPayload};
    use transfer_domain::TransferId;

    #[test]
    fn round_trips_a_json_message() {
        let msg = Message::ConnectAck(super::super::messages::ConnectAckPayload {
            capabilities: super::super::messages::Capabilities::COMPRESSION,
            rejected: None,
        });
        let bytes = encode_message(&msg).unwrap();
        let decoded = decode_message(&bytes, DEFAULT_MAX_PAYLOAD_LEN).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_chunk_ack() {
        let msg = Message::ChunkAck(ChunkAckPayload {
            transfer_id: TransferId::new(),
            chunk_index: 7,
        });
        let bytes = encode_message(&msg).unwrap();
        let decoded = decode_message(&bytes, DEFAULT_MAX_PAYLOAD_LEN).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_connect_with_client_name() {
        let msg = Message::Connect(ConnectPayload {
            capabilities: super::super::messages::Capabilities::ENCRYPTION,
            client_name: "test-client".into(),
        });
        let bytes = encode_message(&msg).unwrap();
        let decoded = decode_message(&bytes, DEFAULT_MAX_PAYLOAD_LEN).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode_message(&Message::Heartbeat).unwrap();
        bytes[0] ^= 0xFF;
        let err = decode_message(&bytes, DEFAULT_MAX_PAYLOAD_LEN).unwrap_err();
        assert!(matches!(err, TransferError::ProtocolError(_)));
    }

    #[test]
    fn rejects_incompatible_major_version() {
        let mut bytes = encode_message(&Message::Heartbeat).unwrap();
        let mismatched = ProtocolVersion {
            major: ProtocolVersion::CURRENT.major + 1,
            ..ProtocolVersion::CURRENT
        };
        bytes[4..8].copy_from_slice(&mismatched.to_u32().to_be_bytes());
        let err = decode_message(&bytes, DEFAULT_MAX_PAYLOAD_LEN).unwrap_err();
        assert!(matches!(err, TransferError::ProtocolVersionMismatch(_)));
    }

    #[test]
    fn rejects_oversized_payload_len() {
        let bytes = encode_message(&Message::Heartbeat).unwrap();
        let err = decode_envelope_header(&bytes, 0).unwrap_err();
        assert!(matches!(err, TransferError::ProtocolError(_)));
    }

    #[test]
    fn version_compatibility_ignores_minor_patch_build() {
        let newer = ProtocolVersion {
            minor: ProtocolVersion::CURRENT.minor + 1,
            ..ProtocolVersion::CURRENT
        };
        assert!(newer.is_compatible_with(ProtocolVersion::CURRENT));
    }
}
