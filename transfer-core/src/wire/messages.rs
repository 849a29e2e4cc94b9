// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Message Types
//!
//! [`MessageType`] enumerates the control-protocol message codes (§4.8);
//! [`Message`] is the decoded, typed payload for each. Session/Upload/
//! Resume/Control/Download/Listing payloads are plain structs so the
//! protocol state machines in [`crate::protocol`] can match on them
//! without re-parsing bytes.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use transfer_domain::TransferId;

/// Wire codes for every message the protocol exchanges, grouped by
/// category exactly as laid out in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Connect = 0x01,
    ConnectAck = 0x02,
    Disconnect = 0x03,
    Heartbeat = 0x04,
    HeartbeatAck = 0x05,

    UploadRequest = 0x10,
    UploadAccept = 0x11,
    UploadReject = 0x12,
    UploadComplete = 0x13,
    UploadAck = 0x14,

    ChunkData = 0x20,
    ChunkAck = 0x21,
    ChunkNack = 0x22,

    ResumeRequest = 0x30,
    ResumeResponse = 0x31,

    TransferCancel = 0x40,
    TransferPause = 0x41,
    TransferResume = 0x42,
    TransferVerify = 0x43,

    DownloadRequest = 0x50,
    DownloadAccept = 0x51,
    DownloadReject = 0x52,
    DownloadComplete = 0x53,
    DownloadAck = 0x54,

    ListRequest = 0x60,
    ListResponse = 0x61,

    Error = 0xFF,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        use MessageType::*;
        Some(match byte {
            0x01 => Connect,
            0x02 => ConnectAck,
            0x03 => Disconnect,
            0x04 => Heartbeat,
            0x05 => HeartbeatAck,
            0x10 => UploadRequest,
            0x11 => UploadAccept,
            0x12 => UploadReject,
            0x13 => UploadComplete,
            0x14 => UploadAck,
            0x20 => ChunkData,
            0x21 => ChunkAck,
            0x22 => ChunkNack,
            0x30 => ResumeRequest,
            0x31 => ResumeResponse,
            0x40 => TransferCancel,
            0x41 => TransferPause,
            0x42 => TransferResume,
            0x43 => TransferVerify,
            0x50 => DownloadRequest,
            0x51 => DownloadAccept,
            0x52 => DownloadReject,
            0x53 => DownloadComplete,
            0x54 => DownloadAck,
            0x60 => ListRequest,
            0x61 => ListResponse,
            0xFF => Error,
            _ => return None,
        })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

bitflags! {
    /// `CONNECT`/`CONNECT_ACK` capability bitmap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Capabilities: u32 {
        const COMPRESSION     = 1 << 0;
        const RESUME          = 1 << 1;
        const BATCH_TRANSFER  = 1 << 2;
        const QUIC_SUPPORT    = 1 << 3;
        const AUTO_RECONNECT  = 1 << 4;
        const ENCRYPTION      = 1 << 5;
    }
}

bitflags! {
    /// Per-transfer options carried on `UPLOAD_REQUEST`/`DOWNLOAD_REQUEST`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TransferOptions: u32 {
        const OVERWRITE_EXISTING = 1 << 0;
        const VERIFY_CHECKSUM    = 1 << 1;
        const PRESERVE_TIMESTAMP = 1 << 2;
        const ENCRYPTED          = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPayload {
    pub capabilities: Capabilities,
    pub client_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectAckPayload {
    pub capabilities: Capabilities,
    pub rejected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequestPayload {
    pub transfer_id: TransferId,
    pub filename: String,
    pub file_size: u64,
    pub total_chunks: u64,
    pub sha256: String,
    pub options: TransferOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAcceptPayload {
    pub transfer_id: TransferId,
    /// Empty when the receiver has nothing yet; populated when resuming.
    pub resume_bitmap: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRejectPayload {
    pub transfer_id: TransferId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAckPayload {
    pub transfer_id: TransferId,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAckPayload {
    pub transfer_id: TransferId,
    pub chunk_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkNackPayload {
    pub transfer_id: TransferId,
    pub chunk_index: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRequestPayload {
    pub transfer_id: TransferId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeResponsePayload {
    pub transfer_id: TransferId,
    /// Empty when the server holds no state for this transfer.
    pub bitmap: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCancelPayload {
    pub transfer_id: TransferId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPausePayload {
    pub transfer_id: TransferId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResumePayload {
    pub transfer_id: TransferId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferVerifyPayload {
    pub transfer_id: TransferId,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequestPayload {
    pub transfer_id: TransferId,
    pub filename: String,
    pub options: TransferOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadAcceptPayload {
    pub transfer_id: TransferId,
    pub file_size: u64,
    pub total_chunks: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRejectPayload {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadAckPayload {
    pub transfer_id: TransferId,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListSortField {
    Name,
    Size,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListSortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequestPayload {
    pub prefix: String,
    pub sort_field: ListSortField,
    pub sort_order: ListSortOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub filename: String,
    pub size: u64,
    pub modified_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponsePayload {
    pub entries: Vec<ListEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: u32,
    pub message: String,
}

/// A fully decoded protocol message: the envelope's `msg_type` determines
/// which variant is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Connect(ConnectPayload),
    ConnectAck(ConnectAckPayload),
    Disconnect,
    Heartbeat,
    HeartbeatAck,

    UploadRequest(UploadRequestPayload),
    UploadAccept(UploadAcceptPayload),
    UploadReject(UploadRejectPayload),
    UploadComplete { transfer_id: TransferId },
    UploadAck(UploadAckPayload),

    /// `ChunkData`'s payload is not JSON-encoded like the others; it is the
    /// raw `chunk_codec` frame, carried separately by the transport layer.
    ChunkData { frame: Vec<u8> },
    ChunkAck(ChunkAckPayload),
    ChunkNack(ChunkNackPayload),

    ResumeRequest(ResumeRequestPayload),
    ResumeResponse(ResumeResponsePayload),

    TransferCancel(TransferCancelPayload),
    TransferPause(TransferPausePayload),
    TransferResume(TransferResumePayload),
    TransferVerify(TransferVerifyPayload),

    DownloadRequest(DownloadRequestPayload),
    DownloadAccept(DownloadAcceptPayload),
    DownloadReject(DownloadRejectPayload),
    DownloadComplete { transfer_id: TransferId },
    DownloadAck(DownloadAckPayload),

    ListRequest(ListRequestPayload),
    ListResponse(ListResponsePayload),

    Error(ErrorPayload),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Connect(_) => MessageType::Connect,
            Message::ConnectAck(_) => MessageType::ConnectAck,
            Message::Disconnect => MessageType::Disconnect,
            Message::Heartbeat => MessageType::Heartbeat,
            Message::HeartbeatAck => MessageType::HeartbeatAck,
            Message::UploadRequest(_) => MessageType::UploadRequest,
            Message::UploadAccept(_) => MessageType::UploadAccept,
            Message::UploadReject(_) => MessageType::UploadReject,
            Message::UploadComplete { .. } => MessageType::UploadComplete,
            Message::UploadAck(_) => MessageType::UploadAck,
            Message::ChunkData { .. } => MessageType::ChunkData,
            Message::ChunkAck(_) => MessageType::ChunkAck,
            Message::ChunkNack(_) => MessageType::ChunkNack,
            Message::ResumeRequest(_) => MessageType::ResumeRequest,
            Message::ResumeResponse(_) => MessageType::ResumeResponse,
            Message::TransferCancel(_) => MessageType::TransferCancel,
            Message::TransferPause(_) => MessageType::TransferPause,
            Message::TransferResume(_) => MessageType::TransferResume,
            Message::TransferVerify(_) => MessageType::TransferVerify,
            Message::DownloadRequest(_) => MessageType::DownloadRequest,
            Message::DownloadAccept(_) => MessageType::DownloadAccept,
            Message::DownloadReject(_) => MessageType::DownloadReject,
            Message::DownloadComplete { .. } => MessageType::DownloadComplete,
            Message::DownloadAck(_) => MessageType::DownloadAck,
            Message::ListRequest(_) => MessageType::ListRequest,
            Message::ListResponse(_) => MessageType::ListResponse,
            Message::Error(_) => MessageType::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trips_for_every_known_code() {
        let codes = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x10, 0x11, 0x12, 0x13, 0x14, 0x20, 0x21, 0x22, 0x30, 0x31, 0x40, 0x41,
            0x42, 0x43, 0x50, 0x51, 0x52, 0x53, 0x54, 0x60, 0x61, 0xFF,
        ];
        for code in codes {
            let parsed = MessageType::from_byte(code).unwrap_or_else(|| panic!("code {code:#x} should parse"));
            assert_eq!(parsed.as_byte(), code);
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert!(MessageType::from_byte(0x99).is_none());
    }

    #[test]
    fn capabilities_compose_and_intersect() {
        let client = Capabilities::COMPRESSION | Capabilities::RESUME | Capabilities::ENCRYPTION;
        let server = Capabilities::COMPRESSION | Capabilities::ENCRYPTION | Capabilities::QUIC_SUPPORT;
        let agreed = client & server;
        assert!(agreed.contains(Capabilities::COMPRESSION));
        assert!(agreed.contains(Capabilities::ENCRYPTION));
        assert!(!agreed.contains(Capabilities::RESUME));
        assert!(!agreed.contains(Capabilities::QUIC_SUPPORT));
    }

    #[test]
    fn message_type_matches_payload_variant() {
        let msg = Message::Heartbeat;
        assert_eq!(msg.message_type(), MessageType::Heartbeat);
    }
}
