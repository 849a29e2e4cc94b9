// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Codec
//!
//! Fixed wire header for a single chunk: every [`ChunkHeader`] field, in
//! the stable order from the data model, followed by the raw payload
//! bytes. All multi-byte integers are big-endian.

use transfer_domain::{Chunk, ChunkConfig, ChunkFlags, ChunkHeader, TransferError, TransferId};

use crate::checksum;

/// `transfer_id(16) + chunk_index(8) + total_chunks(8) + chunk_offset(8) +
/// payload_length(4) + original_length(4) + flags(4) + crc32(4)`.
pub const CHUNK_HEADER_LEN: usize = 16 + 8 + 8 + 8 + 4 + 4 + 4 + 4;

/// Largest payload a single chunk's `payload_length` may declare: the
/// maximum nominal chunk size plus headroom for AEAD tag/cipher overhead.
pub const MAX_CHUNK_PAYLOAD_LEN: usize = ChunkConfig::MAX_SIZE + 64;

pub fn encode_header(header: &ChunkHeader) -> [u8; CHUNK_HEADER_LEN] {
    let mut buf = [0u8; CHUNK_HEADER_LEN];
    let mut offset = 0;

    buf[offset..offset + 16].copy_from_slice(header.transfer_id.as_uuid().as_bytes());
    offset += 16;
    buf[offset..offset + 8].copy_from_slice(&header.chunk_index.to_be_bytes());
    offset += 8;
    buf[offset..offset + 8].copy_from_slice(&header.total_chunks.to_be_bytes());
    offset += 8;
    buf[offset..offset + 8].copy_from_slice(&header.chunk_offset.to_be_bytes());
    offset += 8;
    buf[offset..offset + 4].copy_from_slice(&header.payload_length.to_be_bytes());
    offset += 4;
    buf[offset..offset + 4].copy_from_slice(&header.original_length.to_be_bytes());
    offset += 4;
    buf[offset..offset + 4].copy_from_slice(&header.flags.bits().to_be_bytes());
    offset += 4;
    buf[offset..offset + 4].copy_from_slice(&header.crc32.to_be_bytes());

    buf
}

fn decode_header_unchecked(bytes: &[u8]) -> ChunkHeader {
    let transfer_id = TransferId::from_uuid(uuid::Uuid::from_slice(&bytes[0..16]).expect("16-byte slice"));
    let chunk_index = u64::from_be_bytes(bytes[16..24].try_into().unwrap());
    let total_chunks = u64::from_be_bytes(bytes[24..32].try_into().unwrap());
    let chunk_offset = u64::from_be_bytes(bytes[32..40].try_into().unwrap());
    let payload_length = u32::from_be_bytes(bytes[40..44].try_into().unwrap());
    let original_length = u32::from_be_bytes(bytes[44..48].try_into().unwrap());
    let flags = ChunkFlags::from_bits_truncate(u32::from_be_bytes(bytes[48..52].try_into().unwrap()));
    let crc32 = u32::from_be_bytes(bytes[52..56].try_into().unwrap());

    ChunkHeader {
        transfer_id,
        chunk_index,
        total_chunks,
        chunk_offset,
        payload_length,
        original_length,
        flags,
        crc32,
    }
}

/// Encodes a full chunk (header + payload) as it appears on the wire.
pub fn encode_chunk(chunk: &Chunk) -> Vec<u8> {
    let mut out = Vec::with_capacity(CHUNK_HEADER_LEN + chunk.payload.len());
    out.extend_from_slice(&encode_header(&chunk.header));
    out.extend_from_slice(&chunk.payload);
    out
}

/// Reads just the `transfer_id` out of a chunk frame, without validating
/// the rest of the header or the payload CRC. Used by session routers to
/// demultiplex `CHUNK_DATA` frames to the right transfer before handing
/// them off for the full [`decode_chunk`] + integrity check.
pub fn peek_transfer_id(bytes: &[u8]) -> Result<TransferId, TransferError> {
    if bytes.len() < 16 {
        return Err(TransferError::ProtocolError("chunk header truncated".into()));
    }
    let uuid = uuid::Uuid::from_slice(&bytes[0..16]).map_err(|e| TransferError::ProtocolError(e.to_string()))?;
    Ok(TransferId::from_uuid(uuid))
}

/// Decodes and validates a chunk from its wire representation.
///
/// Validates: header length, non-zero `total_chunks`, `chunk_index <
/// total_chunks`, `payload_length` within protocol bounds, and that the
/// trailing payload's CRC matches the header's `crc32`.
pub fn decode_chunk(bytes: &[u8]) -> Result<Chunk, TransferError> {
    if bytes.len() < CHUNK_HEADER_LEN {
        return Err(TransferError::ProtocolError("chunk header truncated".into()));
    }
    let header = decode_header_unchecked(&bytes[..CHUNK_HEADER_LEN]);

    if header.total_chunks == 0 {
        return Err(TransferError::ProtocolError("total_chunks must be non-zero".into()));
    }
    if header.chunk_index >= header.total_chunks {
        return Err(TransferError::InvalidChunkIndex(format!(
            "chunk_index {} >= total_chunks {}",
            header.chunk_index, header.total_chunks
        )));
    }
    if header.payload_length as usize > MAX_CHUNK_PAYLOAD_LEN {
        return Err(TransferError::ProtocolError(format!(
            "payload_length {} exceeds protocol maximum {}",
            header.payload_length, MAX_CHUNK_PAYLOAD_LEN
        )));
    }

    let payload_end = CHUNK_HEADER_LEN + header.payload_length as usize;
    if bytes.len() < payload_end {
        return Err(TransferError::ProtocolError("chunk payload truncated".into()));
    }
    let payload = bytes[CHUNK_HEADER_LEN..payload_end].to_vec();

    let computed = checksum::crc32(&payload);
    if !checksum::verify_crc32(computed, header.crc32) {
        return Err(TransferError::ChunkChecksumError(format!(
            "chunk {} crc mismatch: header={:#x} computed={:#x}",
            header.chunk_index, header.crc32, computed
        )));
    }

    Ok(Chunk { header, payload })
}
