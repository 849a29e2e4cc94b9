// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Property tests for the universal invariants: splitting a file recovers
//! its exact bytes and chunk count, and the chunk wire codec round-trips
//! for arbitrary payloads.

use proptest::prelude::*;

use transfer_core::checksum;
use transfer_core::pipeline::splitter::ChunkSplitter;
use transfer_core::wire::chunk_codec::{decode_chunk, encode_chunk};
use transfer_domain::{Chunk, ChunkConfig, ChunkFlags, ChunkHeader, TransferId};

fn small_chunk_size() -> impl Strategy<Value = usize> {
    ChunkConfig::MIN_SIZE..=ChunkConfig::MIN_SIZE * 3
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn split_recovers_exact_bytes_and_chunk_count(
        data in proptest::collection::vec(any::<u8>(), 0..(ChunkConfig::MIN_SIZE * 5)),
        nominal_chunk_size in small_chunk_size(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::write(&path, &data).unwrap();

        let config = ChunkConfig::new(nominal_chunk_size).unwrap();
        let mut splitter = ChunkSplitter::open(&path, config).unwrap();

        let expected_chunks = config.total_chunks(data.len() as u64);
        prop_assert_eq!(splitter.total_chunks(), expected_chunks);

        let mut recovered = Vec::with_capacity(data.len());
        let mut seen = 0u64;
        while let Some(raw) = splitter.next_chunk().unwrap() {
            prop_assert_eq!(raw.index, seen);
            prop_assert_eq!(raw.is_first, seen == 0);
            prop_assert_eq!(raw.is_last, seen + 1 == expected_chunks);
            recovered.extend_from_slice(&raw.data);
            seen += 1;
        }

        prop_assert_eq!(seen, expected_chunks);
        prop_assert_eq!(recovered, data.clone());
        prop_assert_eq!(checksum::sha256(&recovered), checksum::sha256(&data));
    }

    #[test]
    fn chunk_codec_round_trips_for_arbitrary_payloads(
        payload in proptest::collection::vec(any::<u8>(), 0..4096),
        chunk_index in 0u64..1000,
        total_chunks in 1u64..1001,
    ) {
        prop_assume!(chunk_index < total_chunks);

        let header = ChunkHeader {
            transfer_id: TransferId::new(),
            chunk_index,
            total_chunks,
            chunk_offset: chunk_index * ChunkConfig::DEFAULT_SIZE as u64,
            payload_length: payload.len() as u32,
            original_length: payload.len() as u32,
            flags: if total_chunks == 1 {
                ChunkFlags::FIRST_CHUNK | ChunkFlags::LAST_CHUNK
            } else if chunk_index == 0 {
                ChunkFlags::FIRST_CHUNK
            } else if chunk_index + 1 == total_chunks {
                ChunkFlags::LAST_CHUNK
            } else {
                ChunkFlags::empty()
            },
            crc32: checksum::crc32(&payload),
        };
        let chunk = Chunk { header, payload };

        let bytes = encode_chunk(&chunk);
        let decoded = decode_chunk(&bytes).unwrap();
        prop_assert_eq!(decoded, chunk);
    }
}
