// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Assembler
//!
//! Accepts chunks in any order and writes each directly to its offset in a
//! sparse temporary file, tracking completion with a [`transfer_domain::ChunkBitmap`].
//! One session per `TransferId`; sessions are sharded behind a [`DashMap`]
//! so unrelated transfers never contend on the same lock. Finalizing
//! renames the temp file into place; cancelling deletes it.

use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use rand::RngCore;
use tokio::sync::Mutex as AsyncMutex;

use transfer_domain::{ChunkBitmap, TransferError, TransferId};

use crate::checksum;

struct SessionInner {
    file: std::fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    bitmap: ChunkBitmap,
    transferred_bytes: u64,
}

/// Concurrent, session-keyed writer for in-progress transfers.
pub struct ChunkAssembler {
    storage_dir: PathBuf,
    sessions: DashMap<TransferId, Arc<AsyncMutex<SessionInner>>>,
}

impl ChunkAssembler {
    pub fn new(storage_dir: PathBuf) -> Self {
        Self {
            storage_dir,
            sessions: DashMap::new(),
        }
    }

    fn temp_file_name() -> String {
        let mut bytes = [0u8; 8];
        rand::rng().fill_bytes(&mut bytes);
        format!(".tmp_{}", hex::encode(bytes))
    }

    /// Opens (creating if absent) a session for `transfer_id`, preallocating
    /// a sparse file of `total_size` bytes under the storage directory.
    pub async fn start_session(
        &self,
        transfer_id: TransferId,
        filename: &str,
        total_size: u64,
        total_chunks: u64,
    ) -> Result<(), TransferError> {
        if self.sessions.contains_key(&transfer_id) {
            return Ok(());
        }
        validate_filename(filename)?;

        let temp_path = self.storage_dir.join(Self::temp_file_name());
        let final_path = self.storage_dir.join(filename);

        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(TransferError::from)?;
        file.set_len(total_size).map_err(TransferError::from)?;

        let inner = SessionInner {
            file,
            temp_path,
            final_path,
            bitmap: ChunkBitmap::new(total_chunks),
            transferred_bytes: 0,
        };
        self.sessions.insert(transfer_id, Arc::new(AsyncMutex::new(inner)));
        Ok(())
    }

    /// Writes one chunk's plaintext payload at `offset`. Returns `true` if
    /// this was the first time this index was received (a retransmit of an
    /// already-acknowledged index is a no-op that still returns `false`).
    pub async fn write_chunk(
        &self,
        transfer_id: TransferId,
        chunk_index: u64,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<bool, TransferError> {
        let session = self
            .sessions
            .get(&transfer_id)
            .ok_or_else(|| TransferError::NotInitialized(format!("no assembler session for {transfer_id}")))?
            .clone();

        let mut inner = session.lock().await;
        if inner.bitmap.get(chunk_index) {
            return Ok(false);
        }

        let len = data.len() as u64;
        let write_result = tokio::task::spawn_blocking({
            let mut file = inner.file.try_clone().map_err(TransferError::from)?;
            move || -> Result<(), TransferError> {
                file.seek(SeekFrom::Start(offset)).map_err(TransferError::from)?;
                file.write_all(&data).map_err(TransferError::from)?;
                Ok(())
            }
        })
        .await
        .map_err(|e| TransferError::InternalError(e.to_string()))?;
        write_result?;

        inner.bitmap.set(chunk_index);
        inner.transferred_bytes += len;
        Ok(true)
    }

    pub async fn is_complete(&self, transfer_id: TransferId) -> Result<bool, TransferError> {
        let session = self.require_session(transfer_id)?;
        let inner = session.lock().await;
        Ok(inner.bitmap.is_complete())
    }

    pub async fn missing_chunks(&self, transfer_id: TransferId) -> Result<Vec<u64>, TransferError> {
        let session = self.require_session(transfer_id)?;
        let inner = session.lock().await;
        Ok(inner.bitmap.missing())
    }

    pub async fn bitmap_bytes(&self, transfer_id: TransferId) -> Result<Vec<u8>, TransferError> {
        let session = self.require_session(transfer_id)?;
        let inner = session.lock().await;
        Ok(inner.bitmap.to_bytes())
    }

    /// Flushes, verifies the SHA-256 of the assembled file if `expected_sha256`
    /// is given, and renames the temp file into its final place.
    pub async fn finalize(&self, transfer_id: TransferId, expected_sha256: Option<&str>) -> Result<PathBuf, TransferError> {
        let (_, session) = self
            .sessions
            .remove(&transfer_id)
            .ok_or_else(|| TransferError::NotInitialized(format!("no assembler session for {transfer_id}")))?;
        let inner = session.lock().await;

        if !inner.bitmap.is_complete() {
            return Err(TransferError::MissingChunks(format!(
                "transfer {transfer_id}: {} of {} chunks missing",
                inner.bitmap.missing().len(),
                inner.bitmap.len()
            )));
        }

        inner.file.sync_all().map_err(TransferError::from)?;

        if let Some(expected) = expected_sha256 {
            let digest = checksum::sha256_file(&inner.temp_path)?;
            let actual = checksum::sha256_hex(&digest);
            if actual != expected {
                return Err(TransferError::FileHashMismatch(format!(
                    "transfer {transfer_id}: expected {expected}, got {actual}"
                )));
            }
        }

        std::fs::rename(&inner.temp_path, &inner.final_path).map_err(TransferError::from)?;
        Ok(inner.final_path.clone())
    }

    /// Deletes the temp file and drops the session's bookkeeping.
    pub async fn cancel(&self, transfer_id: TransferId) -> Result<(), TransferError> {
        if let Some((_, session)) = self.sessions.remove(&transfer_id) {
            let inner = session.lock().await;
            let _ = std::fs::remove_file(&inner.temp_path);
        }
        Ok(())
    }

    fn require_session(&self, transfer_id: TransferId) -> Result<Arc<AsyncMutex<SessionInner>>, TransferError> {
        self.sessions
            .get(&transfer_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| TransferError::NotInitialized(format!("no assembler session for {transfer_id}")))
    }
}

/// Rejects filenames that could escape the storage directory.
fn validate_filename(filename: &str) -> Result<(), TransferError> {
    if filename.is_empty()
        || filename.contains("..")
        || filename.contains('\0')
        || Path::new(filename).is_absolute()
    {
        return Err(TransferError::InvalidFilePath(filename.to_string()));
    }
    Ok(())
}
