// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Resume Store
//!
//! Persists one JSON file per transfer (`<transfer_id_hex>.json`) under a
//! directory, so a transfer can resume after a process restart. An
//! in-memory cache, sharded per `transfer_id` the same way the chunk
//! assembler shards its sessions, keeps reads cheap and serializes writes
//! to the same id without blocking unrelated transfers.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use transfer_domain::{TransferError, TransferId, TransferState};

struct CacheEntry {
    state: TransferState,
    dirty_since_flush: u64,
}

pub struct ResumeStore {
    dir: PathBuf,
    entries: DashMap<TransferId, Arc<Mutex<CacheEntry>>>,
    checkpoint_interval: u64,
    ttl: chrono::Duration,
}

impl ResumeStore {
    /// `checkpoint_interval` is clamped to at least 1 (a value of 0 would
    /// mean "never batch", which `mark_chunks_received` expresses by
    /// flushing every call anyway).
    pub fn new(dir: impl Into<PathBuf>, checkpoint_interval: u64, ttl: chrono::Duration) -> Result<Self, TransferError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            entries: DashMap::new(),
            checkpoint_interval: checkpoint_interval.max(1),
            ttl,
        })
    }

    fn state_path(&self, id: TransferId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_hex()))
    }

    async fn write_to_disk(&self, state: &TransferState) -> Result<(), TransferError> {
        let path = self.state_path(state.transfer_id);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state)?;
        tokio::task::spawn_blocking(move || -> Result<(), TransferError> {
            std::fs::write(&tmp_path, &json)?;
            std::fs::rename(&tmp_path, &path)?;
            Ok(())
        })
        .await
        .map_err(|e| TransferError::InternalError(e.to_string()))??;
        Ok(())
    }

    fn cached(&self, id: TransferId) -> Option<Arc<Mutex<CacheEntry>>> {
        self.entries.get(&id).map(|e| e.clone())
    }

    /// Returns the cached handle for `id`, loading it from disk first if
    /// it isn't already cached. Fails with `NotInitialized` if no resume
    /// record exists for `id` at all.
    async fn ensure_entry(&self, id: TransferId) -> Result<Arc<Mutex<CacheEntry>>, TransferError> {
        if let Some(entry) = self.cached(id) {
            return Ok(entry);
        }
        self.load_state(id).await?;
        Ok(self.cached(id).expect("load_state just inserted this entry"))
    }

    pub async fn save_state(&self, state: TransferState) -> Result<(), TransferError> {
        let id = state.transfer_id;
        self.write_to_disk(&state).await?;
        self.entries.insert(
            id,
            Arc::new(Mutex::new(CacheEntry {
                state,
                dirty_since_flush: 0,
            })),
        );
        Ok(())
    }

    pub async fn load_state(&self, id: TransferId) -> Result<TransferState, TransferError> {
        if let Some(entry) = self.cached(id) {
            return Ok(entry.lock().await.state.clone());
        }
        let path = self.state_path(id);
        let state = tokio::task::spawn_blocking(move || -> Result<TransferState, TransferError> {
            let bytes = std::fs::read(&path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TransferError::NotInitialized(format!("no resume state for {id}"))
                } else {
                    TransferError::from(e)
                }
            })?;
            serde_json::from_slice(&bytes).map_err(TransferError::from)
        })
        .await
        .map_err(|e| TransferError::InternalError(e.to_string()))??;

        self.entries.insert(
            id,
            Arc::new(Mutex::new(CacheEntry {
                state: state.clone(),
                dirty_since_flush: 0,
            })),
        );
        Ok(state)
    }

    pub async fn has_state(&self, id: TransferId) -> bool {
        if self.entries.contains_key(&id) {
            return true;
        }
        self.state_path(id).exists()
    }

    pub async fn delete_state(&self, id: TransferId) -> Result<(), TransferError> {
        self.entries.remove(&id);
        let path = self.state_path(id);
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransferError::from(e)),
        })
        .await
        .map_err(|e| TransferError::InternalError(e.to_string()))?
    }

    pub async fn mark_chunk_received(&self, id: TransferId, index: u64) -> Result<(), TransferError> {
        self.mark_chunks_received(id, &[index]).await
    }

    /// Batched variant: sets every bit, then checkpoints to disk once the
    /// accumulated dirty count reaches `checkpoint_interval`.
    pub async fn mark_chunks_received(&self, id: TransferId, indices: &[u64]) -> Result<(), TransferError> {
        let entry = self.ensure_entry(id).await?;
        let snapshot = {
            let mut guard = entry.lock().await;
            for &index in indices {
                guard.state.chunk_bitmap.set(index);
            }
            guard.state.last_activity = chrono::Utc::now();
            guard.dirty_since_flush += indices.len() as u64;
            if guard.dirty_since_flush >= self.checkpoint_interval {
                guard.dirty_since_flush = 0;
                Some(guard.state.clone())
            } else {
                None
            }
        };
        if let Some(state) = snapshot {
            self.write_to_disk(&state).await?;
        }
        Ok(())
    }

    pub async fn update_transferred_bytes(&self, id: TransferId, delta: u64) -> Result<(), TransferError> {
        let entry = self.ensure_entry(id).await?;
        let mut guard = entry.lock().await;
        guard.state.transferred_bytes = (guard.state.transferred_bytes + delta).min(guard.state.total_size);
        guard.state.last_activity = chrono::Utc::now();
        Ok(())
    }

    pub async fn missing_chunks(&self, id: TransferId) -> Result<Vec<u64>, TransferError> {
        let entry = self.ensure_entry(id).await?;
        Ok(entry.lock().await.state.missing_chunks())
    }

    pub async fn is_chunk_received(&self, id: TransferId, index: u64) -> Result<bool, TransferError> {
        let entry = self.ensure_entry(id).await?;
        Ok(entry.lock().await.state.chunk_bitmap.get(index))
    }

    /// Every resumable transfer known to this store, cached or on disk.
    pub async fn list_resumable_transfers(&self) -> Result<Vec<TransferState>, TransferError> {
        let dir = self.dir.clone();
        let ids = tokio::task::spawn_blocking(move || -> Result<Vec<TransferId>, TransferError> {
            let mut ids = Vec::new();
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Ok(id) = TransferId::from_hex(stem) {
                        ids.push(id);
                    }
                }
            }
            Ok(ids)
        })
        .await
        .map_err(|e| TransferError::InternalError(e.to_string()))??;

        let mut states = Vec::with_capacity(ids.len());
        for id in ids {
            states.push(self.load_state(id).await?);
        }
        Ok(states)
    }

    /// Deletes every record whose `last_activity` is older than the
    /// configured TTL. Callable explicitly at any time; `transfer-bootstrap`
    /// additionally runs it on a startup timer.
    pub async fn cleanup_expired_states(&self) -> Result<u64, TransferError> {
        let mut removed = 0u64;
        for state in self.list_resumable_transfers().await? {
            if state.is_expired(self.ttl) {
                self.delete_state(state.transfer_id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> ResumeStore {
        ResumeStore::new(dir.path(), 10, chrono::Duration::hours(24)).unwrap()
    }

    fn new_state(total_chunks: u64) -> TransferState {
        TransferState::new(TransferId::new(), "f.bin".into(), total_chunks * 1024, total_chunks, "abc".into())
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let state = new_state(4);
        let id = state.transfer_id;
        store.save_state(state.clone()).await.unwrap();

        let loaded = store.load_state(id).await.unwrap();
        assert_eq!(loaded.transfer_id, id);
        assert_eq!(loaded.total_chunks, 4);
    }

    #[tokio::test]
    async fn load_missing_state_is_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let err = store.load_state(TransferId::new()).await.unwrap_err();
        assert!(matches!(err, TransferError::NotInitialized(_)));
    }

    #[tokio::test]
    async fn fresh_process_sees_same_bitmap_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let id = TransferId::new();
        {
            let store = ResumeStore::new(dir.path(), 1, chrono::Duration::hours(24)).unwrap();
            let state = TransferState {
                transfer_id: id,
                ..new_state(40)
            };
            store.save_state(state).await.unwrap();
            for i in 0..20 {
                store.mark_chunk_received(id, i).await.unwrap();
            }
        }
        // Simulates a fresh process: a brand new store over the same directory.
        let reopened = ResumeStore::new(dir.path(), 1, chrono::Duration::hours(24)).unwrap();
        let missing = reopened.missing_chunks(id).await.unwrap();
        assert_eq!(missing.len(), 20);
    }

    #[tokio::test]
    async fn checkpointing_batches_disk_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResumeStore::new(dir.path(), 5, chrono::Duration::hours(24)).unwrap();
        let state = new_state(10);
        let id = state.transfer_id;
        store.save_state(state).await.unwrap();

        // Four marks: below the checkpoint interval, so the on-disk file
        // should not yet reflect them.
        for i in 0..4 {
            store.mark_chunk_received(id, i).await.unwrap();
        }
        let on_disk: TransferState = serde_json::from_slice(&std::fs::read(dir.path().join(format!("{}.json", id.as_hex()))).unwrap()).unwrap();
        assert_eq!(on_disk.received_chunk_count(), 0);

        // The fifth mark crosses the checkpoint interval and flushes.
        store.mark_chunk_received(id, 4).await.unwrap();
        let on_disk: TransferState = serde_json::from_slice(&std::fs::read(dir.path().join(format!("{}.json", id.as_hex()))).unwrap()).unwrap();
        assert_eq!(on_disk.received_chunk_count(), 5);
    }

    #[tokio::test]
    async fn delete_state_removes_file_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let state = new_state(2);
        let id = state.transfer_id;
        store.save_state(state).await.unwrap();
        store.delete_state(id).await.unwrap();
        assert!(!store.has_state(id).await);
    }

    #[tokio::test]
    async fn delete_state_on_absent_id_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.delete_state(TransferId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_expired_states_removes_only_stale_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResumeStore::new(dir.path(), 1, chrono::Duration::seconds(0)).unwrap();
        let fresh = new_state(2);
        let fresh_id = fresh.transfer_id;
        store.save_state(fresh).await.unwrap();

        let mut stale = new_state(2);
        stale.last_activity = chrono::Utc::now() - chrono::Duration::hours(1);
        let stale_id = stale.transfer_id;
        store.save_state(stale).await.unwrap();

        let removed = store.cleanup_expired_states().await.unwrap();
        assert_eq!(removed, 2); // TTL of 0 seconds means both are already "expired"
        assert!(!store.has_state(fresh_id).await);
        assert!(!store.has_state(stale_id).await);
    }

    #[tokio::test]
    async fn list_resumable_transfers_picks_up_uncached_disk_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store(&dir);
            store.save_state(new_state(3)).await.unwrap();
        }
        let reopened = store(&dir);
        let listed = reopened.list_resumable_transfers().await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
