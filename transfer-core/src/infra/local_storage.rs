// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Local Filesystem Storage Backend
//!
//! Maps `StorageBackend` keys onto files under a root directory. Keys are
//! validated the same way uploaded filenames are (no `..`, no absolute
//! paths, no interior NUL) before being joined onto the root, so a key
//! received off the wire can never escape it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use transfer_domain::traits::storage_backend::ObjectMetadata;
use transfer_domain::{StorageBackend, TransferError};

pub struct LocalStorageBackend {
    root: PathBuf,
}

impl LocalStorageBackend {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, TransferError> {
        if key.is_empty() {
            return Err(TransferError::InvalidFilePath("empty storage key".into()));
        }
        if key.contains("..") || key.contains('\0') || Path::new(key).is_absolute() {
            return Err(TransferError::InvalidFilePath(format!("unsafe storage key: {key}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageBackend for LocalStorageBackend {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), TransferError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("tmp-upload");
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, TransferError> {
        let path = self.resolve(key)?;
        fs::read(&path).await.map_err(TransferError::from)
    }

    async fn delete(&self, key: &str) -> Result<(), TransferError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMetadata>, TransferError> {
        let mut out = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(prefix) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            out.push(ObjectMetadata {
                key: name,
                size: metadata.len(),
                modified_at: metadata
                    .modified()
                    .map(chrono::DateTime::<chrono::Utc>::from)
                    .unwrap_or_else(|_| chrono::Utc::now()),
            });
        }
        Ok(out)
    }

    async fn stat(&self, key: &str) -> Result<ObjectMetadata, TransferError> {
        let path = self.resolve(key)?;
        let metadata = fs::metadata(&path).await?;
        Ok(ObjectMetadata {
            key: key.to_string(),
            size: metadata.len(),
            modified_at: metadata
                .modified()
                .map(chrono::DateTime::<chrono::Utc>::from)
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalStorageBackend::new(dir.path()).await.unwrap();
        backend.put("report.bin", vec![1, 2, 3, 4]).await.unwrap();
        let bytes = backend.get("report.bin").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn rejects_path_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalStorageBackend::new(dir.path()).await.unwrap();
        let err = backend.put("../escape.bin", vec![1]).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidFilePath(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalStorageBackend::new(dir.path()).await.unwrap();
        backend.put("a.bin", vec![9]).await.unwrap();
        backend.delete("a.bin").await.unwrap();
        backend.delete("a.bin").await.unwrap();
        assert!(backend.get("a.bin").await.is_err());
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalStorageBackend::new(dir.path()).await.unwrap();
        backend.put("upload-1.bin", vec![1]).await.unwrap();
        backend.put("upload-2.bin", vec![2]).await.unwrap();
        backend.put("other.bin", vec![3]).await.unwrap();
        let listed = backend.list("upload-").await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn stat_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalStorageBackend::new(dir.path()).await.unwrap();
        backend.put("sized.bin", vec![0u8; 128]).await.unwrap();
        let meta = backend.stat("sized.bin").await.unwrap();
        assert_eq!(meta.size, 128);
    }
}
