// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Typed Configuration
//!
//! A single [`TransferConfig`] tree covering every tunable knob the system
//! exposes: chunking, compression, encryption, bandwidth, timeouts,
//! reconnect policy, server limits, resume checkpointing, and batch
//! concurrency. Every field has a default, so a caller can start from
//! [`TransferConfig::default`] and override only what matters, or load a
//! complete tree from a TOML file via [`TransferConfig::load`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use transfer_domain::TransferError;

use crate::protocol::ReconnectPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSettings {
    pub nominal_chunk_size: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            nominal_chunk_size: transfer_domain::ChunkConfig::DEFAULT_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionMode {
    Off,
    Adaptive,
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSettings {
    pub mode: CompressionMode,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self { mode: CompressionMode::Adaptive }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionSettings {
    pub enabled: bool,
    /// `"pbkdf2"` or `"argon2"`.
    pub kdf: String,
    pub key_size: usize,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self { enabled: false, kdf: "pbkdf2".to_string(), key_size: 32 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BandwidthSettings {
    pub upload_bytes_per_sec: u64,
    pub download_bytes_per_sec: u64,
}

impl Default for BandwidthSettings {
    fn default() -> Self {
        Self { upload_bytes_per_sec: 0, download_bytes_per_sec: 0 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutSettings {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { connect_timeout_secs: 10, read_timeout_secs: 30, write_timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub max_connections: usize,
    pub max_file_size_bytes: u64,
    pub storage_quota_bytes: u64,
    pub quota_warning_thresholds: Vec<f64>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_connections: 64,
            max_file_size_bytes: 0,
            storage_quota_bytes: 0,
            quota_warning_thresholds: vec![70.0, 85.0, 95.0],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResumeSettings {
    pub checkpoint_interval_chunks: u64,
    pub state_ttl_hours: i64,
}

impl Default for ResumeSettings {
    fn default() -> Self {
        Self { checkpoint_interval_chunks: 16, state_ttl_hours: 72 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchSettings {
    pub max_concurrent_transfers: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { max_concurrent_transfers: 4 }
    }
}

/// Complete, validated configuration tree for one transfer endpoint
/// (client or server). Every section has a standalone `Default`, so
/// partial TOML overrides (via [`TransferConfig::load`]) only need to
/// name the fields that differ from the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub chunk: ChunkSettings,
    #[serde(default)]
    pub compression: CompressionSettings,
    #[serde(default)]
    pub encryption: EncryptionSettings,
    #[serde(default)]
    pub bandwidth: BandwidthSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub resume: ResumeSettings,
    #[serde(default)]
    pub batch: BatchSettings,
}

impl TransferConfig {
    /// Loads a tree from a TOML file, falling back to an all-default
    /// config with a warning if the file is absent (mirrors how a
    /// missing observability config is treated as "use defaults" rather
    /// than a hard error).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .await
            .map_err(|e| TransferError::InvalidConfiguration(format!("reading {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| TransferError::InvalidConfiguration(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Validates cross-field invariants that a plain `#[derive(Default)]`
    /// construction can't enforce (bounds the wire protocol or domain
    /// value objects would otherwise reject lazily, at first use).
    pub fn validate(&self) -> Result<(), TransferError> {
        transfer_domain::ChunkConfig::new(self.chunk.nominal_chunk_size)?;

        if self.encryption.kdf != "pbkdf2" && self.encryption.kdf != "argon2" {
            return Err(TransferError::InvalidConfiguration(format!(
                "unknown kdf {:?}, expected \"pbkdf2\" or \"argon2\"",
                self.encryption.kdf
            )));
        }
        if self.encryption.key_size == 0 {
            return Err(TransferError::InvalidConfiguration("encryption.key_size must be nonzero".into()));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(TransferError::InvalidConfiguration("reconnect.max_attempts must be nonzero".into()));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(TransferError::InvalidConfiguration("reconnect.multiplier must be >= 1.0".into()));
        }

        if self.server.max_connections == 0 {
            return Err(TransferError::InvalidConfiguration("server.max_connections must be nonzero".into()));
        }
        for &threshold in &self.server.quota_warning_thresholds {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(TransferError::InvalidConfiguration(format!(
                    "quota warning threshold {threshold} outside [0, 100]"
                )));
            }
        }

        if self.batch.max_concurrent_transfers == 0 {
            return Err(TransferError::InvalidConfiguration("batch.max_concurrent_transfers must be nonzero".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        TransferConfig::default().validate().unwrap();
    }

    #[tokio::test]
    async fn load_missing_file_falls_back_to_defaults() {
        let config = TransferConfig::load("/no/such/config-file.toml").await.unwrap();
        assert_eq!(config.chunk.nominal_chunk_size, transfer_domain::ChunkConfig::DEFAULT_SIZE);
    }

    #[tokio::test]
    async fn load_parses_a_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transfer.toml");
        tokio::fs::write(&path, "[server]\nmax_connections = 8\n").await.unwrap();

        let config = TransferConfig::load(&path).await.unwrap();
        assert_eq!(config.server.max_connections, 8);
        assert_eq!(config.bandwidth.upload_bytes_per_sec, 0);
    }

    #[test]
    fn validate_rejects_out_of_range_chunk_size() {
        let mut config = TransferConfig::default();
        config.chunk.nominal_chunk_size = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_kdf() {
        let mut config = TransferConfig::default();
        config.encryption.kdf = "scrypt".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_max_connections() {
        let mut config = TransferConfig::default();
        config.server.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_threshold_outside_range() {
        let mut config = TransferConfig::default();
        config.server.quota_warning_thresholds = vec![150.0];
        assert!(config.validate().is_err());
    }
}
