// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Entry Points
//!
//! Wires a loaded [`TransferConfig`] into a running server or a single
//! client transfer. No argument parsing lives here - an external driver
//! (a CLI, a service manager, a test harness) builds the config and the
//! connected/accepted [`Transport`] and hands both to [`run_server`] or
//! [`run_client`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use transfer_core::coordinator::{
    CommandSender, CoordinatorEvent, CoordinatorEventKind, Direction, InboundMessage, SessionCommand,
    TransferCoordinator, TransformOptions, DEFAULT_RETRY_BUDGET,
};
use transfer_core::flowcontrol::BandwidthLimiter;
use transfer_core::pipeline::{ChunkAssembler, ChunkSplitter};
use transfer_core::resume::ResumeStore;
use transfer_core::server::{QuotaCoordinator, ServerSessionConfig, ServerSessionManager};
use transfer_core::wire::messages::{DownloadRequestPayload, Message, TransferOptions, UploadRequestPayload};
use transfer_core::wire::protocol_codec::{decode_message, encode_message, DEFAULT_MAX_PAYLOAD_LEN};
use transfer_core::TransferConfig;
use transfer_domain::{TransferError, TransferId, Transport};

use crate::shutdown::ShutdownCoordinator;

/// Builds the shared, session-independent collaborators (quota, resume
/// store, bandwidth limiter, transform options) from a validated config.
/// Both [`run_server`] and [`run_client`] start from this.
pub struct Runtime {
    pub resume_store: Arc<ResumeStore>,
    pub limiter: Arc<BandwidthLimiter>,
    pub transforms: TransformOptions,
}

impl Runtime {
    /// `passphrase` is deliberately not part of [`TransferConfig`] - it's
    /// secret material, supplied by the driver (an env var, a secrets
    /// manager) rather than round-tripped through a TOML file on disk.
    /// Required when `config.encryption.enabled`; ignored otherwise.
    pub fn build(
        config: &TransferConfig,
        resume_dir: impl Into<PathBuf>,
        passphrase: Option<&[u8]>,
    ) -> Result<Self, TransferError> {
        let resume_store = Arc::new(ResumeStore::new(
            resume_dir,
            config.resume.checkpoint_interval_chunks,
            ChronoDuration::hours(config.resume.state_ttl_hours),
        )?);

        let limiter = Arc::new(BandwidthLimiter::new(config.bandwidth.upload_bytes_per_sec));

        let compressor: Option<Arc<dyn transfer_domain::Compressor>> = match config.compression.mode {
            transfer_core::config::CompressionMode::Off => None,
            transfer_core::config::CompressionMode::Adaptive | transfer_core::config::CompressionMode::Always => {
                Some(Arc::new(transfer_core::transform::Lz4Compressor::new()))
            }
        };

        let cipher: Option<Arc<dyn transfer_domain::Cipher>> = if config.encryption.enabled {
            let passphrase = passphrase
                .ok_or_else(|| TransferError::InvalidConfiguration("encryption enabled but no passphrase supplied".into()))?;
            let kdf: Arc<dyn transfer_domain::Kdf> = if config.encryption.kdf == "argon2" {
                Arc::new(transfer_core::transform::Argon2Kdf::new())
            } else {
                Arc::new(transfer_core::transform::Pbkdf2Kdf::new())
            };
            let params = transfer_domain::traits::KdfParams {
                key_size: config.encryption.key_size,
                ..transfer_domain::traits::KdfParams::default()
            };
            let salt = random_salt();
            let key = kdf.derive(passphrase, &salt, &params)?;
            Some(Arc::new(transfer_core::transform::AesGcmCipher::from_slice(&key)?))
        } else {
            None
        };

        Ok(Self { resume_store, limiter, transforms: TransformOptions { compressor, cipher } })
    }

    /// Spawns the periodic expired-resume-state sweep (Open Question: the
    /// composition root runs this on a timer rather than leaving every
    /// caller to remember to call it).
    pub fn spawn_resume_sweeper(&self, interval: Duration, shutdown: crate::shutdown::CancellationToken) {
        let resume_store = self.resume_store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match resume_store.cleanup_expired_states().await {
                            Ok(removed) if removed > 0 => info!(removed, "swept expired resume states"),
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "resume state sweep failed"),
                        }
                    }
                }
            }
        });
    }
}

/// Runs the server side: owns [`QuotaCoordinator`] and
/// [`ServerSessionManager`] for the process lifetime, spawning one task per
/// inbound [`Transport`] delivered on `incoming` until either the channel
/// closes or `shutdown` is cancelled. Returns once every in-flight session
/// has finished (bounded by the shutdown coordinator's grace period).
pub async fn run_server(
    config: TransferConfig,
    storage_root: PathBuf,
    resume_dir: PathBuf,
    passphrase: Option<&[u8]>,
    mut incoming: mpsc::Receiver<Arc<dyn Transport>>,
    shutdown: ShutdownCoordinator,
) -> Result<(), TransferError> {
    config.validate()?;

    let runtime = Runtime::build(&config, resume_dir, passphrase)?;
    runtime.spawn_resume_sweeper(Duration::from_secs(3600), shutdown.token());

    let quota = Arc::new(QuotaCoordinator::new(config.server.storage_quota_bytes, config.server.max_file_size_bytes));

    let session_config = ServerSessionConfig {
        max_connections: config.server.max_connections,
        storage_root,
        upload_policy: None,
        download_policy: None,
    };
    let manager = ServerSessionManager::new(session_config, quota, runtime.resume_store, runtime.limiter, runtime.transforms);

    let token = shutdown.token();
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                info!("server shutdown requested, no longer accepting new connections");
                break;
            }
            maybe_transport = incoming.recv() => {
                match maybe_transport {
                    Some(transport) => {
                        let manager = manager.clone();
                        sessions.spawn(async move {
                            if let Err(e) = manager.run_session(transport).await {
                                warn!(error = %e, "session ended with an error");
                            }
                        });
                    }
                    None => {
                        info!("incoming connection channel closed");
                        break;
                    }
                }
            }
        }
    }

    shutdown.initiate_shutdown();
    let drain_signal = shutdown.clone();
    tokio::spawn(async move {
        while sessions.join_next().await.is_some() {}
        drain_signal.complete_shutdown();
    });
    if !shutdown.wait_for_shutdown().await {
        warn!("shutdown grace period elapsed with sessions still running");
    }

    Ok(())
}

/// One client-driven transfer request. No CLI parsing: the driver already
/// knows which of these it wants.
pub enum ClientRequest {
    Upload { local_path: PathBuf, filename: String },
    Download { filename: String, dest_dir: PathBuf },
}

/// Runs a single upload or download over an already-connected `transport`,
/// to completion or until `shutdown` is cancelled (in which case a
/// best-effort `TransferCancel` is sent before returning).
pub async fn run_client(
    config: TransferConfig,
    resume_dir: PathBuf,
    passphrase: Option<&[u8]>,
    transport: Arc<dyn Transport>,
    request: ClientRequest,
    shutdown: ShutdownCoordinator,
) -> Result<(), TransferError> {
    config.validate()?;

    let runtime = Runtime::build(&config, resume_dir, passphrase)?;
    let (event_tx, mut event_rx) = mpsc::channel::<CoordinatorEvent>(16);

    // Every session opens with an unsolicited CONNECT_ACK from the peer.
    let frame = transport.recv().await?;
    match decode_message(&frame, DEFAULT_MAX_PAYLOAD_LEN)? {
        Message::ConnectAck(ack) if ack.rejected.is_none() => {}
        Message::ConnectAck(ack) => {
            return Err(TransferError::ConnectionFailed(ack.rejected.unwrap_or_default()));
        }
        other => return Err(TransferError::ProtocolError(format!("expected CONNECT_ACK, got {:?}", other.message_type()))),
    }

    let transfer_id = TransferId::new();
    let (coordinator, commands, inbound) = TransferCoordinator::new(
        transfer_id,
        match &request {
            ClientRequest::Upload { .. } => Direction::Upload,
            ClientRequest::Download { .. } => Direction::Download,
        },
        transport.clone(),
        runtime.limiter.clone(),
        runtime.transforms.clone(),
        runtime.resume_store.clone(),
        event_tx,
        DEFAULT_RETRY_BUDGET,
    );

    let driver = match request {
        ClientRequest::Upload { local_path, filename } => {
            start_upload(&transport, transfer_id, &local_path, filename).await?;
            tokio::spawn(coordinator.run_upload(ChunkSplitter::open(&local_path, transfer_domain::ChunkConfig::default())?))
        }
        ClientRequest::Download { filename, dest_dir } => {
            start_download(&transport, transfer_id, &filename).await?;
            let assembler = Arc::new(ChunkAssembler::new(dest_dir));
            tokio::spawn(coordinator.run_download(assembler))
        }
    };

    recv_loop(transport, commands, inbound, transfer_id, &mut event_rx, shutdown).await?;
    driver.await.map_err(|e| TransferError::ProtocolError(format!("transfer task panicked: {e}")))?
}

async fn start_upload(
    transport: &Arc<dyn Transport>,
    transfer_id: TransferId,
    local_path: &Path,
    filename: String,
) -> Result<(), TransferError> {
    let splitter = ChunkSplitter::open(local_path, transfer_domain::ChunkConfig::default())?;
    let file_size = std::fs::metadata(local_path)?.len();
    let sha256 = transfer_core::checksum::sha256_hex(&transfer_core::checksum::sha256_file(local_path)?);

    let request = Message::UploadRequest(UploadRequestPayload {
        transfer_id,
        filename,
        file_size,
        total_chunks: splitter.total_chunks(),
        sha256,
        options: TransferOptions::empty(),
    });
    transport.send(&encode_message(&request)?).await?;

    let frame = transport.recv().await?;
    match decode_message(&frame, DEFAULT_MAX_PAYLOAD_LEN)? {
        Message::UploadAccept(_) => Ok(()),
        Message::UploadReject(reject) => Err(TransferError::PolicyDenied(reject.reason)),
        other => Err(TransferError::ProtocolError(format!("expected UPLOAD_ACCEPT, got {:?}", other.message_type()))),
    }
}

async fn start_download(transport: &Arc<dyn Transport>, transfer_id: TransferId, filename: &str) -> Result<(), TransferError> {
    let request = Message::DownloadRequest(DownloadRequestPayload {
        transfer_id,
        filename: filename.to_string(),
        options: TransferOptions::empty(),
    });
    transport.send(&encode_message(&request)?).await?;

    let frame = transport.recv().await?;
    match decode_message(&frame, DEFAULT_MAX_PAYLOAD_LEN)? {
        Message::DownloadAccept(_) => Ok(()),
        Message::DownloadReject(reject) => Err(TransferError::PolicyDenied(reject.reason)),
        other => Err(TransferError::ProtocolError(format!("expected DOWNLOAD_ACCEPT, got {:?}", other.message_type()))),
    }
}

/// Demultiplexes inbound frames to the one active transfer's channel -
/// the single-connection analogue of `ServerSessionManager::drive_session`.
/// Exits once the transfer's terminal event arrives or `shutdown` fires.
async fn recv_loop(
    transport: Arc<dyn Transport>,
    commands: CommandSender,
    inbound: mpsc::Sender<InboundMessage>,
    transfer_id: TransferId,
    event_rx: &mut mpsc::Receiver<CoordinatorEvent>,
    shutdown: ShutdownCoordinator,
) -> Result<(), TransferError> {
    let token = shutdown.token();
    let mut cancel_sent = false;

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled(), if !cancel_sent => {
                cancel_sent = true;
                let _ = commands.send(SessionCommand::Cancel).await;
            }

            frame = transport.recv() => {
                let frame = frame?;
                match decode_message(&frame, DEFAULT_MAX_PAYLOAD_LEN)? {
                    Message::ChunkData { frame } => {
                        let _ = inbound.send(InboundMessage::ChunkData { frame }).await;
                    }
                    Message::ChunkAck(payload) if payload.transfer_id == transfer_id => {
                        let _ = inbound.send(InboundMessage::ChunkAck { chunk_index: payload.chunk_index }).await;
                    }
                    Message::ChunkNack(payload) if payload.transfer_id == transfer_id => {
                        let _ = inbound.send(InboundMessage::ChunkNack { chunk_index: payload.chunk_index, reason: payload.reason }).await;
                    }
                    Message::HeartbeatAck => {}
                    other => {
                        warn!(message_type = ?other.message_type(), "unexpected message in client recv loop");
                    }
                }
            }

            Some(event) = event_rx.recv() => {
                if let CoordinatorEventKind::Completed | CoordinatorEventKind::Cancelled | CoordinatorEventKind::Failed(_) = event.kind {
                    return Ok(());
                }
            }
        }
    }
}

fn random_salt() -> [u8; 16] {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;
    use transfer_core::config::CompressionMode;

    #[test]
    fn build_with_encryption_disabled_needs_no_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let config = TransferConfig::default();
        let runtime = Runtime::build(&config, dir.path(), None).unwrap();
        assert!(runtime.transforms.cipher.is_none());
    }

    #[test]
    fn build_with_encryption_enabled_and_no_passphrase_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TransferConfig::default();
        config.encryption.enabled = true;
        let err = Runtime::build(&config, dir.path(), None).unwrap_err();
        assert!(matches!(err, TransferError::InvalidConfiguration(_)));
    }

    #[test]
    fn build_with_encryption_enabled_and_passphrase_derives_a_cipher() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TransferConfig::default();
        config.encryption.enabled = true;
        let runtime = Runtime::build(&config, dir.path(), Some(b"correct horse battery staple")).unwrap();
        assert!(runtime.transforms.cipher.is_some());
    }

    #[test]
    fn build_with_argon2_kdf_also_derives_a_cipher() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TransferConfig::default();
        config.encryption.enabled = true;
        config.encryption.kdf = "argon2".to_string();
        let runtime = Runtime::build(&config, dir.path(), Some(b"correct horse battery staple")).unwrap();
        assert!(runtime.transforms.cipher.is_some());
    }

    #[test]
    fn build_respects_compression_mode_off() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TransferConfig::default();
        config.compression.mode = CompressionMode::Off;
        let runtime = Runtime::build(&config, dir.path(), None).unwrap();
        assert!(runtime.transforms.compressor.is_none());
    }

    #[test]
    fn build_respects_compression_mode_always() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TransferConfig::default();
        config.compression.mode = CompressionMode::Always;
        let runtime = Runtime::build(&config, dir.path(), None).unwrap();
        assert!(runtime.transforms.compressor.is_some());
    }

    #[tokio::test]
    async fn run_server_returns_once_incoming_channel_closes() {
        let resume_dir = tempfile::tempdir().unwrap();
        let storage_dir = tempfile::tempdir().unwrap();
        let config = TransferConfig::default();
        let (tx, rx) = mpsc::channel::<Arc<dyn Transport>>(1);
        drop(tx);

        let shutdown = ShutdownCoordinator::default();
        let result = run_server(
            config,
            storage_dir.path().to_path_buf(),
            resume_dir.path().to_path_buf(),
            None,
            rx,
            shutdown,
        )
        .await;
        assert!(result.is_ok());
    }
}
