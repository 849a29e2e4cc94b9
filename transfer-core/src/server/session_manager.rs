// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Server Session Manager
//!
//! Accepts one [`Transport`] connection per client and runs it as its own
//! task for the connection's lifetime. Over `max_connections`, a new
//! connection gets a `CONNECT_ACK` carrying a rejection reason and is then
//! closed. Within an accepted session, inbound dispatch is serialized (one
//! `recv` loop) but each transfer it spawns becomes its own concurrently
//! running [`TransferCoordinator`] - the session loop only demultiplexes
//! wire messages to the right coordinator by `transfer_id`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use transfer_domain::{ChunkConfig, TransferError, TransferId, Transport};

use crate::coordinator::{CommandSender, CoordinatorEvent, Direction, InboundMessage, TransferCoordinator, TransformOptions};
use crate::flowcontrol::BandwidthLimiter;
use crate::pipeline::{ChunkAssembler, ChunkSplitter};
use crate::protocol::ServerSessionState;
use crate::resume::ResumeStore;
use crate::server::quota::QuotaCoordinator;
use crate::wire::messages::{
    Capabilities, ConnectAckPayload, DownloadAcceptPayload, DownloadRejectPayload, Message, UploadAcceptPayload,
    UploadRejectPayload,
};
use crate::wire::protocol_codec::{decode_message, encode_message, DEFAULT_MAX_PAYLOAD_LEN};

/// What the session-level policy callback decided about an incoming
/// upload or download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(String),
}

pub type UploadPolicy = Arc<dyn Fn(&crate::wire::messages::UploadRequestPayload) -> PolicyDecision + Send + Sync>;
pub type DownloadPolicy = Arc<dyn Fn(&crate::wire::messages::DownloadRequestPayload) -> PolicyDecision + Send + Sync>;

pub struct ServerSessionConfig {
    pub max_connections: usize,
    pub storage_root: std::path::PathBuf,
    pub upload_policy: Option<UploadPolicy>,
    pub download_policy: Option<DownloadPolicy>,
}

struct ActiveTransfer {
    commands: CommandSender,
    inbound: mpsc::Sender<InboundMessage>,
}

pub struct ServerSessionManager {
    config: ServerSessionConfig,
    quota: Arc<QuotaCoordinator>,
    resume_store: Arc<ResumeStore>,
    limiter: Arc<BandwidthLimiter>,
    transforms: TransformOptions,
    active_connections: AtomicUsize,
}

impl ServerSessionManager {
    pub fn new(
        config: ServerSessionConfig,
        quota: Arc<QuotaCoordinator>,
        resume_store: Arc<ResumeStore>,
        limiter: Arc<BandwidthLimiter>,
        transforms: TransformOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            quota,
            resume_store,
            limiter,
            transforms,
            active_connections: AtomicUsize::new(0),
        })
    }

    /// Runs one accepted connection to completion. Intended to be spawned
    /// per inbound `Transport` by whatever owns the listener (QUIC/TCP
    /// acceptance loop lives outside the core, see spec Non-goals).
    #[instrument(skip(self, transport), fields(active = self.active_connections.load(Ordering::Relaxed)))]
    pub async fn run_session(self: Arc<Self>, transport: Arc<dyn Transport>) -> Result<(), TransferError> {
        let current = self.active_connections.fetch_add(1, Ordering::SeqCst) + 1;
        if current > self.config.max_connections {
            self.active_connections.fetch_sub(1, Ordering::SeqCst);
            let ack = Message::ConnectAck(ConnectAckPayload {
                capabilities: Capabilities::empty(),
                rejected: Some("connection limit reached".into()),
            });
            let _ = transport.send(&encode_message(&ack)?).await;
            let _ = transport.close().await;
            return Err(TransferError::PolicyDenied("connection limit reached".into()));
        }

        let result = self.drive_session(transport.clone()).await;
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
        let _ = transport.close().await;
        result
    }

    async fn drive_session(&self, transport: Arc<dyn Transport>) -> Result<(), TransferError> {
        let mut session_state = ServerSessionState::accept();
        let mut transfers: HashMap<TransferId, ActiveTransfer> = HashMap::new();
        let (event_tx, mut event_rx) = mpsc::channel::<CoordinatorEvent>(256);

        let ack = Message::ConnectAck(ConnectAckPayload { capabilities: Capabilities::all(), rejected: None });
        transport.send(&encode_message(&ack)?).await?;

        loop {
            tokio::select! {
                biased;

                frame = transport.recv() => {
                    let frame = frame?;
                    let message = decode_message(&frame, DEFAULT_MAX_PAYLOAD_LEN)?;
                    match message {
                        Message::Disconnect => {
                            session_state = session_state.begin_disconnect()?;
                            break;
                        }
                        Message::Heartbeat => {
                            transport.send(&encode_message(&Message::HeartbeatAck)?).await?;
                        }
                        Message::UploadRequest(request) => {
                            session_state = session_state.transfer_started()?;
                            self.handle_upload_request(&transport, request, &event_tx, &mut transfers).await?;
                        }
                        Message::DownloadRequest(request) => {
                            session_state = session_state.transfer_started()?;
                            self.handle_download_request(&transport, request, &event_tx, &mut transfers).await?;
                        }
                        Message::ChunkData { frame: chunk_frame } => {
                            match crate::wire::chunk_codec::peek_transfer_id(&chunk_frame) {
                                Ok(transfer_id) => {
                                    self.route_inbound(&transfers, transfer_id, InboundMessage::ChunkData { frame: chunk_frame }).await;
                                }
                                Err(e) => warn!(error = %e, "dropping chunk frame with unreadable transfer id"),
                            }
                        }
                        Message::ChunkAck(payload) => {
                            self.route_inbound(&transfers, payload.transfer_id, InboundMessage::ChunkAck { chunk_index: payload.chunk_index }).await;
                        }
                        Message::ChunkNack(payload) => {
                            self.route_inbound(
                                &transfers,
                                payload.transfer_id,
                                InboundMessage::ChunkNack { chunk_index: payload.chunk_index, reason: payload.reason },
                            )
                            .await;
                        }
                        Message::TransferCancel(payload) => {
                            if let Some(active) = transfers.get(&payload.transfer_id) {
                                let _ = active.commands.send(crate::coordinator::SessionCommand::Cancel).await;
                            }
                        }
                        other => {
                            debug!(message_type = ?other.message_type(), "unhandled message in session loop");
                        }
                    }
                }

                Some(event) = event_rx.recv() => {
                    use crate::coordinator::CoordinatorEventKind;
                    if let CoordinatorEventKind::Completed | CoordinatorEventKind::Cancelled | CoordinatorEventKind::Failed(_) = event.kind {
                        transfers.remove(&event.transfer_id);
                        session_state = session_state.transfer_finished(transfers.len())?;
                    }
                }
            }
        }

        info!("session closed");
        Ok(())
    }

    async fn route_inbound(&self, transfers: &HashMap<TransferId, ActiveTransfer>, transfer_id: TransferId, message: InboundMessage) {
        if let Some(active) = transfers.get(&transfer_id) {
            if active.inbound.send(message).await.is_err() {
                warn!(%transfer_id, "coordinator inbound channel closed while routing a message");
            }
        } else {
            warn!(%transfer_id, "received a message for an unknown transfer");
        }
    }

    async fn handle_upload_request(
        &self,
        transport: &Arc<dyn Transport>,
        request: crate::wire::messages::UploadRequestPayload,
        event_tx: &mpsc::Sender<CoordinatorEvent>,
        transfers: &mut HashMap<TransferId, ActiveTransfer>,
    ) -> Result<(), TransferError> {
        if let Some(policy) = &self.config.upload_policy {
            if let PolicyDecision::Deny(reason) = policy(&request) {
                let reject = Message::UploadReject(UploadRejectPayload { transfer_id: request.transfer_id, reason });
                transport.send(&encode_message(&reject)?).await?;
                return Ok(());
            }
        }

        if let Err(e) = self.quota.check_incoming(&request.filename, request.file_size) {
            let reject = Message::UploadReject(UploadRejectPayload { transfer_id: request.transfer_id, reason: e.to_string() });
            transport.send(&encode_message(&reject)?).await?;
            return Ok(());
        }
        self.quota.reserve(request.file_size)?;

        let resume_bitmap = if self.resume_store.has_state(request.transfer_id).await {
            self.resume_store
                .load_state(request.transfer_id)
                .await?
                .chunk_bitmap
                .to_bytes()
        } else {
            self.resume_store
                .save_state(transfer_domain::TransferState::new(
                    request.transfer_id,
                    request.filename.clone(),
                    request.file_size,
                    request.total_chunks,
                    request.sha256.clone(),
                ))
                .await?;
            Vec::new()
        };
        let assembler = Arc::new(ChunkAssembler::new(self.config.storage_root.clone()));
        assembler
            .start_session(request.transfer_id, &request.filename, request.file_size, request.total_chunks)
            .await?;

        let accept = Message::UploadAccept(UploadAcceptPayload { transfer_id: request.transfer_id, resume_bitmap });
        transport.send(&encode_message(&accept)?).await?;

        let (coordinator, commands, inbound) = TransferCoordinator::new(
            request.transfer_id,
            Direction::Download,
            transport.clone(),
            self.limiter.clone(),
            self.transforms.clone(),
            self.resume_store.clone(),
            event_tx.clone(),
            crate::coordinator::DEFAULT_RETRY_BUDGET,
        );
        transfers.insert(request.transfer_id, ActiveTransfer { commands, inbound });
        tokio::spawn(coordinator.run_download(assembler));
        Ok(())
    }

    async fn handle_download_request(
        &self,
        transport: &Arc<dyn Transport>,
        request: crate::wire::messages::DownloadRequestPayload,
        event_tx: &mpsc::Sender<CoordinatorEvent>,
        transfers: &mut HashMap<TransferId, ActiveTransfer>,
    ) -> Result<(), TransferError> {
        if let Some(policy) = &self.config.download_policy {
            if let PolicyDecision::Deny(reason) = policy(&request) {
                let reject = Message::DownloadReject(DownloadRejectPayload { reason });
                transport.send(&encode_message(&reject)?).await?;
                return Ok(());
            }
        }

        let local_path = self.config.storage_root.join(&request.filename);
        let splitter = match ChunkSplitter::open(&local_path, ChunkConfig::default()) {
            Ok(splitter) => splitter,
            Err(e) => {
                let reject = Message::DownloadReject(DownloadRejectPayload { reason: e.to_string() });
                transport.send(&encode_message(&reject)?).await?;
                return Ok(());
            }
        };

        let file_size = std::fs::metadata(&local_path)?.len();
        let sha256 = crate::checksum::sha256_hex(&crate::checksum::sha256_file(&local_path)?);
        let accept = Message::DownloadAccept(DownloadAcceptPayload {
            transfer_id: request.transfer_id,
            file_size,
            total_chunks: splitter.total_chunks(),
            sha256,
        });
        transport.send(&encode_message(&accept)?).await?;

        let (coordinator, commands, inbound) = TransferCoordinator::new(
            request.transfer_id,
            Direction::Upload,
            transport.clone(),
            self.limiter.clone(),
            self.transforms.clone(),
            self.resume_store.clone(),
            event_tx.clone(),
            crate::coordinator::DEFAULT_RETRY_BUDGET,
        );
        transfers.insert(request.transfer_id, ActiveTransfer { commands, inbound });
        tokio::spawn(coordinator.run_upload(splitter));
        Ok(())
    }
}
