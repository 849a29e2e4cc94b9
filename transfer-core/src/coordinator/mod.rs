// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Transfer Coordinator
//!
//! One [`TransferCoordinator`] per active transfer, spawned as its own
//! task. It exclusively owns either a [`ChunkSplitter`] (upload) or a
//! [`ChunkAssembler`] session (download) and drives the
//! compress -> encrypt -> limiter -> codec pipeline (or its mirror) end to
//! end. It never holds a strong reference back to its owning session -
//! only a [`CommandSender`]/[`CommandReceiver`] pair carries control
//! messages (pause/resume/cancel) in and progress events out, so a
//! coordinator and its session can drop independently.

use std::sync::Arc;

use rand::RngCore;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument, warn};

use transfer_domain::{
    traits::CompressionLevel, Chunk, ChunkConfig, ChunkFlags, ChunkHeader, Cipher, Compressor, TransferError,
    TransferId, Transport,
};

use crate::checksum;
use crate::flowcontrol::BandwidthLimiter;
use crate::pipeline::{ChunkAssembler, ChunkSplitter};
use crate::protocol::{ReceiverTransferState, SenderTransferState};
use crate::resume::ResumeStore;
use crate::wire::messages::{ChunkAckPayload, ChunkNackPayload, Message};
use crate::wire::protocol_codec::encode_message;

/// Chunks sent before an ack/nack arrives are retried this many times
/// before the transfer is failed outright.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// How long the sender waits for an ack before treating the chunk as lost.
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Direction this coordinator drives. Distinguishing the two matters for
/// telling a caller which terminal message (`UploadComplete` vs.
/// `DownloadComplete`) a finished coordinator emitted - both directions
/// otherwise share almost all of their plumbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

/// Control sent from the owning session into a running coordinator.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Pause,
    Resume,
    Cancel,
}

pub type CommandSender = mpsc::Sender<SessionCommand>;
pub type CommandReceiver = mpsc::Receiver<SessionCommand>;

/// Messages demultiplexed from the transport by the owning session and
/// routed here because they belong to this transfer.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    ChunkData { frame: Vec<u8> },
    ChunkAck { chunk_index: u64 },
    ChunkNack { chunk_index: u64, reason: String },
}

/// Progress/lifecycle events emitted back to the owning session.
#[derive(Debug, Clone)]
pub enum CoordinatorEventKind {
    ChunkTransferred { chunk_index: u64 },
    Completed,
    Paused,
    Resumed,
    Cancelled,
    Failed(String),
}

/// A [`CoordinatorEventKind`] tagged with the transfer it came from - a
/// session holds many coordinators behind one shared `events` channel, so
/// the tag is how it tells them apart.
#[derive(Debug, Clone)]
pub struct CoordinatorEvent {
    pub transfer_id: TransferId,
    pub kind: CoordinatorEventKind,
}

/// Optional compress/encrypt configuration for one transfer. `None` in
/// either field means that transform is skipped entirely.
#[derive(Clone)]
pub struct TransformOptions {
    pub compressor: Option<Arc<dyn Compressor>>,
    pub cipher: Option<Arc<dyn Cipher>>,
}

impl TransformOptions {
    pub fn none() -> Self {
        Self { compressor: None, cipher: None }
    }
}

/// Builds the counter-construction IV for one chunk: a per-transfer random
/// nonce followed by the big-endian chunk index. Lives here rather than on
/// `Cipher` because the construction is a coordinator-level convention, not
/// a property of the cipher itself (per the AEAD port's own doc comment).
fn chunk_iv(session_nonce: [u8; 4], chunk_index: u64, iv_len: usize) -> Vec<u8> {
    let mut iv = Vec::with_capacity(iv_len.max(12));
    iv.extend_from_slice(&session_nonce);
    iv.extend_from_slice(&chunk_index.to_be_bytes());
    iv.truncate(iv_len);
    while iv.len() < iv_len {
        iv.push(0);
    }
    iv
}

fn random_session_nonce() -> [u8; 4] {
    let mut nonce = [0u8; 4];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

/// Associated data for a chunk's AEAD encryption: every header field except
/// `crc32` and `payload_length`, which are computed from the post-transform
/// bytes and so can't be known yet when encryption happens.
fn header_aad(header: &ChunkHeader) -> Vec<u8> {
    let mut aad = Vec::with_capacity(16 + 8 + 8 + 8 + 4);
    aad.extend_from_slice(header.transfer_id.as_uuid().as_bytes());
    aad.extend_from_slice(&header.chunk_index.to_be_bytes());
    aad.extend_from_slice(&header.total_chunks.to_be_bytes());
    aad.extend_from_slice(&header.chunk_offset.to_be_bytes());
    aad.extend_from_slice(&header.original_length.to_be_bytes());
    aad.extend_from_slice(&header.flags.bits().to_be_bytes());
    aad
}

pub struct TransferCoordinator {
    transfer_id: TransferId,
    direction: Direction,
    transport: Arc<dyn Transport>,
    limiter: Arc<BandwidthLimiter>,
    transforms: TransformOptions,
    resume_store: Arc<ResumeStore>,
    retry_budget: u32,
    session_nonce: [u8; 4],
    commands: CommandReceiver,
    inbound: mpsc::Receiver<InboundMessage>,
    events: mpsc::Sender<CoordinatorEvent>,
}

impl TransferCoordinator {
    /// Builds a coordinator and the two senders its owning session needs to
    /// drive it: one for control commands, one for demultiplexed inbound
    /// wire messages. The session keeps both; the coordinator keeps only
    /// the matching receivers plus its own `events` sender.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transfer_id: TransferId,
        direction: Direction,
        transport: Arc<dyn Transport>,
        limiter: Arc<BandwidthLimiter>,
        transforms: TransformOptions,
        resume_store: Arc<ResumeStore>,
        events: mpsc::Sender<CoordinatorEvent>,
        retry_budget: u32,
    ) -> (Self, CommandSender, mpsc::Sender<InboundMessage>) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let coordinator = Self {
            transfer_id,
            direction,
            transport,
            limiter,
            transforms,
            resume_store,
            retry_budget,
            session_nonce: random_session_nonce(),
            commands: command_rx,
            inbound: inbound_rx,
            events,
        };
        (coordinator, command_tx, inbound_tx)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    async fn emit(&self, kind: CoordinatorEventKind) {
        let _ = self.events.send(CoordinatorEvent { transfer_id: self.transfer_id, kind }).await;
    }

    /// Blocks until a `Resume` or `Cancel` command arrives, returning
    /// `Ok(true)` to resume or `Ok(false)` if the transfer was cancelled
    /// while paused.
    async fn wait_out_pause(&mut self) -> Result<bool, TransferError> {
        self.emit(CoordinatorEventKind::Paused).await;
        loop {
            match self.commands.recv().await {
                Some(SessionCommand::Resume) => {
                    self.emit(CoordinatorEventKind::Resumed).await;
                    return Ok(true);
                }
                Some(SessionCommand::Cancel) => return Ok(false),
                Some(SessionCommand::Pause) => continue,
                None => return Ok(false),
            }
        }
    }

    /// Drains any control commands without blocking. Returns `Ok(false)`
    /// if the caller should stop (cancelled), `Ok(true)` to keep going.
    async fn poll_commands(&mut self) -> Result<bool, TransferError> {
        loop {
            match self.commands.try_recv() {
                Ok(SessionCommand::Cancel) => return Ok(false),
                Ok(SessionCommand::Pause) => {
                    if !self.wait_out_pause().await? {
                        return Ok(false);
                    }
                }
                Ok(SessionCommand::Resume) => continue,
                Err(mpsc::error::TryRecvError::Empty) => return Ok(true),
                Err(mpsc::error::TryRecvError::Disconnected) => return Ok(true),
            }
        }
    }

    /// Transforms one raw chunk into its on-wire [`Chunk`], applying
    /// adaptive compression and, if configured, AEAD encryption.
    fn build_wire_chunk(
        &self,
        index: u64,
        total_chunks: u64,
        offset: u64,
        is_first: bool,
        is_last: bool,
        plaintext: Vec<u8>,
    ) -> Result<Chunk, TransferError> {
        let original_length = plaintext.len() as u32;
        let mut flags = ChunkFlags::empty();
        if is_first {
            flags |= ChunkFlags::FIRST_CHUNK;
        }
        if is_last {
            flags |= ChunkFlags::LAST_CHUNK;
        }

        let mut payload = plaintext;
        if let Some(compressor) = &self.transforms.compressor {
            if compressor.is_compressible(&payload) {
                let compressed = compressor.compress(&payload, CompressionLevel::Fast)?;
                if compressed.len() < payload.len() {
                    payload = compressed;
                    flags |= ChunkFlags::COMPRESSED;
                }
            }
        }

        let mut header = ChunkHeader {
            transfer_id: self.transfer_id,
            chunk_index: index,
            total_chunks,
            chunk_offset: offset,
            payload_length: 0,
            original_length,
            flags,
            crc32: 0,
        };

        if let Some(cipher) = &self.transforms.cipher {
            let iv = chunk_iv(self.session_nonce, index, cipher.iv_len());
            let aad = header_aad(&header);
            let (ciphertext, tag) = cipher.encrypt(&payload, &aad, &iv)?;
            payload = ciphertext;
            payload.extend_from_slice(&tag);
            header.flags |= ChunkFlags::ENCRYPTED;
        }

        header.payload_length = payload.len() as u32;
        header.crc32 = checksum::crc32(&payload);

        Ok(Chunk::new(header, payload))
    }

    /// Reverses [`Self::build_wire_chunk`]: verifies the CRC (done by the
    /// caller via `chunk_codec::decode_chunk`), decrypts, then decompresses.
    fn recover_plaintext(&self, chunk: &Chunk) -> Result<Vec<u8>, TransferError> {
        let mut payload = chunk.payload.clone();

        if chunk.header.is_encrypted() {
            let cipher = self
                .transforms
                .cipher
                .as_ref()
                .ok_or_else(|| TransferError::DecryptionFailure("chunk is encrypted but no cipher configured".into()))?;
            let tag_len = cipher.tag_len();
            if payload.len() < tag_len {
                return Err(TransferError::DecryptionFailure("ciphertext shorter than tag".into()));
            }
            let split_at = payload.len() - tag_len;
            let tag = payload.split_off(split_at);
            let iv = chunk_iv(self.session_nonce, chunk.header.chunk_index, cipher.iv_len());
            let aad = header_aad(&chunk.header);
            payload = cipher.decrypt(&payload, &tag, &aad, &iv)?;
        }

        if chunk.header.is_compressed() {
            let compressor = self
                .transforms
                .compressor
                .as_ref()
                .ok_or_else(|| TransferError::DecompressionFailure("chunk is compressed but no compressor configured".into()))?;
            payload = compressor.decompress(&payload, chunk.header.original_length as usize)?;
        }

        Ok(payload)
    }

    /// Drives the upload side of a transfer: reads `splitter` forward-only,
    /// transforms and sends each chunk, and retries unacknowledged chunks
    /// up to `retry_budget` times before failing.
    #[instrument(skip(self, splitter), fields(transfer_id = %self.transfer_id))]
    pub async fn run_upload(mut self, mut splitter: ChunkSplitter) -> Result<(), TransferError> {
        let mut state = SenderTransferState::Pending;
        state = state.accepted()?;
        state = state.start_transferring()?;

        loop {
            if !self.poll_commands().await? {
                return self.finish_cancelled().await;
            }

            let raw = match splitter.next_chunk() {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => return self.finish_failed(state, e).await,
            };

            if self
                .resume_store
                .is_chunk_received(self.transfer_id, raw.index)
                .await
                .unwrap_or(false)
            {
                debug!(chunk_index = raw.index, "skipping already-acknowledged chunk on resume");
                continue;
            }

            let chunk = match self.build_wire_chunk(
                raw.index,
                raw.total_chunks,
                raw.offset,
                raw.is_first,
                raw.is_last,
                raw.data,
            ) {
                Ok(c) => c,
                Err(e) => return self.finish_failed(state, e).await,
            };

            if !self.send_chunk_with_retries(&chunk).await? {
                return self.finish_failed(state, TransferError::RetransmissionLimitExceeded(format!(
                    "chunk {} exceeded retry budget {}",
                    chunk.header.chunk_index, self.retry_budget
                ))).await;
            }

            let _ = self.resume_store.mark_chunk_received(self.transfer_id, chunk.header.chunk_index).await;
            self.emit(CoordinatorEventKind::ChunkTransferred { chunk_index: chunk.header.chunk_index }).await;
        }

        state = state.completing()?;
        let complete = Message::UploadComplete { transfer_id: self.transfer_id };
        self.transport.send(&encode_message(&complete)?).await?;
        state.completed()?;

        self.emit(CoordinatorEventKind::Completed).await;
        Ok(())
    }

    /// Sends `chunk` and waits for its ack, resending on nack or timeout up
    /// to `retry_budget` additional times. Returns `Ok(false)` once the
    /// budget is exhausted without an ack.
    async fn send_chunk_with_retries(&mut self, chunk: &Chunk) -> Result<bool, TransferError> {
        let frame = crate::wire::chunk_codec::encode_chunk(chunk);
        let mut attempts = 0u32;

        loop {
            self.limiter.acquire(frame.len() as u64).await;
            self.transport.send(&encode_message(&Message::ChunkData { frame: frame.clone() })?).await?;

            match timeout(ACK_TIMEOUT, self.inbound.recv()).await {
                Ok(Some(InboundMessage::ChunkAck { chunk_index })) if chunk_index == chunk.header.chunk_index => {
                    return Ok(true);
                }
                // Out-of-order acks for other chunks (e.g. a stray retransmit ack)
                // are expected and harmless; they're simply not this wait's answer.
                Ok(Some(InboundMessage::ChunkAck { .. })) => continue,
                Ok(Some(InboundMessage::ChunkNack { chunk_index, reason })) if chunk_index == chunk.header.chunk_index => {
                    warn!(chunk_index, %reason, "chunk nacked, retrying");
                    attempts += 1;
                }
                Ok(Some(_)) => continue,
                Ok(None) => return Ok(false),
                Err(_elapsed) => {
                    warn!(chunk_index = chunk.header.chunk_index, "ack timed out, retrying");
                    attempts += 1;
                }
            }

            if attempts > self.retry_budget {
                return Ok(false);
            }
        }
    }

    /// Drives the download side: pulls `CHUNK_DATA` frames demultiplexed by
    /// the session, verifies and decodes each, writes it through `assembler`,
    /// and ack/nacks back to the sender.
    #[instrument(skip(self, assembler), fields(transfer_id = %self.transfer_id))]
    pub async fn run_download(mut self, assembler: Arc<ChunkAssembler>) -> Result<(), TransferError> {
        let mut state = ReceiverTransferState::Pending;
        state = state.accepted()?;
        state = state.start_assembling()?;

        loop {
            if !self.poll_commands().await? {
                return self.finish_cancelled().await;
            }

            if assembler.is_complete(self.transfer_id).await.unwrap_or(false) {
                break;
            }

            let inbound = match self.inbound.recv().await {
                Some(msg) => msg,
                None => {
                    return self
                        .finish_failed(
                            state,
                            TransferError::ConnectionLost("inbound channel closed before transfer completed".into()),
                        )
                        .await
                }
            };

            let frame = match inbound {
                InboundMessage::ChunkData { frame } => frame,
                _ => continue,
            };

            let decoded = crate::wire::chunk_codec::decode_chunk(&frame);
            let chunk = match decoded {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.nack_decode_failure(0, &e).await?;
                    continue;
                }
            };

            let plaintext = match self.recover_plaintext(&chunk) {
                Ok(p) => p,
                Err(e) => {
                    self.nack_decode_failure(chunk.header.chunk_index, &e).await?;
                    continue;
                }
            };

            assembler
                .write_chunk(self.transfer_id, chunk.header.chunk_index, chunk.header.chunk_offset, plaintext)
                .await?;
            let _ = self.resume_store.mark_chunk_received(self.transfer_id, chunk.header.chunk_index).await;

            let ack = Message::ChunkAck(ChunkAckPayload {
                transfer_id: self.transfer_id,
                chunk_index: chunk.header.chunk_index,
            });
            self.transport.send(&encode_message(&ack)?).await?;
            self.emit(CoordinatorEventKind::ChunkTransferred { chunk_index: chunk.header.chunk_index }).await;
        }

        state = state.completing()?;
        let expected_sha256 = self.resume_store.load_state(self.transfer_id).await.ok().map(|s| s.sha256);
        assembler.finalize(self.transfer_id, expected_sha256.as_deref()).await?;
        let complete = Message::DownloadComplete { transfer_id: self.transfer_id };
        self.transport.send(&encode_message(&complete)?).await?;
        state.completed()?;

        self.emit(CoordinatorEventKind::Completed).await;
        Ok(())
    }

    async fn nack_decode_failure(&self, chunk_index: u64, error: &TransferError) -> Result<(), TransferError> {
        warn!(chunk_index, %error, "chunk failed validation, nacking");
        let nack = Message::ChunkNack(ChunkNackPayload {
            transfer_id: self.transfer_id,
            chunk_index,
            reason: error.to_string(),
        });
        self.transport.send(&encode_message(&nack)?).await
    }

    async fn finish_cancelled(self) -> Result<(), TransferError> {
        let cancel = Message::TransferCancel(crate::wire::messages::TransferCancelPayload {
            transfer_id: self.transfer_id,
        });
        let _ = self.transport.send(&encode_message(&cancel)?).await;
        self.emit(CoordinatorEventKind::Cancelled).await;
        Ok(())
    }

    async fn finish_failed<S: std::fmt::Debug>(self, _state: S, error: TransferError) -> Result<(), TransferError> {
        warn!(%error, "transfer failed");
        self.emit(CoordinatorEventKind::Failed(error.to_string())).await;
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex as AsyncMutex;

    struct LoopbackTransport {
        outbound: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
        sent: StdMutex<Vec<Vec<u8>>>,
        tx: mpsc::UnboundedSender<Vec<u8>>,
    }

    impl LoopbackTransport {
        fn new() -> Arc<Self> {
            let (tx, rx) = mpsc::unbounded_channel();
            Arc::new(Self {
                outbound: AsyncMutex::new(rx),
                sent: StdMutex::new(Vec::new()),
                tx,
            })
        }
    }

    #[async_trait]
    impl Transport for LoopbackTransport {
        async fn send(&self, bytes: &[u8]) -> Result<(), TransferError> {
            self.sent.lock().unwrap().push(bytes.to_vec());
            let _ = self.tx.send(bytes.to_vec());
            Ok(())
        }

        async fn recv(&self) -> Result<Vec<u8>, TransferError> {
            self.outbound
                .lock()
                .await
                .recv()
                .await
                .ok_or_else(|| TransferError::ConnectionLost("loopback closed".into()))
        }

        async fn close(&self) -> Result<(), TransferError> {
            Ok(())
        }
    }

    fn resume_store(dir: &std::path::Path) -> Arc<ResumeStore> {
        Arc::new(ResumeStore::new(dir.to_path_buf(), 1, chrono::Duration::hours(1)).unwrap())
    }

    #[tokio::test]
    async fn upload_of_small_file_completes_with_acks_driven_inline() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        file.write_all(&vec![9u8; 10]).unwrap();
        file.flush().unwrap();

        let transfer_id = TransferId::new();
        let splitter = ChunkSplitter::open(file.path(), ChunkConfig::new(ChunkConfig::MIN_SIZE).unwrap()).unwrap();
        let total_chunks = splitter.total_chunks();

        let transport = LoopbackTransport::new();
        let limiter = Arc::new(BandwidthLimiter::disabled());
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (coordinator, _commands, inbound_tx) = TransferCoordinator::new(
            transfer_id,
            Direction::Upload,
            transport.clone(),
            limiter,
            TransformOptions::none(),
            resume_store(dir.path()),
            events_tx,
            DEFAULT_RETRY_BUDGET,
        );

        // Auto-ack every chunk the coordinator sends, mirroring what a real
        // receiver's session loop would demultiplex back in.
        let acker_transport = transport.clone();
        let acker_inbound = inbound_tx.clone();
        tokio::spawn(async move {
            for _ in 0..total_chunks {
                let frame = acker_transport.recv().await.unwrap();
                let msg = crate::wire::protocol_codec::decode_message(
                    &frame,
                    crate::wire::protocol_codec::DEFAULT_MAX_PAYLOAD_LEN,
                )
                .unwrap();
                if let Message::ChunkData { frame } = msg {
                    let chunk = crate::wire::chunk_codec::decode_chunk(&frame).unwrap();
                    acker_inbound
                        .send(InboundMessage::ChunkAck { chunk_index: chunk.header.chunk_index })
                        .await
                        .unwrap();
                }
            }
        });

        coordinator.run_upload(splitter).await.unwrap();
        let mut saw_completed = false;
        while let Ok(event) = events_rx.try_recv() {
            assert_eq!(event.transfer_id, transfer_id);
            if matches!(event.kind, CoordinatorEventKind::Completed) {
                saw_completed = true;
            }
        }
        assert!(saw_completed);
    }

    #[tokio::test]
    async fn download_assembles_and_acks_each_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let transfer_id = TransferId::new();
        let assembler = Arc::new(ChunkAssembler::new(dir.path().to_path_buf()));
        assembler.start_session(transfer_id, "out.bin", 4, 1).await.unwrap();

        let header = ChunkHeader {
            transfer_id,
            chunk_index: 0,
            total_chunks: 1,
            chunk_offset: 0,
            payload_length: 4,
            original_length: 4,
            flags: ChunkFlags::FIRST_CHUNK | ChunkFlags::LAST_CHUNK,
            crc32: checksum::crc32(b"data"),
        };
        let chunk = Chunk::new(header, b"data".to_vec());
        let frame = crate::wire::chunk_codec::encode_chunk(&chunk);

        let transport = LoopbackTransport::new();
        let limiter = Arc::new(BandwidthLimiter::disabled());
        let (events_tx, _events_rx) = mpsc::channel(16);
        let (coordinator, _commands, inbound_tx) = TransferCoordinator::new(
            transfer_id,
            Direction::Download,
            transport.clone(),
            limiter,
            TransformOptions::none(),
            resume_store(dir.path()),
            events_tx,
            DEFAULT_RETRY_BUDGET,
        );

        inbound_tx.send(InboundMessage::ChunkData { frame }).await.unwrap();

        coordinator.run_download(assembler.clone()).await.unwrap();
        let contents = std::fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(contents, b"data");
    }

    #[test]
    fn chunk_iv_is_twelve_bytes_and_varies_by_index() {
        let iv0 = chunk_iv([1, 2, 3, 4], 0, 12);
        let iv1 = chunk_iv([1, 2, 3, 4], 1, 12);
        assert_eq!(iv0.len(), 12);
        assert_ne!(iv0, iv1);
    }
}
