//! The session engine.
//!
//! A [`Session`] owns one transport connection: version exchange, key
//! exchange and rekeying, message dispatch and the channel table.
//!
//! One reader task consumes every inbound packet. Writers share a single
//! lock around the packet sealer, so sealing, sequence number increment
//! and transmission happen together. While a key exchange is in flight,
//! only transport and key exchange messages pass the rekey barrier; other
//! writers wait for it up to `rekey_timeout`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fynx_ssh::auth::PasswordAuth;
//! use fynx_ssh::known_hosts::KnownHosts;
//! use fynx_ssh::session::SessionBuilder;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = tokio::net::TcpStream::connect("server.example.com:22").await?;
//! let store = Arc::new(KnownHosts::from_string("server.example.com ssh-ed25519 AAAA..."));
//! let session = SessionBuilder::new(store)
//!     .connect(stream, "server.example.com", 22)
//!     .await?;
//!
//! let result = session
//!     .authenticate("alice", &mut PasswordAuth::new("secret"))
//!     .await?;
//! assert!(result.is_success());
//!
//! let mut channel = session.open_session().await?;
//! channel.exec("uname -a").await?;
//! while let Some(event) = channel.read().await {
//!     println!("{:?}", event);
//! }
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod barrier;
mod handshake;
mod keepalive;
mod reader;
mod state;

pub use keepalive::KEEPALIVE_REQUEST;
pub use state::SessionPhase;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use fynx_platform::{FynxError, FynxResult};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::auth::{AuthResult, AuthTransport, UserAuth};
use crate::channel::{Channel, ChannelEvent, ChannelShared, ChannelTable};
use crate::config::SessionConfig;
use crate::connection::{tcpip_forward_data, ChannelOpen, ChannelType};
use crate::hostkey::HostKey;
use crate::kex::{KexInit, NewKeys, EXT_INFO_CLIENT};
use crate::message::{service_request, Disconnect, DisconnectReason, GlobalRequest, MessageType};
use crate::packet::{PacketSealer, SealingState};
use crate::registry::AlgorithmRegistry;
use crate::rng::SecureRandom;
use crate::trust::{host_label, HostTrustVerifier, TrustStore, UserPrompt};
use crate::version::{read_version, Version};
use crate::wire::read_u32;

use barrier::RekeyBarrier;
use keepalive::KeepaliveState;
use reader::Reader;
use state::SessionState;

/// How long teardown waits for the writer to send DISCONNECT.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Answer to a global request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalReply {
    /// SSH_MSG_REQUEST_SUCCESS with its response data
    Success(Vec<u8>),
    /// SSH_MSG_REQUEST_FAILURE
    Failure,
}

/// Output side of the connection. Only touched under the writer lock.
struct Writer {
    sealer: PacketSealer,
    io: Box<dyn AsyncWrite + Send + Unpin>,
    client_kexinit: Option<KexInit>,
    queued: Vec<Vec<u8>>,
}

impl Writer {
    async fn write_packet(&mut self, payload: &[u8]) -> FynxResult<()> {
        let sequence = self.sealer.sequence();
        let packet = self.sealer.seal(payload)?;
        self.io.write_all(&packet).await?;
        self.io.flush().await?;
        trace!(sequence, msg_type = payload[0], len = payload.len(), "Sent packet");
        Ok(())
    }
}

type IncomingChannel = (ChannelType, Arc<ChannelShared>, mpsc::UnboundedReceiver<ChannelEvent>);

/// State shared by the session handle, the reader task, the timer task
/// and channel handles.
pub(crate) struct Shared {
    pub(crate) config: SessionConfig,
    pub(crate) registry: Arc<AlgorithmRegistry>,
    pub(crate) rng: SecureRandom,
    pub(crate) verifier: HostTrustVerifier,
    pub(crate) host: String,
    pub(crate) client_version: Version,
    pub(crate) keepalive: KeepaliveState,
    writer: tokio::sync::Mutex<Writer>,
    barrier: RekeyBarrier,
    state: Mutex<SessionState>,
    phase: watch::Sender<SessionPhase>,
    channels: Mutex<ChannelTable>,
    global_replies: Mutex<VecDeque<oneshot::Sender<GlobalReply>>>,
    forwards: Mutex<Vec<(String, u32)>>,
    auth_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    auth_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    incoming_tx: Mutex<Option<mpsc::UnboundedSender<IncomingChannel>>>,
    incoming_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<IncomingChannel>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }

    pub(crate) fn lock_channels(&self) -> MutexGuard<'_, ChannelTable> {
        lock(&self.channels)
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.send_modify(|p| {
            if *p != SessionPhase::Disconnected {
                *p = phase;
            }
        });
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state().close_reason.is_some()
    }

    fn check_open(&self) -> FynxResult<()> {
        match &self.state().close_reason {
            Some(reason) => Err(FynxError::Closed(reason.clone())),
            None => Ok(()),
        }
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.state().authenticated
    }

    pub(crate) fn has_session_id(&self) -> bool {
        self.state().session_id.is_some()
    }

    /// True once both sides have switched to the first set of keys.
    pub(crate) fn is_secured(&self) -> bool {
        self.state().kex_count > 0
    }

    pub(crate) fn server_version(&self) -> String {
        self.state().server_version.as_str().to_string()
    }

    pub(crate) fn server_advertises_incomplete_sig_algs(&self) -> bool {
        self.state().server_version.advertises_incomplete_sig_algs()
    }

    pub(crate) fn set_server_sig_algs(&self, algs: Vec<String>) {
        self.state().server_sig_algs = Some(algs);
    }

    pub(crate) fn trusted_host_key(&self) -> Option<HostKey> {
        self.state().host_key.clone()
    }

    pub(crate) fn set_host_key(&self, host_key: HostKey) {
        self.state().host_key = Some(host_key);
    }

    /// The session id is H of the first exchange and never changes.
    pub(crate) fn session_id_or_init(&self, exchange_hash: &[u8]) -> Vec<u8> {
        self.state()
            .session_id
            .get_or_insert_with(|| exchange_hash.to_vec())
            .clone()
    }

    /// Records a finished exchange and returns how many there have been.
    pub(crate) fn kex_finished(&self) -> u32 {
        let (count, phase) = {
            let mut state = self.state();
            state.kex_count += 1;
            state.last_kex = Instant::now();
            (state.kex_count, state.settled_phase())
        };
        self.set_phase(phase);
        count
    }

    /// True when the traffic or time limit calls for new keys.
    pub(crate) fn rekey_due(&self, bytes_read: u64) -> bool {
        let state = self.state();
        if state.session_id.is_none() || state.close_reason.is_some() {
            return false;
        }
        bytes_read >= self.config.rekey_bytes_limit
            || self
                .config
                .rekey_time_limit
                .map_or(false, |limit| state.last_kex.elapsed() >= limit)
    }

    fn outbound_rekey_due(&self, writer: &Writer) -> bool {
        !self.barrier.is_rekeying() && self.rekey_due(writer.sealer.bytes_since_keys())
    }

    /// Writes our KEXINIT and raises the barrier, unless an exchange is
    /// already running.
    async fn begin_kex_locked(&self, writer: &mut Writer) -> FynxResult<()> {
        if self.barrier.is_rekeying() {
            return Ok(());
        }
        let first = !self.has_session_id();
        let known_types = self.verifier.store().key_types(&self.host);
        let mut proposal = self.config.proposal(&self.registry, &known_types)?;
        if !first {
            proposal.kex.retain(|name| name != EXT_INFO_CLIENT);
        }
        let kexinit = KexInit::new(proposal, &self.rng);

        self.barrier.raise();
        self.set_phase(if first {
            SessionPhase::Negotiating
        } else {
            SessionPhase::Rekeying
        });
        if first {
            debug!("Sending KEXINIT");
        } else {
            info!("Starting rekey");
        }
        writer.write_packet(kexinit.as_bytes()).await?;
        writer.client_kexinit = Some(kexinit);
        Ok(())
    }

    /// Starts a key exchange if none is running.
    pub(crate) async fn start_kex(&self) -> FynxResult<()> {
        self.check_open()?;
        let mut writer = self.writer.lock().await;
        self.begin_kex_locked(&mut writer).await
    }

    /// Returns our KEXINIT for the exchange the server just joined,
    /// sending it first if the server started the exchange.
    pub(crate) async fn take_client_kexinit(&self) -> FynxResult<KexInit> {
        let mut writer = self.writer.lock().await;
        self.begin_kex_locked(&mut writer).await?;
        writer.client_kexinit.take().ok_or_else(|| {
            FynxError::Protocol("Second KEXINIT in one key exchange".to_string())
        })
    }

    /// Writes NEWKEYS and switches outbound keys in one step, then flushes
    /// queued messages under the new keys and releases the barrier.
    pub(crate) async fn send_newkeys(&self, sealing: SealingState) -> FynxResult<()> {
        self.check_open()?;
        let mut writer = self.writer.lock().await;
        writer.write_packet(&NewKeys.to_bytes()).await?;
        writer.sealer.install(sealing);
        self.state().last_kex = Instant::now();
        for payload in std::mem::take(&mut writer.queued) {
            writer.write_packet(&payload).await?;
        }
        self.barrier.release();
        Ok(())
    }

    async fn send_locked(&self, writer: &mut Writer, payload: &[u8]) -> FynxResult<()> {
        writer.write_packet(payload).await?;
        if self.outbound_rekey_due(writer) {
            self.begin_kex_locked(writer).await?;
        }
        Ok(())
    }

    /// Sends a message, waiting for the rekey barrier if needed.
    pub(crate) async fn send(&self, payload: Vec<u8>) -> FynxResult<()> {
        self.send_with(payload, || {}).await
    }

    /// Like [`Shared::send`], running `on_send` under the writer lock
    /// just before the message is written. Used to register reply
    /// waiters in wire order.
    pub(crate) async fn send_with<F>(&self, payload: Vec<u8>, on_send: F) -> FynxResult<()>
    where
        F: FnOnce() + Send,
    {
        let msg_type = payload.first().copied().unwrap_or(0);
        let mut on_send = Some(on_send);
        loop {
            self.check_open()?;
            let result = {
                let mut writer = self.writer.lock().await;
                if self.barrier.allows(msg_type) {
                    if let Some(f) = on_send.take() {
                        f();
                    }
                    Some(self.send_locked(&mut writer, &payload).await)
                } else {
                    None
                }
            };
            match result {
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) => return Err(self.fail_and_report(e).await),
                None => {
                    trace!(msg_type, "Waiting for key exchange to finish");
                    if let Err(e) = self.barrier.wait(self.config.rekey_timeout).await {
                        return Err(self.fail_and_report(e).await);
                    }
                }
            }
        }
    }

    /// Sends from the reader task: never waits on the barrier, queues
    /// non-KEX messages until the new keys are installed.
    pub(crate) async fn send_or_queue(&self, payload: Vec<u8>) -> FynxResult<()> {
        self.check_open()?;
        let mut writer = self.writer.lock().await;
        if self.barrier.allows(payload[0]) {
            self.send_locked(&mut writer, &payload).await
        } else {
            trace!(msg_type = payload[0], "Queued until key exchange finishes");
            writer.queued.push(payload);
            Ok(())
        }
    }

    pub(crate) async fn send_keepalive(&self) -> FynxResult<()> {
        let request = GlobalRequest {
            name: KEEPALIVE_REQUEST.to_string(),
            want_reply: true,
            data: Vec::new(),
        };
        // The reply only matters as proof of life; its waiter is dropped.
        let (tx, _rx) = oneshot::channel();
        self.send_with(request.to_bytes(), || lock(&self.global_replies).push_back(tx))
            .await
    }

    pub(crate) fn pop_global_reply(&self) -> Option<oneshot::Sender<GlobalReply>> {
        lock(&self.global_replies).pop_front()
    }

    pub(crate) fn is_forwarded(&self, address: &str, port: u32) -> bool {
        lock(&self.forwards).iter().any(|(bound, bound_port)| {
            *bound_port == port
                && (bound == address || matches!(bound.as_str(), "" | "0.0.0.0" | "::" | "*"))
        })
    }

    pub(crate) fn accepts_incoming(&self) -> bool {
        lock(&self.incoming_tx).is_some()
    }

    pub(crate) fn queue_incoming(
        &self,
        channel_type: ChannelType,
        channel: Arc<ChannelShared>,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        if let Some(tx) = lock(&self.incoming_tx).as_ref() {
            let _ = tx.send((channel_type, channel, events));
        }
    }

    pub(crate) fn deliver_auth_message(&self, payload: Vec<u8>) {
        if let Some(tx) = lock(&self.auth_tx).as_ref() {
            let _ = tx.send(payload);
        }
    }

    /// Marks the user authenticated and turns on delayed compression.
    pub(crate) async fn authenticated(&self) {
        let phase = {
            let mut state = self.state();
            state.authenticated = true;
            if self.barrier.is_rekeying() {
                SessionPhase::Rekeying
            } else {
                SessionPhase::Established
            }
        };
        self.writer.lock().await.sealer.activate_compression();
        self.set_phase(phase);
        info!("User authenticated");
    }

    pub(crate) fn release_channel(&self, id: u32) {
        self.lock_channels().release_if_closed(id);
    }

    pub(crate) fn peer_disconnected(&self, msg: Disconnect) -> FynxError {
        let err = FynxError::PeerDisconnected {
            reason_code: msg.reason_code,
            description: msg.description.clone(),
        };
        self.state().peer_disconnect = Some(msg);
        err
    }

    /// Tears the session down after a fatal error. Sends DISCONNECT
    /// unless the peer already left.
    pub(crate) async fn fail(&self, err: FynxError) {
        let notify_peer = !matches!(err, FynxError::PeerDisconnected { .. } | FynxError::Io(_));
        let reason = err.to_string();
        let disconnect = Disconnect::new(DisconnectReason::for_error(&err), &reason);
        if !self.state().close(reason.clone(), Some(err)) {
            return;
        }
        if notify_peer {
            error!(error = %reason, "Session failed");
        } else {
            info!(reason = %reason, "Session closed");
        }
        self.shutdown(notify_peer.then_some(disconnect)).await;
    }

    /// Fails the session and hands back an error for the caller.
    async fn fail_and_report(&self, err: FynxError) -> FynxError {
        let report = match &err {
            FynxError::FlowControlTimeout(msg) => FynxError::FlowControlTimeout(msg.clone()),
            other => FynxError::Closed(other.to_string()),
        };
        self.fail(err).await;
        report
    }

    async fn shutdown(&self, disconnect: Option<Disconnect>) {
        self.barrier.close();
        self.set_phase(SessionPhase::Disconnected);

        let flush = async {
            let mut writer = self.writer.lock().await;
            if let Some(msg) = disconnect {
                if let Err(e) = writer.write_packet(&msg.to_bytes()).await {
                    debug!(error = %e, "Could not send DISCONNECT");
                }
            }
            // Drops (and zeroes) the session keys.
            writer.sealer.install(SealingState::plaintext());
            writer.queued.clear();
            let _ = writer.io.shutdown().await;
        };
        if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
            warn!("Writer busy during shutdown");
        }
        self.close_local();
    }

    /// Synchronous part of teardown.
    fn close_local(&self) {
        self.barrier.close();
        self.set_phase(SessionPhase::Disconnected);
        self.lock_channels().abort_all();
        lock(&self.global_replies).clear();
        lock(&self.auth_tx).take();
        lock(&self.incoming_tx).take();
    }
}

/// Authentication transport over a live session.
struct SessionAuthTransport<'a> {
    shared: &'a Shared,
    session_id: Vec<u8>,
    rx: tokio::sync::MutexGuard<'a, mpsc::UnboundedReceiver<Vec<u8>>>,
}

#[async_trait]
impl AuthTransport for SessionAuthTransport<'_> {
    fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    async fn send(&mut self, payload: Vec<u8>) -> FynxResult<()> {
        match payload.first() {
            Some(50..=79) => self.shared.send(payload).await,
            other => Err(FynxError::Protocol(format!(
                "Message {:?} is not an authentication message",
                other
            ))),
        }
    }

    async fn receive(&mut self) -> FynxResult<Vec<u8>> {
        loop {
            let msg = self.rx.recv().await.ok_or_else(|| {
                FynxError::Closed("session closed during authentication".to_string())
            })?;
            if msg.first() != Some(&(MessageType::UserauthBanner as u8)) {
                return Ok(msg);
            }
        }
    }
}

/// Configures and opens sessions.
pub struct SessionBuilder {
    config: SessionConfig,
    registry: Arc<AlgorithmRegistry>,
    store: Arc<dyn TrustStore>,
    prompt: Option<Arc<dyn UserPrompt>>,
    rng: SecureRandom,
    phase: watch::Sender<SessionPhase>,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("prompt", &self.prompt.is_some())
            .field("phase", &*self.phase.borrow())
            .finish()
    }
}

impl SessionBuilder {
    /// Starts from the default configuration and built-in algorithms.
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self {
            config: SessionConfig::default(),
            registry: Arc::new(AlgorithmRegistry::with_defaults()),
            store,
            prompt: None,
            rng: SecureRandom::new(),
            phase: watch::channel(SessionPhase::Connecting).0,
        }
    }

    /// Follows the phase of the session this builder opens, starting at
    /// [`SessionPhase::Connecting`]. The receiver stays valid after
    /// `connect` returns.
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Replaces the configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the algorithm registry.
    pub fn registry(mut self, registry: Arc<AlgorithmRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the prompt used by the `Ask` host key policy.
    pub fn prompt(mut self, prompt: Arc<dyn UserPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Replaces the random source.
    pub fn rng(mut self, rng: SecureRandom) -> Self {
        self.rng = rng;
        self
    }

    /// Runs the version exchange and the first key exchange over
    /// `stream`. `host` and `port` name the server for host key lookups
    /// (unless `host_key_alias` is set).
    ///
    /// # Errors
    ///
    /// Fails with the error that ended the handshake, e.g.
    /// `FynxError::TrustRejected` or `FynxError::Negotiation`, or with
    /// `FynxError::FlowControlTimeout` after `connect_timeout`.
    pub async fn connect<S>(self, stream: S, host: &str, port: u16) -> FynxResult<Session>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if let Err(e) = self.config.validate() {
            self.phase.send_replace(SessionPhase::Disconnected);
            return Err(e);
        }
        let timeout = self.config.connect_timeout;
        let label = self
            .config
            .host_key_alias
            .clone()
            .unwrap_or_else(|| host_label(host, port));

        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut read_half = BufReader::new(read_half);
        let client_version = Version::new(&self.config.client_software, None);

        let exchange = async {
            write_half.write_all(&client_version.to_wire_format()).await?;
            write_half.flush().await?;
            read_version(&mut read_half).await
        };
        let exchanged = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(FynxError::FlowControlTimeout(
                "version exchange timed out".to_string(),
            )),
        };
        let server_version = match exchanged {
            Ok(version) => version,
            Err(e) => {
                self.phase.send_replace(SessionPhase::Disconnected);
                return Err(e);
            }
        };
        self.phase.send_replace(SessionPhase::VersionExchanged);
        info!(
            local = %client_version,
            remote = %server_version,
            host = %label,
            "Version exchange complete"
        );

        let mut verifier = HostTrustVerifier::new(
            self.store,
            self.config.strict_host_key_checking,
            Arc::clone(&self.registry),
        );
        if let Some(prompt) = self.prompt {
            verifier = verifier.with_prompt(prompt);
        }

        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let mut phase_rx = self.phase.subscribe();
        let shared = Arc::new(Shared {
            writer: tokio::sync::Mutex::new(Writer {
                sealer: PacketSealer::new(self.rng.clone()),
                io: Box::new(write_half),
                client_kexinit: None,
                queued: Vec::new(),
            }),
            config: self.config,
            registry: self.registry,
            rng: self.rng,
            verifier,
            host: label,
            client_version,
            keepalive: KeepaliveState::default(),
            barrier: RekeyBarrier::new(),
            state: Mutex::new(SessionState::new(server_version)),
            phase: self.phase,
            channels: Mutex::new(ChannelTable::default()),
            global_replies: Mutex::new(VecDeque::new()),
            forwards: Mutex::new(Vec::new()),
            auth_tx: Mutex::new(Some(auth_tx)),
            auth_rx: tokio::sync::Mutex::new(auth_rx),
            incoming_tx: Mutex::new(Some(incoming_tx)),
            incoming_rx: tokio::sync::Mutex::new(incoming_rx),
        });

        let reader = tokio::spawn(Reader::new(Arc::clone(&shared), read_half).run());
        let mut session = Session {
            shared: Arc::clone(&shared),
            reader,
            timer: None,
        };

        let handshake = async {
            shared.start_kex().await?;
            let _ = phase_rx
                .wait_for(|p| p.is_secured() || *p == SessionPhase::Disconnected)
                .await;
            Ok::<_, FynxError>(())
        };
        match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                shared.fail(e).await;
            }
            Err(_) => {
                shared
                    .fail(FynxError::FlowControlTimeout(
                        "key exchange timed out".to_string(),
                    ))
                    .await;
            }
        }

        // A session that closes right after the handshake is still returned.
        if shared.state().kex_count == 0 {
            let failure = shared.state().failure.take();
            return Err(failure.unwrap_or_else(|| {
                FynxError::Closed("handshake did not complete".to_string())
            }));
        }
        session.timer = Some(keepalive::spawn(Arc::clone(&session.shared)));
        Ok(session)
    }
}

/// A client SSH session.
///
/// Dropping the session closes it without notifying the peer; call
/// [`Session::disconnect`] for an orderly close.
pub struct Session {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    timer: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.shared.host)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Session {
    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        *self.shared.phase.borrow()
    }

    /// Our identification string.
    pub fn client_version(&self) -> &str {
        self.shared.client_version.as_str()
    }

    /// The server's identification string.
    pub fn server_version(&self) -> String {
        self.shared.server_version()
    }

    /// H of the first key exchange.
    pub fn session_id(&self) -> Option<Vec<u8>> {
        self.shared.state().session_id.clone()
    }

    /// The server host key accepted during the first key exchange.
    pub fn host_key(&self) -> Option<HostKey> {
        self.shared.trusted_host_key()
    }

    /// Signature algorithms from the server's EXT_INFO, if it sent one.
    pub fn server_sig_algs(&self) -> Option<Vec<String>> {
        self.shared.state().server_sig_algs.clone()
    }

    /// Returns true after USERAUTH_SUCCESS.
    pub fn is_authenticated(&self) -> bool {
        self.shared.is_authenticated()
    }

    /// Returns true once the session is closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Why the session closed.
    pub fn close_reason(&self) -> Option<String> {
        self.shared.state().close_reason.clone()
    }

    /// Takes the error that closed the session, if it failed.
    pub fn take_failure(&self) -> Option<FynxError> {
        self.shared.state().failure.take()
    }

    /// The peer's DISCONNECT, if it sent one.
    pub fn peer_disconnect(&self) -> Option<Disconnect> {
        self.shared.state().peer_disconnect.clone()
    }

    /// Number of completed key exchanges, the first one included.
    pub fn kex_count(&self) -> u32 {
        self.shared.state().kex_count
    }

    /// Number of channels holding an id.
    pub fn channel_count(&self) -> usize {
        self.shared.lock_channels().len()
    }

    /// Waits until the session reaches `phase` or closes.
    pub async fn wait_for_phase(&self, phase: SessionPhase) -> SessionPhase {
        let mut rx = self.shared.phase.subscribe();
        let result = rx
            .wait_for(|p| *p == phase || *p == SessionPhase::Disconnected)
            .await
            .map(|p| *p);
        result.unwrap_or(SessionPhase::Disconnected)
    }

    /// Runs one authentication method.
    ///
    /// Requests the `ssh-userauth` service on first use. On success the
    /// session becomes established and delayed compression starts.
    pub async fn authenticate(
        &self,
        username: &str,
        method: &mut dyn UserAuth,
    ) -> FynxResult<AuthResult> {
        self.shared.check_open()?;
        if self.is_authenticated() {
            return Err(FynxError::Protocol("Already authenticated".to_string()));
        }
        let session_id = self
            .session_id()
            .ok_or_else(|| FynxError::Protocol("Key exchange not complete".to_string()))?;

        let mut rx = self.shared.auth_rx.lock().await;
        if !self.shared.state().service_accepted {
            self.shared.send(service_request("ssh-userauth")).await?;
            let reply = rx.recv().await.ok_or_else(|| {
                FynxError::Closed("session closed during service request".to_string())
            })?;
            if reply.first() != Some(&(MessageType::ServiceAccept as u8)) {
                return Err(FynxError::Protocol(format!(
                    "Expected SSH_MSG_SERVICE_ACCEPT, got {}",
                    reply.first().copied().unwrap_or(0)
                )));
            }
            self.shared.state().service_accepted = true;
            debug!("ssh-userauth service accepted");
        }

        let mut transport = SessionAuthTransport {
            shared: &self.shared,
            session_id,
            rx,
        };
        debug!(user = username, method = method.method(), "Authenticating");
        let result = method.authenticate(username, &mut transport).await?;
        if let AuthResult::Failure { methods, .. } = &result {
            debug!(method = method.method(), ?methods, "Authentication failed");
        }
        Ok(result)
    }

    /// Opens a channel of the given type.
    ///
    /// # Errors
    ///
    /// `FynxError::Channel` if the peer refuses, `FynxError::FlowControlTimeout`
    /// if it does not answer within `channel_open_timeout`.
    pub async fn open_channel(&self, channel_type: ChannelType) -> FynxResult<Channel> {
        self.shared.check_open()?;
        let config = &self.shared.config;
        let (shared, events) = self
            .shared
            .lock_channels()
            .allocate(config.local_window_size, config.local_max_packet);
        let channel = Channel::new(shared, Arc::clone(&self.shared), events);
        let (tx, rx) = oneshot::channel();
        channel.set_open_waiter(tx);

        let open = ChannelOpen::new(
            channel_type,
            channel.id(),
            config.local_window_size,
            config.local_max_packet,
        );
        debug!(
            channel = channel.id(),
            channel_type = open.channel_type().name(),
            "Opening channel"
        );
        self.shared.send(open.to_bytes()).await?;

        match tokio::time::timeout(config.channel_open_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(channel),
            Ok(Ok(Err(e))) => {
                self.shared.release_channel(channel.id());
                Err(e)
            }
            Ok(Err(_)) => Err(FynxError::Closed("session closed".to_string())),
            Err(_) => Err(FynxError::FlowControlTimeout(format!(
                "no answer to channel open within {:?}",
                config.channel_open_timeout
            ))),
        }
    }

    /// Opens a `session` channel.
    pub async fn open_session(&self) -> FynxResult<Channel> {
        self.open_channel(ChannelType::Session).await
    }

    /// Opens a `direct-tcpip` channel to `host:port` through the server.
    pub async fn open_direct_tcpip(
        &self,
        host: &str,
        port: u32,
        originator_address: &str,
        originator_port: u32,
    ) -> FynxResult<Channel> {
        self.open_channel(ChannelType::DirectTcpip {
            host: host.to_string(),
            port,
            originator_address: originator_address.to_string(),
            originator_port,
        })
        .await
    }

    /// Waits for the next channel opened by the server (forwarded
    /// connections, X11, agent). Returns `None` once the session is closed.
    pub async fn accept(&self) -> Option<(ChannelType, Channel)> {
        let (channel_type, shared, events) = self.shared.incoming_rx.lock().await.recv().await?;
        Some((
            channel_type,
            Channel::new(shared, Arc::clone(&self.shared), events),
        ))
    }

    /// Sends a global request. Without `want_reply` the result is always
    /// `GlobalReply::Success` with no data.
    pub async fn global_request(
        &self,
        name: &str,
        want_reply: bool,
        data: Vec<u8>,
    ) -> FynxResult<GlobalReply> {
        let request = GlobalRequest {
            name: name.to_string(),
            want_reply,
            data,
        };
        if !want_reply {
            self.shared.send(request.to_bytes()).await?;
            return Ok(GlobalReply::Success(Vec::new()));
        }
        let (tx, rx) = oneshot::channel();
        let replies = &self.shared.global_replies;
        self.shared
            .send_with(request.to_bytes(), move || lock(replies).push_back(tx))
            .await?;
        rx.await
            .map_err(|_| FynxError::Closed("session closed".to_string()))
    }

    /// Asks the server to listen on `address:port` and forward
    /// connections back. Returns the bound port (useful when `port` is 0).
    pub async fn tcpip_forward(&self, address: &str, port: u32) -> FynxResult<u32> {
        let reply = self
            .global_request("tcpip-forward", true, tcpip_forward_data(address, port))
            .await?;
        let bound = match reply {
            GlobalReply::Failure => {
                return Err(FynxError::Channel(format!(
                    "server refused to forward {}:{}",
                    address, port
                )))
            }
            GlobalReply::Success(data) if port == 0 => {
                let mut offset = 0;
                read_u32(&data, &mut offset)?
            }
            GlobalReply::Success(_) => port,
        };
        lock(&self.shared.forwards).push((address.to_string(), bound));
        info!(address, port = bound, "Remote forwarding established");
        Ok(bound)
    }

    /// Cancels a forwarding set up with [`Session::tcpip_forward`].
    pub async fn cancel_tcpip_forward(&self, address: &str, port: u32) -> FynxResult<()> {
        lock(&self.shared.forwards).retain(|(a, p)| !(a == address && *p == port));
        let reply = self
            .global_request(
                "cancel-tcpip-forward",
                true,
                tcpip_forward_data(address, port),
            )
            .await?;
        match reply {
            GlobalReply::Success(_) => Ok(()),
            GlobalReply::Failure => Err(FynxError::Channel(format!(
                "server refused to cancel forwarding {}:{}",
                address, port
            ))),
        }
    }

    /// Starts a key exchange now. Returns once our KEXINIT is sent;
    /// traffic resumes automatically when the exchange completes.
    pub async fn rekey(&self) -> FynxResult<()> {
        if !self.shared.is_secured() {
            return Err(FynxError::Protocol("Key exchange not complete".to_string()));
        }
        self.shared.start_kex().await
    }

    /// Sends DISCONNECT (by application) and closes the session.
    pub async fn disconnect(&self) -> FynxResult<()> {
        let reason = "disconnected by application".to_string();
        if !self.shared.state().close(reason.clone(), None) {
            return Ok(());
        }
        info!("Disconnecting");
        self.shared
            .shutdown(Some(Disconnect::new(
                DisconnectReason::ByApplication,
                &reason,
            )))
            .await;
        self.reader.abort();
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared
            .state()
            .close("session dropped".to_string(), None);
        self.shared.close_local();
        self.reader.abort();
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
