//! Channel multiplexing and flow control.
//!
//! The session's reader task owns dispatch: it looks a channel up in the
//! [`ChannelTable`] by recipient id and feeds it the message. A
//! [`Channel`] handle is what callers hold; writes reserve remote window
//! credit before anything goes on the wire and wait (with a deadline) when
//! none is left.
//!
//! Local windows are replenished as soon as they drop below half their
//! maximum.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use fynx_platform::{FynxError, FynxResult};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, trace};

use crate::connection::{
    channel_message, ChannelData, ChannelOpenConfirmation, ChannelOpenFailure, ChannelRequest,
    ChannelRequestType, ChannelWindowAdjust,
};
use crate::message::MessageType;
use crate::packet::MAX_PACKET_SIZE;
use crate::session::Shared;

/// Largest data chunk sent in one CHANNEL_DATA message.
const MAX_CHUNK: u32 = (MAX_PACKET_SIZE - 1024) as u32;

/// Something that happened on a channel, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// CHANNEL_DATA payload
    Data(Vec<u8>),
    /// CHANNEL_EXTENDED_DATA payload (type 1 is stderr)
    ExtendedData {
        /// Data type code
        data_type: u32,
        /// Payload
        data: Vec<u8>,
    },
    /// Peer will send no more data
    Eof,
    /// `exit-status` request
    ExitStatus(u32),
    /// `exit-signal` request
    ExitSignal {
        /// Signal name without the "SIG" prefix
        signal_name: String,
        /// Error message
        error_message: String,
    },
    /// Channel is closed. Always the last event.
    Closed,
}

/// Lifecycle of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// CHANNEL_OPEN sent, no answer yet
    Opening,
    /// Confirmed
    Open,
    /// Closed or refused
    Closed,
}

#[derive(Debug)]
struct ChannelInner {
    status: ChannelStatus,
    remote_id: u32,
    remote_window: u32,
    remote_max_packet: u32,
    local_window: u32,
    local_window_max: u32,
    local_max_packet: u32,
    eof_sent: bool,
    eof_received: bool,
    close_sent: bool,
    close_received: bool,
    exit_status: Option<u32>,
    open_waiter: Option<oneshot::Sender<FynxResult<()>>>,
    pending_requests: VecDeque<oneshot::Sender<bool>>,
}

/// Per-channel monitor shared by the reader task and [`Channel`] handles.
#[derive(Debug)]
pub(crate) struct ChannelShared {
    local_id: u32,
    inner: Mutex<ChannelInner>,
    window_changed: Notify,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelShared {
    fn new(
        local_id: u32,
        local_window: u32,
        local_max_packet: u32,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            local_id,
            inner: Mutex::new(ChannelInner {
                status: ChannelStatus::Opening,
                remote_id: 0,
                remote_window: 0,
                remote_max_packet: 0,
                local_window,
                local_window_max: local_window,
                local_max_packet,
                eof_sent: false,
                eof_received: false,
                close_sent: false,
                close_received: false,
                exit_status: None,
                open_waiter: None,
                pending_requests: VecDeque::new(),
            }),
            window_changed: Notify::new(),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        // A poisoned lock means a panic elsewhere; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn local_id(&self) -> u32 {
        self.local_id
    }

    pub(crate) fn remote_id(&self) -> u32 {
        self.lock().remote_id
    }

    pub(crate) fn status(&self) -> ChannelStatus {
        self.lock().status
    }

    /// Marks a peer-initiated channel as open.
    pub(crate) fn accept(&self, remote_id: u32, remote_window: u32, remote_max_packet: u32) {
        let mut inner = self.lock();
        inner.status = ChannelStatus::Open;
        inner.remote_id = remote_id;
        inner.remote_window = remote_window;
        inner.remote_max_packet = remote_max_packet;
    }

    /// Returns false if nobody is waiting for the open any more; the
    /// caller then closes the channel.
    pub(crate) fn on_confirmation(&self, msg: &ChannelOpenConfirmation) -> FynxResult<bool> {
        let mut inner = self.lock();
        if inner.status != ChannelStatus::Opening {
            return Err(FynxError::Protocol(format!(
                "Unexpected open confirmation for channel {}",
                self.local_id
            )));
        }
        inner.status = ChannelStatus::Open;
        inner.remote_id = msg.sender_channel();
        inner.remote_window = msg.initial_window_size();
        inner.remote_max_packet = msg.maximum_packet_size();
        debug!(
            channel = self.local_id,
            remote = inner.remote_id,
            window = inner.remote_window,
            "Channel open confirmed"
        );
        Ok(inner
            .open_waiter
            .take()
            .map_or(false, |waiter| waiter.send(Ok(())).is_ok()))
    }

    /// Closes a channel whose opener stopped waiting.
    pub(crate) fn close_abandoned(&self) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        if inner.close_sent {
            return None;
        }
        inner.close_sent = true;
        Some(channel_message(MessageType::ChannelClose, inner.remote_id))
    }

    pub(crate) fn on_open_failure(&self, msg: &ChannelOpenFailure) -> FynxResult<()> {
        let mut inner = self.lock();
        if inner.status != ChannelStatus::Opening {
            return Err(FynxError::Protocol(format!(
                "Unexpected open failure for channel {}",
                self.local_id
            )));
        }
        inner.status = ChannelStatus::Closed;
        inner.close_sent = true;
        inner.close_received = true;
        debug!(
            channel = self.local_id,
            reason = msg.reason_code(),
            "Channel open refused: {}",
            msg.description()
        );
        if let Some(waiter) = inner.open_waiter.take() {
            let _ = waiter.send(Err(FynxError::Channel(format!(
                "open refused ({}): {}",
                msg.reason_code(),
                msg.description()
            ))));
        }
        Ok(())
    }

    pub(crate) fn on_window_adjust(&self, bytes_to_add: u32) {
        let mut inner = self.lock();
        inner.remote_window = inner.remote_window.saturating_add(bytes_to_add);
        trace!(
            channel = self.local_id,
            window = inner.remote_window,
            "Remote window adjusted"
        );
        drop(inner);
        self.window_changed.notify_waiters();
    }

    /// Consumes local window and queues the data. Returns a WINDOW_ADJUST
    /// to send when the window dropped below half.
    pub(crate) fn on_data(&self, data: ChannelData) -> FynxResult<Option<Vec<u8>>> {
        let mut inner = self.lock();
        let len = data.data().len() as u32;
        if inner.status != ChannelStatus::Open || inner.eof_received {
            debug!(channel = self.local_id, "Dropping data on finished channel");
            return Ok(None);
        }
        if len > inner.local_window {
            return Err(FynxError::Protocol(format!(
                "Channel {} received {} bytes with window {}",
                self.local_id, len, inner.local_window
            )));
        }
        if len > inner.local_max_packet {
            return Err(FynxError::Protocol(format!(
                "Channel {} received {} bytes, maximum packet is {}",
                self.local_id, len, inner.local_max_packet
            )));
        }
        inner.local_window -= len;

        let event = match data.data_type() {
            None => ChannelEvent::Data(data.into_data()),
            Some(data_type) => ChannelEvent::ExtendedData {
                data_type,
                data: data.into_data(),
            },
        };
        let _ = self.events.send(event);

        if inner.local_window < inner.local_window_max / 2 {
            let add = inner.local_window_max - inner.local_window;
            inner.local_window = inner.local_window_max;
            trace!(channel = self.local_id, add, "Replenishing local window");
            return Ok(Some(ChannelWindowAdjust::new(inner.remote_id, add).to_bytes()));
        }
        Ok(None)
    }

    pub(crate) fn on_eof(&self) {
        let mut inner = self.lock();
        if !inner.eof_received {
            inner.eof_received = true;
            let _ = self.events.send(ChannelEvent::Eof);
        }
    }

    /// Handles CHANNEL_CLOSE. Returns the CLOSE reply if this side has not
    /// closed yet.
    pub(crate) fn on_close(&self) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        inner.close_received = true;
        let reply = if inner.close_sent {
            None
        } else {
            inner.close_sent = true;
            Some(channel_message(MessageType::ChannelClose, inner.remote_id))
        };
        self.finish(&mut inner);
        drop(inner);
        self.window_changed.notify_waiters();
        debug!(channel = self.local_id, "Channel closed by peer");
        reply
    }

    /// Handles a request from the peer. Returns the reply, if one is
    /// wanted.
    pub(crate) fn on_request(&self, request: ChannelRequest) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        let remote_id = inner.remote_id;
        let accepted = match request.request_type() {
            ChannelRequestType::ExitStatus { exit_status } => {
                inner.exit_status = Some(*exit_status);
                let _ = self.events.send(ChannelEvent::ExitStatus(*exit_status));
                true
            }
            ChannelRequestType::ExitSignal {
                signal_name,
                error_message,
                ..
            } => {
                let _ = self.events.send(ChannelEvent::ExitSignal {
                    signal_name: signal_name.clone(),
                    error_message: error_message.clone(),
                });
                true
            }
            other => {
                debug!(
                    channel = self.local_id,
                    request = other.name(),
                    "Refusing channel request"
                );
                false
            }
        };
        request.want_reply().then(|| {
            let msg_type = if accepted {
                MessageType::ChannelSuccess
            } else {
                MessageType::ChannelFailure
            };
            channel_message(msg_type, remote_id)
        })
    }

    /// Handles CHANNEL_SUCCESS / CHANNEL_FAILURE.
    pub(crate) fn on_request_reply(&self, success: bool) -> FynxResult<()> {
        let waiter = self.lock().pending_requests.pop_front();
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(success);
                Ok(())
            }
            None => Err(FynxError::Protocol(format!(
                "Unsolicited channel request reply on channel {}",
                self.local_id
            ))),
        }
    }

    /// Terminates the channel after a session failure.
    pub(crate) fn abort(&self) {
        let mut inner = self.lock();
        inner.close_sent = true;
        inner.close_received = true;
        if let Some(waiter) = inner.open_waiter.take() {
            let _ = waiter.send(Err(FynxError::Closed("session closed".to_string())));
        }
        self.finish(&mut inner);
        drop(inner);
        self.window_changed.notify_waiters();
    }

    fn finish(&self, inner: &mut ChannelInner) {
        if inner.status != ChannelStatus::Closed {
            inner.status = ChannelStatus::Closed;
            let _ = self.events.send(ChannelEvent::Closed);
        }
        // Dropping the senders fails every waiting request.
        inner.pending_requests.clear();
    }

    pub(crate) fn is_fully_closed(&self) -> bool {
        let inner = self.lock();
        inner.close_sent && inner.close_received
    }

    /// Takes up to `wanted` bytes of remote window, waiting until some is
    /// available. Never returns more than the peer's maximum packet.
    pub(crate) async fn reserve(&self, wanted: usize, timeout: Duration) -> FynxResult<usize> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.window_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if inner.status == ChannelStatus::Closed || inner.close_sent {
                    return Err(FynxError::Channel(format!(
                        "channel {} is closed",
                        self.local_id
                    )));
                }
                if inner.eof_sent {
                    return Err(FynxError::Channel(format!(
                        "channel {} already sent EOF",
                        self.local_id
                    )));
                }
                if inner.remote_window > 0 {
                    let limit = inner.remote_max_packet.clamp(1, MAX_CHUNK);
                    let n = (wanted as u64)
                        .min(u64::from(inner.remote_window))
                        .min(u64::from(limit)) as u32;
                    inner.remote_window -= n;
                    return Ok(n as usize);
                }
            }

            trace!(channel = self.local_id, "Waiting for window space");
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(FynxError::FlowControlTimeout(format!(
                    "no window space on channel {} after {:?}",
                    self.local_id, timeout
                )));
            }
        }
    }

    /// Gives back reserved window that could not be sent.
    fn release(&self, n: usize) {
        let mut inner = self.lock();
        inner.remote_window = inner.remote_window.saturating_add(n as u32);
    }
}

/// Channel ids to channels. Ids are dense: the lowest free id is reused.
#[derive(Debug, Default)]
pub(crate) struct ChannelTable {
    slots: Vec<Option<Arc<ChannelShared>>>,
}

impl ChannelTable {
    /// Allocates the lowest free id.
    pub(crate) fn allocate(
        &mut self,
        local_window: u32,
        local_max_packet: u32,
    ) -> (Arc<ChannelShared>, mpsc::UnboundedReceiver<ChannelEvent>) {
        let id = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.slots.len());
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(ChannelShared::new(id as u32, local_window, local_max_packet, tx));
        if id == self.slots.len() {
            self.slots.push(Some(Arc::clone(&channel)));
        } else {
            self.slots[id] = Some(Arc::clone(&channel));
        }
        (channel, rx)
    }

    pub(crate) fn get(&self, id: u32) -> Option<Arc<ChannelShared>> {
        self.slots.get(id as usize).and_then(Clone::clone)
    }

    /// Frees the id once both sides have closed.
    pub(crate) fn release_if_closed(&mut self, id: u32) {
        let closed = self
            .get(id)
            .map_or(false, |channel| channel.is_fully_closed());
        if closed {
            self.slots[id as usize] = None;
            while matches!(self.slots.last(), Some(None)) {
                self.slots.pop();
            }
            trace!(channel = id, "Channel id released");
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Aborts every channel; used when the session dies.
    pub(crate) fn abort_all(&mut self) {
        for channel in self.slots.drain(..).flatten() {
            channel.abort();
        }
    }
}

/// Caller handle for one channel.
///
/// Dropping the handle does not close the channel; call
/// [`Channel::close`].
pub struct Channel {
    shared: Arc<ChannelShared>,
    session: Arc<Shared>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    finished: bool,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("local_id", &self.shared.local_id())
            .field("remote_id", &self.shared.remote_id())
            .field("status", &self.shared.status())
            .finish()
    }
}

impl Channel {
    pub(crate) fn new(
        shared: Arc<ChannelShared>,
        session: Arc<Shared>,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> Self {
        Self {
            shared,
            session,
            events,
            finished: false,
        }
    }

    pub(crate) fn set_open_waiter(&self, waiter: oneshot::Sender<FynxResult<()>>) {
        self.shared.lock().open_waiter = Some(waiter);
    }

    /// Local channel id.
    pub fn id(&self) -> u32 {
        self.shared.local_id()
    }

    /// Peer's channel id.
    pub fn remote_id(&self) -> u32 {
        self.shared.remote_id()
    }

    /// Current status.
    pub fn status(&self) -> ChannelStatus {
        self.shared.status()
    }

    /// Remaining send credit.
    pub fn remote_window(&self) -> u32 {
        self.shared.lock().remote_window
    }

    /// Exit status reported by the peer, if any.
    pub fn exit_status(&self) -> Option<u32> {
        self.shared.lock().exit_status
    }

    /// Sends data, splitting it to fit the peer's window and maximum
    /// packet size. Waits for window adjustments when the window is
    /// exhausted and fails with [`FynxError::FlowControlTimeout`] if none
    /// arrives in time.
    pub async fn write(&self, data: &[u8]) -> FynxResult<()> {
        let timeout = self.session.config.window_wait_timeout;
        let mut rest = data;
        while !rest.is_empty() {
            let n = self.shared.reserve(rest.len(), timeout).await?;
            let (chunk, tail) = rest.split_at(n);
            let msg = ChannelData::new(self.shared.remote_id(), chunk.to_vec());
            if let Err(e) = self.session.send(msg.to_bytes()).await {
                self.shared.release(n);
                return Err(e);
            }
            rest = tail;
        }
        Ok(())
    }

    /// Waits for the next event. Returns `None` after [`ChannelEvent::Closed`].
    pub async fn read(&mut self) -> Option<ChannelEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await;
        if matches!(event, Some(ChannelEvent::Closed) | None) {
            self.finished = true;
        }
        event
    }

    /// Sends a channel request and, if `want_reply`, waits for the answer.
    pub async fn request(&self, request: ChannelRequestType, want_reply: bool) -> FynxResult<bool> {
        let msg = ChannelRequest::new(self.shared.remote_id(), request, want_reply);
        if !want_reply {
            self.session.send(msg.to_bytes()).await?;
            return Ok(true);
        }
        let (tx, rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        self.session
            .send_with(msg.to_bytes(), move || {
                shared.lock().pending_requests.push_back(tx);
            })
            .await?;
        rx.await
            .map_err(|_| FynxError::Channel(format!("channel {} closed", self.id())))
    }

    /// Runs a command. Fails if the peer refuses.
    pub async fn exec(&self, command: &str) -> FynxResult<()> {
        let request = ChannelRequestType::Exec {
            command: command.to_string(),
        };
        self.expect_success(request, "exec").await
    }

    /// Starts a subsystem. Fails if the peer refuses.
    pub async fn subsystem(&self, name: &str) -> FynxResult<()> {
        let request = ChannelRequestType::Subsystem {
            name: name.to_string(),
        };
        self.expect_success(request, "subsystem").await
    }

    /// Starts a login shell. Fails if the peer refuses.
    pub async fn shell(&self) -> FynxResult<()> {
        self.expect_success(ChannelRequestType::Shell, "shell").await
    }

    async fn expect_success(&self, request: ChannelRequestType, what: &str) -> FynxResult<()> {
        if self.request(request, true).await? {
            Ok(())
        } else {
            Err(FynxError::Channel(format!(
                "{} request refused on channel {}",
                what,
                self.id()
            )))
        }
    }

    /// Sends EOF. Further writes fail.
    pub async fn send_eof(&self) -> FynxResult<()> {
        let remote_id = {
            let mut inner = self.shared.lock();
            if inner.eof_sent || inner.close_sent {
                return Ok(());
            }
            inner.eof_sent = true;
            inner.remote_id
        };
        self.shared.window_changed.notify_waiters();
        self.session
            .send(channel_message(MessageType::ChannelEof, remote_id))
            .await
    }

    /// Sends CLOSE. The id is released once the peer's CLOSE arrives.
    pub async fn close(&self) -> FynxResult<()> {
        let remote_id = {
            let mut inner = self.shared.lock();
            if inner.close_sent {
                return Ok(());
            }
            inner.close_sent = true;
            inner.remote_id
        };
        self.shared.window_changed.notify_waiters();
        self.session
            .send(channel_message(MessageType::ChannelClose, remote_id))
            .await?;
        self.session.release_channel(self.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_channel(table: &mut ChannelTable) -> (Arc<ChannelShared>, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (channel, rx) = table.allocate(1000, 400);
        channel.accept(77, 100, 60);
        (channel, rx)
    }

    #[test]
    fn test_ids_are_dense() {
        let mut table = ChannelTable::default();
        let (a, _) = table.allocate(10, 10);
        let (b, _) = table.allocate(10, 10);
        let (c, _) = table.allocate(10, 10);
        assert_eq!((a.local_id(), b.local_id(), c.local_id()), (0, 1, 2));

        b.abort();
        table.release_if_closed(1);
        let (d, _) = table.allocate(10, 10);
        assert_eq!(d.local_id(), 1);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_release_waits_for_both_closes() {
        let mut table = ChannelTable::default();
        let (channel, _rx) = open_channel(&mut table);
        assert!(channel.on_close().is_some());
        table.release_if_closed(0);
        assert!(table.get(0).is_none());
    }

    #[test]
    fn test_confirmation_sets_remote_parameters() {
        let mut table = ChannelTable::default();
        let (channel, _rx) = table.allocate(1000, 400);
        let (tx, mut rx) = oneshot::channel();
        channel.lock().open_waiter = Some(tx);
        let waiting = channel
            .on_confirmation(&ChannelOpenConfirmation::new(0, 9, 5000, 1000))
            .unwrap();
        assert!(waiting);
        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(channel.remote_id(), 9);
        assert_eq!(channel.status(), ChannelStatus::Open);
        assert!(channel
            .on_confirmation(&ChannelOpenConfirmation::new(0, 9, 5000, 1000))
            .is_err());
    }

    #[test]
    fn test_local_window_replenished_below_half() {
        let mut table = ChannelTable::default();
        let (channel, mut rx) = open_channel(&mut table);

        let adjust = channel.on_data(ChannelData::new(0, vec![0; 400])).unwrap();
        assert!(adjust.is_none());
        let adjust = channel.on_data(ChannelData::new(0, vec![0; 200])).unwrap();
        let adjust = ChannelWindowAdjust::from_bytes(&adjust.unwrap()).unwrap();
        assert_eq!(adjust.recipient_channel(), 77);
        assert_eq!(adjust.bytes_to_add(), 600);
        assert_eq!(channel.lock().local_window, 1000);

        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::Data(vec![0; 400]));
    }

    #[test]
    fn test_data_beyond_window_is_protocol_error() {
        let mut table = ChannelTable::default();
        let (channel, _rx) = table.allocate(100, 400);
        channel.accept(1, 10, 10);
        assert!(matches!(
            channel.on_data(ChannelData::new(0, vec![0; 101])),
            Err(FynxError::Protocol(_))
        ));
    }

    #[test]
    fn test_exit_status_recorded_and_other_requests_refused() {
        let mut table = ChannelTable::default();
        let (channel, mut rx) = open_channel(&mut table);

        let reply = channel.on_request(ChannelRequest::new(
            0,
            ChannelRequestType::ExitStatus { exit_status: 3 },
            false,
        ));
        assert!(reply.is_none());
        assert_eq!(channel.lock().exit_status, Some(3));
        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::ExitStatus(3));

        let reply = channel
            .on_request(ChannelRequest::new(
                0,
                ChannelRequestType::Other {
                    name: "eow@openssh.com".to_string(),
                    data: vec![],
                },
                true,
            ))
            .unwrap();
        assert_eq!(reply, vec![100, 0, 0, 0, 77]);
    }

    #[test]
    fn test_unsolicited_request_reply() {
        let mut table = ChannelTable::default();
        let (channel, _rx) = open_channel(&mut table);
        assert!(channel.on_request_reply(true).is_err());
    }

    #[tokio::test]
    async fn test_reserve_never_exceeds_window_or_packet() {
        let mut table = ChannelTable::default();
        let (channel, _rx) = open_channel(&mut table);
        let timeout = Duration::from_secs(1);
        assert_eq!(channel.reserve(500, timeout).await.unwrap(), 60);
        assert_eq!(channel.reserve(500, timeout).await.unwrap(), 40);
        assert_eq!(channel.lock().remote_window, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_times_out_without_adjust() {
        let mut table = ChannelTable::default();
        let (channel, _rx) = open_channel(&mut table);
        channel.reserve(100, Duration::from_secs(1)).await.unwrap();
        let err = channel.reserve(1, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, FynxError::FlowControlTimeout(_)));
    }

    #[tokio::test]
    async fn test_reserve_wakes_on_window_adjust() {
        let mut table = ChannelTable::default();
        let (channel, _rx) = open_channel(&mut table);
        channel.reserve(100, Duration::from_secs(1)).await.unwrap();

        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.reserve(50, Duration::from_secs(10)).await })
        };
        tokio::task::yield_now().await;
        channel.on_window_adjust(30);
        assert_eq!(waiter.await.unwrap().unwrap(), 30);
    }

    #[tokio::test]
    async fn test_reserve_wakes_on_close() {
        let mut table = ChannelTable::default();
        let (channel, _rx) = open_channel(&mut table);
        channel.reserve(100, Duration::from_secs(1)).await.unwrap();

        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.reserve(50, Duration::from_secs(10)).await })
        };
        tokio::task::yield_now().await;
        channel.on_close();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(FynxError::Channel(_))
        ));
    }
}
