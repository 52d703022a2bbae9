//! The reader task: the only consumer of inbound packets.
//!
//! Each packet is decoded, then routed to the key exchange driver, the
//! authentication channel, the global request queue or the channel table.
//! Replies the reader has to send go through `Shared::send_or_queue` so
//! the reader never waits on the rekey barrier.

use std::sync::Arc;

use fynx_platform::{FynxError, FynxResult};
use tokio::io::AsyncRead;
use tracing::{debug, info, trace, warn};

use crate::channel::ChannelStatus;
use crate::connection::{
    recipient_channel, ChannelData, ChannelOpen, ChannelOpenConfirmation,
    ChannelOpenFailure, ChannelOpenFailureReason, ChannelRequest, ChannelType,
    ChannelWindowAdjust,
};
use crate::message::{unimplemented, Disconnect, GlobalRequest, MessageType};
use crate::packet::{InboundPacket, PacketOpener};
use crate::wire::{read_string, read_u32, read_utf8};

use super::handshake::KexDriver;
use super::{GlobalReply, Shared};

/// Signature algorithms OpenSSH 7.4 supports but leaves out of
/// `server-sig-algs`.
const MISSING_SIG_ALGS: &[&str] = &["rsa-sha2-256", "rsa-sha2-512"];

pub(crate) struct Reader<R> {
    shared: Arc<Shared>,
    io: R,
    opener: PacketOpener,
    kex: KexDriver,
}

impl<R> Reader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub(crate) fn new(shared: Arc<Shared>, io: R) -> Self {
        Self {
            shared,
            io,
            opener: PacketOpener::new(),
            kex: KexDriver::default(),
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Reader task started");
        loop {
            let packet = match self.opener.read_packet(&mut self.io).await {
                Ok(packet) => packet,
                Err(e) => {
                    if !self.shared.is_closed() {
                        self.shared.fail(e).await;
                    }
                    break;
                }
            };
            self.shared.keepalive.packet_received();

            if let Err(e) = self.dispatch(packet).await {
                self.shared.fail(e).await;
                break;
            }
            if self.shared.is_closed() {
                break;
            }
            if !self.kex.in_progress() && self.shared.rekey_due(self.opener.bytes_since_keys()) {
                if let Err(e) = self.shared.start_kex().await {
                    self.shared.fail(e).await;
                    break;
                }
            }
        }
        debug!("Reader task stopped");
    }

    async fn dispatch(&mut self, packet: InboundPacket) -> FynxResult<()> {
        let msg_type = packet.message_type();
        let payload = packet.payload.as_slice();
        trace!(
            sequence = packet.sequence,
            msg_type,
            len = payload.len(),
            "Received packet"
        );

        // Transport messages valid at any time.
        match MessageType::from_u8(msg_type) {
            Some(MessageType::Disconnect) => {
                let msg = Disconnect::from_bytes(payload)?;
                info!(
                    reason = msg.reason_code,
                    description = %msg.description,
                    "Peer disconnected"
                );
                return Err(self.shared.peer_disconnected(msg));
            }
            Some(MessageType::Ignore) => return Ok(()),
            Some(MessageType::Debug) => {
                let mut offset = 2;
                let text = read_string(payload, &mut offset).unwrap_or_default();
                debug!(message = %String::from_utf8_lossy(text), "Peer debug message");
                return Ok(());
            }
            Some(MessageType::Unimplemented) => {
                let mut offset = 1;
                let sequence = read_u32(payload, &mut offset)?;
                warn!(sequence, "Peer did not implement one of our packets");
                return Ok(());
            }
            Some(MessageType::KexInit) => {
                return self.kex.on_kexinit(&self.shared, payload).await;
            }
            Some(MessageType::NewKeys) => {
                return self
                    .kex
                    .on_newkeys(&self.shared, &mut self.opener, payload)
                    .await;
            }
            _ => {}
        }
        if MessageType::is_kex_message(msg_type) {
            return self.kex.on_method_message(&self.shared, payload).await;
        }

        if !self.shared.is_secured() {
            return Err(FynxError::Protocol(format!(
                "Message {} received before key exchange",
                msg_type
            )));
        }

        if msg_type == MessageType::ServiceAccept as u8 || (50..=79).contains(&msg_type) {
            return self.on_auth_message(payload).await;
        }

        match MessageType::from_u8(msg_type) {
            Some(MessageType::ExtInfo) => self.on_ext_info(payload),
            Some(MessageType::GlobalRequest) => self.on_global_request(payload).await,
            Some(MessageType::RequestSuccess) => {
                self.on_global_reply(GlobalReply::Success(payload[1..].to_vec()));
                Ok(())
            }
            Some(MessageType::RequestFailure) => {
                self.on_global_reply(GlobalReply::Failure);
                Ok(())
            }
            Some(MessageType::ChannelOpen) => self.on_channel_open(payload).await,
            _ if (91..=100).contains(&msg_type) => self.on_channel_message(msg_type, payload).await,
            _ => {
                debug!(msg_type, sequence = packet.sequence, "Unknown message");
                self.shared
                    .send_or_queue(unimplemented(packet.sequence))
                    .await
            }
        }
    }

    async fn on_auth_message(&mut self, payload: &[u8]) -> FynxResult<()> {
        if payload[0] == MessageType::UserauthSuccess as u8 {
            if self.shared.is_authenticated() {
                return Err(FynxError::Protocol(
                    "Duplicate SSH_MSG_USERAUTH_SUCCESS".to_string(),
                ));
            }
            // The server compresses everything after this message.
            self.opener.activate_compression();
            self.shared.authenticated().await;
        } else if payload[0] == MessageType::UserauthBanner as u8 {
            let mut offset = 1;
            if let Ok(banner) = read_utf8(payload, &mut offset) {
                info!(banner = %banner.trim_end(), "Server banner");
            }
        }
        self.shared.deliver_auth_message(payload.to_vec());
        Ok(())
    }

    fn on_ext_info(&mut self, payload: &[u8]) -> FynxResult<()> {
        if !self.shared.config.enable_server_sig_algs
            || self.shared.is_authenticated()
            || self.kex.in_progress()
        {
            debug!("Ignoring SSH_MSG_EXT_INFO");
            return Ok(());
        }
        let mut offset = 1;
        let count = read_u32(payload, &mut offset)?;
        for _ in 0..count {
            let name = read_utf8(payload, &mut offset)?;
            let value = read_string(payload, &mut offset)?;
            if name != "server-sig-algs" {
                debug!(extension = %name, "Ignoring extension");
                continue;
            }
            let mut algs: Vec<String> = String::from_utf8_lossy(value)
                .split(',')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if self.shared.server_advertises_incomplete_sig_algs() {
                for alg in MISSING_SIG_ALGS {
                    if !algs.iter().any(|a| a == alg) {
                        algs.push(alg.to_string());
                    }
                }
            }
            debug!(?algs, "server-sig-algs");
            self.shared.set_server_sig_algs(algs);
        }
        Ok(())
    }

    async fn on_global_request(&mut self, payload: &[u8]) -> FynxResult<()> {
        let request = GlobalRequest::from_bytes(payload)?;
        debug!(name = %request.name, want_reply = request.want_reply, "Refusing global request");
        if request.want_reply {
            self.shared
                .send_or_queue(vec![MessageType::RequestFailure as u8])
                .await?;
        }
        Ok(())
    }

    fn on_global_reply(&mut self, reply: GlobalReply) {
        match self.shared.pop_global_reply() {
            Some(waiter) => {
                let _ = waiter.send(reply);
            }
            None => warn!("Unsolicited global request reply"),
        }
    }

    async fn on_channel_open(&mut self, payload: &[u8]) -> FynxResult<()> {
        let open = ChannelOpen::from_bytes(payload)?;
        let allowed = match open.channel_type() {
            ChannelType::ForwardedTcpip {
                connected_address,
                connected_port,
                ..
            } => self.shared.is_forwarded(connected_address, *connected_port),
            ChannelType::X11 { .. } => self.shared.config.x11_forwarding,
            ChannelType::AuthAgent => self.shared.config.agent_forwarding,
            _ => false,
        };

        if !allowed || !self.shared.accepts_incoming() {
            debug!(channel_type = open.channel_type().name(), "Refusing channel open");
            let failure = ChannelOpenFailure::new(
                open.sender_channel(),
                ChannelOpenFailureReason::AdministrativelyProhibited,
            );
            return self.shared.send_or_queue(failure.to_bytes()).await;
        }

        let config = &self.shared.config;
        let (channel, events) = self
            .shared
            .lock_channels()
            .allocate(config.local_window_size, config.local_max_packet);
        channel.accept(
            open.sender_channel(),
            open.initial_window_size(),
            open.maximum_packet_size(),
        );
        let confirmation = ChannelOpenConfirmation::new(
            open.sender_channel(),
            channel.local_id(),
            config.local_window_size,
            config.local_max_packet,
        );
        debug!(
            channel = channel.local_id(),
            channel_type = open.channel_type().name(),
            "Accepted channel open"
        );
        self.shared.send_or_queue(confirmation.to_bytes()).await?;
        self.shared
            .queue_incoming(open.channel_type().clone(), channel, events);
        Ok(())
    }

    async fn on_channel_message(&mut self, msg_type: u8, payload: &[u8]) -> FynxResult<()> {
        let id = recipient_channel(payload)?;
        let channel = self
            .shared
            .lock_channels()
            .get(id)
            .ok_or_else(|| {
                FynxError::Protocol(format!("Message {} for unknown channel {}", msg_type, id))
            })?;

        let reply = match MessageType::from_u8(msg_type) {
            Some(MessageType::ChannelOpenConfirmation) => {
                let confirmation = ChannelOpenConfirmation::from_bytes(payload)?;
                if channel.on_confirmation(&confirmation)? {
                    None
                } else {
                    debug!(channel = id, "Open confirmed after caller gave up, closing");
                    channel.close_abandoned()
                }
            }
            Some(MessageType::ChannelOpenFailure) => {
                channel.on_open_failure(&ChannelOpenFailure::from_bytes(payload)?)?;
                None
            }
            Some(MessageType::ChannelWindowAdjust) => {
                let adjust = ChannelWindowAdjust::from_bytes(payload)?;
                channel.on_window_adjust(adjust.bytes_to_add());
                None
            }
            Some(MessageType::ChannelData) | Some(MessageType::ChannelExtendedData) => {
                channel.on_data(ChannelData::from_bytes(payload)?)?
            }
            Some(MessageType::ChannelEof) => {
                channel.on_eof();
                None
            }
            Some(MessageType::ChannelClose) => channel.on_close(),
            Some(MessageType::ChannelRequest) => {
                channel.on_request(ChannelRequest::from_bytes(payload)?)
            }
            Some(MessageType::ChannelSuccess) => {
                channel.on_request_reply(true)?;
                None
            }
            Some(MessageType::ChannelFailure) => {
                channel.on_request_reply(false)?;
                None
            }
            _ => None,
        };

        if let Some(reply) = reply {
            self.shared.send_or_queue(reply).await?;
        }
        if channel.status() == ChannelStatus::Closed {
            self.shared.lock_channels().release_if_closed(id);
        }
        Ok(())
    }
}
