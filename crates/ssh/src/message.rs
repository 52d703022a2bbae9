//! SSH protocol message numbers and transport-level messages (RFC 4253).
//!
//! # Message Categories
//!
//! - **Transport Layer Generic** (1-19): Disconnect, ignore, debug, service, ext-info
//! - **Algorithm Negotiation** (20-29): KEXINIT, NEWKEYS
//! - **Key Exchange Method** (30-49): Method-specific, numbers are reused by each method
//! - **User Authentication Generic** (50-79): Authentication protocol
//! - **Connection Protocol Generic** (80-127): Global requests and channels
//!
//! # Example
//!
//! ```rust
//! use fynx_ssh::message::MessageType;
//!
//! assert_eq!(MessageType::KexInit as u8, 20);
//! assert!(MessageType::is_kex_message(31));
//! assert!(!MessageType::is_kex_message(94));
//! ```

use bytes::{BufMut, BytesMut};
use fynx_platform::{FynxError, FynxResult};

use crate::wire::{read_bool, read_string, read_u32, read_u8, read_utf8, write_bool, write_string};

/// SSH message numbers.
///
/// The 30-49 range is interpreted by the negotiated key exchange method:
/// number 30/31 is INIT/REPLY for DH, ECDH and hybrid methods, and
/// 31-34 are GROUP/INIT/REPLY/REQUEST for group exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Disconnect message - terminates the connection.
    Disconnect = 1,
    /// Ignore message - padding or traffic analysis resistance.
    Ignore = 2,
    /// Unimplemented message - response to an unknown message type.
    Unimplemented = 3,
    /// Debug message.
    Debug = 4,
    /// Service request (e.g. "ssh-userauth").
    ServiceRequest = 5,
    /// Service accept.
    ServiceAccept = 6,
    /// Extension negotiation (RFC 8308).
    ExtInfo = 7,

    /// Key exchange init - algorithm negotiation.
    KexInit = 20,
    /// New keys - switch to the freshly derived keys.
    NewKeys = 21,

    /// KEX method message 30 (DH/ECDH/hybrid INIT).
    KexdhInit = 30,
    /// KEX method message 31 (DH/ECDH/hybrid REPLY, group exchange GROUP).
    KexdhReply = 31,
    /// Group exchange INIT.
    KexDhGexInit = 32,
    /// Group exchange REPLY.
    KexDhGexReply = 33,
    /// Group exchange REQUEST.
    KexDhGexRequest = 34,

    /// User authentication request.
    UserauthRequest = 50,
    /// User authentication failure.
    UserauthFailure = 51,
    /// User authentication success.
    UserauthSuccess = 52,
    /// User authentication banner.
    UserauthBanner = 53,
    /// Method specific (PK_OK, PASSWD_CHANGEREQ, INFO_REQUEST).
    UserauthPkOk = 60,

    /// Global request.
    GlobalRequest = 80,
    /// Request success.
    RequestSuccess = 81,
    /// Request failure.
    RequestFailure = 82,
    /// Channel open.
    ChannelOpen = 90,
    /// Channel open confirmation.
    ChannelOpenConfirmation = 91,
    /// Channel open failure.
    ChannelOpenFailure = 92,
    /// Channel window adjust.
    ChannelWindowAdjust = 93,
    /// Channel data.
    ChannelData = 94,
    /// Channel extended data (stderr).
    ChannelExtendedData = 95,
    /// Channel EOF.
    ChannelEof = 96,
    /// Channel close.
    ChannelClose = 97,
    /// Channel request.
    ChannelRequest = 98,
    /// Channel success.
    ChannelSuccess = 99,
    /// Channel failure.
    ChannelFailure = 100,
}

impl MessageType {
    /// Converts a byte to a message type.
    ///
    /// ```rust
    /// use fynx_ssh::message::MessageType;
    ///
    /// assert_eq!(MessageType::from_u8(7), Some(MessageType::ExtInfo));
    /// assert_eq!(MessageType::from_u8(255), None);
    /// ```
    pub fn from_u8(byte: u8) -> Option<Self> {
        use MessageType::*;
        let t = match byte {
            1 => Disconnect,
            2 => Ignore,
            3 => Unimplemented,
            4 => Debug,
            5 => ServiceRequest,
            6 => ServiceAccept,
            7 => ExtInfo,
            20 => KexInit,
            21 => NewKeys,
            30 => KexdhInit,
            31 => KexdhReply,
            32 => KexDhGexInit,
            33 => KexDhGexReply,
            34 => KexDhGexRequest,
            50 => UserauthRequest,
            51 => UserauthFailure,
            52 => UserauthSuccess,
            53 => UserauthBanner,
            60 => UserauthPkOk,
            80 => GlobalRequest,
            81 => RequestSuccess,
            82 => RequestFailure,
            90 => ChannelOpen,
            91 => ChannelOpenConfirmation,
            92 => ChannelOpenFailure,
            93 => ChannelWindowAdjust,
            94 => ChannelData,
            95 => ChannelExtendedData,
            96 => ChannelEof,
            97 => ChannelClose,
            98 => ChannelRequest,
            99 => ChannelSuccess,
            100 => ChannelFailure,
            _ => return None,
        };
        Some(t)
    }

    /// Returns true for message numbers that may pass the rekey barrier.
    ///
    /// DISCONNECT, KEXINIT, NEWKEYS and the whole key exchange method range.
    pub fn is_kex_message(byte: u8) -> bool {
        matches!(byte, 1 | 20 | 21 | 30..=49)
    }

    /// Returns the message type name.
    pub fn name(&self) -> &'static str {
        use MessageType::*;
        match self {
            Disconnect => "SSH_MSG_DISCONNECT",
            Ignore => "SSH_MSG_IGNORE",
            Unimplemented => "SSH_MSG_UNIMPLEMENTED",
            Debug => "SSH_MSG_DEBUG",
            ServiceRequest => "SSH_MSG_SERVICE_REQUEST",
            ServiceAccept => "SSH_MSG_SERVICE_ACCEPT",
            ExtInfo => "SSH_MSG_EXT_INFO",
            KexInit => "SSH_MSG_KEXINIT",
            NewKeys => "SSH_MSG_NEWKEYS",
            KexdhInit => "SSH_MSG_KEX_30",
            KexdhReply => "SSH_MSG_KEX_31",
            KexDhGexInit => "SSH_MSG_KEX_DH_GEX_INIT",
            KexDhGexReply => "SSH_MSG_KEX_DH_GEX_REPLY",
            KexDhGexRequest => "SSH_MSG_KEX_DH_GEX_REQUEST",
            UserauthRequest => "SSH_MSG_USERAUTH_REQUEST",
            UserauthFailure => "SSH_MSG_USERAUTH_FAILURE",
            UserauthSuccess => "SSH_MSG_USERAUTH_SUCCESS",
            UserauthBanner => "SSH_MSG_USERAUTH_BANNER",
            UserauthPkOk => "SSH_MSG_USERAUTH_60",
            GlobalRequest => "SSH_MSG_GLOBAL_REQUEST",
            RequestSuccess => "SSH_MSG_REQUEST_SUCCESS",
            RequestFailure => "SSH_MSG_REQUEST_FAILURE",
            ChannelOpen => "SSH_MSG_CHANNEL_OPEN",
            ChannelOpenConfirmation => "SSH_MSG_CHANNEL_OPEN_CONFIRMATION",
            ChannelOpenFailure => "SSH_MSG_CHANNEL_OPEN_FAILURE",
            ChannelWindowAdjust => "SSH_MSG_CHANNEL_WINDOW_ADJUST",
            ChannelData => "SSH_MSG_CHANNEL_DATA",
            ChannelExtendedData => "SSH_MSG_CHANNEL_EXTENDED_DATA",
            ChannelEof => "SSH_MSG_CHANNEL_EOF",
            ChannelClose => "SSH_MSG_CHANNEL_CLOSE",
            ChannelRequest => "SSH_MSG_CHANNEL_REQUEST",
            ChannelSuccess => "SSH_MSG_CHANNEL_SUCCESS",
            ChannelFailure => "SSH_MSG_CHANNEL_FAILURE",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), *self as u8)
    }
}

/// Disconnect reason codes (RFC 4253 Section 11.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DisconnectReason {
    /// SSH_DISCONNECT_HOST_NOT_ALLOWED_TO_CONNECT
    HostNotAllowedToConnect = 1,
    /// SSH_DISCONNECT_PROTOCOL_ERROR
    ProtocolError = 2,
    /// SSH_DISCONNECT_KEY_EXCHANGE_FAILED
    KeyExchangeFailed = 3,
    /// SSH_DISCONNECT_MAC_ERROR
    MacError = 5,
    /// SSH_DISCONNECT_SERVICE_NOT_AVAILABLE
    ServiceNotAvailable = 7,
    /// SSH_DISCONNECT_PROTOCOL_VERSION_NOT_SUPPORTED
    ProtocolVersionNotSupported = 8,
    /// SSH_DISCONNECT_HOST_KEY_NOT_VERIFIABLE
    HostKeyNotVerifiable = 9,
    /// SSH_DISCONNECT_CONNECTION_LOST
    ConnectionLost = 10,
    /// SSH_DISCONNECT_BY_APPLICATION
    ByApplication = 11,
}

impl DisconnectReason {
    /// Picks the reason code reported to the peer for a local fatal error.
    pub fn for_error(err: &FynxError) -> Self {
        match err {
            FynxError::Negotiation { .. } | FynxError::UnsupportedAlgorithm(_) => {
                DisconnectReason::KeyExchangeFailed
            }
            FynxError::CryptoVerification(_) => DisconnectReason::MacError,
            FynxError::TrustRejected(_) => DisconnectReason::HostKeyNotVerifiable,
            FynxError::FlowControlTimeout(_) => DisconnectReason::ConnectionLost,
            _ => DisconnectReason::ProtocolError,
        }
    }
}

/// SSH_MSG_DISCONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// Reason code
    pub reason_code: u32,
    /// Human-readable description
    pub description: String,
}

impl Disconnect {
    /// Creates a disconnect message.
    pub fn new(reason: DisconnectReason, description: &str) -> Self {
        Self {
            reason_code: reason as u32,
            description: description.to_string(),
        }
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::Disconnect as u8);
        buf.put_u32(self.reason_code);
        write_string(&mut buf, self.description.as_bytes());
        write_string(&mut buf, b"");
        buf.to_vec()
    }

    /// Parses the message. The description is decoded lossily.
    pub fn from_bytes(data: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        expect_type(data, &mut offset, MessageType::Disconnect)?;
        let reason_code = read_u32(data, &mut offset)?;
        let description = String::from_utf8_lossy(read_string(data, &mut offset)?).into_owned();
        Ok(Self {
            reason_code,
            description,
        })
    }
}

/// Builds SSH_MSG_UNIMPLEMENTED for the rejected packet's sequence number.
pub fn unimplemented(sequence: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(MessageType::Unimplemented as u8);
    buf.put_u32(sequence);
    buf.to_vec()
}

/// Builds SSH_MSG_SERVICE_REQUEST.
pub fn service_request(service: &str) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(MessageType::ServiceRequest as u8);
    write_string(&mut buf, service.as_bytes());
    buf.to_vec()
}

/// SSH_MSG_GLOBAL_REQUEST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalRequest {
    /// Request name (e.g. "tcpip-forward")
    pub name: String,
    /// Whether the sender expects a reply
    pub want_reply: bool,
    /// Request specific data
    pub data: Vec<u8>,
}

impl GlobalRequest {
    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::GlobalRequest as u8);
        write_string(&mut buf, self.name.as_bytes());
        write_bool(&mut buf, self.want_reply);
        buf.put_slice(&self.data);
        buf.to_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        expect_type(data, &mut offset, MessageType::GlobalRequest)?;
        let name = read_utf8(data, &mut offset)?;
        let want_reply = read_bool(data, &mut offset)?;
        Ok(Self {
            name,
            want_reply,
            data: data[offset..].to_vec(),
        })
    }
}

/// Consumes the message type byte and checks it.
pub(crate) fn expect_type(data: &[u8], offset: &mut usize, expected: MessageType) -> FynxResult<()> {
    let got = read_u8(data, offset)?;
    if got != expected as u8 {
        return Err(FynxError::Protocol(format!(
            "Invalid message type: expected {}, got {}",
            expected, got
        )));
    }
    Ok(())
}
