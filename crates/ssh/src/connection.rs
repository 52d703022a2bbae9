//! SSH connection protocol messages (RFC 4254).
//!
//! Channel open/confirm/fail, window adjust, data, EOF, close and channel
//! requests. Every message after CHANNEL_OPEN starts with the recipient
//! channel number, which [`recipient_channel`] extracts for dispatch.
//!
//! # Example
//!
//! ```rust
//! use fynx_ssh::connection::{ChannelOpen, ChannelType};
//!
//! let open = ChannelOpen::new(ChannelType::Session, 0, 2 * 1024 * 1024, 32768);
//! let bytes = open.to_bytes();
//! assert_eq!(bytes[0], 90);
//! assert_eq!(ChannelOpen::from_bytes(&bytes).unwrap(), open);
//! ```

use bytes::{BufMut, BytesMut};
use fynx_platform::{FynxError, FynxResult};

use crate::message::{expect_type, MessageType};
use crate::wire::{read_bool, read_string, read_u32, read_u8, read_utf8, write_bool, write_string};

/// Channel type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelType {
    /// Session channel (shell, exec, subsystem).
    Session,
    /// Local port forward opened by the client.
    DirectTcpip {
        /// Host to connect to
        host: String,
        /// Port to connect to
        port: u32,
        /// Originator IP address
        originator_address: String,
        /// Originator port
        originator_port: u32,
    },
    /// Remote port forward opened by the server.
    ForwardedTcpip {
        /// Address that was connected
        connected_address: String,
        /// Port that was connected
        connected_port: u32,
        /// Originator IP address
        originator_address: String,
        /// Originator port
        originator_port: u32,
    },
    /// X11 connection forwarded by the server.
    X11 {
        /// Originator address
        originator_address: String,
        /// Originator port
        originator_port: u32,
    },
    /// Agent connection forwarded by the server.
    AuthAgent,
    /// Any other type, kept so it can be refused.
    Other(String),
}

impl ChannelType {
    /// Returns the channel type name.
    pub fn name(&self) -> &str {
        match self {
            ChannelType::Session => "session",
            ChannelType::DirectTcpip { .. } => "direct-tcpip",
            ChannelType::ForwardedTcpip { .. } => "forwarded-tcpip",
            ChannelType::X11 { .. } => "x11",
            ChannelType::AuthAgent => "auth-agent@openssh.com",
            ChannelType::Other(name) => name,
        }
    }
}

/// SSH_MSG_CHANNEL_OPEN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpen {
    channel_type: ChannelType,
    sender_channel: u32,
    initial_window_size: u32,
    maximum_packet_size: u32,
}

impl ChannelOpen {
    /// Creates a channel open message.
    pub fn new(
        channel_type: ChannelType,
        sender_channel: u32,
        initial_window_size: u32,
        maximum_packet_size: u32,
    ) -> Self {
        Self {
            channel_type,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        }
    }

    /// Returns the channel type.
    pub fn channel_type(&self) -> &ChannelType {
        &self.channel_type
    }

    /// Returns the sender channel number.
    pub fn sender_channel(&self) -> u32 {
        self.sender_channel
    }

    /// Returns the initial window size.
    pub fn initial_window_size(&self) -> u32 {
        self.initial_window_size
    }

    /// Returns the maximum packet size.
    pub fn maximum_packet_size(&self) -> u32 {
        self.maximum_packet_size
    }

    /// Serializes to bytes.
    ///
    /// ```text
    /// byte      SSH_MSG_CHANNEL_OPEN (90)
    /// string    channel type
    /// uint32    sender channel
    /// uint32    initial window size
    /// uint32    maximum packet size
    /// ....      channel type specific data
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::ChannelOpen as u8);
        write_string(&mut buf, self.channel_type.name().as_bytes());
        buf.put_u32(self.sender_channel);
        buf.put_u32(self.initial_window_size);
        buf.put_u32(self.maximum_packet_size);

        match &self.channel_type {
            ChannelType::DirectTcpip {
                host: address,
                port,
                originator_address,
                originator_port,
            }
            | ChannelType::ForwardedTcpip {
                connected_address: address,
                connected_port: port,
                originator_address,
                originator_port,
            } => {
                write_string(&mut buf, address.as_bytes());
                buf.put_u32(*port);
                write_string(&mut buf, originator_address.as_bytes());
                buf.put_u32(*originator_port);
            }
            ChannelType::X11 {
                originator_address,
                originator_port,
            } => {
                write_string(&mut buf, originator_address.as_bytes());
                buf.put_u32(*originator_port);
            }
            ChannelType::Session | ChannelType::AuthAgent | ChannelType::Other(_) => {}
        }

        buf.to_vec()
    }

    /// Parses from bytes. Unknown channel types parse as
    /// [`ChannelType::Other`].
    pub fn from_bytes(data: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        expect_type(data, &mut offset, MessageType::ChannelOpen)?;
        let type_name = read_utf8(data, &mut offset)?;
        let sender_channel = read_u32(data, &mut offset)?;
        let initial_window_size = read_u32(data, &mut offset)?;
        let maximum_packet_size = read_u32(data, &mut offset)?;

        let channel_type = match type_name.as_str() {
            "session" => ChannelType::Session,
            "direct-tcpip" => ChannelType::DirectTcpip {
                host: read_utf8(data, &mut offset)?,
                port: read_u32(data, &mut offset)?,
                originator_address: read_utf8(data, &mut offset)?,
                originator_port: read_u32(data, &mut offset)?,
            },
            "forwarded-tcpip" => ChannelType::ForwardedTcpip {
                connected_address: read_utf8(data, &mut offset)?,
                connected_port: read_u32(data, &mut offset)?,
                originator_address: read_utf8(data, &mut offset)?,
                originator_port: read_u32(data, &mut offset)?,
            },
            "x11" => ChannelType::X11 {
                originator_address: read_utf8(data, &mut offset)?,
                originator_port: read_u32(data, &mut offset)?,
            },
            "auth-agent@openssh.com" => ChannelType::AuthAgent,
            _ => ChannelType::Other(type_name),
        };

        Ok(Self {
            channel_type,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        })
    }
}

/// SSH_MSG_CHANNEL_OPEN_CONFIRMATION.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpenConfirmation {
    recipient_channel: u32,
    sender_channel: u32,
    initial_window_size: u32,
    maximum_packet_size: u32,
}

impl ChannelOpenConfirmation {
    /// Creates a confirmation.
    pub fn new(
        recipient_channel: u32,
        sender_channel: u32,
        initial_window_size: u32,
        maximum_packet_size: u32,
    ) -> Self {
        Self {
            recipient_channel,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the sender channel number.
    pub fn sender_channel(&self) -> u32 {
        self.sender_channel
    }

    /// Returns the initial window size.
    pub fn initial_window_size(&self) -> u32 {
        self.initial_window_size
    }

    /// Returns the maximum packet size.
    pub fn maximum_packet_size(&self) -> u32 {
        self.maximum_packet_size
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(17);
        buf.put_u8(MessageType::ChannelOpenConfirmation as u8);
        buf.put_u32(self.recipient_channel);
        buf.put_u32(self.sender_channel);
        buf.put_u32(self.initial_window_size);
        buf.put_u32(self.maximum_packet_size);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        expect_type(data, &mut offset, MessageType::ChannelOpenConfirmation)?;
        Ok(Self {
            recipient_channel: read_u32(data, &mut offset)?,
            sender_channel: read_u32(data, &mut offset)?,
            initial_window_size: read_u32(data, &mut offset)?,
            maximum_packet_size: read_u32(data, &mut offset)?,
        })
    }
}

/// Channel open failure reason codes (RFC 4254 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChannelOpenFailureReason {
    /// SSH_OPEN_ADMINISTRATIVELY_PROHIBITED
    AdministrativelyProhibited = 1,
    /// SSH_OPEN_CONNECT_FAILED
    ConnectFailed = 2,
    /// SSH_OPEN_UNKNOWN_CHANNEL_TYPE
    UnknownChannelType = 3,
    /// SSH_OPEN_RESOURCE_SHORTAGE
    ResourceShortage = 4,
}

impl ChannelOpenFailureReason {
    /// Converts a reason code.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::AdministrativelyProhibited),
            2 => Some(Self::ConnectFailed),
            3 => Some(Self::UnknownChannelType),
            4 => Some(Self::ResourceShortage),
            _ => None,
        }
    }

    /// Returns a short description.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdministrativelyProhibited => "administratively prohibited",
            Self::ConnectFailed => "connect failed",
            Self::UnknownChannelType => "unknown channel type",
            Self::ResourceShortage => "resource shortage",
        }
    }
}

/// SSH_MSG_CHANNEL_OPEN_FAILURE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpenFailure {
    recipient_channel: u32,
    reason_code: u32,
    description: String,
}

impl ChannelOpenFailure {
    /// Creates a failure with the default description for `reason`.
    pub fn new(recipient_channel: u32, reason: ChannelOpenFailureReason) -> Self {
        Self {
            recipient_channel,
            reason_code: reason as u32,
            description: reason.as_str().to_string(),
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the raw reason code.
    pub fn reason_code(&self) -> u32 {
        self.reason_code
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::ChannelOpenFailure as u8);
        buf.put_u32(self.recipient_channel);
        buf.put_u32(self.reason_code);
        write_string(&mut buf, self.description.as_bytes());
        write_string(&mut buf, b"");
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        expect_type(data, &mut offset, MessageType::ChannelOpenFailure)?;
        let recipient_channel = read_u32(data, &mut offset)?;
        let reason_code = read_u32(data, &mut offset)?;
        let description = String::from_utf8_lossy(read_string(data, &mut offset)?).into_owned();
        Ok(Self {
            recipient_channel,
            reason_code,
            description,
        })
    }
}

/// SSH_MSG_CHANNEL_WINDOW_ADJUST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWindowAdjust {
    recipient_channel: u32,
    bytes_to_add: u32,
}

impl ChannelWindowAdjust {
    /// Creates a window adjust.
    pub fn new(recipient_channel: u32, bytes_to_add: u32) -> Self {
        Self {
            recipient_channel,
            bytes_to_add,
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the credit granted.
    pub fn bytes_to_add(&self) -> u32 {
        self.bytes_to_add
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(9);
        buf.put_u8(MessageType::ChannelWindowAdjust as u8);
        buf.put_u32(self.recipient_channel);
        buf.put_u32(self.bytes_to_add);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        expect_type(data, &mut offset, MessageType::ChannelWindowAdjust)?;
        Ok(Self {
            recipient_channel: read_u32(data, &mut offset)?,
            bytes_to_add: read_u32(data, &mut offset)?,
        })
    }
}

/// SSH_MSG_CHANNEL_DATA and SSH_MSG_CHANNEL_EXTENDED_DATA.
///
/// `data_type` is `None` for plain data and `Some(1)` for stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelData {
    recipient_channel: u32,
    data_type: Option<u32>,
    data: Vec<u8>,
}

/// Extended data type code for stderr.
pub const EXTENDED_DATA_STDERR: u32 = 1;

impl ChannelData {
    /// Creates a plain data message.
    pub fn new(recipient_channel: u32, data: Vec<u8>) -> Self {
        Self {
            recipient_channel,
            data_type: None,
            data,
        }
    }

    /// Creates an extended data message.
    pub fn extended(recipient_channel: u32, data_type: u32, data: Vec<u8>) -> Self {
        Self {
            recipient_channel,
            data_type: Some(data_type),
            data,
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the extended data type, if any.
    pub fn data_type(&self) -> Option<u32> {
        self.data_type
    }

    /// Returns the payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the message and returns the payload.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(13 + self.data.len());
        match self.data_type {
            None => {
                buf.put_u8(MessageType::ChannelData as u8);
                buf.put_u32(self.recipient_channel);
            }
            Some(code) => {
                buf.put_u8(MessageType::ChannelExtendedData as u8);
                buf.put_u32(self.recipient_channel);
                buf.put_u32(code);
            }
        }
        write_string(&mut buf, &self.data);
        buf.to_vec()
    }

    /// Parses either message type.
    pub fn from_bytes(data: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        let msg_type = read_u8(data, &mut offset)?;
        let recipient_channel = read_u32(data, &mut offset)?;
        let data_type = match MessageType::from_u8(msg_type) {
            Some(MessageType::ChannelData) => None,
            Some(MessageType::ChannelExtendedData) => Some(read_u32(data, &mut offset)?),
            _ => {
                return Err(FynxError::Protocol(format!(
                    "Invalid message type: expected channel data, got {}",
                    msg_type
                )))
            }
        };
        let payload = read_string(data, &mut offset)?.to_vec();
        Ok(Self {
            recipient_channel,
            data_type,
            data: payload,
        })
    }
}

/// Builds a message that carries only the recipient channel
/// (EOF, CLOSE, SUCCESS, FAILURE).
pub fn channel_message(msg_type: MessageType, recipient_channel: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(msg_type as u8);
    buf.put_u32(recipient_channel);
    buf.to_vec()
}

/// Reads the recipient channel of any message in the 91-100 range.
pub fn recipient_channel(data: &[u8]) -> FynxResult<u32> {
    let mut offset = 1;
    read_u32(data, &mut offset)
}

/// Channel request type (RFC 4254 Section 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequestType {
    /// Pseudo-terminal allocation
    PtyReq {
        /// Terminal type (e.g. "xterm")
        term: String,
        /// Width in characters
        width_chars: u32,
        /// Height in rows
        height_rows: u32,
        /// Width in pixels
        width_pixels: u32,
        /// Height in pixels
        height_pixels: u32,
        /// Encoded terminal modes
        modes: Vec<u8>,
    },
    /// Environment variable
    Env {
        /// Variable name
        name: String,
        /// Variable value
        value: String,
    },
    /// Execute a command
    Exec {
        /// Command line
        command: String,
    },
    /// Start a login shell
    Shell,
    /// Start a subsystem (e.g. "sftp")
    Subsystem {
        /// Subsystem name
        name: String,
    },
    /// Remote process exit status
    ExitStatus {
        /// Exit code
        exit_status: u32,
    },
    /// Remote process killed by a signal
    ExitSignal {
        /// Signal name without the "SIG" prefix
        signal_name: String,
        /// Core dumped
        core_dumped: bool,
        /// Error message
        error_message: String,
    },
    /// Any other request, with its raw type-specific data
    Other {
        /// Request name
        name: String,
        /// Type specific data
        data: Vec<u8>,
    },
}

impl ChannelRequestType {
    /// Returns the request name.
    pub fn name(&self) -> &str {
        match self {
            ChannelRequestType::PtyReq { .. } => "pty-req",
            ChannelRequestType::Env { .. } => "env",
            ChannelRequestType::Exec { .. } => "exec",
            ChannelRequestType::Shell => "shell",
            ChannelRequestType::Subsystem { .. } => "subsystem",
            ChannelRequestType::ExitStatus { .. } => "exit-status",
            ChannelRequestType::ExitSignal { .. } => "exit-signal",
            ChannelRequestType::Other { name, .. } => name,
        }
    }
}

/// SSH_MSG_CHANNEL_REQUEST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    recipient_channel: u32,
    request_type: ChannelRequestType,
    want_reply: bool,
}

impl ChannelRequest {
    /// Creates a channel request.
    pub fn new(recipient_channel: u32, request_type: ChannelRequestType, want_reply: bool) -> Self {
        Self {
            recipient_channel,
            request_type,
            want_reply,
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the request type.
    pub fn request_type(&self) -> &ChannelRequestType {
        &self.request_type
    }

    /// Returns whether a reply is wanted.
    pub fn want_reply(&self) -> bool {
        self.want_reply
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::ChannelRequest as u8);
        buf.put_u32(self.recipient_channel);
        write_string(&mut buf, self.request_type.name().as_bytes());
        write_bool(&mut buf, self.want_reply);

        match &self.request_type {
            ChannelRequestType::PtyReq {
                term,
                width_chars,
                height_rows,
                width_pixels,
                height_pixels,
                modes,
            } => {
                write_string(&mut buf, term.as_bytes());
                buf.put_u32(*width_chars);
                buf.put_u32(*height_rows);
                buf.put_u32(*width_pixels);
                buf.put_u32(*height_pixels);
                write_string(&mut buf, modes);
            }
            ChannelRequestType::Env { name, value } => {
                write_string(&mut buf, name.as_bytes());
                write_string(&mut buf, value.as_bytes());
            }
            ChannelRequestType::Exec { command } => write_string(&mut buf, command.as_bytes()),
            ChannelRequestType::Shell => {}
            ChannelRequestType::Subsystem { name } => write_string(&mut buf, name.as_bytes()),
            ChannelRequestType::ExitStatus { exit_status } => buf.put_u32(*exit_status),
            ChannelRequestType::ExitSignal {
                signal_name,
                core_dumped,
                error_message,
            } => {
                write_string(&mut buf, signal_name.as_bytes());
                write_bool(&mut buf, *core_dumped);
                write_string(&mut buf, error_message.as_bytes());
                write_string(&mut buf, b"");
            }
            ChannelRequestType::Other { data, .. } => buf.put_slice(data),
        }

        buf.to_vec()
    }

    /// Parses from bytes. Unknown request names parse as
    /// [`ChannelRequestType::Other`].
    pub fn from_bytes(data: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        expect_type(data, &mut offset, MessageType::ChannelRequest)?;
        let recipient_channel = read_u32(data, &mut offset)?;
        let name = read_utf8(data, &mut offset)?;
        let want_reply = read_bool(data, &mut offset)?;

        let request_type = match name.as_str() {
            "pty-req" => ChannelRequestType::PtyReq {
                term: read_utf8(data, &mut offset)?,
                width_chars: read_u32(data, &mut offset)?,
                height_rows: read_u32(data, &mut offset)?,
                width_pixels: read_u32(data, &mut offset)?,
                height_pixels: read_u32(data, &mut offset)?,
                modes: read_string(data, &mut offset)?.to_vec(),
            },
            "env" => ChannelRequestType::Env {
                name: read_utf8(data, &mut offset)?,
                value: read_utf8(data, &mut offset)?,
            },
            "exec" => ChannelRequestType::Exec {
                command: read_utf8(data, &mut offset)?,
            },
            "shell" => ChannelRequestType::Shell,
            "subsystem" => ChannelRequestType::Subsystem {
                name: read_utf8(data, &mut offset)?,
            },
            "exit-status" => ChannelRequestType::ExitStatus {
                exit_status: read_u32(data, &mut offset)?,
            },
            "exit-signal" => ChannelRequestType::ExitSignal {
                signal_name: read_utf8(data, &mut offset)?,
                core_dumped: read_bool(data, &mut offset)?,
                error_message: String::from_utf8_lossy(read_string(data, &mut offset)?)
                    .into_owned(),
            },
            _ => ChannelRequestType::Other {
                name,
                data: data[offset..].to_vec(),
            },
        };

        Ok(Self {
            recipient_channel,
            request_type,
            want_reply,
        })
    }
}

/// Request data for `tcpip-forward` and `cancel-tcpip-forward`.
pub fn tcpip_forward_data(address: &str, port: u32) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_string(&mut buf, address.as_bytes());
    buf.put_u32(port);
    buf.to_vec()
}
