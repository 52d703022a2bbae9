//! Error types for Fynx

use std::fmt;

/// Why a presented host key or certificate was not trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustFailure {
    /// Host is not present in the trust store and policy forbids adding it.
    UnknownHost {
        /// Host name (or `[host]:port` / alias) that was checked
        host: String,
        /// Fingerprint of the presented key
        fingerprint: String,
    },
    /// A different key is recorded for this host.
    HostKeyChanged {
        /// Host name that was checked
        host: String,
        /// Fingerprint of the presented key
        fingerprint: String,
    },
    /// The presented key carries a revocation marker.
    Revoked {
        /// Host name that was checked
        host: String,
    },
    /// The certificate's signing CA is not trusted for this host.
    UnknownCa {
        /// Host name that was checked
        host: String,
    },
    /// The certificate failed a field or signature check.
    InvalidCertificate(String),
}

impl fmt::Display for TrustFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustFailure::UnknownHost { host, fingerprint } => {
                write!(f, "unknown host key for {} ({})", host, fingerprint)
            }
            TrustFailure::HostKeyChanged { host, fingerprint } => {
                write!(f, "host key for {} has changed ({})", host, fingerprint)
            }
            TrustFailure::Revoked { host } => write!(f, "revoked host key for {}", host),
            TrustFailure::UnknownCa { host } => {
                write!(f, "certification authority not trusted for {}", host)
            }
            TrustFailure::InvalidCertificate(msg) => write!(f, "invalid certificate: {}", msg),
        }
    }
}

/// Unified error type for all Fynx operations
#[derive(Debug)]
pub enum FynxError {
    /// I/O error
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Protocol violation (malformed packet, bad length, unexpected message)
    Protocol(String),

    /// No common algorithm for a negotiation category
    Negotiation {
        /// Human-readable category name (e.g. "ciphers c2s")
        category: String,
        /// Client name-list as sent
        client: String,
        /// Server name-list as received
        server: String,
    },

    /// MAC/AEAD tag mismatch, invalid curve point or bad signature.
    ///
    /// Messages are deliberately generic.
    CryptoVerification(String),

    /// Host key or certificate rejected by the trust policy
    TrustRejected(TrustFailure),

    /// Window never replenished or rekey never completed in time
    FlowControlTimeout(String),

    /// Peer sent SSH_MSG_DISCONNECT
    PeerDisconnected {
        /// Reason code from the peer
        reason_code: u32,
        /// Description from the peer
        description: String,
    },

    /// No implementation is registered for an algorithm name
    UnsupportedAlgorithm(String),

    /// A single channel failed (open refused, channel already closed)
    Channel(String),

    /// Session is closed
    Closed(String),

    /// Security error (key material, randomness)
    Security(String),

    /// Other error
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl FynxError {
    /// Returns true if this error must tear down the whole session.
    ///
    /// Channel-level failures leave the session usable.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, FynxError::Channel(_) | FynxError::Config(_))
    }
}

impl fmt::Display for FynxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FynxError::Io(e) => write!(f, "IO error: {}", e),
            FynxError::Config(msg) => write!(f, "Configuration error: {}", msg),
            FynxError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            FynxError::Negotiation {
                category,
                client,
                server,
            } => write!(
                f,
                "Algorithm negotiation failed for {}: client [{}], server [{}]",
                category, client, server
            ),
            FynxError::CryptoVerification(msg) => write!(f, "Verification failed: {}", msg),
            FynxError::TrustRejected(reason) => write!(f, "Host key rejected: {}", reason),
            FynxError::FlowControlTimeout(msg) => write!(f, "Timeout: {}", msg),
            FynxError::PeerDisconnected {
                reason_code,
                description,
            } => write!(
                f,
                "Peer disconnected (reason {}): {}",
                reason_code, description
            ),
            FynxError::UnsupportedAlgorithm(name) => write!(f, "Unsupported algorithm: {}", name),
            FynxError::Channel(msg) => write!(f, "Channel error: {}", msg),
            FynxError::Closed(msg) => write!(f, "Session closed: {}", msg),
            FynxError::Security(msg) => write!(f, "Security error: {}", msg),
            FynxError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for FynxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FynxError::Io(e) => Some(e),
            FynxError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FynxError {
    fn from(err: std::io::Error) -> Self {
        FynxError::Io(err)
    }
}

impl From<TrustFailure> for FynxError {
    fn from(reason: TrustFailure) -> Self {
        FynxError::TrustRejected(reason)
    }
}

/// Result type for Fynx operations
pub type FynxResult<T> = Result<T, FynxError>;
