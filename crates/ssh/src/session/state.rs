//! Session lifecycle state.

use fynx_platform::FynxError;
use tokio::time::Instant;

use crate::hostkey::HostKey;
use crate::message::Disconnect;
use crate::version::Version;

/// Where a session is in its lifetime.
///
/// ```text
/// Connecting -> VersionExchanged -> Negotiating -> Authenticating
///     -> Established -> (Rekeying -> Established)* -> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Identification string being sent
    Connecting,
    /// Both identification strings known
    VersionExchanged,
    /// First key exchange in progress
    Negotiating,
    /// Transport encrypted, user not yet authenticated
    Authenticating,
    /// User authenticated
    Established,
    /// Later key exchange in progress
    Rekeying,
    /// Session closed
    Disconnected,
}

impl SessionPhase {
    /// Returns true once the first key exchange has completed.
    pub fn is_secured(&self) -> bool {
        matches!(
            self,
            SessionPhase::Authenticating | SessionPhase::Established | SessionPhase::Rekeying
        )
    }
}

/// Mutable per-session facts, guarded by a short-lived lock.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) server_version: Version,
    pub(crate) session_id: Option<Vec<u8>>,
    pub(crate) host_key: Option<HostKey>,
    pub(crate) authenticated: bool,
    pub(crate) service_accepted: bool,
    pub(crate) server_sig_algs: Option<Vec<String>>,
    pub(crate) last_kex: Instant,
    pub(crate) kex_count: u32,
    pub(crate) close_reason: Option<String>,
    pub(crate) failure: Option<FynxError>,
    pub(crate) peer_disconnect: Option<Disconnect>,
}

impl SessionState {
    pub(crate) fn new(server_version: Version) -> Self {
        Self {
            server_version,
            session_id: None,
            host_key: None,
            authenticated: false,
            service_accepted: false,
            server_sig_algs: None,
            last_kex: Instant::now(),
            kex_count: 0,
            close_reason: None,
            failure: None,
            peer_disconnect: None,
        }
    }

    /// Phase to return to after a key exchange finishes.
    pub(crate) fn settled_phase(&self) -> SessionPhase {
        if self.authenticated {
            SessionPhase::Established
        } else {
            SessionPhase::Authenticating
        }
    }

    /// Records the first fatal error. Returns false if the session was
    /// already closed.
    pub(crate) fn close(&mut self, reason: String, failure: Option<FynxError>) -> bool {
        if self.close_reason.is_some() {
            return false;
        }
        self.close_reason = Some(reason);
        self.failure = failure;
        true
    }
}
