//! Session configuration.
//!
//! [`SessionConfig`] holds algorithm preferences, timeouts, rekey limits,
//! keepalive and host key policy. Per-host overrides come from a
//! [`ConfigSource`] (an `~/.ssh/config`-like lookup supplied by the
//! caller) via [`SessionConfig::apply_source`].
//!
//! Preference lists accept the OpenSSH modifiers when overridden:
//! `+a,b` appends, `-a,b` removes and `^a,b` moves to the front.
//!
//! # Example
//!
//! ```rust
//! use fynx_ssh::config::{ConfigSource, SessionConfig};
//!
//! struct Fixed;
//! impl ConfigSource for Fixed {
//!     fn get(&self, _host: &str, key: &str) -> Option<String> {
//!         (key == "Ciphers").then(|| "aes256-ctr,aes128-ctr".to_string())
//!     }
//! }
//!
//! let mut config = SessionConfig::default();
//! config.apply_source("example.com", &Fixed).unwrap();
//! assert_eq!(config.ciphers_c2s, vec!["aes256-ctr", "aes128-ctr"]);
//! config.validate().unwrap();
//! ```

use std::time::Duration;

use fynx_platform::{FynxError, FynxResult};
use tracing::debug;

use crate::kex::{Proposal, EXT_INFO_CLIENT};
use crate::packet::MAX_PACKET_SIZE;
use crate::registry::{AlgorithmCategory, AlgorithmRegistry};
use crate::trust::{prefer_known_types, StrictHostKeyChecking};
use crate::version::MAX_VERSION_LENGTH;

/// Default key exchange preference.
pub const DEFAULT_KEX: &[&str] = &[
    "mlkem768x25519-sha256",
    "curve25519-sha256",
    "curve25519-sha256@libssh.org",
    "ecdh-sha2-nistp256",
    "ecdh-sha2-nistp384",
    "ecdh-sha2-nistp521",
    "diffie-hellman-group-exchange-sha256",
    "diffie-hellman-group16-sha512",
    "diffie-hellman-group18-sha512",
    "diffie-hellman-group14-sha256",
];

/// Default host key algorithm preference.
pub const DEFAULT_HOST_KEY: &[&str] = &[
    "ssh-ed25519-cert-v01@openssh.com",
    "ecdsa-sha2-nistp256-cert-v01@openssh.com",
    "ecdsa-sha2-nistp384-cert-v01@openssh.com",
    "ecdsa-sha2-nistp521-cert-v01@openssh.com",
    "rsa-sha2-512-cert-v01@openssh.com",
    "rsa-sha2-256-cert-v01@openssh.com",
    "ssh-ed25519",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "rsa-sha2-512",
    "rsa-sha2-256",
];

/// Default cipher preference.
pub const DEFAULT_CIPHERS: &[&str] = &[
    "chacha20-poly1305@openssh.com",
    "aes128-gcm@openssh.com",
    "aes256-gcm@openssh.com",
    "aes128-ctr",
    "aes192-ctr",
    "aes256-ctr",
];

/// Default MAC preference.
pub const DEFAULT_MACS: &[&str] = &[
    "hmac-sha2-256-etm@openssh.com",
    "hmac-sha2-512-etm@openssh.com",
    "hmac-sha1-etm@openssh.com",
    "hmac-sha2-256",
    "hmac-sha2-512",
    "hmac-sha1",
];

/// Per-host configuration lookup.
pub trait ConfigSource: Send + Sync {
    /// Returns the value of `key` (OpenSSH option name) for `host`.
    fn get(&self, host: &str, key: &str) -> Option<String>;
}

fn to_strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// Software part of the client identification string.
    pub client_software: String,
    /// Key exchange methods.
    pub kex_algorithms: Vec<String>,
    /// Host key algorithms.
    pub host_key_algorithms: Vec<String>,
    /// Ciphers client to server.
    pub ciphers_c2s: Vec<String>,
    /// Ciphers server to client.
    pub ciphers_s2c: Vec<String>,
    /// MACs client to server.
    pub macs_c2s: Vec<String>,
    /// MACs server to client.
    pub macs_s2c: Vec<String>,
    /// Compression client to server.
    pub compression_c2s: Vec<String>,
    /// Compression server to client.
    pub compression_s2c: Vec<String>,
    /// Languages client to server (usually empty).
    pub languages_c2s: Vec<String>,
    /// Languages server to client (usually empty).
    pub languages_s2c: Vec<String>,

    /// Version exchange and initial key exchange deadline.
    pub connect_timeout: Duration,
    /// How long writers wait for a rekey to finish.
    pub rekey_timeout: Duration,
    /// How long to wait for a channel open reply.
    pub channel_open_timeout: Duration,
    /// How long a writer waits for window space.
    pub window_wait_timeout: Duration,

    /// Rekey after this many bytes in either direction.
    pub rekey_bytes_limit: u64,
    /// Rekey after this much time.
    pub rekey_time_limit: Option<Duration>,

    /// Keepalive interval. `None` disables keepalive.
    pub keepalive_interval: Option<Duration>,
    /// Unanswered keepalives tolerated before the session fails.
    pub keepalive_count_max: u32,

    /// Host key policy.
    pub strict_host_key_checking: StrictHostKeyChecking,
    /// Name used instead of the real host for trust store lookups.
    pub host_key_alias: Option<String>,
    /// Store newly added hostnames hashed.
    pub hash_known_hosts: bool,

    /// Advertise `ext-info-c`.
    pub enable_server_sig_algs: bool,
    /// Accept incoming `x11` channels.
    pub x11_forwarding: bool,
    /// Accept incoming `auth-agent@openssh.com` channels.
    pub agent_forwarding: bool,

    /// Initial local window for new channels.
    pub local_window_size: u32,
    /// Largest data packet accepted per channel.
    pub local_max_packet: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_software: format!("Fynx_{}", env!("CARGO_PKG_VERSION")),
            kex_algorithms: to_strings(DEFAULT_KEX),
            host_key_algorithms: to_strings(DEFAULT_HOST_KEY),
            ciphers_c2s: to_strings(DEFAULT_CIPHERS),
            ciphers_s2c: to_strings(DEFAULT_CIPHERS),
            macs_c2s: to_strings(DEFAULT_MACS),
            macs_s2c: to_strings(DEFAULT_MACS),
            compression_c2s: to_strings(&["none"]),
            compression_s2c: to_strings(&["none"]),
            languages_c2s: Vec::new(),
            languages_s2c: Vec::new(),
            connect_timeout: Duration::from_secs(30),
            rekey_timeout: Duration::from_secs(60),
            channel_open_timeout: Duration::from_secs(30),
            window_wait_timeout: Duration::from_secs(120),
            rekey_bytes_limit: 1 << 30,
            rekey_time_limit: Some(Duration::from_secs(3600)),
            keepalive_interval: None,
            keepalive_count_max: 3,
            strict_host_key_checking: StrictHostKeyChecking::Strict,
            host_key_alias: None,
            hash_known_hosts: false,
            enable_server_sig_algs: true,
            x11_forwarding: false,
            agent_forwarding: false,
            local_window_size: 2 * 1024 * 1024,
            local_max_packet: 32 * 1024,
        }
    }
}

/// Applies an override to a preference list.
fn apply_list(current: &[String], value: &str) -> Vec<String> {
    let (op, rest) = match value.chars().next() {
        Some(c @ ('+' | '-' | '^')) => (Some(c), &value[1..]),
        _ => (None, value),
    };
    let names: Vec<String> = rest
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    match op {
        Some('+') => {
            let mut out = current.to_vec();
            out.extend(names.into_iter().filter(|n| !current.contains(n)));
            out
        }
        Some('-') => current.iter().filter(|c| !names.contains(c)).cloned().collect(),
        Some('^') => {
            let mut out = names.clone();
            out.extend(current.iter().filter(|c| !names.contains(c)).cloned());
            out
        }
        _ => names,
    }
}

fn parse_bool(key: &str, value: &str) -> FynxResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(FynxError::Config(format!("{}: expected yes or no, got '{}'", key, value))),
    }
}

fn parse_u64(key: &str, value: &str) -> FynxResult<u64> {
    value
        .parse()
        .map_err(|_| FynxError::Config(format!("{}: invalid number '{}'", key, value)))
}

/// Parses `1G`, `512M`, `64K` or plain bytes.
fn parse_size(key: &str, value: &str) -> FynxResult<u64> {
    let (digits, shift) = match value.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&value[..value.len() - 1], 10),
        Some('M') => (&value[..value.len() - 1], 20),
        Some('G') => (&value[..value.len() - 1], 30),
        _ => (value, 0),
    };
    Ok(parse_u64(key, digits)? << shift)
}

impl SessionConfig {
    /// Applies per-host overrides. Recognized keys: `KexAlgorithms`,
    /// `HostKeyAlgorithms`, `Ciphers`, `MACs`, `Compression`,
    /// `StrictHostKeyChecking`, `HostKeyAlias`, `HashKnownHosts`,
    /// `ServerAliveInterval`, `ServerAliveCountMax`, `ConnectTimeout`,
    /// `RekeyLimit`, `ForwardX11`, `ForwardAgent`.
    pub fn apply_source(&mut self, host: &str, source: &dyn ConfigSource) -> FynxResult<()> {
        let get = |key: &str| source.get(host, key).map(|v| v.trim().to_string());

        if let Some(v) = get("KexAlgorithms") {
            self.kex_algorithms = apply_list(&self.kex_algorithms, &v);
        }
        if let Some(v) = get("HostKeyAlgorithms") {
            self.host_key_algorithms = apply_list(&self.host_key_algorithms, &v);
        }
        if let Some(v) = get("Ciphers") {
            self.ciphers_c2s = apply_list(&self.ciphers_c2s, &v);
            self.ciphers_s2c = apply_list(&self.ciphers_s2c, &v);
        }
        if let Some(v) = get("MACs") {
            self.macs_c2s = apply_list(&self.macs_c2s, &v);
            self.macs_s2c = apply_list(&self.macs_s2c, &v);
        }
        if let Some(v) = get("Compression") {
            let list = if parse_bool("Compression", &v)? {
                to_strings(&["zlib@openssh.com", "zlib", "none"])
            } else {
                to_strings(&["none"])
            };
            self.compression_c2s = list.clone();
            self.compression_s2c = list;
        }
        if let Some(v) = get("StrictHostKeyChecking") {
            self.strict_host_key_checking = StrictHostKeyChecking::from_name(&v).ok_or_else(|| {
                FynxError::Config(format!("StrictHostKeyChecking: unknown value '{}'", v))
            })?;
        }
        if let Some(v) = get("HostKeyAlias") {
            self.host_key_alias = Some(v);
        }
        if let Some(v) = get("HashKnownHosts") {
            self.hash_known_hosts = parse_bool("HashKnownHosts", &v)?;
        }
        if let Some(v) = get("ServerAliveInterval") {
            let secs = parse_u64("ServerAliveInterval", &v)?;
            self.keepalive_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(v) = get("ServerAliveCountMax") {
            self.keepalive_count_max = parse_u64("ServerAliveCountMax", &v)? as u32;
        }
        if let Some(v) = get("ConnectTimeout") {
            self.connect_timeout = Duration::from_secs(parse_u64("ConnectTimeout", &v)?);
        }
        if let Some(v) = get("RekeyLimit") {
            let mut parts = v.split_whitespace();
            if let Some(bytes) = parts.next() {
                if bytes != "default" {
                    self.rekey_bytes_limit = parse_size("RekeyLimit", bytes)?;
                }
            }
            if let Some(secs) = parts.next() {
                let secs = parse_u64("RekeyLimit", secs)?;
                self.rekey_time_limit = (secs > 0).then(|| Duration::from_secs(secs));
            }
        }
        if let Some(v) = get("ForwardX11") {
            self.x11_forwarding = parse_bool("ForwardX11", &v)?;
        }
        if let Some(v) = get("ForwardAgent") {
            self.agent_forwarding = parse_bool("ForwardAgent", &v)?;
        }
        debug!(host, "Applied per-host configuration");
        Ok(())
    }

    /// Checks the configuration for values the session cannot work with.
    pub fn validate(&self) -> FynxResult<()> {
        if self.client_software.is_empty()
            || self
                .client_software
                .chars()
                .any(|c| c.is_whitespace() || c == '-' || !c.is_ascii_graphic())
        {
            return Err(FynxError::Config(format!(
                "Invalid client software version '{}'",
                self.client_software
            )));
        }
        if "SSH-2.0-\r\n".len() + self.client_software.len() > MAX_VERSION_LENGTH {
            return Err(FynxError::Config(format!(
                "Client software version too long: {} bytes",
                self.client_software.len()
            )));
        }
        for (name, list) in [
            ("kex_algorithms", &self.kex_algorithms),
            ("host_key_algorithms", &self.host_key_algorithms),
            ("ciphers_c2s", &self.ciphers_c2s),
            ("ciphers_s2c", &self.ciphers_s2c),
            ("macs_c2s", &self.macs_c2s),
            ("macs_s2c", &self.macs_s2c),
            ("compression_c2s", &self.compression_c2s),
            ("compression_s2c", &self.compression_s2c),
        ] {
            if list.is_empty() {
                return Err(FynxError::Config(format!("{} is empty", name)));
            }
        }
        if self.local_max_packet == 0 || self.local_max_packet as usize > MAX_PACKET_SIZE - 1024 {
            return Err(FynxError::Config(format!(
                "local_max_packet {} out of range",
                self.local_max_packet
            )));
        }
        if self.local_window_size < self.local_max_packet {
            return Err(FynxError::Config(
                "local_window_size smaller than local_max_packet".to_string(),
            ));
        }
        if self.rekey_bytes_limit < 16 * 1024 {
            return Err(FynxError::Config(format!(
                "rekey_bytes_limit {} too small",
                self.rekey_bytes_limit
            )));
        }
        if self.keepalive_interval.is_some() && self.keepalive_count_max == 0 {
            return Err(FynxError::Config(
                "keepalive_count_max must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("rekey_timeout", self.rekey_timeout),
            ("channel_open_timeout", self.channel_open_timeout),
            ("window_wait_timeout", self.window_wait_timeout),
        ] {
            if value.is_zero() {
                return Err(FynxError::Config(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }

    /// Builds the client KEXINIT proposal.
    ///
    /// Names the registry cannot construct are dropped; host key
    /// algorithms whose key type is already recorded for the host move to
    /// the front; `ext-info-c` is appended when enabled.
    pub fn proposal(
        &self,
        registry: &AlgorithmRegistry,
        known_key_types: &[String],
    ) -> FynxResult<Proposal> {
        let mut kex = registry.filter_supported(AlgorithmCategory::Kex, &self.kex_algorithms)?;
        if self.enable_server_sig_algs {
            kex.push(EXT_INFO_CLIENT.to_string());
        }
        let host_key = prefer_known_types(
            &registry.filter_supported(AlgorithmCategory::HostKey, &self.host_key_algorithms)?,
            known_key_types,
        );
        Ok(Proposal {
            kex,
            host_key,
            cipher_c2s: registry.filter_supported(AlgorithmCategory::Cipher, &self.ciphers_c2s)?,
            cipher_s2c: registry.filter_supported(AlgorithmCategory::Cipher, &self.ciphers_s2c)?,
            mac_c2s: registry.filter_supported(AlgorithmCategory::Mac, &self.macs_c2s)?,
            mac_s2c: registry.filter_supported(AlgorithmCategory::Mac, &self.macs_s2c)?,
            compression_c2s: registry
                .filter_supported(AlgorithmCategory::Compression, &self.compression_c2s)?,
            compression_s2c: registry
                .filter_supported(AlgorithmCategory::Compression, &self.compression_s2c)?,
            language_c2s: self.languages_c2s.clone(),
            language_s2c: self.languages_s2c.clone(),
        })
    }
}
