//! In-memory known hosts store (OpenSSH known_hosts syntax).
//!
//! Each line has the format:
//! ```text
//! [@marker] hostnames keytype base64-key [comment]
//! ```
//!
//! Hostnames can be:
//! - Standard: `example.com` or `[example.com]:2222`
//! - Hashed: `|1|salt|hash` (HMAC-SHA1 of the hostname keyed by salt)
//! - Wildcard: `*.example.com`, `host?.example.com`
//! - Multiple: `host1,host2,host3`
//! - Negated: `*.example.com,!bad.example.com`
//!
//! Markers are `@cert-authority` (a CA trusted to sign host certificates
//! for the matching hosts) and `@revoked` (a key that must never be
//! accepted). Reading and writing files is left to the caller; see
//! [`KnownHosts::from_string`] and the `Display` impl.
//!
//! # Example
//!
//! ```rust
//! use fynx_ssh::known_hosts::KnownHosts;
//! use fynx_ssh::trust::{HostKeyStatus, TrustStore};
//!
//! let store = KnownHosts::new();
//! let blob = [0u8, 0, 0, 11, b's', b's', b'h', b'-', b'e', b'd', b'2', b'5', b'5', b'1', b'9'];
//! store.add("example.com", "ssh-ed25519", &blob).unwrap();
//!
//! assert_eq!(store.check("example.com", "ssh-ed25519", &blob), HostKeyStatus::Known);
//! assert_eq!(store.check("other.com", "ssh-ed25519", &blob), HostKeyStatus::Unknown);
//! ```

use std::fmt;
use std::sync::RwLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fynx_platform::{FynxError, FynxResult};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::rng::SecureRandom;
use crate::trust::{HostKeyStatus, TrustStore};

type HmacSha1 = Hmac<Sha1>;

/// Line marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Plain host key
    None,
    /// `@cert-authority`
    CertAuthority,
    /// `@revoked`
    Revoked,
}

/// A single known_hosts entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownHost {
    marker: Marker,
    hostname_pattern: String,
    key_type: String,
    key_blob: Vec<u8>,
    comment: String,
}

impl KnownHost {
    /// Creates an unmarked entry.
    pub fn new(hostname_pattern: &str, key_type: &str, key_blob: Vec<u8>) -> Self {
        Self {
            marker: Marker::None,
            hostname_pattern: hostname_pattern.to_string(),
            key_type: key_type.to_string(),
            key_blob,
            comment: String::new(),
        }
    }

    /// Returns the marker.
    pub fn marker(&self) -> Marker {
        self.marker
    }

    /// Returns the hostname pattern.
    pub fn hostname_pattern(&self) -> &str {
        &self.hostname_pattern
    }

    /// Returns the key type.
    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    /// Returns the public key blob.
    pub fn key_blob(&self) -> &[u8] {
        &self.key_blob
    }

    /// Returns the comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Checks if this entry applies to `host` (`name` or `[name]:port`).
    ///
    /// A matching negated pattern excludes the host even when another
    /// pattern matches it.
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let mut matched = false;
        for pattern in self.hostname_pattern.split(',') {
            let pattern = pattern.trim();
            if let Some(negated) = pattern.strip_prefix('!') {
                if matches_pattern(negated, &host) {
                    return false;
                }
            } else if matches_pattern(pattern, &host) {
                matched = true;
            }
        }
        matched
    }

    /// Parses a single line.
    ///
    /// ```rust
    /// use fynx_ssh::known_hosts::{KnownHost, Marker};
    ///
    /// let entry = KnownHost::parse_line("@revoked * ssh-ed25519 AAAA bad key").unwrap();
    /// assert_eq!(entry.marker(), Marker::Revoked);
    /// assert_eq!(entry.hostname_pattern(), "*");
    /// assert_eq!(entry.comment(), "bad key");
    /// ```
    pub fn parse_line(line: &str) -> FynxResult<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Err(FynxError::Config("Empty or comment line".to_string()));
        }

        let mut parts: Vec<&str> = line.split_whitespace().collect();
        let marker = match parts.first().copied() {
            Some("@cert-authority") => Marker::CertAuthority,
            Some("@revoked") => Marker::Revoked,
            Some(other) if other.starts_with('@') => {
                return Err(FynxError::Config(format!("Unknown marker '{}'", other)));
            }
            _ => Marker::None,
        };
        if marker != Marker::None {
            parts.remove(0);
        }
        if parts.len() < 3 {
            return Err(FynxError::Config(
                "Invalid known_hosts line: too few fields (need at least 3)".to_string(),
            ));
        }

        let key_blob = STANDARD
            .decode(parts[2])
            .map_err(|e| FynxError::Config(format!("Invalid base64 key data: {}", e)))?;

        Ok(Self {
            marker,
            hostname_pattern: parts[0].to_string(),
            key_type: parts[1].to_string(),
            key_blob,
            comment: parts[3..].join(" "),
        })
    }
}

impl fmt::Display for KnownHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.marker {
            Marker::CertAuthority => write!(f, "@cert-authority ")?,
            Marker::Revoked => write!(f, "@revoked ")?,
            Marker::None => {}
        }
        write!(
            f,
            "{} {} {}",
            self.hostname_pattern,
            self.key_type,
            STANDARD.encode(&self.key_blob)
        )?;
        if !self.comment.is_empty() {
            write!(f, " {}", self.comment)?;
        }
        Ok(())
    }
}

fn matches_pattern(pattern: &str, host: &str) -> bool {
    if pattern.starts_with("|1|") {
        return hashed_matches(pattern, host);
    }
    let pattern = pattern.to_ascii_lowercase();
    if pattern.contains('*') || pattern.contains('?') {
        let p: Vec<char> = pattern.chars().collect();
        let t: Vec<char> = host.chars().collect();
        return wildcard_match(&p, &t);
    }
    pattern == host
}

/// `|1|base64(salt)|base64(HMAC-SHA1(salt, host))`
fn hashed_matches(hashed: &str, host: &str) -> bool {
    let parts: Vec<&str> = hashed.split('|').collect();
    if parts.len() != 4 || !parts[0].is_empty() || parts[1] != "1" {
        return false;
    }
    let (salt, expected) = match (STANDARD.decode(parts[2]), STANDARD.decode(parts[3])) {
        (Ok(salt), Ok(expected)) => (salt, expected),
        _ => return false,
    };
    match host_hmac(&salt, host) {
        Some(computed) => computed.ct_eq(&expected[..]).into(),
        None => false,
    }
}

fn host_hmac(salt: &[u8], host: &str) -> Option<Vec<u8>> {
    let mut mac = HmacSha1::new_from_slice(salt).ok()?;
    mac.update(host.as_bytes());
    Some(mac.finalize().into_bytes().to_vec())
}

/// `*` matches any run of characters, `?` exactly one.
fn wildcard_match(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => (0..=text.len()).any(|skip| wildcard_match(rest, &text[skip..])),
        Some((c, rest)) => match text.split_first() {
            Some((t, text_rest)) if *c == '?' || c == t => wildcard_match(rest, text_rest),
            _ => false,
        },
    }
}

/// Known hosts held in memory.
pub struct KnownHosts {
    entries: RwLock<Vec<KnownHost>>,
    hash_hostnames: bool,
    rng: SecureRandom,
}

impl fmt::Debug for KnownHosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnownHosts")
            .field("entries", &self.entries().len())
            .field("hash_hostnames", &self.hash_hostnames)
            .finish()
    }
}

impl Default for KnownHosts {
    fn default() -> Self {
        Self::new()
    }
}

impl KnownHosts {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            hash_hostnames: false,
            rng: SecureRandom::new(),
        }
    }

    /// Store hostnames of newly added keys in hashed form.
    pub fn with_hashed_hostnames(mut self, hash: bool) -> Self {
        self.hash_hostnames = hash;
        self
    }

    /// Parses known_hosts content. Blank and comment lines are skipped;
    /// malformed lines are skipped with a debug log.
    pub fn from_string(content: &str) -> Self {
        let store = Self::new();
        {
            let mut entries = store.write();
            for (number, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                match KnownHost::parse_line(trimmed) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => debug!(line = number + 1, error = %e, "Skipping known_hosts line"),
                }
            }
        }
        store
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<KnownHost> {
        self.read().clone()
    }

    /// Appends an entry.
    pub fn add_entry(&self, entry: KnownHost) {
        self.write().push(entry);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<KnownHost>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<KnownHost>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn hostname_pattern(&self, host: &str) -> String {
        if !self.hash_hostnames {
            return host.to_string();
        }
        let mut salt = [0u8; 20];
        self.rng.fill(&mut salt);
        match host_hmac(&salt, host) {
            Some(hash) => format!("|1|{}|{}", STANDARD.encode(salt), STANDARD.encode(hash)),
            None => host.to_string(),
        }
    }
}

impl fmt::Display for KnownHosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.read().iter() {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

impl TrustStore for KnownHosts {
    fn check(&self, host: &str, key_type: &str, key_blob: &[u8]) -> HostKeyStatus {
        let entries = self.read();
        let mut changed = false;
        for entry in entries.iter() {
            if entry.marker != Marker::None || entry.key_type != key_type || !entry.matches(host) {
                continue;
            }
            if entry.key_blob == key_blob {
                return HostKeyStatus::Known;
            }
            changed = true;
        }
        if changed {
            HostKeyStatus::Changed
        } else {
            HostKeyStatus::Unknown
        }
    }

    fn is_revoked(&self, host: &str, key_blob: &[u8]) -> bool {
        self.read()
            .iter()
            .any(|e| e.marker == Marker::Revoked && e.key_blob == key_blob && e.matches(host))
    }

    fn is_trusted_ca(&self, host: &str, ca_blob: &[u8]) -> bool {
        self.read()
            .iter()
            .any(|e| e.marker == Marker::CertAuthority && e.key_blob == ca_blob && e.matches(host))
    }

    fn key_types(&self, host: &str) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for entry in self.read().iter() {
            if entry.marker == Marker::None && entry.matches(host) && !types.contains(&entry.key_type) {
                types.push(entry.key_type.clone());
            }
        }
        types
    }

    fn add(&self, host: &str, key_type: &str, key_blob: &[u8]) -> FynxResult<()> {
        let pattern = self.hostname_pattern(host);
        self.add_entry(KnownHost::new(&pattern, key_type, key_blob.to_vec()));
        debug!(host, key_type, "Added known host");
        Ok(())
    }

    fn remove(&self, host: &str, key_type: Option<&str>) -> FynxResult<usize> {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|e| {
            !(e.marker == Marker::None
                && e.matches(host)
                && key_type.map_or(true, |t| t == e.key_type))
        });
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &[u8] = b"\x00\x00\x00\x0bssh-ed25519\x00\x00\x00\x20AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
    const KEY_B: &[u8] = b"\x00\x00\x00\x0bssh-ed25519\x00\x00\x00\x20BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";

    fn line(pattern: &str, key: &[u8]) -> String {
        format!("{} ssh-ed25519 {}", pattern, STANDARD.encode(key))
    }

    #[test]
    fn test_parse_standard_format() {
        let entry = KnownHost::parse_line(&line("example.com", KEY_A)).unwrap();
        assert_eq!(entry.marker(), Marker::None);
        assert_eq!(entry.hostname_pattern(), "example.com");
        assert_eq!(entry.key_type(), "ssh-ed25519");
        assert_eq!(entry.key_blob(), KEY_A);
        assert_eq!(entry.comment(), "");
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(KnownHost::parse_line("# comment").is_err());
        assert!(KnownHost::parse_line("").is_err());
        assert!(KnownHost::parse_line("host ssh-ed25519").is_err());
        assert!(KnownHost::parse_line("@bogus host ssh-ed25519 AAAA").is_err());
        assert!(KnownHost::parse_line("host ssh-ed25519 !!!").is_err());
    }

    #[test]
    fn test_wildcard_match() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert!(wildcard_match(&chars("*.example.com"), &chars("a.example.com")));
        assert!(wildcard_match(&chars("host?"), &chars("host1")));
        assert!(!wildcard_match(&chars("host?"), &chars("host12")));
        assert!(wildcard_match(&chars("*"), &chars("")));
        assert!(!wildcard_match(&chars("*.example.com"), &chars("example.org")));
    }

    #[test]
    fn test_negation_wins_regardless_of_order() {
        let entry = KnownHost::new("*.example.com,!bad.example.com", "ssh-ed25519", KEY_A.to_vec());
        assert!(entry.matches("good.example.com"));
        assert!(!entry.matches("bad.example.com"));

        let entry = KnownHost::new("!bad.example.com,*.example.com", "ssh-ed25519", KEY_A.to_vec());
        assert!(!entry.matches("bad.example.com"));
    }

    #[test]
    fn test_port_and_case() {
        let entry = KnownHost::new("[Example.com]:2222", "ssh-ed25519", KEY_A.to_vec());
        assert!(entry.matches("[example.com]:2222"));
        assert!(!entry.matches("example.com"));
    }

    #[test]
    fn test_hashed_hostname() {
        let salt = [5u8; 20];
        let hash = host_hmac(&salt, "example.com").unwrap();
        let pattern = format!("|1|{}|{}", STANDARD.encode(salt), STANDARD.encode(hash));
        let entry = KnownHost::new(&pattern, "ssh-ed25519", KEY_A.to_vec());
        assert!(entry.matches("example.com"));
        assert!(!entry.matches("example.org"));
        assert!(!KnownHost::new("|1|bad|bad", "ssh-ed25519", vec![]).matches("example.com"));
    }

    #[test]
    fn test_check_known_changed_unknown() {
        let store = KnownHosts::from_string(&line("example.com", KEY_A));
        assert_eq!(store.check("example.com", "ssh-ed25519", KEY_A), HostKeyStatus::Known);
        assert_eq!(store.check("example.com", "ssh-ed25519", KEY_B), HostKeyStatus::Changed);
        assert_eq!(store.check("example.com", "ssh-rsa", KEY_B), HostKeyStatus::Unknown);
        assert_eq!(store.check("other.com", "ssh-ed25519", KEY_A), HostKeyStatus::Unknown);
    }

    #[test]
    fn test_markers() {
        let content = format!(
            "# trust roots\n@cert-authority *.example.com {}\n@revoked * {}\n\nnot a valid line\n",
            &line("", KEY_A)[1..],
            &line("", KEY_B)[1..]
        );
        let store = KnownHosts::from_string(&content);
        assert_eq!(store.entries().len(), 2);
        assert!(store.is_trusted_ca("web.example.com", KEY_A));
        assert!(!store.is_trusted_ca("web.example.org", KEY_A));
        assert!(store.is_revoked("anything", KEY_B));
        assert!(!store.is_revoked("anything", KEY_A));
        // CA lines are not host keys
        assert_eq!(store.check("web.example.com", "ssh-ed25519", KEY_A), HostKeyStatus::Unknown);
    }

    #[test]
    fn test_add_hashed_and_remove() {
        let store = KnownHosts::new().with_hashed_hostnames(true);
        store.add("[example.com]:2222", "ssh-ed25519", KEY_A).unwrap();
        let entries = store.entries();
        assert!(entries[0].hostname_pattern().starts_with("|1|"));
        assert_eq!(store.check("[example.com]:2222", "ssh-ed25519", KEY_A), HostKeyStatus::Known);
        assert_eq!(store.key_types("[example.com]:2222"), vec!["ssh-ed25519".to_string()]);

        assert_eq!(store.remove("[example.com]:2222", Some("ssh-rsa")).unwrap(), 0);
        assert_eq!(store.remove("[example.com]:2222", None).unwrap(), 1);
        assert_eq!(store.check("[example.com]:2222", "ssh-ed25519", KEY_A), HostKeyStatus::Unknown);
    }

    #[test]
    fn test_display_round_trip() {
        let content = format!("@revoked {} old\n{}\n", &line("*", KEY_B), line("a,b", KEY_A));
        let store = KnownHosts::from_string(&content);
        assert_eq!(store.to_string(), content);
    }
}
