//! Host trust verification.
//!
//! Decides whether the host key presented during key exchange is trusted,
//! using a [`TrustStore`] for recorded keys and CA roots and a
//! [`UserPrompt`] for interactive decisions.
//!
//! - Plain keys are looked up by host and key type. A revocation marker
//!   wins over a match.
//! - Certificates must be signed by a CA the store trusts for the host,
//!   and then pass the field and signature checks of
//!   [`Certificate::check_host`](crate::certificate::Certificate::check_host).
//!   Certificate failures are never overridden by a prompt.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use fynx_platform::{FynxError, FynxResult, TrustFailure};
use tracing::{debug, info, warn};

use crate::hostkey::HostKey;
use crate::registry::AlgorithmRegistry;

/// Result of looking up a plain host key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyStatus {
    /// A recorded key for the host matches.
    Known,
    /// A different key of the same type is recorded for the host.
    Changed,
    /// Nothing recorded for this host and key type.
    Unknown,
}

/// Where host keys and CA roots are kept.
pub trait TrustStore: Send + Sync {
    /// Looks up `key_blob` for `host` (`name` or `[name]:port`).
    fn check(&self, host: &str, key_type: &str, key_blob: &[u8]) -> HostKeyStatus;

    /// Whether the key carries a revocation marker for `host`.
    fn is_revoked(&self, host: &str, key_blob: &[u8]) -> bool;

    /// Whether `ca_blob` may sign host certificates for `host`.
    fn is_trusted_ca(&self, host: &str, ca_blob: &[u8]) -> bool;

    /// Key types recorded for `host`, in store order.
    fn key_types(&self, host: &str) -> Vec<String>;

    /// Records a key for `host`.
    fn add(&self, host: &str, key_type: &str, key_blob: &[u8]) -> FynxResult<()>;

    /// Removes keys for `host`, optionally only of one type. Returns the
    /// number removed.
    fn remove(&self, host: &str, key_type: Option<&str>) -> FynxResult<usize>;
}

/// Interactive confirmation.
pub trait UserPrompt: Send + Sync {
    /// Asks a yes/no question.
    fn prompt_yes_no(&self, message: &str) -> bool;

    /// Shows a message.
    fn show_message(&self, message: &str) {
        let _ = message;
    }
}

/// Policy for unknown and changed host keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StrictHostKeyChecking {
    /// Reject unknown and changed keys.
    #[default]
    Strict,
    /// Ask the user about unknown and changed keys.
    Ask,
    /// Add unknown keys, reject changed keys.
    AcceptNew,
    /// Add unknown keys, reject changed keys, never prompt.
    No,
}

impl StrictHostKeyChecking {
    /// Parses `yes`, `ask`, `accept-new` or `no`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "yes" | "strict" => Some(Self::Strict),
            "ask" => Some(Self::Ask),
            "accept-new" => Some(Self::AcceptNew),
            "no" | "off" => Some(Self::No),
            _ => None,
        }
    }
}

/// Outcome of evaluating a presented key, before policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustDecision {
    /// Known and matching (or a valid certificate from a trusted CA).
    Trusted,
    /// A different key is recorded.
    Changed,
    /// Nothing is recorded.
    Unknown,
    /// The key or its CA is revoked.
    Revoked,
    /// The certificate is not acceptable.
    CertificateInvalid(TrustFailure),
}

/// Applies trust store lookups and policy to presented host keys.
pub struct HostTrustVerifier {
    store: Arc<dyn TrustStore>,
    prompt: Option<Arc<dyn UserPrompt>>,
    policy: StrictHostKeyChecking,
    registry: Arc<AlgorithmRegistry>,
}

impl std::fmt::Debug for HostTrustVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostTrustVerifier")
            .field("policy", &self.policy)
            .field("prompt", &self.prompt.is_some())
            .finish()
    }
}

/// Formats the store key for a host: `name` on port 22, `[name]:port`
/// otherwise.
pub fn host_label(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{}]:{}", host, port)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl HostTrustVerifier {
    /// Creates a verifier.
    pub fn new(
        store: Arc<dyn TrustStore>,
        policy: StrictHostKeyChecking,
        registry: Arc<AlgorithmRegistry>,
    ) -> Self {
        Self {
            store,
            prompt: None,
            policy,
            registry,
        }
    }

    /// Sets the prompt used by [`StrictHostKeyChecking::Ask`].
    pub fn with_prompt(mut self, prompt: Arc<dyn UserPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Returns the trust store.
    pub fn store(&self) -> &Arc<dyn TrustStore> {
        &self.store
    }

    /// Evaluates a key for `host` at time `now` (seconds since the epoch).
    pub fn evaluate(&self, host: &str, host_key: &HostKey, now: u64) -> TrustDecision {
        if self.store.is_revoked(host, host_key.blob()) {
            return TrustDecision::Revoked;
        }
        let cert = match host_key.certificate() {
            None => {
                return match self.store.check(host, host_key.key_type(), host_key.blob()) {
                    HostKeyStatus::Known => TrustDecision::Trusted,
                    HostKeyStatus::Changed => TrustDecision::Changed,
                    HostKeyStatus::Unknown => TrustDecision::Unknown,
                };
            }
            Some(cert) => cert,
        };

        if self.store.is_revoked(host, cert.signature_key()) {
            return TrustDecision::Revoked;
        }
        if !self.store.is_trusted_ca(host, cert.signature_key()) {
            return TrustDecision::CertificateInvalid(TrustFailure::UnknownCa {
                host: host.to_string(),
            });
        }
        let principal = strip_port(host).to_ascii_lowercase();
        match cert.check_host(&principal, now, &self.registry) {
            Ok(()) => TrustDecision::Trusted,
            Err(failure) => TrustDecision::CertificateInvalid(failure),
        }
    }

    /// Evaluates the key and applies the policy, prompting and adding to
    /// the store where the policy allows.
    ///
    /// # Errors
    ///
    /// Returns `FynxError::TrustRejected` with the specific failure.
    pub fn verify(&self, host: &str, host_key: &HostKey) -> FynxResult<()> {
        let fingerprint = host_key.fingerprint();
        let decision = self.evaluate(host, host_key, unix_now());
        debug!(host, %fingerprint, ?decision, "Host key evaluated");

        match decision {
            TrustDecision::Trusted => {
                info!(host, key_type = %host_key.key_type(), "Host key trusted");
                Ok(())
            }
            TrustDecision::Revoked => {
                warn!(host, %fingerprint, "Host key is revoked");
                Err(FynxError::TrustRejected(TrustFailure::Revoked {
                    host: host.to_string(),
                }))
            }
            TrustDecision::CertificateInvalid(failure) => {
                warn!(host, error = %failure, "Host certificate rejected");
                Err(FynxError::TrustRejected(failure))
            }
            TrustDecision::Changed => self.on_changed(host, host_key, fingerprint),
            TrustDecision::Unknown => self.on_unknown(host, host_key, fingerprint),
        }
    }

    fn on_changed(&self, host: &str, host_key: &HostKey, fingerprint: String) -> FynxResult<()> {
        warn!(host, %fingerprint, "Host key has changed");
        let rejected = || {
            Err(FynxError::TrustRejected(TrustFailure::HostKeyChanged {
                host: host.to_string(),
                fingerprint: fingerprint.clone(),
            }))
        };
        if self.policy != StrictHostKeyChecking::Ask {
            return rejected();
        }
        let message = format!(
            "WARNING: REMOTE HOST IDENTIFICATION HAS CHANGED!\n\
             The {} key sent by {} has fingerprint {}.\n\
             Replace the recorded key?",
            host_key.key_type(),
            host,
            fingerprint
        );
        if !self.ask(&message) {
            return rejected();
        }
        self.store.remove(host, Some(host_key.key_type()))?;
        self.store.add(host, host_key.key_type(), host_key.blob())?;
        Ok(())
    }

    fn on_unknown(&self, host: &str, host_key: &HostKey, fingerprint: String) -> FynxResult<()> {
        let accept = match self.policy {
            StrictHostKeyChecking::Strict => false,
            StrictHostKeyChecking::AcceptNew | StrictHostKeyChecking::No => true,
            StrictHostKeyChecking::Ask => self.ask(&format!(
                "The authenticity of host '{}' can't be established.\n\
                 {} key fingerprint is {}.\n\
                 Are you sure you want to continue connecting?",
                host,
                host_key.key_type(),
                fingerprint
            )),
        };
        if !accept {
            return Err(FynxError::TrustRejected(TrustFailure::UnknownHost {
                host: host.to_string(),
                fingerprint,
            }));
        }
        self.store.add(host, host_key.key_type(), host_key.blob())?;
        if let Some(prompt) = &self.prompt {
            prompt.show_message(&format!(
                "Permanently added '{}' ({}) to the list of known hosts.",
                host,
                host_key.key_type()
            ));
        }
        Ok(())
    }

    fn ask(&self, message: &str) -> bool {
        self.prompt
            .as_ref()
            .map_or(false, |prompt| prompt.prompt_yes_no(message))
    }
}

fn strip_port(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|rest| rest.split_once("]:"))
        .map_or(host, |(name, _)| name)
}

/// Moves host key algorithms whose key type is already recorded for the
/// host to the front, keeping relative order otherwise.
pub fn prefer_known_types(algorithms: &[String], known_types: &[String]) -> Vec<String> {
    let is_known = |alg: &String| {
        let key_type = crate::hostkey::key_type_for_algorithm(alg);
        known_types.iter().any(|t| *t == key_type)
    };
    let (mut front, back): (Vec<String>, Vec<String>) =
        algorithms.iter().cloned().partition(|alg| is_known(alg));
    front.extend(back);
    front
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::testing::{issue, CertSpec};
    use crate::known_hosts::{KnownHost, KnownHosts};
    use crate::wire::write_string;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::BytesMut;
    use ed25519_dalek::SigningKey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedPrompt {
        answer: bool,
        asked: AtomicUsize,
    }

    impl UserPrompt for ScriptedPrompt {
        fn prompt_yes_no(&self, _message: &str) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn ed25519_key(seed: u8) -> HostKey {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let mut buf = BytesMut::new();
        write_string(&mut buf, b"ssh-ed25519");
        write_string(&mut buf, signing.verifying_key().as_bytes());
        HostKey::parse(&buf).unwrap()
    }

    fn ca_blob(ca: &SigningKey) -> Vec<u8> {
        let mut buf = BytesMut::new();
        write_string(&mut buf, b"ssh-ed25519");
        write_string(&mut buf, ca.verifying_key().as_bytes());
        buf.to_vec()
    }

    fn verifier(store: Arc<KnownHosts>, policy: StrictHostKeyChecking) -> HostTrustVerifier {
        HostTrustVerifier::new(store, policy, Arc::new(AlgorithmRegistry::with_defaults()))
    }

    #[test]
    fn test_known_key_accepted() {
        let store = Arc::new(KnownHosts::new());
        let key = ed25519_key(1);
        store.add("example.com", "ssh-ed25519", key.blob()).unwrap();
        verifier(store, StrictHostKeyChecking::Strict)
            .verify("example.com", &key)
            .unwrap();
    }

    #[test]
    fn test_changed_key_rejected_under_strict_and_store_untouched() {
        let store = Arc::new(KnownHosts::new());
        let old = ed25519_key(1);
        store.add("example.com", "ssh-ed25519", old.blob()).unwrap();

        for policy in [
            StrictHostKeyChecking::Strict,
            StrictHostKeyChecking::AcceptNew,
            StrictHostKeyChecking::No,
        ] {
            match verifier(store.clone(), policy).verify("example.com", &ed25519_key(2)) {
                Err(FynxError::TrustRejected(TrustFailure::HostKeyChanged { host, .. })) => {
                    assert_eq!(host, "example.com")
                }
                other => panic!("Expected HostKeyChanged, got {:?}", other),
            }
        }
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.check("example.com", "ssh-ed25519", old.blob()), HostKeyStatus::Known);
    }

    #[test]
    fn test_ask_replaces_changed_key_when_confirmed() {
        let store = Arc::new(KnownHosts::new());
        store.add("example.com", "ssh-ed25519", ed25519_key(1).blob()).unwrap();
        let prompt = Arc::new(ScriptedPrompt {
            answer: true,
            asked: AtomicUsize::new(0),
        });
        let new_key = ed25519_key(2);
        verifier(store.clone(), StrictHostKeyChecking::Ask)
            .with_prompt(prompt.clone())
            .verify("example.com", &new_key)
            .unwrap();
        assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.check("example.com", "ssh-ed25519", new_key.blob()), HostKeyStatus::Known);
    }

    #[test]
    fn test_unknown_host_policies() {
        let key = ed25519_key(3);

        let store = Arc::new(KnownHosts::new());
        assert!(matches!(
            verifier(store.clone(), StrictHostKeyChecking::Strict).verify("h", &key),
            Err(FynxError::TrustRejected(TrustFailure::UnknownHost { .. }))
        ));
        assert!(store.entries().is_empty());

        verifier(store.clone(), StrictHostKeyChecking::AcceptNew)
            .verify("h", &key)
            .unwrap();
        assert_eq!(store.check("h", "ssh-ed25519", key.blob()), HostKeyStatus::Known);

        let store = Arc::new(KnownHosts::new());
        let prompt = Arc::new(ScriptedPrompt {
            answer: false,
            asked: AtomicUsize::new(0),
        });
        assert!(verifier(store.clone(), StrictHostKeyChecking::Ask)
            .with_prompt(prompt)
            .verify("h", &key)
            .is_err());
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_revoked_key_rejected_even_when_known() {
        let key = ed25519_key(4);
        let store = Arc::new(KnownHosts::from_string(&format!(
            "@revoked * ssh-ed25519 {}\n",
            STANDARD.encode(key.blob())
        )));
        store.add("h", "ssh-ed25519", key.blob()).unwrap();
        assert!(matches!(
            verifier(store, StrictHostKeyChecking::No).verify("h", &key),
            Err(FynxError::TrustRejected(TrustFailure::Revoked { .. }))
        ));
    }

    #[test]
    fn test_certificate_from_trusted_ca() {
        let ca = SigningKey::from_bytes(&[50u8; 32]);
        let blob = issue(&CertSpec::default(), [7u8; 32], &ca);
        let key = HostKey::parse(&blob).unwrap();

        let store = Arc::new(KnownHosts::new());
        let v = verifier(store.clone(), StrictHostKeyChecking::Strict);
        assert!(matches!(
            v.evaluate("server.example.com", &key, 100),
            TrustDecision::CertificateInvalid(TrustFailure::UnknownCa { .. })
        ));

        store.add_entry(
            KnownHost::parse_line(&format!(
                "@cert-authority *.example.com ssh-ed25519 {}",
                STANDARD.encode(ca_blob(&ca))
            ))
            .unwrap(),
        );
        assert_eq!(v.evaluate("server.example.com", &key, 100), TrustDecision::Trusted);
        assert_eq!(v.evaluate("SERVER.example.com", &key, 100), TrustDecision::Trusted);
        assert!(matches!(
            v.evaluate("other.example.com", &key, 100),
            TrustDecision::CertificateInvalid(TrustFailure::InvalidCertificate(_))
        ));
    }

    #[test]
    fn test_certificate_failures_ignore_prompt() {
        let ca = SigningKey::from_bytes(&[51u8; 32]);
        let blob = issue(
            &CertSpec {
                cert_type: 1,
                ..CertSpec::default()
            },
            [8u8; 32],
            &ca,
        );
        let key = HostKey::parse(&blob).unwrap();
        let store = Arc::new(KnownHosts::new());
        let prompt = Arc::new(ScriptedPrompt {
            answer: true,
            asked: AtomicUsize::new(0),
        });
        let result = verifier(store, StrictHostKeyChecking::Ask)
            .with_prompt(prompt.clone())
            .verify("h", &key);
        assert!(matches!(result, Err(FynxError::TrustRejected(_))));
        assert_eq!(prompt.asked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_prefer_known_types() {
        let algs: Vec<String> = ["ssh-ed25519", "rsa-sha2-512", "rsa-sha2-256", "ecdsa-sha2-nistp256"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let ordered = prefer_known_types(&algs, &["ssh-rsa".to_string()]);
        assert_eq!(
            ordered,
            vec!["rsa-sha2-512", "rsa-sha2-256", "ssh-ed25519", "ecdsa-sha2-nistp256"]
        );
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(StrictHostKeyChecking::from_name("yes"), Some(StrictHostKeyChecking::Strict));
        assert_eq!(
            StrictHostKeyChecking::from_name("accept-new"),
            Some(StrictHostKeyChecking::AcceptNew)
        );
        assert_eq!(StrictHostKeyChecking::from_name("maybe"), None);
    }
}
