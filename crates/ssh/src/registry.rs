//! Algorithm registry.
//!
//! Maps algorithm names to constructors for every negotiable category.
//! The registry is built once per session (usually with
//! [`AlgorithmRegistry::with_defaults`]) and shared behind an `Arc`. A name
//! that cannot be constructed is reported as
//! [`FynxError::UnsupportedAlgorithm`].
//!
//! # Example
//!
//! ```rust
//! use fynx_ssh::registry::{AlgorithmCategory, AlgorithmRegistry};
//!
//! let registry = AlgorithmRegistry::with_defaults();
//! assert!(registry.supports(AlgorithmCategory::Kex, "curve25519-sha256"));
//! assert!(!registry.supports(AlgorithmCategory::Kex, "sntrup761x25519-sha512"));
//! assert!(registry.kex("ecdh-sha2-nistp256").is_ok());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use fynx_platform::{FynxError, FynxResult};
use tracing::debug;

use crate::compression::CompressionAlgorithm;
use crate::crypto::{CipherAlgorithm, HashAlgorithm, MacAlgorithm};
use crate::hostkey::{
    base_algorithm, DsaVerifier, EcdsaCurve, EcdsaVerifier, Ed25519Verifier, RsaVerifier,
    SignatureVerifier,
};
use crate::kex::KeyExchange;
use crate::kex_dh::{DhGroup, DhKex, GexKex};
use crate::kex_ecdh::{EcdhCurve, EcdhKex};
use crate::kex_hybrid::{HybridKex, KemVariant};

/// Constructor for a key exchange method.
pub type KexFactory = Arc<dyn Fn() -> Box<dyn KeyExchange> + Send + Sync>;

/// Negotiable algorithm category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmCategory {
    /// Key exchange methods
    Kex,
    /// Host key / signature algorithms
    HostKey,
    /// Packet ciphers
    Cipher,
    /// MAC algorithms
    Mac,
    /// Compression methods
    Compression,
}

impl fmt::Display for AlgorithmCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgorithmCategory::Kex => "kex",
            AlgorithmCategory::HostKey => "host key",
            AlgorithmCategory::Cipher => "cipher",
            AlgorithmCategory::Mac => "mac",
            AlgorithmCategory::Compression => "compression",
        };
        f.write_str(name)
    }
}

/// Name to constructor mapping for all algorithm categories.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    kex: HashMap<String, KexFactory>,
    verifiers: HashMap<String, Arc<dyn SignatureVerifier>>,
    ciphers: HashMap<String, CipherAlgorithm>,
    macs: HashMap<String, MacAlgorithm>,
    compression: HashMap<String, CompressionAlgorithm>,
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kex: Vec<_> = self.kex.keys().collect();
        kex.sort();
        let mut verifiers: Vec<_> = self.verifiers.keys().collect();
        verifiers.sort();
        f.debug_struct("AlgorithmRegistry")
            .field("kex", &kex)
            .field("verifiers", &verifiers)
            .field("ciphers", &self.ciphers.len())
            .field("macs", &self.macs.len())
            .field("compression", &self.compression.len())
            .finish()
    }
}

impl AlgorithmRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in algorithm.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        for (name, kem, curve, hash) in [
            (
                "mlkem768x25519-sha256",
                KemVariant::MlKem768,
                EcdhCurve::Curve25519,
                HashAlgorithm::Sha256,
            ),
            (
                "mlkem768nistp256-sha256",
                KemVariant::MlKem768,
                EcdhCurve::NistP256,
                HashAlgorithm::Sha256,
            ),
            (
                "mlkem1024nistp384-sha384",
                KemVariant::MlKem1024,
                EcdhCurve::NistP384,
                HashAlgorithm::Sha384,
            ),
        ] {
            registry.register_kex(
                name,
                Arc::new(move || {
                    Box::new(HybridKex::new(name, kem, curve, hash)) as Box<dyn KeyExchange>
                }),
            );
        }
        for (name, curve, hash) in [
            ("curve25519-sha256", EcdhCurve::Curve25519, HashAlgorithm::Sha256),
            (
                "curve25519-sha256@libssh.org",
                EcdhCurve::Curve25519,
                HashAlgorithm::Sha256,
            ),
            ("ecdh-sha2-nistp256", EcdhCurve::NistP256, HashAlgorithm::Sha256),
            ("ecdh-sha2-nistp384", EcdhCurve::NistP384, HashAlgorithm::Sha384),
            ("ecdh-sha2-nistp521", EcdhCurve::NistP521, HashAlgorithm::Sha512),
        ] {
            registry.register_kex(
                name,
                Arc::new(move || Box::new(EcdhKex::new(name, curve, hash)) as Box<dyn KeyExchange>),
            );
        }
        for (name, hash) in [
            ("diffie-hellman-group-exchange-sha256", HashAlgorithm::Sha256),
            ("diffie-hellman-group-exchange-sha1", HashAlgorithm::Sha1),
        ] {
            registry.register_kex(
                name,
                Arc::new(move || Box::new(GexKex::new(name, hash)) as Box<dyn KeyExchange>),
            );
        }
        for (name, group, hash) in [
            ("diffie-hellman-group16-sha512", DhGroup::Group16, HashAlgorithm::Sha512),
            ("diffie-hellman-group18-sha512", DhGroup::Group18, HashAlgorithm::Sha512),
            ("diffie-hellman-group14-sha256", DhGroup::Group14, HashAlgorithm::Sha256),
            ("diffie-hellman-group14-sha1", DhGroup::Group14, HashAlgorithm::Sha1),
            ("diffie-hellman-group1-sha1", DhGroup::Group1, HashAlgorithm::Sha1),
        ] {
            registry.register_kex(
                name,
                Arc::new(move || Box::new(DhKex::new(name, group, hash)) as Box<dyn KeyExchange>),
            );
        }

        registry.register_verifier("ssh-ed25519", Arc::new(Ed25519Verifier));
        for curve in [EcdsaCurve::NistP256, EcdsaCurve::NistP384, EcdsaCurve::NistP521] {
            registry.register_verifier(curve.key_type(), Arc::new(EcdsaVerifier::new(curve)));
        }
        registry.register_verifier("rsa-sha2-512", Arc::new(RsaVerifier::new(HashAlgorithm::Sha512)));
        registry.register_verifier("rsa-sha2-256", Arc::new(RsaVerifier::new(HashAlgorithm::Sha256)));
        registry.register_verifier("ssh-rsa", Arc::new(RsaVerifier::new(HashAlgorithm::Sha1)));
        registry.register_verifier("ssh-dss", Arc::new(DsaVerifier));

        for cipher in CipherAlgorithm::ALL {
            registry.ciphers.insert(cipher.name().to_string(), cipher);
        }
        for mac in MacAlgorithm::ALL {
            registry.macs.insert(mac.name().to_string(), mac);
        }
        for method in CompressionAlgorithm::ALL {
            registry.compression.insert(method.name().to_string(), method);
        }
        registry
    }

    /// Registers (or replaces) a key exchange method.
    pub fn register_kex(&mut self, name: &str, factory: KexFactory) {
        self.kex.insert(name.to_string(), factory);
    }

    /// Registers (or replaces) a signature verifier, e.g. `ssh-ed448`.
    pub fn register_verifier(&mut self, name: &str, verifier: Arc<dyn SignatureVerifier>) {
        self.verifiers.insert(name.to_string(), verifier);
    }

    /// Removes a name from a category. Returns whether it was present.
    pub fn remove(&mut self, category: AlgorithmCategory, name: &str) -> bool {
        match category {
            AlgorithmCategory::Kex => self.kex.remove(name).is_some(),
            AlgorithmCategory::HostKey => self.verifiers.remove(name).is_some(),
            AlgorithmCategory::Cipher => self.ciphers.remove(name).is_some(),
            AlgorithmCategory::Mac => self.macs.remove(name).is_some(),
            AlgorithmCategory::Compression => self.compression.remove(name).is_some(),
        }
    }

    /// Whether `name` can be constructed. Host key algorithms are supported
    /// when a verifier exists for the name with any certificate suffix
    /// removed.
    pub fn supports(&self, category: AlgorithmCategory, name: &str) -> bool {
        match category {
            AlgorithmCategory::Kex => self.kex.contains_key(name),
            AlgorithmCategory::HostKey => self.verifiers.contains_key(base_algorithm(name)),
            AlgorithmCategory::Cipher => self.ciphers.contains_key(name),
            AlgorithmCategory::Mac => self.macs.contains_key(name),
            AlgorithmCategory::Compression => self.compression.contains_key(name),
        }
    }

    /// Keeps the names that can be constructed, in order.
    ///
    /// # Errors
    ///
    /// Returns `FynxError::Config` if nothing is left.
    pub fn filter_supported(
        &self,
        category: AlgorithmCategory,
        names: &[String],
    ) -> FynxResult<Vec<String>> {
        let (kept, dropped): (Vec<String>, Vec<String>) = names
            .iter()
            .cloned()
            .partition(|name| self.supports(category, name));
        if !dropped.is_empty() {
            debug!(%category, dropped = %dropped.join(","), "Unsupported algorithms removed");
        }
        if kept.is_empty() {
            return Err(FynxError::Config(format!(
                "No supported {} algorithm in '{}'",
                category,
                names.join(",")
            )));
        }
        Ok(kept)
    }

    /// Constructs a key exchange method.
    pub fn kex(&self, name: &str) -> FynxResult<Box<dyn KeyExchange>> {
        self.kex
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| unsupported(AlgorithmCategory::Kex, name))
    }

    /// Looks up the verifier for a signature algorithm.
    pub fn verifier(&self, name: &str) -> FynxResult<Arc<dyn SignatureVerifier>> {
        self.verifiers
            .get(name)
            .cloned()
            .ok_or_else(|| unsupported(AlgorithmCategory::HostKey, name))
    }

    /// Looks up a cipher.
    pub fn cipher(&self, name: &str) -> FynxResult<CipherAlgorithm> {
        self.ciphers
            .get(name)
            .copied()
            .ok_or_else(|| unsupported(AlgorithmCategory::Cipher, name))
    }

    /// Looks up a MAC.
    pub fn mac(&self, name: &str) -> FynxResult<MacAlgorithm> {
        self.macs
            .get(name)
            .copied()
            .ok_or_else(|| unsupported(AlgorithmCategory::Mac, name))
    }

    /// Looks up a compression method.
    pub fn compression(&self, name: &str) -> FynxResult<CompressionAlgorithm> {
        self.compression
            .get(name)
            .copied()
            .ok_or_else(|| unsupported(AlgorithmCategory::Compression, name))
    }
}

fn unsupported(category: AlgorithmCategory, name: &str) -> FynxError {
    FynxError::UnsupportedAlgorithm(format!("{} algorithm '{}'", category, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hostkey::PublicKey;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults_cover_all_kex_methods() {
        let registry = AlgorithmRegistry::with_defaults();
        for name in [
            "mlkem768x25519-sha256",
            "mlkem768nistp256-sha256",
            "mlkem1024nistp384-sha384",
            "curve25519-sha256",
            "curve25519-sha256@libssh.org",
            "ecdh-sha2-nistp256",
            "ecdh-sha2-nistp384",
            "ecdh-sha2-nistp521",
            "diffie-hellman-group-exchange-sha256",
            "diffie-hellman-group-exchange-sha1",
            "diffie-hellman-group16-sha512",
            "diffie-hellman-group18-sha512",
            "diffie-hellman-group14-sha256",
            "diffie-hellman-group14-sha1",
            "diffie-hellman-group1-sha1",
        ] {
            let kex = registry.kex(name).unwrap();
            assert_eq!(kex.name(), name);
        }
    }

    #[test]
    fn test_unknown_name_is_unsupported() {
        let registry = AlgorithmRegistry::with_defaults();
        assert!(matches!(
            registry.kex("sntrup761x25519-sha512"),
            Err(FynxError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            registry.verifier("ssh-ed448"),
            Err(FynxError::UnsupportedAlgorithm(_))
        ));
        assert!(registry.cipher("3des-cbc").is_err());
        assert!(registry.mac("hmac-md5").is_err());
        assert!(registry.compression("lz4").is_err());
    }

    #[test]
    fn test_host_key_support_includes_certificates() {
        let registry = AlgorithmRegistry::with_defaults();
        assert!(registry.supports(AlgorithmCategory::HostKey, "ssh-ed25519"));
        assert!(registry.supports(
            AlgorithmCategory::HostKey,
            "ssh-ed25519-cert-v01@openssh.com"
        ));
        assert!(!registry.supports(AlgorithmCategory::HostKey, "ssh-ed448"));
    }

    #[test]
    fn test_filter_supported_keeps_order() {
        let registry = AlgorithmRegistry::with_defaults();
        let kept = registry
            .filter_supported(
                AlgorithmCategory::Cipher,
                &names(&["aes256-ctr", "blowfish-cbc", "aes128-gcm@openssh.com"]),
            )
            .unwrap();
        assert_eq!(kept, names(&["aes256-ctr", "aes128-gcm@openssh.com"]));
    }

    #[test]
    fn test_filter_supported_empty_is_config_error() {
        let registry = AlgorithmRegistry::with_defaults();
        match registry.filter_supported(AlgorithmCategory::Kex, &names(&["sntrup761x25519-sha512"])) {
            Err(FynxError::Config(msg)) => assert!(msg.contains("kex")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_remove_and_register_verifier() {
        struct AcceptAll;
        impl SignatureVerifier for AcceptAll {
            fn verify(&self, _: &PublicKey, _: &[u8], _: &[u8]) -> FynxResult<bool> {
                Ok(true)
            }
        }

        let mut registry = AlgorithmRegistry::with_defaults();
        assert!(registry.remove(AlgorithmCategory::Cipher, "aes128-cbc"));
        assert!(!registry.remove(AlgorithmCategory::Cipher, "aes128-cbc"));
        assert!(!registry.supports(AlgorithmCategory::Cipher, "aes128-cbc"));

        registry.register_verifier("ssh-ed448", Arc::new(AcceptAll));
        assert!(registry.supports(AlgorithmCategory::HostKey, "ssh-ed448"));
    }
}
