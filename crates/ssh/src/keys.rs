//! Session key derivation (RFC 4253 Section 7.2).
//!
//! ```text
//! IV c->s   = HASH(K || H || "A" || session_id)
//! IV s->c   = HASH(K || H || "B" || session_id)
//! Key c->s  = HASH(K || H || "C" || session_id)
//! Key s->c  = HASH(K || H || "D" || session_id)
//! MAC c->s  = HASH(K || H || "E" || session_id)
//! MAC s->c  = HASH(K || H || "F" || session_id)
//! ```
//!
//! K is passed already encoded (mpint for classical methods, string for
//! hybrid ones). Outputs shorter than needed are extended with
//! `HASH(K || H || key so far)` and then truncated.

use fynx_platform::{FynxError, FynxResult};
use tracing::debug;
use zeroize::Zeroizing;

use crate::compression::{CompressionAlgorithm, Compressor, Decompressor};
use crate::crypto::{CipherAlgorithm, HashAlgorithm, MacAlgorithm, MacKey};
use crate::kex::NegotiatedAlgorithms;
use crate::packet::{OpeningState, SealingState};
use crate::registry::AlgorithmRegistry;

/// Derives one key of `len` bytes for `tag` (`b'A'..=b'F'`).
///
/// # Example
///
/// ```rust
/// use fynx_ssh::crypto::HashAlgorithm;
/// use fynx_ssh::keys::derive_key;
///
/// let k = [0u8, 0, 0, 1, 0x42];
/// let h = [1u8; 32];
/// let key = derive_key(HashAlgorithm::Sha256, &k, &h, &h, b'C', 64);
/// assert_eq!(key.len(), 64);
/// ```
pub fn derive_key(
    hash: HashAlgorithm,
    shared_secret: &[u8],
    exchange_hash: &[u8],
    session_id: &[u8],
    tag: u8,
    len: usize,
) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(hash.digest(&[shared_secret, exchange_hash, &[tag], session_id]));
    while key.len() < len {
        let more = Zeroizing::new(hash.digest(&[shared_secret, exchange_hash, &key[..]]));
        key.extend_from_slice(&more);
    }
    key.truncate(len);
    key
}

/// Algorithms for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionAlgorithms {
    /// Cipher
    pub cipher: CipherAlgorithm,
    /// MAC, absent for AEAD ciphers
    pub mac: Option<MacAlgorithm>,
    /// Compression
    pub compression: CompressionAlgorithm,
}

impl DirectionAlgorithms {
    /// Resolves negotiated names through the registry.
    pub fn resolve(
        registry: &AlgorithmRegistry,
        cipher: &str,
        mac: &str,
        compression: &str,
    ) -> FynxResult<Self> {
        let cipher = registry.cipher(cipher)?;
        let mac = if cipher.is_aead() {
            None
        } else if mac == "none" {
            return Err(FynxError::Protocol(format!(
                "Cipher {} needs a MAC",
                cipher.name()
            )));
        } else {
            Some(registry.mac(mac)?)
        };
        Ok(Self {
            cipher,
            mac,
            compression: registry.compression(compression)?,
        })
    }

    fn mac_key_size(&self) -> usize {
        self.mac.map_or(0, |m| m.key_size())
    }
}

/// The six derived values. Zeroed on drop.
pub struct SessionKeys {
    /// IV client to server ('A')
    pub iv_c2s: Zeroizing<Vec<u8>>,
    /// IV server to client ('B')
    pub iv_s2c: Zeroizing<Vec<u8>>,
    /// Encryption key client to server ('C')
    pub enc_c2s: Zeroizing<Vec<u8>>,
    /// Encryption key server to client ('D')
    pub enc_s2c: Zeroizing<Vec<u8>>,
    /// Integrity key client to server ('E')
    pub mac_c2s: Zeroizing<Vec<u8>>,
    /// Integrity key server to client ('F')
    pub mac_s2c: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("iv_c2s", &"<redacted>")
            .field("iv_s2c", &"<redacted>")
            .field("enc_c2s", &"<redacted>")
            .field("enc_s2c", &"<redacted>")
            .field("mac_c2s", &"<redacted>")
            .field("mac_s2c", &"<redacted>")
            .finish()
    }
}

impl SessionKeys {
    /// Derives all six values sized for the given algorithms.
    pub fn derive(
        hash: HashAlgorithm,
        shared_secret: &[u8],
        exchange_hash: &[u8],
        session_id: &[u8],
        c2s: &DirectionAlgorithms,
        s2c: &DirectionAlgorithms,
    ) -> Self {
        let derive = |tag: u8, len: usize| {
            derive_key(hash, shared_secret, exchange_hash, session_id, tag, len)
        };
        Self {
            iv_c2s: derive(b'A', c2s.cipher.iv_size()),
            iv_s2c: derive(b'B', s2c.cipher.iv_size()),
            enc_c2s: derive(b'C', c2s.cipher.key_size()),
            enc_s2c: derive(b'D', s2c.cipher.key_size()),
            mac_c2s: derive(b'E', c2s.mac_key_size()),
            mac_s2c: derive(b'F', s2c.mac_key_size()),
        }
    }
}

/// Builds both packet states for a finished key exchange.
///
/// The caller installs them only after NEWKEYS has been both sent and
/// received.
pub fn build_states(
    registry: &AlgorithmRegistry,
    negotiated: &NegotiatedAlgorithms,
    hash: HashAlgorithm,
    shared_secret: &[u8],
    exchange_hash: &[u8],
    session_id: &[u8],
    authenticated: bool,
) -> FynxResult<(SealingState, OpeningState)> {
    let c2s = DirectionAlgorithms::resolve(
        registry,
        &negotiated.cipher_c2s,
        &negotiated.mac_c2s,
        &negotiated.compression_c2s,
    )?;
    let s2c = DirectionAlgorithms::resolve(
        registry,
        &negotiated.cipher_s2c,
        &negotiated.mac_s2c,
        &negotiated.compression_s2c,
    )?;
    let keys = SessionKeys::derive(hash, shared_secret, exchange_hash, session_id, &c2s, &s2c);

    let sealing = SealingState::new(
        c2s.cipher,
        c2s.cipher.sealing(&keys.enc_c2s, &keys.iv_c2s)?,
        c2s.mac.map(|m| MacKey::new(m, &keys.mac_c2s)).transpose()?,
        Compressor::new(c2s.compression, authenticated),
    );
    let opening = OpeningState::new(
        s2c.cipher,
        s2c.cipher.opening(&keys.enc_s2c, &keys.iv_s2c)?,
        s2c.mac.map(|m| MacKey::new(m, &keys.mac_s2c)).transpose()?,
        Decompressor::new(s2c.compression, authenticated),
    );
    debug!(
        cipher_c2s = c2s.cipher.name(),
        cipher_s2c = s2c.cipher.name(),
        "Derived session keys"
    );
    Ok((sealing, opening))
}
