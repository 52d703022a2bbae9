//! SSH key exchange (RFC 4253 Section 7).
//!
//! This module holds the pieces shared by every key exchange method:
//!
//! - SSH_MSG_KEXINIT and SSH_MSG_NEWKEYS
//! - Algorithm negotiation ([`guess`])
//! - The [`KeyExchange`] state machine contract
//! - Exchange hash assembly and host key signature verification
//!
//! # Key Exchange Flow
//!
//! 1. Both sides send SSH_MSG_KEXINIT
//! 2. Algorithm negotiation (client preference wins)
//! 3. Method-specific messages (DH, ECDH, hybrid KEM, group exchange)
//! 4. The client verifies the host key signature over H
//! 5. Both sides send SSH_MSG_NEWKEYS and switch keys
//!
//! # Example
//!
//! ```rust
//! use fynx_ssh::kex::{guess, Proposal};
//!
//! let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
//! let mut client = Proposal::default();
//! let mut server = Proposal::default();
//! for p in [&mut client, &mut server] {
//!     p.kex = names(&["curve25519-sha256"]);
//!     p.host_key = names(&["ssh-ed25519"]);
//!     p.mac_c2s = names(&["hmac-sha2-256"]);
//!     p.mac_s2c = names(&["hmac-sha2-256"]);
//!     p.compression_c2s = names(&["none"]);
//!     p.compression_s2c = names(&["none"]);
//! }
//! client.cipher_c2s = names(&["aes128-ctr", "aes256-ctr"]);
//! client.cipher_s2c = names(&["aes128-ctr", "aes256-ctr"]);
//! server.cipher_c2s = names(&["aes256-ctr"]);
//! server.cipher_s2c = names(&["aes256-ctr"]);
//!
//! let negotiated = guess(&server, &client).unwrap();
//! assert_eq!(negotiated.cipher_c2s, "aes256-ctr");
//! ```

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use fynx_platform::{FynxError, FynxResult};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crypto::{CipherAlgorithm, HashAlgorithm};
use crate::hostkey::{base_algorithm, key_type_for_algorithm, verify_signature, HostKey};
use crate::message::{expect_type, MessageType};
use crate::registry::AlgorithmRegistry;
use crate::rng::SecureRandom;
use crate::wire::{read_bool, read_fixed, read_name_list, write_bool, write_name_list};

/// Marker name a client lists to request SSH_MSG_EXT_INFO (RFC 8308).
pub const EXT_INFO_CLIENT: &str = "ext-info-c";

/// Marker name a server lists when it will send SSH_MSG_EXT_INFO.
pub const EXT_INFO_SERVER: &str = "ext-info-s";

/// Ten algorithm name-lists of one side, in preference order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proposal {
    /// Key exchange methods
    pub kex: Vec<String>,
    /// Server host key algorithms
    pub host_key: Vec<String>,
    /// Ciphers client to server
    pub cipher_c2s: Vec<String>,
    /// Ciphers server to client
    pub cipher_s2c: Vec<String>,
    /// MACs client to server
    pub mac_c2s: Vec<String>,
    /// MACs server to client
    pub mac_s2c: Vec<String>,
    /// Compression client to server
    pub compression_c2s: Vec<String>,
    /// Compression server to client
    pub compression_s2c: Vec<String>,
    /// Languages client to server (usually empty)
    pub language_c2s: Vec<String>,
    /// Languages server to client (usually empty)
    pub language_s2c: Vec<String>,
}

impl Proposal {
    fn lists(&self) -> [&Vec<String>; 10] {
        [
            &self.kex,
            &self.host_key,
            &self.cipher_c2s,
            &self.cipher_s2c,
            &self.mac_c2s,
            &self.mac_s2c,
            &self.compression_c2s,
            &self.compression_s2c,
            &self.language_c2s,
            &self.language_s2c,
        ]
    }
}

/// SSH_MSG_KEXINIT message (RFC 4253 Section 7.1).
///
/// The exact payload is kept because it is hashed verbatim into H
/// (`I_C` / `I_S`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexInit {
    cookie: [u8; 16],
    proposal: Proposal,
    first_kex_packet_follows: bool,
    raw: Vec<u8>,
}

impl KexInit {
    /// Builds a KEXINIT with a random cookie.
    pub fn new(proposal: Proposal, rng: &SecureRandom) -> Self {
        let mut cookie = [0u8; 16];
        rng.fill(&mut cookie);
        Self::with_cookie(cookie, proposal)
    }

    /// Builds a KEXINIT with a fixed cookie.
    pub fn with_cookie(cookie: [u8; 16], proposal: Proposal) -> Self {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::KexInit as u8);
        buf.put_slice(&cookie);
        for list in proposal.lists() {
            write_name_list(&mut buf, list);
        }
        write_bool(&mut buf, false);
        buf.put_u32(0);

        Self {
            cookie,
            proposal,
            first_kex_packet_follows: false,
            raw: buf.to_vec(),
        }
    }

    /// Returns the cookie.
    pub fn cookie(&self) -> &[u8; 16] {
        &self.cookie
    }

    /// Returns the algorithm lists.
    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    /// Returns whether a guessed KEX packet follows.
    pub fn first_kex_packet_follows(&self) -> bool {
        self.first_kex_packet_follows
    }

    /// Returns the payload exactly as sent or received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Parses a KEXINIT payload.
    ///
    /// # Errors
    ///
    /// Returns [`FynxError::Protocol`] if the message type is wrong or a
    /// field is truncated.
    pub fn from_bytes(data: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        expect_type(data, &mut offset, MessageType::KexInit)?;
        let mut cookie = [0u8; 16];
        cookie.copy_from_slice(read_fixed(data, &mut offset, 16)?);

        let proposal = Proposal {
            kex: read_name_list(data, &mut offset)?,
            host_key: read_name_list(data, &mut offset)?,
            cipher_c2s: read_name_list(data, &mut offset)?,
            cipher_s2c: read_name_list(data, &mut offset)?,
            mac_c2s: read_name_list(data, &mut offset)?,
            mac_s2c: read_name_list(data, &mut offset)?,
            compression_c2s: read_name_list(data, &mut offset)?,
            compression_s2c: read_name_list(data, &mut offset)?,
            language_c2s: read_name_list(data, &mut offset)?,
            language_s2c: read_name_list(data, &mut offset)?,
        };
        let first_kex_packet_follows = read_bool(data, &mut offset)?;
        read_fixed(data, &mut offset, 4)?;

        Ok(Self {
            cookie,
            proposal,
            first_kex_packet_follows,
            raw: data.to_vec(),
        })
    }
}

/// SSH_MSG_NEWKEYS message (RFC 4253 Section 7.3).
///
/// The packet sequence number is NOT reset when keys change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NewKeys;

impl NewKeys {
    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![MessageType::NewKeys as u8]
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        expect_type(data, &mut offset, MessageType::NewKeys)?;
        Ok(Self)
    }
}

/// Result of negotiation: one algorithm per category.
///
/// MAC slots hold `"none"` when the matching cipher is AEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedAlgorithms {
    /// Key exchange method
    pub kex: String,
    /// Host key algorithm
    pub host_key: String,
    /// Cipher client to server
    pub cipher_c2s: String,
    /// Cipher server to client
    pub cipher_s2c: String,
    /// MAC client to server
    pub mac_c2s: String,
    /// MAC server to client
    pub mac_s2c: String,
    /// Compression client to server
    pub compression_c2s: String,
    /// Compression server to client
    pub compression_s2c: String,
    /// Language client to server
    pub language_c2s: String,
    /// Language server to client
    pub language_s2c: String,
}

fn first_match(
    category: &str,
    client: &[String],
    server: &[String],
    optional: bool,
) -> FynxResult<String> {
    if let Some(found) = client.iter().find(|c| server.contains(c)) {
        return Ok(found.clone());
    }
    if optional {
        return Ok(String::new());
    }
    Err(FynxError::Negotiation {
        category: category.to_string(),
        client: client.join(","),
        server: server.join(","),
    })
}

fn is_aead(cipher: &str) -> bool {
    CipherAlgorithm::from_name(cipher).map_or(false, |c| c.is_aead())
}

/// Negotiates one algorithm per category.
///
/// For each category the client's list is scanned in order and the first
/// name also present in the server's list wins. Languages may come out
/// empty; every other category fails with [`FynxError::Negotiation`]
/// naming the category. When a cipher is AEAD its MAC slot is `"none"`.
pub fn guess(server: &Proposal, client: &Proposal) -> FynxResult<NegotiatedAlgorithms> {
    let kex = first_match("kex", &client.kex, &server.kex, false)?;
    let host_key = first_match("host key", &client.host_key, &server.host_key, false)?;
    let cipher_c2s = first_match("cipher c2s", &client.cipher_c2s, &server.cipher_c2s, false)?;
    let cipher_s2c = first_match("cipher s2c", &client.cipher_s2c, &server.cipher_s2c, false)?;

    let mac_c2s = if is_aead(&cipher_c2s) {
        "none".to_string()
    } else {
        first_match("mac c2s", &client.mac_c2s, &server.mac_c2s, false)?
    };
    let mac_s2c = if is_aead(&cipher_s2c) {
        "none".to_string()
    } else {
        first_match("mac s2c", &client.mac_s2c, &server.mac_s2c, false)?
    };

    let negotiated = NegotiatedAlgorithms {
        kex,
        host_key,
        cipher_c2s,
        cipher_s2c,
        mac_c2s,
        mac_s2c,
        compression_c2s: first_match(
            "compression c2s",
            &client.compression_c2s,
            &server.compression_c2s,
            false,
        )?,
        compression_s2c: first_match(
            "compression s2c",
            &client.compression_s2c,
            &server.compression_s2c,
            false,
        )?,
        language_c2s: first_match("language c2s", &client.language_c2s, &server.language_c2s, true)?,
        language_s2c: first_match("language s2c", &client.language_s2c, &server.language_s2c, true)?,
    };

    info!(kex = %negotiated.kex, host_key = %negotiated.host_key, "kex: algorithm negotiated");
    info!(
        "kex: server->client cipher: {} MAC: {} compression: {}",
        negotiated.cipher_s2c,
        if is_aead(&negotiated.cipher_s2c) { "<implicit>" } else { negotiated.mac_s2c.as_str() },
        negotiated.compression_s2c
    );
    info!(
        "kex: client->server cipher: {} MAC: {} compression: {}",
        negotiated.cipher_c2s,
        if is_aead(&negotiated.cipher_c2s) { "<implicit>" } else { negotiated.mac_c2s.as_str() },
        negotiated.compression_c2s
    );
    Ok(negotiated)
}

/// Rejects negotiated results that are never acceptable.
///
/// - `ext-info-c` / `ext-info-s` are markers, not key exchange methods.
/// - The `none` cipher is refused before user authentication.
pub fn check_negotiated(negotiated: &NegotiatedAlgorithms, authenticated: bool) -> FynxResult<()> {
    if negotiated.kex == EXT_INFO_CLIENT || negotiated.kex == EXT_INFO_SERVER {
        return Err(FynxError::Protocol(format!(
            "Invalid key exchange method negotiated: {}",
            negotiated.kex
        )));
    }
    if !authenticated && (negotiated.cipher_c2s == "none" || negotiated.cipher_s2c == "none") {
        return Err(FynxError::Protocol(
            "The none cipher must not be used before authentication".to_string(),
        ));
    }
    Ok(())
}

/// Handshake progress of a key exchange method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KexState {
    /// Nothing sent yet
    Uninitialized,
    /// INIT (or REQUEST) sent, waiting for the server
    AwaitingReply,
    /// K and H computed and the signature verified
    Done,
}

/// Values every method hashes into H, plus what is needed to check the
/// host key signature.
#[derive(Clone)]
pub struct ExchangeContext {
    /// V_C without CR LF
    pub client_version: String,
    /// V_S without CR LF
    pub server_version: String,
    /// I_C, the client's KEXINIT payload
    pub client_kexinit: Vec<u8>,
    /// I_S, the server's KEXINIT payload
    pub server_kexinit: Vec<u8>,
    /// Negotiated host key algorithm
    pub host_key_algorithm: String,
    /// Signature verifiers
    pub registry: Arc<AlgorithmRegistry>,
}

/// Completed key exchange.
pub struct KexOutput {
    /// K, already encoded (mpint for classical methods, string for hybrid)
    pub shared_secret: Zeroizing<Vec<u8>>,
    /// Exchange hash H
    pub exchange_hash: Vec<u8>,
    /// Server host key (K_S)
    pub host_key: HostKey,
    /// Method hash function
    pub hash: HashAlgorithm,
}

impl std::fmt::Debug for KexOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KexOutput")
            .field("shared_secret", &"<redacted>")
            .field("exchange_hash", &hex::encode(&self.exchange_hash))
            .field("host_key", &self.host_key.key_type())
            .field("hash", &self.hash)
            .finish()
    }
}

/// What the engine does after feeding a message to a method.
#[derive(Debug)]
pub enum KexStep {
    /// Send this payload and keep waiting
    Send(Vec<u8>),
    /// Handshake finished
    Done(KexOutput),
}

/// One key exchange method.
///
/// Every method follows `Uninitialized -> AwaitingReply -> Done`. Secrets
/// are dropped (and zeroed) as soon as K is known.
pub trait KeyExchange: Send {
    /// Method name as negotiated.
    fn name(&self) -> &str;

    /// Hash function for H and key derivation.
    fn hash(&self) -> HashAlgorithm;

    /// Current state.
    fn state(&self) -> KexState;

    /// Produces the first client message (INIT or group REQUEST).
    fn start(&mut self, rng: &SecureRandom) -> FynxResult<Vec<u8>>;

    /// Consumes a server message in the 30-49 range.
    fn handle(
        &mut self,
        ctx: &ExchangeContext,
        message: &[u8],
        rng: &SecureRandom,
    ) -> FynxResult<KexStep>;
}

/// Builds the exchange hash input.
///
/// Starts with `string V_C, string V_S, string I_C, string I_S`; each
/// method appends its own fields in order.
pub(crate) struct ExchangeHash {
    buf: Zeroizing<Vec<u8>>,
}

impl ExchangeHash {
    pub(crate) fn new(ctx: &ExchangeContext) -> Self {
        let mut h = Self {
            buf: Zeroizing::new(Vec::with_capacity(2048)),
        };
        h.string(ctx.client_version.as_bytes());
        h.string(ctx.server_version.as_bytes());
        h.string(&ctx.client_kexinit);
        h.string(&ctx.server_kexinit);
        h
    }

    pub(crate) fn string(&mut self, value: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    pub(crate) fn mpint(&mut self, magnitude: &[u8]) -> &mut Self {
        let start = magnitude
            .iter()
            .position(|b| *b != 0)
            .unwrap_or(magnitude.len());
        let trimmed = &magnitude[start..];
        let pad = trimmed.first().map_or(false, |b| b & 0x80 != 0);
        let len = trimmed.len() + usize::from(pad);
        self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        if pad {
            self.buf.push(0);
        }
        self.buf.extend_from_slice(trimmed);
        self
    }

    pub(crate) fn uint32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Appends already-encoded bytes (K).
    pub(crate) fn raw(&mut self, encoded: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(encoded);
        self
    }

    pub(crate) fn finish(&self, hash: HashAlgorithm) -> Vec<u8> {
        hash.digest(&[&self.buf[..]])
    }
}

/// Parses K_S, checks it against the negotiated algorithm and verifies the
/// server's signature over H.
pub(crate) fn finish_exchange(
    ctx: &ExchangeContext,
    hash: HashAlgorithm,
    host_key_blob: &[u8],
    shared_secret: Zeroizing<Vec<u8>>,
    exchange_hash: Vec<u8>,
    signature: &[u8],
) -> FynxResult<KexOutput> {
    let host_key = HostKey::parse(host_key_blob)?;
    let expected_type = key_type_for_algorithm(&ctx.host_key_algorithm);
    if host_key.key_type() != expected_type {
        return Err(FynxError::Protocol(format!(
            "Host key type '{}' does not match negotiated algorithm '{}'",
            host_key.key_type(),
            ctx.host_key_algorithm
        )));
    }
    verify_signature(
        &ctx.registry,
        host_key.key().signing_key(),
        base_algorithm(&ctx.host_key_algorithm),
        &exchange_hash,
        signature,
    )?;
    debug!(
        host_key = %host_key.key_type(),
        fingerprint = %host_key.fingerprint(),
        "Host key signature verified"
    );
    Ok(KexOutput {
        shared_secret,
        exchange_hash,
        host_key,
        hash,
    })
}

/// Error for a message that arrives in the wrong handshake state.
pub(crate) fn unexpected(method: &str, message: &[u8], state: KexState) -> FynxError {
    FynxError::Protocol(format!(
        "Unexpected message {} for {} in state {:?}",
        message.first().copied().unwrap_or(0),
        method,
        state
    ))
}


#[cfg(test)]
mod tests {
    use super::testing::{names, proposal};
    use super::*;

    #[test]
    fn test_kexinit_round_trip_keeps_raw_bytes() {
        let original = KexInit::with_cookie([7u8; 16], proposal(&["aes128-ctr"]));
        let parsed = KexInit::from_bytes(original.as_bytes()).unwrap();
        assert_eq!(parsed.cookie(), &[7u8; 16]);
        assert_eq!(parsed.proposal(), original.proposal());
        assert_eq!(parsed.as_bytes(), original.as_bytes());
        assert!(!parsed.first_kex_packet_follows());
    }

    #[test]
    fn test_kexinit_parse_invalid_type() {
        let mut data = vec![99];
        data.extend_from_slice(&[0u8; 60]);
        match KexInit::from_bytes(&data) {
            Err(FynxError::Protocol(msg)) => assert!(msg.contains("Invalid message type")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_kexinit_parse_truncated() {
        let full = KexInit::with_cookie([1u8; 16], proposal(&["aes128-ctr"]));
        let bytes = full.as_bytes();
        assert!(KexInit::from_bytes(&bytes[..bytes.len() - 2]).is_err());
        assert!(KexInit::from_bytes(&[20, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_newkeys() {
        assert_eq!(NewKeys.to_bytes(), vec![21]);
        assert_eq!(NewKeys::from_bytes(&[21]).unwrap(), NewKeys);
        assert!(NewKeys::from_bytes(&[20]).is_err());
        assert!(NewKeys::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_guess_client_preference_wins() {
        let client = proposal(&["aes128-ctr", "aes256-ctr"]);
        let server = proposal(&["aes256-ctr"]);
        let negotiated = guess(&server, &client).unwrap();
        assert_eq!(negotiated.cipher_c2s, "aes256-ctr");
        assert_eq!(negotiated.cipher_s2c, "aes256-ctr");
        assert_eq!(negotiated.kex, "curve25519-sha256");
        assert_eq!(negotiated.mac_c2s, "hmac-sha2-256");
        assert_eq!(negotiated.language_c2s, "");
    }

    #[test]
    fn test_guess_order_follows_client_not_server() {
        let client = proposal(&["aes256-ctr", "aes128-ctr"]);
        let server = proposal(&["aes128-ctr", "aes256-ctr"]);
        assert_eq!(guess(&server, &client).unwrap().cipher_c2s, "aes256-ctr");
    }

    #[test]
    fn test_guess_no_match_names_category() {
        let client = proposal(&["aes128-ctr"]);
        let mut server = proposal(&["aes128-ctr"]);
        server.mac_s2c = names(&["hmac-md5"]);
        match guess(&server, &client) {
            Err(FynxError::Negotiation {
                category,
                client,
                server,
            }) => {
                assert_eq!(category, "mac s2c");
                assert_eq!(client, "hmac-sha2-256,hmac-sha1");
                assert_eq!(server, "hmac-md5");
            }
            other => panic!("Expected Negotiation error, got {:?}", other),
        }
    }

    #[test]
    fn test_guess_empty_required_list_fails() {
        let client = proposal(&["aes128-ctr"]);
        let mut server = proposal(&["aes128-ctr"]);
        server.kex.clear();
        assert!(matches!(
            guess(&server, &client),
            Err(FynxError::Negotiation { .. })
        ));
    }

    #[test]
    fn test_guess_aead_forces_mac_none() {
        let client = proposal(&["chacha20-poly1305@openssh.com", "aes128-ctr"]);
        let mut server = proposal(&["chacha20-poly1305@openssh.com"]);
        // The MAC lists do not intersect; AEAD does not need them.
        server.mac_c2s = names(&["hmac-md5"]);
        server.mac_s2c = names(&["hmac-md5"]);
        let negotiated = guess(&server, &client).unwrap();
        assert_eq!(negotiated.mac_c2s, "none");
        assert_eq!(negotiated.mac_s2c, "none");
    }

    #[test]
    fn test_guess_mixed_directions() {
        let client = proposal(&["aes256-gcm@openssh.com", "aes128-ctr"]);
        let mut server = proposal(&["aes128-ctr"]);
        server.cipher_s2c = names(&["aes256-gcm@openssh.com"]);
        let negotiated = guess(&server, &client).unwrap();
        assert_eq!(negotiated.cipher_c2s, "aes128-ctr");
        assert_eq!(negotiated.mac_c2s, "hmac-sha2-256");
        assert_eq!(negotiated.cipher_s2c, "aes256-gcm@openssh.com");
        assert_eq!(negotiated.mac_s2c, "none");
    }

    #[test]
    fn test_guess_languages_optional() {
        let mut client = proposal(&["aes128-ctr"]);
        let mut server = proposal(&["aes128-ctr"]);
        client.language_c2s = names(&["en-US"]);
        server.language_c2s = names(&["fr"]);
        server.language_s2c = names(&["fr"]);
        let negotiated = guess(&server, &client).unwrap();
        assert_eq!(negotiated.language_c2s, "");
        assert_eq!(negotiated.language_s2c, "");
    }

    #[test]
    fn test_check_negotiated_rejects_ext_info_marker() {
        let mut client = proposal(&["aes128-ctr"]);
        let mut server = proposal(&["aes128-ctr"]);
        client.kex = names(&[EXT_INFO_CLIENT]);
        server.kex = names(&[EXT_INFO_CLIENT]);
        let negotiated = guess(&server, &client).unwrap();
        assert!(check_negotiated(&negotiated, false).is_err());
    }

    #[test]
    fn test_check_negotiated_none_cipher_before_auth() {
        let negotiated = guess(&proposal(&["none"]), &proposal(&["none"])).unwrap();
        assert!(check_negotiated(&negotiated, false).is_err());
        assert!(check_negotiated(&negotiated, true).is_ok());
    }

    #[test]
    fn test_exchange_hash_mpint_encoding() {
        let ctx = ExchangeContext {
            client_version: "SSH-2.0-a".to_string(),
            server_version: "SSH-2.0-b".to_string(),
            client_kexinit: vec![20],
            server_kexinit: vec![20],
            host_key_algorithm: "ssh-ed25519".to_string(),
            registry: Arc::new(AlgorithmRegistry::with_defaults()),
        };
        let mut a = ExchangeHash::new(&ctx);
        a.mpint(&[0, 0, 0x80]);
        let mut b = ExchangeHash::new(&ctx);
        b.raw(&[0, 0, 0, 2, 0, 0x80]);
        assert_eq!(a.finish(HashAlgorithm::Sha256), b.finish(HashAlgorithm::Sha256));
    }
}
