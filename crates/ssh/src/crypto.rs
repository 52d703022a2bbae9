//! SSH packet ciphers, MACs and hash functions.
//!
//! - ChaCha20-Poly1305 (`chacha20-poly1305@openssh.com`, AEAD, encrypted length)
//! - AES-128/256-GCM (`aes*-gcm@openssh.com`, AEAD, clear length)
//! - AES-128/192/256-CTR and AES-128/192/256-CBC (separate MAC)
//! - HMAC-SHA1, HMAC-SHA1-96, HMAC-SHA2-256/512 and their EtM variants
//!
//! Each direction owns one [`SealingCipher`] or [`OpeningCipher`]. Cipher
//! state (CTR counter, CBC chaining value, GCM invocation counter) carries
//! over from one packet to the next.

use aes::{Aes128, Aes192, Aes256};
use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use fynx_platform::{FynxError, FynxResult};
use hmac::{Hmac, Mac};
use ring::aead::chacha20_poly1305_openssh;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM, AES_256_GCM};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Hash function used by a key exchange method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    fn ring_algorithm(&self) -> &'static ring::digest::Algorithm {
        match self {
            HashAlgorithm::Sha1 => &ring::digest::SHA1_FOR_LEGACY_USE_ONLY,
            HashAlgorithm::Sha256 => &ring::digest::SHA256,
            HashAlgorithm::Sha384 => &ring::digest::SHA384,
            HashAlgorithm::Sha512 => &ring::digest::SHA512,
        }
    }

    /// Digest output length in bytes.
    pub fn output_len(&self) -> usize {
        self.ring_algorithm().output_len()
    }

    /// Starts an incremental hash.
    pub fn context(&self) -> ring::digest::Context {
        ring::digest::Context::new(self.ring_algorithm())
    }

    /// Hashes the concatenation of `parts`.
    pub fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        let mut ctx = self.context();
        for part in parts {
            ctx.update(part);
        }
        ctx.finish().as_ref().to_vec()
    }
}

/// Packet cipher algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    /// No encryption (before the first NEWKEYS)
    None,
    /// ChaCha20-Poly1305 AEAD cipher
    ChaCha20Poly1305,
    /// AES-128-GCM AEAD cipher
    Aes128Gcm,
    /// AES-256-GCM AEAD cipher
    Aes256Gcm,
    /// AES-128-CTR
    Aes128Ctr,
    /// AES-192-CTR
    Aes192Ctr,
    /// AES-256-CTR
    Aes256Ctr,
    /// AES-128-CBC
    Aes128Cbc,
    /// AES-192-CBC
    Aes192Cbc,
    /// AES-256-CBC
    Aes256Cbc,
}

impl CipherAlgorithm {
    /// All ciphers this crate implements, in default preference order.
    pub const ALL: [CipherAlgorithm; 10] = [
        CipherAlgorithm::ChaCha20Poly1305,
        CipherAlgorithm::Aes128Gcm,
        CipherAlgorithm::Aes256Gcm,
        CipherAlgorithm::Aes128Ctr,
        CipherAlgorithm::Aes192Ctr,
        CipherAlgorithm::Aes256Ctr,
        CipherAlgorithm::Aes128Cbc,
        CipherAlgorithm::Aes192Cbc,
        CipherAlgorithm::Aes256Cbc,
        CipherAlgorithm::None,
    ];

    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::None => "none",
            CipherAlgorithm::ChaCha20Poly1305 => "chacha20-poly1305@openssh.com",
            CipherAlgorithm::Aes128Gcm => "aes128-gcm@openssh.com",
            CipherAlgorithm::Aes256Gcm => "aes256-gcm@openssh.com",
            CipherAlgorithm::Aes128Ctr => "aes128-ctr",
            CipherAlgorithm::Aes192Ctr => "aes192-ctr",
            CipherAlgorithm::Aes256Ctr => "aes256-ctr",
            CipherAlgorithm::Aes128Cbc => "aes128-cbc",
            CipherAlgorithm::Aes192Cbc => "aes192-cbc",
            CipherAlgorithm::Aes256Cbc => "aes256-cbc",
        }
    }

    /// Parses cipher algorithm from name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    /// Key size in bytes. ChaCha20-Poly1305 takes two 256-bit keys.
    pub fn key_size(&self) -> usize {
        match self {
            CipherAlgorithm::None => 0,
            CipherAlgorithm::ChaCha20Poly1305 => 64,
            CipherAlgorithm::Aes128Gcm | CipherAlgorithm::Aes128Ctr | CipherAlgorithm::Aes128Cbc => 16,
            CipherAlgorithm::Aes192Ctr | CipherAlgorithm::Aes192Cbc => 24,
            CipherAlgorithm::Aes256Gcm | CipherAlgorithm::Aes256Ctr | CipherAlgorithm::Aes256Cbc => 32,
        }
    }

    /// IV size in bytes.
    pub fn iv_size(&self) -> usize {
        match self {
            CipherAlgorithm::None | CipherAlgorithm::ChaCha20Poly1305 => 0,
            CipherAlgorithm::Aes128Gcm | CipherAlgorithm::Aes256Gcm => 12,
            _ => 16,
        }
    }

    /// Cipher block size used for padding alignment (at least 8).
    pub fn block_size(&self) -> usize {
        match self {
            CipherAlgorithm::None | CipherAlgorithm::ChaCha20Poly1305 => 8,
            _ => 16,
        }
    }

    /// Authentication tag size for AEAD ciphers, 0 otherwise.
    pub fn tag_size(&self) -> usize {
        if self.is_aead() {
            16
        } else {
            0
        }
    }

    /// Returns true for AEAD ciphers, which need no separate MAC.
    pub fn is_aead(&self) -> bool {
        matches!(
            self,
            CipherAlgorithm::ChaCha20Poly1305 | CipherAlgorithm::Aes128Gcm | CipherAlgorithm::Aes256Gcm
        )
    }

    /// Returns true for CBC mode ciphers.
    pub fn is_cbc(&self) -> bool {
        matches!(
            self,
            CipherAlgorithm::Aes128Cbc | CipherAlgorithm::Aes192Cbc | CipherAlgorithm::Aes256Cbc
        )
    }

    /// Builds the encrypting half of this cipher.
    pub fn sealing(&self, key: &[u8], iv: &[u8]) -> FynxResult<SealingCipher> {
        let (key, iv) = self.check_material(key, iv)?;
        let cipher = match self {
            CipherAlgorithm::None => SealingCipher::None,
            CipherAlgorithm::ChaCha20Poly1305 => {
                SealingCipher::ChaCha(chacha20_poly1305_openssh::SealingKey::new(&chacha_key(key)?))
            }
            CipherAlgorithm::Aes128Gcm | CipherAlgorithm::Aes256Gcm => {
                SealingCipher::Gcm(GcmState::new(*self, key, iv)?)
            }
            CipherAlgorithm::Aes128Ctr | CipherAlgorithm::Aes192Ctr | CipherAlgorithm::Aes256Ctr => {
                SealingCipher::Ctr(CtrState::new(*self, key, iv)?)
            }
            CipherAlgorithm::Aes128Cbc => SealingCipher::Cbc(CbcEncryptor::Aes128(new_mode(key, iv)?)),
            CipherAlgorithm::Aes192Cbc => SealingCipher::Cbc(CbcEncryptor::Aes192(new_mode(key, iv)?)),
            CipherAlgorithm::Aes256Cbc => SealingCipher::Cbc(CbcEncryptor::Aes256(new_mode(key, iv)?)),
        };
        Ok(cipher)
    }

    /// Builds the decrypting half of this cipher.
    pub fn opening(&self, key: &[u8], iv: &[u8]) -> FynxResult<OpeningCipher> {
        let (key, iv) = self.check_material(key, iv)?;
        let cipher = match self {
            CipherAlgorithm::None => OpeningCipher::None,
            CipherAlgorithm::ChaCha20Poly1305 => {
                OpeningCipher::ChaCha(chacha20_poly1305_openssh::OpeningKey::new(&chacha_key(key)?))
            }
            CipherAlgorithm::Aes128Gcm | CipherAlgorithm::Aes256Gcm => {
                OpeningCipher::Gcm(GcmState::new(*self, key, iv)?)
            }
            CipherAlgorithm::Aes128Ctr | CipherAlgorithm::Aes192Ctr | CipherAlgorithm::Aes256Ctr => {
                OpeningCipher::Ctr(CtrState::new(*self, key, iv)?)
            }
            CipherAlgorithm::Aes128Cbc => OpeningCipher::Cbc(CbcDecryptor::Aes128(new_mode(key, iv)?)),
            CipherAlgorithm::Aes192Cbc => OpeningCipher::Cbc(CbcDecryptor::Aes192(new_mode(key, iv)?)),
            CipherAlgorithm::Aes256Cbc => OpeningCipher::Cbc(CbcDecryptor::Aes256(new_mode(key, iv)?)),
        };
        Ok(cipher)
    }

    fn check_material<'a>(&self, key: &'a [u8], iv: &'a [u8]) -> FynxResult<(&'a [u8], &'a [u8])> {
        if key.len() < self.key_size() || iv.len() < self.iv_size() {
            return Err(FynxError::Security(format!(
                "Insufficient key material for {}: key {} (need {}), iv {} (need {})",
                self.name(),
                key.len(),
                self.key_size(),
                iv.len(),
                self.iv_size()
            )));
        }
        Ok((&key[..self.key_size()], &iv[..self.iv_size()]))
    }
}

fn chacha_key(key: &[u8]) -> FynxResult<[u8; 64]> {
    key.try_into()
        .map_err(|_| FynxError::Security("ChaCha20-Poly1305 needs 64 bytes of key".to_string()))
}

fn new_mode<M: KeyIvInit>(key: &[u8], iv: &[u8]) -> FynxResult<M> {
    M::new_from_slices(key, iv).map_err(|_| FynxError::Security("Invalid key or IV length".to_string()))
}

/// AES-CTR keystream (symmetric for both directions).
pub enum CtrState {
    /// AES-128-CTR
    Aes128(Ctr128BE<Aes128>),
    /// AES-192-CTR
    Aes192(Ctr128BE<Aes192>),
    /// AES-256-CTR
    Aes256(Ctr128BE<Aes256>),
}

impl CtrState {
    fn new(algorithm: CipherAlgorithm, key: &[u8], iv: &[u8]) -> FynxResult<Self> {
        Ok(match algorithm {
            CipherAlgorithm::Aes128Ctr => CtrState::Aes128(new_mode(key, iv)?),
            CipherAlgorithm::Aes192Ctr => CtrState::Aes192(new_mode(key, iv)?),
            _ => CtrState::Aes256(new_mode(key, iv)?),
        })
    }

    fn apply(&mut self, data: &mut [u8]) {
        match self {
            CtrState::Aes128(c) => c.apply_keystream(data),
            CtrState::Aes192(c) => c.apply_keystream(data),
            CtrState::Aes256(c) => c.apply_keystream(data),
        }
    }
}

/// AES-CBC encryptor with chaining state across packets.
pub enum CbcEncryptor {
    /// AES-128-CBC
    Aes128(cbc::Encryptor<Aes128>),
    /// AES-192-CBC
    Aes192(cbc::Encryptor<Aes192>),
    /// AES-256-CBC
    Aes256(cbc::Encryptor<Aes256>),
}

impl CbcEncryptor {
    fn encrypt(&mut self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(16) {
            let block = GenericArray::from_mut_slice(block);
            match self {
                CbcEncryptor::Aes128(c) => c.encrypt_block_mut(block),
                CbcEncryptor::Aes192(c) => c.encrypt_block_mut(block),
                CbcEncryptor::Aes256(c) => c.encrypt_block_mut(block),
            }
        }
    }
}

/// AES-CBC decryptor with chaining state across packets.
pub enum CbcDecryptor {
    /// AES-128-CBC
    Aes128(cbc::Decryptor<Aes128>),
    /// AES-192-CBC
    Aes192(cbc::Decryptor<Aes192>),
    /// AES-256-CBC
    Aes256(cbc::Decryptor<Aes256>),
}

impl CbcDecryptor {
    fn decrypt(&mut self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(16) {
            let block = GenericArray::from_mut_slice(block);
            match self {
                CbcDecryptor::Aes128(c) => c.decrypt_block_mut(block),
                CbcDecryptor::Aes192(c) => c.decrypt_block_mut(block),
                CbcDecryptor::Aes256(c) => c.decrypt_block_mut(block),
            }
        }
    }
}

/// AES-GCM key with the RFC 5647 nonce: 4 fixed bytes and a 64-bit
/// invocation counter that increments once per packet.
pub struct GcmState {
    key: LessSafeKey,
    fixed: [u8; 4],
    invocation: u64,
}

impl GcmState {
    fn new(algorithm: CipherAlgorithm, key: &[u8], iv: &[u8]) -> FynxResult<Self> {
        let aead = if algorithm == CipherAlgorithm::Aes128Gcm {
            &AES_128_GCM
        } else {
            &AES_256_GCM
        };
        let unbound = UnboundKey::new(aead, key)
            .map_err(|_| FynxError::Security("Failed to create AES-GCM key".to_string()))?;
        let mut fixed = [0u8; 4];
        fixed.copy_from_slice(&iv[..4]);
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&iv[4..12]);
        Ok(Self {
            key: LessSafeKey::new(unbound),
            fixed,
            invocation: u64::from_be_bytes(counter),
        })
    }

    fn next_nonce(&mut self) -> Nonce {
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&self.fixed);
        nonce[4..].copy_from_slice(&self.invocation.to_be_bytes());
        self.invocation = self.invocation.wrapping_add(1);
        Nonce::assume_unique_for_key(nonce)
    }
}

/// Encrypting half of a negotiated cipher.
pub enum SealingCipher {
    /// No encryption
    None,
    /// AES-CTR
    Ctr(CtrState),
    /// AES-CBC
    Cbc(CbcEncryptor),
    /// AES-GCM
    Gcm(GcmState),
    /// ChaCha20-Poly1305
    ChaCha(chacha20_poly1305_openssh::SealingKey),
}

impl SealingCipher {
    /// Encrypts `data` in place (non-AEAD ciphers).
    pub fn encrypt(&mut self, data: &mut [u8]) {
        match self {
            SealingCipher::Ctr(c) => c.apply(data),
            SealingCipher::Cbc(c) => c.encrypt(data),
            SealingCipher::None | SealingCipher::Gcm(_) | SealingCipher::ChaCha(_) => {}
        }
    }

    /// Seals a whole packet (length field included) and appends the tag.
    pub fn seal(&mut self, sequence: u32, packet: &mut Vec<u8>) -> FynxResult<()> {
        match self {
            SealingCipher::ChaCha(key) => {
                let mut tag = [0u8; chacha20_poly1305_openssh::TAG_LEN];
                key.seal_in_place(sequence, packet, &mut tag);
                packet.extend_from_slice(&tag);
                Ok(())
            }
            SealingCipher::Gcm(state) => {
                let nonce = state.next_nonce();
                let (length, body) = packet.split_at_mut(4);
                let tag = state
                    .key
                    .seal_in_place_separate_tag(nonce, Aad::from(&*length), body)
                    .map_err(|_| FynxError::Security("Encryption failed".to_string()))?;
                packet.extend_from_slice(tag.as_ref());
                Ok(())
            }
            _ => Err(FynxError::Security(
                "seal called on a non-AEAD cipher".to_string(),
            )),
        }
    }
}

/// Decrypting half of a negotiated cipher.
pub enum OpeningCipher {
    /// No encryption
    None,
    /// AES-CTR
    Ctr(CtrState),
    /// AES-CBC
    Cbc(CbcDecryptor),
    /// AES-GCM
    Gcm(GcmState),
    /// ChaCha20-Poly1305
    ChaCha(chacha20_poly1305_openssh::OpeningKey),
}

impl OpeningCipher {
    /// Decrypts `data` in place (non-AEAD ciphers).
    pub fn decrypt(&mut self, data: &mut [u8]) {
        match self {
            OpeningCipher::Ctr(c) => c.apply(data),
            OpeningCipher::Cbc(c) => c.decrypt(data),
            OpeningCipher::None | OpeningCipher::Gcm(_) | OpeningCipher::ChaCha(_) => {}
        }
    }

    /// Decrypts the length field of a ChaCha20-Poly1305 packet.
    pub fn decrypt_length(&self, sequence: u32, encrypted: [u8; 4]) -> [u8; 4] {
        match self {
            OpeningCipher::ChaCha(key) => key.decrypt_packet_length(sequence, encrypted),
            _ => encrypted,
        }
    }

    /// Authenticates and decrypts `packet` (4-byte length, body, 16-byte tag).
    ///
    /// On success the body is replaced by its plaintext and the tag is
    /// removed. The length field is left untouched.
    pub fn open(&mut self, sequence: u32, packet: &mut Vec<u8>) -> FynxResult<()> {
        let tag_start = packet
            .len()
            .checked_sub(16)
            .filter(|start| *start >= 4)
            .ok_or_else(corrupt)?;
        match self {
            OpeningCipher::ChaCha(key) => {
                let mut tag = [0u8; chacha20_poly1305_openssh::TAG_LEN];
                tag.copy_from_slice(&packet[tag_start..]);
                let encrypted_length = [packet[0], packet[1], packet[2], packet[3]];
                let plain_len = key
                    .open_in_place(sequence, &mut packet[..tag_start], &tag)
                    .map_err(|_| corrupt())?
                    .len();
                debug_assert_eq!(plain_len + 4, tag_start);
                // ring leaves the length bytes encrypted; restore the clear value
                let length = key.decrypt_packet_length(sequence, encrypted_length);
                packet[..4].copy_from_slice(&length);
            }
            OpeningCipher::Gcm(state) => {
                let nonce = state.next_nonce();
                let (length, rest) = packet.split_at_mut(4);
                state
                    .key
                    .open_in_place(nonce, Aad::from(&*length), rest)
                    .map_err(|_| corrupt())?;
            }
            _ => {
                return Err(FynxError::Security(
                    "open called on a non-AEAD cipher".to_string(),
                ))
            }
        }
        packet.truncate(tag_start);
        Ok(())
    }
}

fn corrupt() -> FynxError {
    FynxError::CryptoVerification("packet corrupt".to_string())
}

/// MAC algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAlgorithm {
    /// HMAC-SHA1
    HmacSha1,
    /// HMAC-SHA1 truncated to 96 bits
    HmacSha1_96,
    /// HMAC-SHA256
    HmacSha256,
    /// HMAC-SHA512
    HmacSha512,
    /// HMAC-SHA1, encrypt-then-MAC
    HmacSha1Etm,
    /// HMAC-SHA256, encrypt-then-MAC
    HmacSha256Etm,
    /// HMAC-SHA512, encrypt-then-MAC
    HmacSha512Etm,
}

impl MacAlgorithm {
    /// All MACs this crate implements, in default preference order.
    pub const ALL: [MacAlgorithm; 7] = [
        MacAlgorithm::HmacSha256Etm,
        MacAlgorithm::HmacSha512Etm,
        MacAlgorithm::HmacSha1Etm,
        MacAlgorithm::HmacSha256,
        MacAlgorithm::HmacSha512,
        MacAlgorithm::HmacSha1,
        MacAlgorithm::HmacSha1_96,
    ];

    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            MacAlgorithm::HmacSha1 => "hmac-sha1",
            MacAlgorithm::HmacSha1_96 => "hmac-sha1-96",
            MacAlgorithm::HmacSha256 => "hmac-sha2-256",
            MacAlgorithm::HmacSha512 => "hmac-sha2-512",
            MacAlgorithm::HmacSha1Etm => "hmac-sha1-etm@openssh.com",
            MacAlgorithm::HmacSha256Etm => "hmac-sha2-256-etm@openssh.com",
            MacAlgorithm::HmacSha512Etm => "hmac-sha2-512-etm@openssh.com",
        }
    }

    /// Parses MAC algorithm from name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }

    /// Key size in bytes.
    pub fn key_size(&self) -> usize {
        match self {
            MacAlgorithm::HmacSha1 | MacAlgorithm::HmacSha1_96 | MacAlgorithm::HmacSha1Etm => 20,
            MacAlgorithm::HmacSha256 | MacAlgorithm::HmacSha256Etm => 32,
            MacAlgorithm::HmacSha512 | MacAlgorithm::HmacSha512Etm => 64,
        }
    }

    /// MAC output size in bytes.
    pub fn mac_size(&self) -> usize {
        match self {
            MacAlgorithm::HmacSha1_96 => 12,
            other => other.key_size(),
        }
    }

    /// Returns true for encrypt-then-MAC variants.
    pub fn is_etm(&self) -> bool {
        matches!(
            self,
            MacAlgorithm::HmacSha1Etm | MacAlgorithm::HmacSha256Etm | MacAlgorithm::HmacSha512Etm
        )
    }
}

enum HmacState {
    Sha1(Hmac<Sha1>),
    Sha256(Hmac<Sha256>),
    Sha512(Hmac<Sha512>),
}

/// Keyed MAC for one direction.
pub struct MacKey {
    algorithm: MacAlgorithm,
    state: HmacState,
}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacKey")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl MacKey {
    /// Creates a new MAC key.
    pub fn new(algorithm: MacAlgorithm, key_material: &[u8]) -> FynxResult<Self> {
        if key_material.len() < algorithm.key_size() {
            return Err(FynxError::Security(format!(
                "Insufficient key material for MAC: expected {}, got {}",
                algorithm.key_size(),
                key_material.len()
            )));
        }
        let key = Zeroizing::new(key_material[..algorithm.key_size()].to_vec());
        let invalid = |_| FynxError::Security("Invalid HMAC key".to_string());
        let state = match algorithm {
            MacAlgorithm::HmacSha1 | MacAlgorithm::HmacSha1_96 | MacAlgorithm::HmacSha1Etm => {
                HmacState::Sha1(Hmac::new_from_slice(&key).map_err(invalid)?)
            }
            MacAlgorithm::HmacSha256 | MacAlgorithm::HmacSha256Etm => {
                HmacState::Sha256(Hmac::new_from_slice(&key).map_err(invalid)?)
            }
            MacAlgorithm::HmacSha512 | MacAlgorithm::HmacSha512Etm => {
                HmacState::Sha512(Hmac::new_from_slice(&key).map_err(invalid)?)
            }
        };
        Ok(Self { algorithm, state })
    }

    /// Returns the algorithm.
    pub fn algorithm(&self) -> MacAlgorithm {
        self.algorithm
    }

    /// Computes MAC(sequence || parts...).
    pub fn compute(&self, sequence: u32, parts: &[&[u8]]) -> Vec<u8> {
        fn run<M: Mac + Clone>(mac: &M, sequence: u32, parts: &[&[u8]]) -> Vec<u8> {
            let mut mac = mac.clone();
            mac.update(&sequence.to_be_bytes());
            for part in parts {
                mac.update(part);
            }
            mac.finalize().into_bytes().to_vec()
        }
        let mut out = match &self.state {
            HmacState::Sha1(m) => run(m, sequence, parts),
            HmacState::Sha256(m) => run(m, sequence, parts),
            HmacState::Sha512(m) => run(m, sequence, parts),
        };
        out.truncate(self.algorithm.mac_size());
        out
    }

    /// Verifies a received MAC in constant time.
    pub fn verify(&self, sequence: u32, parts: &[&[u8]], received: &[u8]) -> bool {
        let computed = self.compute(sequence, parts);
        computed.len() == received.len() && bool::from(computed.ct_eq(received))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_algorithm_properties() {
        let chacha = CipherAlgorithm::ChaCha20Poly1305;
        assert_eq!(chacha.key_size(), 64);
        assert_eq!(chacha.block_size(), 8);
        assert!(chacha.is_aead());

        let cbc = CipherAlgorithm::from_name("aes192-cbc").unwrap();
        assert_eq!(cbc.key_size(), 24);
        assert_eq!(cbc.iv_size(), 16);
        assert!(cbc.is_cbc());
        assert!(!cbc.is_aead());

        assert_eq!(CipherAlgorithm::from_name("3des-cbc"), None);
    }

    #[test]
    fn test_mac_algorithm_properties() {
        let etm = MacAlgorithm::from_name("hmac-sha2-256-etm@openssh.com").unwrap();
        assert!(etm.is_etm());
        assert_eq!(etm.mac_size(), 32);
        assert_eq!(MacAlgorithm::HmacSha1_96.mac_size(), 12);
    }

    #[test]
    fn test_ctr_round_trip_keeps_stream_state() {
        let key = [7u8; 32];
        let iv = [9u8; 16];
        let mut enc = CipherAlgorithm::Aes256Ctr.sealing(&key, &iv).unwrap();
        let mut dec = CipherAlgorithm::Aes256Ctr.opening(&key, &iv).unwrap();

        let mut first = b"first block of data".to_vec();
        let mut second = b"second".to_vec();
        enc.encrypt(&mut first);
        enc.encrypt(&mut second);
        dec.decrypt(&mut first);
        dec.decrypt(&mut second);
        assert_eq!(first, b"first block of data");
        assert_eq!(second, b"second");
    }

    #[test]
    fn test_cbc_chains_between_calls() {
        let key = [1u8; 16];
        let iv = [2u8; 16];
        let mut enc = CipherAlgorithm::Aes128Cbc.sealing(&key, &iv).unwrap();
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        enc.encrypt(&mut a);
        enc.encrypt(&mut b);
        // Same plaintext encrypts differently once chained.
        assert_ne!(a, b);

        let mut dec = CipherAlgorithm::Aes128Cbc.opening(&key, &iv).unwrap();
        dec.decrypt(&mut a);
        dec.decrypt(&mut b);
        assert_eq!(a, [0u8; 16]);
        assert_eq!(b, [0u8; 16]);
    }

    #[test]
    fn test_gcm_seal_open() {
        let key = [3u8; 16];
        let iv = [4u8; 12];
        let mut seal = CipherAlgorithm::Aes128Gcm.sealing(&key, &iv).unwrap();
        let mut open = CipherAlgorithm::Aes128Gcm.opening(&key, &iv).unwrap();

        let mut packet = vec![0, 0, 0, 16];
        packet.extend_from_slice(&[0x42; 16]);
        seal.seal(3, &mut packet).unwrap();
        assert_eq!(packet.len(), 4 + 16 + 16);
        open.open(3, &mut packet).unwrap();
        assert_eq!(&packet[4..], &[0x42; 16]);
    }

    #[test]
    fn test_gcm_rejects_tampered_length() {
        let key = [3u8; 32];
        let iv = [4u8; 12];
        let mut seal = CipherAlgorithm::Aes256Gcm.sealing(&key, &iv).unwrap();
        let mut open = CipherAlgorithm::Aes256Gcm.opening(&key, &iv).unwrap();

        let mut packet = vec![0, 0, 0, 16];
        packet.extend_from_slice(&[0x42; 16]);
        seal.seal(0, &mut packet).unwrap();
        packet[3] ^= 1;
        assert!(matches!(
            open.open(0, &mut packet),
            Err(FynxError::CryptoVerification(_))
        ));
    }

    #[test]
    fn test_chacha_seal_open_restores_length() {
        let key = [5u8; 64];
        let mut seal = CipherAlgorithm::ChaCha20Poly1305.sealing(&key, &[]).unwrap();
        let mut open = CipherAlgorithm::ChaCha20Poly1305.opening(&key, &[]).unwrap();

        let mut packet = vec![0, 0, 0, 8, 4, 1, 2, 3, 9, 9, 9, 9];
        let original = packet.clone();
        seal.seal(42, &mut packet).unwrap();
        assert_ne!(&packet[..4], &original[..4]);

        let length = open.decrypt_length(42, [packet[0], packet[1], packet[2], packet[3]]);
        assert_eq!(length, [0, 0, 0, 8]);
        open.open(42, &mut packet).unwrap();
        assert_eq!(packet, original);
    }

    #[test]
    fn test_chacha_wrong_sequence_fails() {
        let key = [5u8; 64];
        let mut seal = CipherAlgorithm::ChaCha20Poly1305.sealing(&key, &[]).unwrap();
        let mut open = CipherAlgorithm::ChaCha20Poly1305.opening(&key, &[]).unwrap();
        let mut packet = vec![0, 0, 0, 8, 4, 1, 2, 3, 9, 9, 9, 9];
        seal.seal(1, &mut packet).unwrap();
        assert!(open.open(2, &mut packet).is_err());
    }

    #[test]
    fn test_mac_depends_on_sequence() {
        let mac = MacKey::new(MacAlgorithm::HmacSha256, &[0x0b; 32]).unwrap();
        let a = mac.compute(0, &[&b"payload"[..]]);
        let b = mac.compute(1, &[&b"payload"[..]]);
        assert_ne!(a, b);
        assert!(mac.verify(0, &[&b"pay"[..], &b"load"[..]], &a));
        assert!(!mac.verify(1, &[&b"payload"[..]], &a));
    }

    #[test]
    fn test_mac_insufficient_key() {
        assert!(MacKey::new(MacAlgorithm::HmacSha512, &[0u8; 32]).is_err());
    }

    #[test]
    fn test_hash_output_len() {
        assert_eq!(HashAlgorithm::Sha1.output_len(), 20);
        assert_eq!(HashAlgorithm::Sha384.digest(&[b"abc"]).len(), 48);
    }
}
