//! Server host keys and signature verification.
//!
//! A host key blob is parsed once into a [`PublicKey`], a tagged union with
//! one variant per key family. Every variant carries only its own fields:
//!
//! ```text
//! ssh-rsa               mpint e, mpint n
//! ssh-dss               mpint p, mpint q, mpint g, mpint y
//! ecdsa-sha2-<curve>    string curve identifier, string Q (SEC1 point)
//! ssh-ed25519           string key (32 bytes)
//! ssh-ed448             string key (57 bytes)
//! *-cert-v01@openssh.com  OpenSSH certificate, see [`crate::certificate`]
//! ```
//!
//! Verification dispatches on the variant through a [`SignatureVerifier`]
//! looked up by signature algorithm name in the
//! [`AlgorithmRegistry`](crate::registry::AlgorithmRegistry). Callers can
//! register verifiers for families without a built-in one (Ed448).
//!
//! # Example
//!
//! ```rust
//! use fynx_ssh::hostkey::{HostKey, PublicKey};
//!
//! let key = PublicKey::Ed25519([7u8; 32]);
//! let host_key = HostKey::parse(&key.to_blob()).unwrap();
//! assert_eq!(host_key.key_type(), "ssh-ed25519");
//! assert!(host_key.fingerprint().starts_with("SHA256:"));
//! ```

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use bytes::{BufMut, BytesMut};
use fynx_platform::{FynxError, FynxResult};
use num_bigint::BigUint;
use ring::signature::{
    RsaPublicKeyComponents, RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
    RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_2048_8192_SHA512,
};
use signature::Verifier;

use crate::certificate::Certificate;
use crate::crypto::HashAlgorithm;
use crate::registry::AlgorithmRegistry;
use crate::wire::{read_mpint, read_string, read_utf8, write_mpint, write_string};

/// Suffix shared by every OpenSSH certificate key type.
pub const CERT_SUFFIX: &str = "-cert-v01@openssh.com";

/// NIST curve used by an ECDSA key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcdsaCurve {
    /// P-256 with SHA-256
    NistP256,
    /// P-384 with SHA-384
    NistP384,
    /// P-521 with SHA-512
    NistP521,
}

impl EcdsaCurve {
    /// Curve identifier as carried inside the key blob.
    pub fn identifier(&self) -> &'static str {
        match self {
            EcdsaCurve::NistP256 => "nistp256",
            EcdsaCurve::NistP384 => "nistp384",
            EcdsaCurve::NistP521 => "nistp521",
        }
    }

    /// Key type and signature algorithm name.
    pub fn key_type(&self) -> &'static str {
        match self {
            EcdsaCurve::NistP256 => "ecdsa-sha2-nistp256",
            EcdsaCurve::NistP384 => "ecdsa-sha2-nistp384",
            EcdsaCurve::NistP521 => "ecdsa-sha2-nistp521",
        }
    }

    /// Parses a curve identifier.
    pub fn from_identifier(name: &str) -> Option<Self> {
        match name {
            "nistp256" => Some(EcdsaCurve::NistP256),
            "nistp384" => Some(EcdsaCurve::NistP384),
            "nistp521" => Some(EcdsaCurve::NistP521),
            _ => None,
        }
    }

    /// Size of a field element (and of r, s) in bytes.
    pub fn field_size(&self) -> usize {
        match self {
            EcdsaCurve::NistP256 => 32,
            EcdsaCurve::NistP384 => 48,
            EcdsaCurve::NistP521 => 66,
        }
    }

    /// Hash applied to the signed message.
    pub fn hash(&self) -> HashAlgorithm {
        match self {
            EcdsaCurve::NistP256 => HashAlgorithm::Sha256,
            EcdsaCurve::NistP384 => HashAlgorithm::Sha384,
            EcdsaCurve::NistP521 => HashAlgorithm::Sha512,
        }
    }
}

/// Parsed public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// `ssh-rsa`
    Rsa {
        /// Public exponent (unsigned magnitude)
        e: Vec<u8>,
        /// Modulus (unsigned magnitude)
        n: Vec<u8>,
    },
    /// `ssh-dss`
    Dsa {
        /// Prime modulus
        p: Vec<u8>,
        /// Subgroup order
        q: Vec<u8>,
        /// Generator
        g: Vec<u8>,
        /// Public value
        y: Vec<u8>,
    },
    /// `ecdsa-sha2-nistp*`
    Ecdsa {
        /// Curve
        curve: EcdsaCurve,
        /// Uncompressed SEC1 point
        point: Vec<u8>,
    },
    /// `ssh-ed25519`
    Ed25519([u8; 32]),
    /// `ssh-ed448`
    Ed448(Vec<u8>),
    /// OpenSSH certificate wrapping one of the above
    Certificate(Box<Certificate>),
}

impl PublicKey {
    /// Parses a complete key blob (`string key_type` followed by fields).
    pub fn parse(blob: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        let key_type = read_utf8(blob, &mut offset)?;
        if key_type.ends_with(CERT_SUFFIX) {
            return Ok(PublicKey::Certificate(Box::new(Certificate::parse(blob)?)));
        }
        let key = Self::parse_fields(&key_type, blob, &mut offset)?;
        if offset != blob.len() {
            return Err(FynxError::Protocol(format!(
                "Trailing data after {} key",
                key_type
            )));
        }
        Ok(key)
    }

    /// Parses the type-specific fields of a plain (non-certificate) key.
    pub(crate) fn parse_fields(
        key_type: &str,
        data: &[u8],
        offset: &mut usize,
    ) -> FynxResult<Self> {
        match key_type {
            "ssh-rsa" => {
                let e = read_mpint(data, offset)?.to_vec();
                let n = read_mpint(data, offset)?.to_vec();
                Ok(PublicKey::Rsa { e, n })
            }
            "ssh-dss" => {
                let p = read_mpint(data, offset)?.to_vec();
                let q = read_mpint(data, offset)?.to_vec();
                let g = read_mpint(data, offset)?.to_vec();
                let y = read_mpint(data, offset)?.to_vec();
                Ok(PublicKey::Dsa { p, q, g, y })
            }
            "ssh-ed25519" => {
                let raw = read_string(data, offset)?;
                let key: [u8; 32] = raw.try_into().map_err(|_| {
                    FynxError::Protocol(format!("Ed25519 key must be 32 bytes, got {}", raw.len()))
                })?;
                Ok(PublicKey::Ed25519(key))
            }
            "ssh-ed448" => {
                let raw = read_string(data, offset)?;
                if raw.len() != 57 {
                    return Err(FynxError::Protocol(format!(
                        "Ed448 key must be 57 bytes, got {}",
                        raw.len()
                    )));
                }
                Ok(PublicKey::Ed448(raw.to_vec()))
            }
            other if other.starts_with("ecdsa-sha2-") => {
                let identifier = read_utf8(data, offset)?;
                let curve = EcdsaCurve::from_identifier(&identifier)
                    .filter(|c| c.key_type() == other)
                    .ok_or_else(|| {
                        FynxError::Protocol(format!(
                            "Curve '{}' does not match key type '{}'",
                            identifier, other
                        ))
                    })?;
                let point = read_string(data, offset)?.to_vec();
                if point.len() != 1 + 2 * curve.field_size() || point[0] != 0x04 {
                    return Err(FynxError::Protocol(format!(
                        "Malformed {} point",
                        curve.identifier()
                    )));
                }
                Ok(PublicKey::Ecdsa { curve, point })
            }
            other => Err(FynxError::UnsupportedAlgorithm(format!(
                "Unknown public key type '{}'",
                other
            ))),
        }
    }

    /// Key type name as it appears at the front of the blob.
    pub fn key_type(&self) -> &str {
        match self {
            PublicKey::Rsa { .. } => "ssh-rsa",
            PublicKey::Dsa { .. } => "ssh-dss",
            PublicKey::Ecdsa { curve, .. } => curve.key_type(),
            PublicKey::Ed25519(_) => "ssh-ed25519",
            PublicKey::Ed448(_) => "ssh-ed448",
            PublicKey::Certificate(cert) => cert.key_type(),
        }
    }

    /// Key that signs exchange hashes: the embedded key for certificates.
    pub fn signing_key(&self) -> &PublicKey {
        match self {
            PublicKey::Certificate(cert) => cert.public_key(),
            key => key,
        }
    }

    /// Serializes the key back to its blob.
    pub fn to_blob(&self) -> Vec<u8> {
        if let PublicKey::Certificate(cert) = self {
            return cert.blob().to_vec();
        }
        let mut buf = BytesMut::new();
        write_string(&mut buf, self.key_type().as_bytes());
        match self {
            PublicKey::Rsa { e, n } => {
                write_mpint(&mut buf, e);
                write_mpint(&mut buf, n);
            }
            PublicKey::Dsa { p, q, g, y } => {
                for part in [p, q, g, y] {
                    write_mpint(&mut buf, part);
                }
            }
            PublicKey::Ecdsa { curve, point } => {
                write_string(&mut buf, curve.identifier().as_bytes());
                write_string(&mut buf, point);
            }
            PublicKey::Ed25519(key) => write_string(&mut buf, key),
            PublicKey::Ed448(key) => write_string(&mut buf, key),
            PublicKey::Certificate(_) => {}
        }
        buf.to_vec()
    }
}

/// SHA-256 fingerprint of a key blob, `SHA256:<base64 without padding>`.
pub fn fingerprint(blob: &[u8]) -> String {
    let digest = HashAlgorithm::Sha256.digest(&[blob]);
    format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
}

/// Host key presented by a server, keeping the exact blob that was hashed
/// into the exchange hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKey {
    blob: Vec<u8>,
    key: PublicKey,
}

impl HostKey {
    /// Parses a host key blob.
    pub fn parse(blob: &[u8]) -> FynxResult<Self> {
        Ok(Self {
            blob: blob.to_vec(),
            key: PublicKey::parse(blob)?,
        })
    }

    /// Raw blob (`K_S`).
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Parsed key.
    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    /// Key type from the blob.
    pub fn key_type(&self) -> &str {
        self.key.key_type()
    }

    /// Certificate, if the host presented one.
    pub fn certificate(&self) -> Option<&Certificate> {
        match &self.key {
            PublicKey::Certificate(cert) => Some(cert),
            _ => None,
        }
    }

    /// SHA-256 fingerprint of the blob.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.blob)
    }
}

/// `string algorithm, string signature` as sent in KEX replies and
/// certificates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlob {
    algorithm: String,
    data: Vec<u8>,
}

impl SignatureBlob {
    /// Parses a signature blob.
    pub fn parse(blob: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        let algorithm = read_utf8(blob, &mut offset)?;
        let data = read_string(blob, &mut offset)?.to_vec();
        Ok(Self { algorithm, data })
    }

    /// Builds a signature blob.
    pub fn new(algorithm: &str, data: Vec<u8>) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            data,
        }
    }

    /// Signature algorithm name.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Algorithm-specific signature bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serializes the blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        write_string(&mut buf, self.algorithm.as_bytes());
        write_string(&mut buf, &self.data);
        buf.to_vec()
    }
}

/// Strips the certificate suffix from a host key algorithm name.
pub fn base_algorithm(name: &str) -> &str {
    name.strip_suffix(CERT_SUFFIX).unwrap_or(name)
}

/// Key type that a host key (or signature) algorithm applies to.
///
/// `rsa-sha2-256` signs with an `ssh-rsa` key; certificate names map to the
/// matching certificate key type.
pub fn key_type_for_algorithm(name: &str) -> String {
    let base = base_algorithm(name);
    let key_type = match base {
        "rsa-sha2-256" | "rsa-sha2-512" => "ssh-rsa",
        other => other,
    };
    if base.len() == name.len() {
        key_type.to_string()
    } else {
        format!("{}{}", key_type, CERT_SUFFIX)
    }
}

/// Verifies signatures for one signature algorithm.
pub trait SignatureVerifier: Send + Sync {
    /// Returns `Ok(false)` for a well-formed but wrong signature and `Err`
    /// if the key does not belong to this algorithm or the signature bytes
    /// are malformed.
    fn verify(&self, key: &PublicKey, message: &[u8], signature: &[u8]) -> FynxResult<bool>;
}

fn invalid_key<E>(_: E) -> FynxError {
    FynxError::CryptoVerification("invalid public key".to_string())
}

fn wrong_key(algorithm: &str, key: &PublicKey) -> FynxError {
    FynxError::Protocol(format!(
        "{} signature cannot be checked with a {} key",
        algorithm,
        key.key_type()
    ))
}

/// `ssh-rsa`, `rsa-sha2-256` and `rsa-sha2-512`.
#[derive(Debug, Clone, Copy)]
pub struct RsaVerifier {
    hash: HashAlgorithm,
}

impl RsaVerifier {
    /// Creates an RSA PKCS#1 v1.5 verifier. SHA-384 is not used by SSH and
    /// is treated as SHA-512.
    pub fn new(hash: HashAlgorithm) -> Self {
        Self { hash }
    }
}

impl SignatureVerifier for RsaVerifier {
    fn verify(&self, key: &PublicKey, message: &[u8], signature: &[u8]) -> FynxResult<bool> {
        let (e, n) = match key {
            PublicKey::Rsa { e, n } => (e, n),
            other => return Err(wrong_key("RSA", other)),
        };
        if signature.len() > n.len() {
            return Ok(false);
        }
        // Some servers strip leading zeros from the signature.
        let mut padded = vec![0u8; n.len() - signature.len()];
        padded.extend_from_slice(signature);

        let params = match self.hash {
            HashAlgorithm::Sha1 => &RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            HashAlgorithm::Sha256 => &RSA_PKCS1_2048_8192_SHA256,
            HashAlgorithm::Sha384 | HashAlgorithm::Sha512 => &RSA_PKCS1_2048_8192_SHA512,
        };
        let components = RsaPublicKeyComponents {
            n: n.as_slice(),
            e: e.as_slice(),
        };
        Ok(components.verify(params, message, &padded).is_ok())
    }
}

/// `ssh-dss` (FIPS 186-2, SHA-1, 160-bit subgroup).
#[derive(Debug, Clone, Copy, Default)]
pub struct DsaVerifier;

impl SignatureVerifier for DsaVerifier {
    fn verify(&self, key: &PublicKey, message: &[u8], signature: &[u8]) -> FynxResult<bool> {
        let (p, q, g, y) = match key {
            PublicKey::Dsa { p, q, g, y } => (
                BigUint::from_bytes_be(p),
                BigUint::from_bytes_be(q),
                BigUint::from_bytes_be(g),
                BigUint::from_bytes_be(y),
            ),
            other => return Err(wrong_key("DSA", other)),
        };
        if signature.len() != 40 {
            return Err(FynxError::Protocol(format!(
                "DSA signature must be 40 bytes, got {}",
                signature.len()
            )));
        }
        let zero = BigUint::from(0u32);
        let two = BigUint::from(2u32);
        if q <= two || p <= two {
            return Ok(false);
        }
        let r = BigUint::from_bytes_be(&signature[..20]);
        let s = BigUint::from_bytes_be(&signature[20..]);
        if r == zero || r >= q || s == zero || s >= q {
            return Ok(false);
        }

        let digest = HashAlgorithm::Sha1.digest(&[message]);
        let mut z = BigUint::from_bytes_be(&digest);
        let digest_bits = (digest.len() * 8) as u64;
        if q.bits() < digest_bits {
            z >>= (digest_bits - q.bits()) as usize;
        }

        // q is prime, so s^(q-2) is the inverse of s.
        let w = s.modpow(&(&q - &two), &q);
        let u1 = (&z * &w) % &q;
        let u2 = (&r * &w) % &q;
        let v = ((g.modpow(&u1, &p) * y.modpow(&u2, &p)) % &p) % &q;
        Ok(v == r)
    }
}

/// `ecdsa-sha2-nistp256/384/521`.
#[derive(Debug, Clone, Copy)]
pub struct EcdsaVerifier {
    curve: EcdsaCurve,
}

impl EcdsaVerifier {
    /// Creates a verifier for one curve.
    pub fn new(curve: EcdsaCurve) -> Self {
        Self { curve }
    }

    /// Converts `mpint r, mpint s` into fixed-width `r || s`.
    fn fixed_width(&self, signature: &[u8]) -> FynxResult<Vec<u8>> {
        let size = self.curve.field_size();
        let mut offset = 0;
        let mut out = Vec::with_capacity(2 * size);
        for _ in 0..2 {
            let part = read_mpint(signature, &mut offset)?;
            if part.len() > size {
                return Err(FynxError::Protocol(
                    "ECDSA signature component too large".to_string(),
                ));
            }
            out.extend(std::iter::repeat(0u8).take(size - part.len()));
            out.extend_from_slice(part);
        }
        Ok(out)
    }
}

impl SignatureVerifier for EcdsaVerifier {
    fn verify(&self, key: &PublicKey, message: &[u8], signature: &[u8]) -> FynxResult<bool> {
        let point = match key {
            PublicKey::Ecdsa { curve, point } if *curve == self.curve => point,
            other => return Err(wrong_key(self.curve.key_type(), other)),
        };
        let rs = self.fixed_width(signature)?;

        Ok(match self.curve {
            EcdsaCurve::NistP256 => {
                let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(invalid_key)?;
                match p256::ecdsa::Signature::from_slice(&rs) {
                    Ok(sig) => vk.verify(message, &sig).is_ok(),
                    Err(_) => false,
                }
            }
            EcdsaCurve::NistP384 => {
                let vk = p384::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(invalid_key)?;
                match p384::ecdsa::Signature::from_slice(&rs) {
                    Ok(sig) => vk.verify(message, &sig).is_ok(),
                    Err(_) => false,
                }
            }
            EcdsaCurve::NistP521 => {
                let vk = p521::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(invalid_key)?;
                match p521::ecdsa::Signature::from_slice(&rs) {
                    Ok(sig) => vk.verify(message, &sig).is_ok(),
                    Err(_) => false,
                }
            }
        })
    }
}

/// `ssh-ed25519`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, key: &PublicKey, message: &[u8], signature: &[u8]) -> FynxResult<bool> {
        let raw = match key {
            PublicKey::Ed25519(raw) => raw,
            other => return Err(wrong_key("Ed25519", other)),
        };
        let vk = ed25519_dalek::VerifyingKey::from_bytes(raw).map_err(invalid_key)?;
        let sig = ed25519_dalek::Signature::from_slice(signature).map_err(|_| {
            FynxError::Protocol(format!(
                "Ed25519 signature must be 64 bytes, got {}",
                signature.len()
            ))
        })?;
        Ok(vk.verify(message, &sig).is_ok())
    }
}

/// Verifies `signature_blob` over `message` with `key`.
///
/// The algorithm named in the blob must equal `expected_algorithm`; a
/// mismatch is rejected rather than corrected. A wrong signature yields
/// [`FynxError::CryptoVerification`].
pub fn verify_signature(
    registry: &AlgorithmRegistry,
    key: &PublicKey,
    expected_algorithm: &str,
    message: &[u8],
    signature_blob: &[u8],
) -> FynxResult<()> {
    let sig = SignatureBlob::parse(signature_blob)?;
    if sig.algorithm() != expected_algorithm {
        return Err(FynxError::Protocol(format!(
            "Signature algorithm '{}' does not match expected '{}'",
            sig.algorithm(),
            expected_algorithm
        )));
    }
    let verifier = registry.verifier(expected_algorithm)?;
    if verifier.verify(key, message, sig.data())? {
        Ok(())
    } else {
        Err(FynxError::CryptoVerification("verify failed".to_string()))
    }
}

/// Encodes `r || s` (fixed width) as the `mpint r, mpint s` ECDSA signature
/// body.
pub fn ecdsa_signature_body(r: &[u8], s: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_mpint(&mut buf, r);
    write_mpint(&mut buf, s);
    buf.to_vec()
}

/// Encodes a complete Ed25519 signature blob from raw signature bytes.
pub fn ed25519_signature_blob(signature: &[u8; 64]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + 11 + 4 + 64);
    write_string(&mut buf, b"ssh-ed25519");
    buf.put_u32(64);
    buf.put_slice(signature);
    buf.to_vec()
}
