//! OpenSSH certificates (`*-cert-v01@openssh.com`).
//!
//! ```text
//! string    key type (e.g. "ssh-ed25519-cert-v01@openssh.com")
//! string    nonce
//! ...       public key fields of the base key type
//! uint64    serial
//! uint32    type (1 = user, 2 = host)
//! string    key id
//! string    valid principals (packed strings)
//! uint64    valid after
//! uint64    valid before
//! string    critical options (packed name/data pairs)
//! string    extensions (packed name/data pairs)
//! string    reserved
//! string    signature key (CA public key blob)
//! string    signature (over every byte before this field)
//! ```
//!
//! A [`Certificate`] is immutable once parsed. Host certificates are
//! checked by [`Certificate::check_host`]; whether the signing CA is trusted
//! at all is the trust store's decision.

use std::collections::BTreeMap;

use fynx_platform::{FynxError, FynxResult, TrustFailure};

use crate::hostkey::{verify_signature, PublicKey, SignatureBlob, CERT_SUFFIX};
use crate::registry::AlgorithmRegistry;
use crate::wire::{read_string, read_u32, read_u64, read_utf8};

/// `valid before` value meaning "never expires".
pub const VALID_FOREVER: u64 = u64::MAX;

/// Certificate type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateType {
    /// SSH2_CERT_TYPE_USER
    User,
    /// SSH2_CERT_TYPE_HOST
    Host,
}

impl CertificateType {
    fn from_u32(value: u32) -> FynxResult<Self> {
        match value {
            1 => Ok(CertificateType::User),
            2 => Ok(CertificateType::Host),
            other => Err(FynxError::Protocol(format!(
                "Unknown certificate type {}",
                other
            ))),
        }
    }
}

/// Parsed OpenSSH certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    key_type: String,
    nonce: Vec<u8>,
    public_key: PublicKey,
    serial: u64,
    cert_type: CertificateType,
    key_id: String,
    principals: Vec<String>,
    valid_after: u64,
    valid_before: u64,
    critical_options: BTreeMap<String, Vec<u8>>,
    extensions: BTreeMap<String, Vec<u8>>,
    signature_key: Vec<u8>,
    signature: Vec<u8>,
    signed_len: usize,
    blob: Vec<u8>,
}

fn read_packed_strings(data: &[u8]) -> FynxResult<Vec<String>> {
    let mut offset = 0;
    let mut out = Vec::new();
    while offset < data.len() {
        out.push(read_utf8(data, &mut offset)?);
    }
    Ok(out)
}

fn read_options(data: &[u8]) -> FynxResult<BTreeMap<String, Vec<u8>>> {
    let mut offset = 0;
    let mut out = BTreeMap::new();
    while offset < data.len() {
        let name = read_utf8(data, &mut offset)?;
        let value = read_string(data, &mut offset)?.to_vec();
        if out.insert(name.clone(), value).is_some() {
            return Err(FynxError::Protocol(format!(
                "Duplicate certificate option '{}'",
                name
            )));
        }
    }
    Ok(out)
}

impl Certificate {
    /// Parses a certificate blob.
    pub fn parse(blob: &[u8]) -> FynxResult<Self> {
        let mut offset = 0;
        let key_type = read_utf8(blob, &mut offset)?;
        let base = key_type.strip_suffix(CERT_SUFFIX).ok_or_else(|| {
            FynxError::Protocol(format!("'{}' is not a certificate type", key_type))
        })?;
        let nonce = read_string(blob, &mut offset)?.to_vec();
        let public_key = PublicKey::parse_fields(base, blob, &mut offset)?;
        let serial = read_u64(blob, &mut offset)?;
        let cert_type = CertificateType::from_u32(read_u32(blob, &mut offset)?)?;
        let key_id = read_utf8(blob, &mut offset)?;
        let principals = read_packed_strings(read_string(blob, &mut offset)?)?;
        let valid_after = read_u64(blob, &mut offset)?;
        let valid_before = read_u64(blob, &mut offset)?;
        let critical_options = read_options(read_string(blob, &mut offset)?)?;
        let extensions = read_options(read_string(blob, &mut offset)?)?;
        let _reserved = read_string(blob, &mut offset)?;
        let signature_key = read_string(blob, &mut offset)?.to_vec();
        let signed_len = offset;
        let signature = read_string(blob, &mut offset)?.to_vec();
        if offset != blob.len() {
            return Err(FynxError::Protocol(format!(
                "Trailing data after certificate '{}'",
                key_id
            )));
        }

        Ok(Self {
            key_type,
            nonce,
            public_key,
            serial,
            cert_type,
            key_id,
            principals,
            valid_after,
            valid_before,
            critical_options,
            extensions,
            signature_key,
            signature,
            signed_len,
            blob: blob.to_vec(),
        })
    }

    /// Certificate key type name.
    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    /// CA-chosen nonce.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Certified public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Serial number.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// User or host certificate.
    pub fn cert_type(&self) -> CertificateType {
        self.cert_type
    }

    /// Key identifier.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Valid principals; empty means any.
    pub fn principals(&self) -> &[String] {
        &self.principals
    }

    /// Start of validity (seconds since epoch).
    pub fn valid_after(&self) -> u64 {
        self.valid_after
    }

    /// End of validity, exclusive. [`VALID_FOREVER`] never expires.
    pub fn valid_before(&self) -> u64 {
        self.valid_before
    }

    /// Critical options.
    pub fn critical_options(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.critical_options
    }

    /// Extensions.
    pub fn extensions(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.extensions
    }

    /// CA public key blob.
    pub fn signature_key(&self) -> &[u8] {
        &self.signature_key
    }

    /// CA signature blob.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Bytes covered by the CA signature.
    pub fn signed_message(&self) -> &[u8] {
        &self.blob[..self.signed_len]
    }

    /// Complete certificate blob.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Unsigned window check: `valid_after <= now < valid_before`.
    pub fn is_valid_at(&self, now: u64) -> bool {
        self.valid_after <= now && (now < self.valid_before || self.valid_before == VALID_FOREVER)
    }

    /// Returns true if `host` (compared lower-cased) is an allowed principal.
    pub fn allows_principal(&self, host: &str) -> bool {
        if self.principals.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.principals.iter().any(|p| *p == host)
    }

    /// Validates a host certificate's fields and CA signature.
    ///
    /// The caller has already established that [`Self::signature_key`] is a
    /// trusted CA for `host`.
    pub fn check_host(
        &self,
        host: &str,
        now: u64,
        registry: &AlgorithmRegistry,
    ) -> Result<(), TrustFailure> {
        if self.cert_type != CertificateType::Host {
            return Err(TrustFailure::InvalidCertificate(format!(
                "certificate '{}' is not a host certificate",
                self.key_id
            )));
        }
        if !self.is_valid_at(now) {
            return Err(TrustFailure::InvalidCertificate(format!(
                "certificate '{}' is not valid at {}",
                self.key_id, now
            )));
        }
        self.check_ca_signature(registry)?;
        if !self.allows_principal(host) {
            return Err(TrustFailure::InvalidCertificate(format!(
                "'{}' is not a principal of certificate '{}'",
                host, self.key_id
            )));
        }
        if !self.critical_options.is_empty() {
            let names: Vec<&str> = self.critical_options.keys().map(String::as_str).collect();
            return Err(TrustFailure::InvalidCertificate(format!(
                "unrecognized critical options: {}",
                names.join(",")
            )));
        }
        Ok(())
    }

    fn check_ca_signature(&self, registry: &AlgorithmRegistry) -> Result<(), TrustFailure> {
        let ca_key = PublicKey::parse(&self.signature_key)
            .map_err(|e| TrustFailure::InvalidCertificate(format!("unusable CA key: {}", e)))?;
        if matches!(ca_key, PublicKey::Certificate(_)) {
            return Err(TrustFailure::InvalidCertificate("CA key is itself a certificate".to_string()));
        }
        let sig = SignatureBlob::parse(&self.signature)
            .map_err(|e| TrustFailure::InvalidCertificate(format!("malformed CA signature: {}", e)))?;
        if sig.algorithm() != ca_key.key_type() {
            return Err(TrustFailure::InvalidCertificate(format!(
                "signature algorithm '{}' does not match CA key algorithm '{}'",
                sig.algorithm(),
                ca_key.key_type()
            )));
        }
        verify_signature(
            registry,
            &ca_key,
            ca_key.key_type(),
            self.signed_message(),
            &self.signature,
        )
        .map_err(|_| TrustFailure::InvalidCertificate("CA signature verification failed".to_string()))
    }
}
