//! Elliptic-curve Diffie-Hellman key exchange.
//!
//! - curve25519-sha256 and curve25519-sha256@libssh.org (RFC 8731)
//! - ecdh-sha2-nistp256/384/521 (RFC 5656)
//!
//! Both share the message shape `INIT(Q_C) -> REPLY(K_S, Q_S, sig)`; the
//! exchange hash is `H = HASH(V_C, V_S, I_C, I_S, K_S, Q_C, Q_S, K)` with K
//! as an mpint of the raw shared secret.
//!
//! Received points are validated before use: NIST points must decode to a
//! point on the curve, and an all-zero X25519 result is rejected.

use bytes::{BufMut, BytesMut};
use fynx_platform::{FynxError, FynxResult};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::HashAlgorithm;
use crate::kex::{
    finish_exchange, unexpected, ExchangeContext, ExchangeHash, KexState, KexStep, KeyExchange,
};
use crate::message::{expect_type, MessageType};
use crate::rng::SecureRandom;
use crate::wire::{mpint_bytes, read_string, write_string};

/// Curve used for an ECDH share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcdhCurve {
    /// X25519, 32-byte public values
    Curve25519,
    /// NIST P-256, 65-byte uncompressed points
    NistP256,
    /// NIST P-384, 97-byte uncompressed points
    NistP384,
    /// NIST P-521, 133-byte uncompressed points
    NistP521,
}

impl EcdhCurve {
    /// Length of an encoded public value.
    pub fn public_len(&self) -> usize {
        match self {
            EcdhCurve::Curve25519 => 32,
            EcdhCurve::NistP256 => 65,
            EcdhCurve::NistP384 => 97,
            EcdhCurve::NistP521 => 133,
        }
    }
}

/// Ephemeral secret for one side of an ECDH agreement.
pub(crate) enum EcdhShare {
    Curve25519(x25519_dalek::EphemeralSecret),
    NistP256(p256::ecdh::EphemeralSecret),
    NistP384(p384::ecdh::EphemeralSecret),
    NistP521(p521::ecdh::EphemeralSecret),
}

impl EcdhShare {
    pub(crate) fn generate(curve: EcdhCurve, rng: &SecureRandom) -> Self {
        rng.with(|r| match curve {
            EcdhCurve::Curve25519 => {
                EcdhShare::Curve25519(x25519_dalek::EphemeralSecret::random_from_rng(r))
            }
            EcdhCurve::NistP256 => EcdhShare::NistP256(p256::ecdh::EphemeralSecret::random(r)),
            EcdhCurve::NistP384 => EcdhShare::NistP384(p384::ecdh::EphemeralSecret::random(r)),
            EcdhCurve::NistP521 => EcdhShare::NistP521(p521::ecdh::EphemeralSecret::random(r)),
        })
    }

    /// Public value to send (X25519 bytes or an uncompressed SEC1 point).
    pub(crate) fn public_bytes(&self) -> Vec<u8> {
        match self {
            EcdhShare::Curve25519(s) => x25519_dalek::PublicKey::from(s).as_bytes().to_vec(),
            EcdhShare::NistP256(s) => s.public_key().to_encoded_point(false).as_bytes().to_vec(),
            EcdhShare::NistP384(s) => s.public_key().to_encoded_point(false).as_bytes().to_vec(),
            EcdhShare::NistP521(s) => s.public_key().to_encoded_point(false).as_bytes().to_vec(),
        }
    }

    fn curve(&self) -> EcdhCurve {
        match self {
            EcdhShare::Curve25519(_) => EcdhCurve::Curve25519,
            EcdhShare::NistP256(_) => EcdhCurve::NistP256,
            EcdhShare::NistP384(_) => EcdhCurve::NistP384,
            EcdhShare::NistP521(_) => EcdhCurve::NistP521,
        }
    }

    /// Agrees with the peer's public value, returning the raw shared secret
    /// (the x coordinate for NIST curves).
    pub(crate) fn agree(self, peer: &[u8]) -> FynxResult<Zeroizing<Vec<u8>>> {
        if peer.len() != self.curve().public_len() {
            return Err(invalid_point());
        }
        match self {
            EcdhShare::Curve25519(s) => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(peer);
                let shared = s.diffie_hellman(&x25519_dalek::PublicKey::from(bytes));
                if !shared.was_contributory() {
                    return Err(invalid_point());
                }
                Ok(Zeroizing::new(shared.as_bytes().to_vec()))
            }
            EcdhShare::NistP256(s) => {
                let pk = p256::PublicKey::from_sec1_bytes(peer).map_err(|_| invalid_point())?;
                Ok(Zeroizing::new(
                    s.diffie_hellman(&pk).raw_secret_bytes().to_vec(),
                ))
            }
            EcdhShare::NistP384(s) => {
                let pk = p384::PublicKey::from_sec1_bytes(peer).map_err(|_| invalid_point())?;
                Ok(Zeroizing::new(
                    s.diffie_hellman(&pk).raw_secret_bytes().to_vec(),
                ))
            }
            EcdhShare::NistP521(s) => {
                let pk = p521::PublicKey::from_sec1_bytes(peer).map_err(|_| invalid_point())?;
                Ok(Zeroizing::new(
                    s.diffie_hellman(&pk).raw_secret_bytes().to_vec(),
                ))
            }
        }
    }
}

pub(crate) fn invalid_point() -> FynxError {
    FynxError::CryptoVerification("invalid peer public key".to_string())
}

/// ECDH key exchange over one curve.
pub struct EcdhKex {
    name: &'static str,
    curve: EcdhCurve,
    hash: HashAlgorithm,
    state: KexState,
    share: Option<EcdhShare>,
    client_public: Vec<u8>,
}

impl EcdhKex {
    /// Creates a method over `curve` hashed with `hash`.
    pub fn new(name: &'static str, curve: EcdhCurve, hash: HashAlgorithm) -> Self {
        Self {
            name,
            curve,
            hash,
            state: KexState::Uninitialized,
            share: None,
            client_public: Vec::new(),
        }
    }
}

impl KeyExchange for EcdhKex {
    fn name(&self) -> &str {
        self.name
    }

    fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    fn state(&self) -> KexState {
        self.state
    }

    fn start(&mut self, rng: &SecureRandom) -> FynxResult<Vec<u8>> {
        if self.state != KexState::Uninitialized {
            return Err(FynxError::Protocol(format!("{} already started", self.name)));
        }
        let share = EcdhShare::generate(self.curve, rng);
        self.client_public = share.public_bytes();
        self.share = Some(share);

        let mut buf = BytesMut::with_capacity(5 + self.client_public.len());
        buf.put_u8(MessageType::KexdhInit as u8);
        write_string(&mut buf, &self.client_public);
        self.state = KexState::AwaitingReply;
        debug!(method = self.name, "Sent SSH_MSG_KEX_ECDH_INIT");
        Ok(buf.to_vec())
    }

    fn handle(
        &mut self,
        ctx: &ExchangeContext,
        message: &[u8],
        _rng: &SecureRandom,
    ) -> FynxResult<KexStep> {
        if self.state != KexState::AwaitingReply {
            return Err(unexpected(self.name, message, self.state));
        }
        let share = self
            .share
            .take()
            .ok_or_else(|| unexpected(self.name, message, self.state))?;

        let mut offset = 0;
        expect_type(message, &mut offset, MessageType::KexdhReply)?;
        let host_key = read_string(message, &mut offset)?;
        let server_public = read_string(message, &mut offset)?;
        let signature = read_string(message, &mut offset)?;

        let raw = share.agree(server_public)?;
        let k = Zeroizing::new(mpint_bytes(&raw));

        let mut h = ExchangeHash::new(ctx);
        h.string(host_key)
            .string(&self.client_public)
            .string(server_public)
            .raw(&k);
        let exchange_hash = h.finish(self.hash);

        let output = finish_exchange(ctx, self.hash, host_key, k, exchange_hash, signature)?;
        self.state = KexState::Done;
        Ok(KexStep::Done(output))
    }
}
