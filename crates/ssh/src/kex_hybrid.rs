//! Hybrid post-quantum key exchange: ML-KEM combined with ECDH.
//!
//! Methods:
//! - mlkem768x25519-sha256
//! - mlkem768nistp256-sha256
//! - mlkem1024nistp384-sha384
//!
//! ```text
//! C_INIT  = ek_C || Q_C
//! S_REPLY = ct   || Q_S
//! K       = string(HASH(kem_secret || ecdh_secret))
//! H       = HASH(V_C, V_S, I_C, I_S, K_S, C_INIT, S_REPLY, K)
//! ```
//!
//! Unlike the classical methods, K enters H and the key schedule as a
//! string, not an mpint.

use bytes::{BufMut, BytesMut};
use fynx_platform::{FynxError, FynxResult};
use ml_kem::kem::Decapsulate;
use ml_kem::{Ciphertext, EncodedSizeUser, KemCore, MlKem1024, MlKem768};
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::HashAlgorithm;
use crate::kex::{
    finish_exchange, unexpected, ExchangeContext, ExchangeHash, KexState, KexStep, KeyExchange,
};
use crate::kex_ecdh::{EcdhCurve, EcdhShare};
use crate::message::{expect_type, MessageType};
use crate::rng::SecureRandom;
use crate::wire::{read_string, string_bytes, write_string};

/// ML-KEM parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KemVariant {
    /// ML-KEM-768
    MlKem768,
    /// ML-KEM-1024
    MlKem1024,
}

impl KemVariant {
    /// Encapsulation key length.
    pub fn public_len(&self) -> usize {
        match self {
            KemVariant::MlKem768 => 1184,
            KemVariant::MlKem1024 => 1568,
        }
    }

    /// Ciphertext length.
    pub fn ciphertext_len(&self) -> usize {
        match self {
            KemVariant::MlKem768 => 1088,
            KemVariant::MlKem1024 => 1568,
        }
    }
}

enum KemSecret {
    MlKem768(<MlKem768 as KemCore>::DecapsulationKey),
    MlKem1024(<MlKem1024 as KemCore>::DecapsulationKey),
}

impl KemSecret {
    /// Returns the decapsulation key and the encoded encapsulation key.
    fn generate(variant: KemVariant, rng: &SecureRandom) -> (Self, Vec<u8>) {
        rng.with(|r| match variant {
            KemVariant::MlKem768 => {
                let (dk, ek) = MlKem768::generate(r);
                (KemSecret::MlKem768(dk), ek.as_bytes().to_vec())
            }
            KemVariant::MlKem1024 => {
                let (dk, ek) = MlKem1024::generate(r);
                (KemSecret::MlKem1024(dk), ek.as_bytes().to_vec())
            }
        })
    }

    fn decapsulate(&self, ciphertext: &[u8]) -> FynxResult<Zeroizing<Vec<u8>>> {
        let bad = || FynxError::CryptoVerification("invalid KEM ciphertext".to_string());
        let shared = match self {
            KemSecret::MlKem768(dk) => {
                let ct = Ciphertext::<MlKem768>::try_from(ciphertext).map_err(|_| bad())?;
                dk.decapsulate(&ct).map_err(|_| bad())?.to_vec()
            }
            KemSecret::MlKem1024(dk) => {
                let ct = Ciphertext::<MlKem1024>::try_from(ciphertext).map_err(|_| bad())?;
                dk.decapsulate(&ct).map_err(|_| bad())?.to_vec()
            }
        };
        Ok(Zeroizing::new(shared))
    }
}

/// Hybrid ML-KEM + ECDH key exchange.
pub struct HybridKex {
    name: &'static str,
    kem: KemVariant,
    curve: EcdhCurve,
    hash: HashAlgorithm,
    state: KexState,
    secrets: Option<(KemSecret, EcdhShare)>,
    client_init: Vec<u8>,
}

impl HybridKex {
    /// Creates a method combining `kem` with ECDH over `curve`.
    pub fn new(name: &'static str, kem: KemVariant, curve: EcdhCurve, hash: HashAlgorithm) -> Self {
        Self {
            name,
            kem,
            curve,
            hash,
            state: KexState::Uninitialized,
            secrets: None,
            client_init: Vec::new(),
        }
    }
}

impl KeyExchange for HybridKex {
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
        let (kem, mut init) = KemSecret::generate(self.kem, rng);
        let ecdh = EcdhShare::generate(self.curve, rng);
        init.extend_from_slice(&ecdh.public_bytes());
        self.secrets = Some((kem, ecdh));

        let mut buf = BytesMut::with_capacity(5 + init.len());
        buf.put_u8(MessageType::KexdhInit as u8);
        write_string(&mut buf, &init);
        self.client_init = init;
        self.state = KexState::AwaitingReply;
        debug!(method = self.name, "Sent SSH_MSG_KEX_HYBRID_INIT");
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
        let (kem, ecdh) = self
            .secrets
            .take()
            .ok_or_else(|| unexpected(self.name, message, self.state))?;

        let mut offset = 0;
        expect_type(message, &mut offset, MessageType::KexdhReply)?;
        let host_key = read_string(message, &mut offset)?;
        let server_reply = read_string(message, &mut offset)?;
        let signature = read_string(message, &mut offset)?;

        let ct_len = self.kem.ciphertext_len();
        if server_reply.len() != ct_len + self.curve.public_len() {
            return Err(FynxError::Protocol(format!(
                "{} reply of {} bytes, expected {}",
                self.name,
                server_reply.len(),
                ct_len + self.curve.public_len()
            )));
        }
        let (ciphertext, server_public) = server_reply.split_at(ct_len);

        let kem_secret = kem.decapsulate(ciphertext)?;
        let ecdh_secret = ecdh.agree(server_public)?;
        let combined = Zeroizing::new(self.hash.digest(&[&kem_secret[..], &ecdh_secret[..]]));
        let k = Zeroizing::new(string_bytes(&combined));

        let mut h = ExchangeHash::new(ctx);
        h.string(host_key)
            .string(&self.client_init)
            .string(server_reply)
            .raw(&k);
        let exchange_hash = h.finish(self.hash);

        let output = finish_exchange(ctx, self.hash, host_key, k, exchange_hash, signature)?;
        self.state = KexState::Done;
        Ok(KexStep::Done(output))
    }
}
