//! A scripted SSH server for driving the client over an in-memory pipe.
//!
//! The server speaks just enough of the protocol to get a client through
//! the handshake (curve25519-sha256 with an Ed25519 host key) and then
//! exchanges raw payloads under the negotiated keys, so each test can
//! script the rest of the conversation message by message.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, BytesMut};
use ed25519_dalek::{Signer, SigningKey};
use fynx_platform::{FynxError, FynxResult};
use fynx_ssh::compression::{Compressor, Decompressor};
use fynx_ssh::crypto::{HashAlgorithm, MacKey};
use fynx_ssh::hostkey::ed25519_signature_blob;
use fynx_ssh::kex::{guess, KexInit, NegotiatedAlgorithms, NewKeys, Proposal};
use fynx_ssh::keys::{DirectionAlgorithms, SessionKeys};
use fynx_ssh::packet::{OpeningState, PacketOpener, PacketSealer, SealingState};
use fynx_ssh::registry::AlgorithmRegistry;
use fynx_ssh::rng::SecureRandom;
use fynx_ssh::wire::{mpint_bytes, read_string, write_string};
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tracing_subscriber::EnvFilter;

/// Identification string the server sends.
pub const SERVER_VERSION: &str = "SSH-2.0-OpenSSH_9.6";

/// Host name used by the tests (port 22, so no `[host]:port` label).
pub const HOST: &str = "server.test";

/// Installs a test log subscriber once. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fynx_ssh=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Deterministic Ed25519 host key.
pub fn host_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// SSH wire encoding of an Ed25519 public key.
pub fn host_key_blob(key: &SigningKey) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_string(&mut buf, b"ssh-ed25519");
    write_string(&mut buf, key.verifying_key().as_bytes());
    buf.to_vec()
}

/// known_hosts line trusting `key` for [`HOST`].
pub fn known_hosts_line(key: &SigningKey) -> String {
    format!("{} ssh-ed25519 {}", HOST, STANDARD.encode(host_key_blob(key)))
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Server proposal offering a single cipher.
pub fn server_proposal(cipher: &str) -> Proposal {
    Proposal {
        kex: names(&["curve25519-sha256"]),
        host_key: names(&["ssh-ed25519"]),
        cipher_c2s: names(&[cipher]),
        cipher_s2c: names(&[cipher]),
        mac_c2s: names(&["hmac-sha2-256"]),
        mac_s2c: names(&["hmac-sha2-256"]),
        compression_c2s: names(&["none"]),
        compression_s2c: names(&["none"]),
        language_c2s: Vec::new(),
        language_s2c: Vec::new(),
    }
}

fn unexpected(expected: u8, payload: &[u8]) -> FynxError {
    FynxError::Protocol(format!(
        "test server expected message {}, got {:?}",
        expected,
        payload.first()
    ))
}

/// Keys derived by a key exchange, not yet in use.
pub struct PendingKeys {
    pub negotiated: NegotiatedAlgorithms,
    pub sealing: SealingState,
    pub opening: OpeningState,
}

/// Server end of an in-memory connection.
pub struct ScriptedServer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    sealer: PacketSealer,
    opener: PacketOpener,
    host_key: SigningKey,
    proposal: Proposal,
    registry: AlgorithmRegistry,
    client_version: String,
    session_id: Option<Vec<u8>>,
}

impl ScriptedServer {
    /// Wraps the server half of a duplex pipe.
    pub fn new(io: DuplexStream, host_key: SigningKey, cipher: &str) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Self {
            reader: BufReader::new(reader),
            writer,
            sealer: PacketSealer::new(SecureRandom::new()),
            opener: PacketOpener::new(),
            host_key,
            proposal: server_proposal(cipher),
            registry: AlgorithmRegistry::with_defaults(),
            client_version: String::new(),
            session_id: None,
        }
    }

    /// Session id fixed by the first exchange.
    pub fn session_id(&self) -> Option<&[u8]> {
        self.session_id.as_deref()
    }

    /// Sequence number of the next packet the server sends.
    pub fn next_sequence(&self) -> u32 {
        self.sealer.sequence()
    }

    /// Swaps identification strings.
    pub async fn exchange_versions(&mut self) -> FynxResult<()> {
        self.writer
            .write_all(format!("{}\r\n", SERVER_VERSION).as_bytes())
            .await?;
        self.writer.flush().await?;
        let mut line = String::new();
        self.reader.read_line(&mut line).await?;
        self.client_version = line.trim_end().to_string();
        Ok(())
    }

    /// Sends one payload under the current keys.
    pub async fn send(&mut self, payload: &[u8]) -> FynxResult<()> {
        let packet = self.sealer.seal(payload)?;
        self.writer.write_all(&packet).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Receives one payload under the current keys.
    pub async fn recv(&mut self) -> FynxResult<Vec<u8>> {
        Ok(self.opener.read_packet(&mut self.reader).await?.payload)
    }

    /// Receives a payload and checks its message type.
    pub async fn expect(&mut self, msg_type: u8) -> FynxResult<Vec<u8>> {
        let payload = self.recv().await?;
        if payload.first() != Some(&msg_type) {
            return Err(unexpected(msg_type, &payload));
        }
        Ok(payload)
    }

    /// Versions plus the first key exchange.
    pub async fn handshake(&mut self) -> FynxResult<NegotiatedAlgorithms> {
        self.exchange_versions().await?;
        let client_kexinit = self.expect(20).await?;
        self.kex(client_kexinit).await
    }

    /// Answers a client KEXINIT and runs curve25519-sha256 to NEWKEYS.
    pub async fn kex(&mut self, client_kexinit: Vec<u8>) -> FynxResult<NegotiatedAlgorithms> {
        let keys = self.kex_reply(client_kexinit).await?;
        self.send(&NewKeys.to_bytes()).await?;
        self.expect(21).await?;
        self.switch_outbound(keys.sealing);
        self.switch_inbound(keys.opening);
        Ok(keys.negotiated)
    }

    /// Runs curve25519-sha256 up to and including the ECDH reply. The
    /// server's NEWKEYS is left to the caller.
    pub async fn kex_reply(&mut self, client_kexinit: Vec<u8>) -> FynxResult<PendingKeys> {
        let client = KexInit::from_bytes(&client_kexinit)?;
        let server = KexInit::with_cookie([7u8; 16], self.proposal.clone());
        self.send(server.as_bytes()).await?;
        let negotiated = guess(&self.proposal, client.proposal())?;

        let init = self.expect(30).await?;
        let mut offset = 1;
        let client_public = read_string(&init, &mut offset)?.to_vec();
        let mut peer = [0u8; 32];
        peer.copy_from_slice(&client_public);

        let secret = x25519_dalek::EphemeralSecret::random_from_rng(rand::rngs::OsRng);
        let server_public = x25519_dalek::PublicKey::from(&secret).as_bytes().to_vec();
        let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer));
        let k = mpint_bytes(shared.as_bytes());

        let host_key_blob = host_key_blob(&self.host_key);
        let mut h = BytesMut::new();
        write_string(&mut h, self.client_version.as_bytes());
        write_string(&mut h, SERVER_VERSION.as_bytes());
        write_string(&mut h, &client_kexinit);
        write_string(&mut h, server.as_bytes());
        write_string(&mut h, &host_key_blob);
        write_string(&mut h, &client_public);
        write_string(&mut h, &server_public);
        h.put_slice(&k);
        let exchange_hash = HashAlgorithm::Sha256.digest(&[&h[..]]);
        let session_id = self
            .session_id
            .get_or_insert_with(|| exchange_hash.clone())
            .clone();

        let signature = ed25519_signature_blob(&self.host_key.sign(&exchange_hash).to_bytes());
        let mut reply = BytesMut::new();
        reply.put_u8(31);
        write_string(&mut reply, &host_key_blob);
        write_string(&mut reply, &server_public);
        write_string(&mut reply, &signature);
        self.send(&reply).await?;

        let c2s = DirectionAlgorithms::resolve(
            &self.registry,
            &negotiated.cipher_c2s,
            &negotiated.mac_c2s,
            &negotiated.compression_c2s,
        )?;
        let s2c = DirectionAlgorithms::resolve(
            &self.registry,
            &negotiated.cipher_s2c,
            &negotiated.mac_s2c,
            &negotiated.compression_s2c,
        )?;
        let keys = SessionKeys::derive(
            HashAlgorithm::Sha256,
            &k,
            &exchange_hash,
            &session_id,
            &c2s,
            &s2c,
        );
        let sealing = SealingState::new(
            s2c.cipher,
            s2c.cipher.sealing(&keys.enc_s2c, &keys.iv_s2c)?,
            s2c.mac.map(|m| MacKey::new(m, &keys.mac_s2c)).transpose()?,
            Compressor::new(s2c.compression, false),
        );
        let opening = OpeningState::new(
            c2s.cipher,
            c2s.cipher.opening(&keys.enc_c2s, &keys.iv_c2s)?,
            c2s.mac.map(|m| MacKey::new(m, &keys.mac_c2s)).transpose()?,
            Decompressor::new(c2s.compression, false),
        );
        Ok(PendingKeys {
            negotiated,
            sealing,
            opening,
        })
    }

    /// Starts sending under new keys.
    pub fn switch_outbound(&mut self, sealing: SealingState) {
        self.sealer.install(sealing);
    }

    /// Starts reading under new keys.
    pub fn switch_inbound(&mut self, opening: OpeningState) {
        self.opener.install(opening);
    }

    /// Accepts the `ssh-userauth` service and the first auth request.
    pub async fn accept_auth(&mut self) -> FynxResult<()> {
        self.expect(5).await?;
        let mut accept = BytesMut::new();
        accept.put_u8(6);
        write_string(&mut accept, b"ssh-userauth");
        self.send(&accept).await?;
        self.expect(50).await?;
        self.send(&[52]).await
    }
}
