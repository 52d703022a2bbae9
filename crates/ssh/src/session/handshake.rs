//! Key exchange driver.
//!
//! Owned by the reader task. Our KEXINIT is written by whoever starts the
//! exchange (see `Shared::start_kex`); the driver picks it up when the
//! server's KEXINIT arrives, runs the negotiated method, checks the host
//! key, switches outbound keys as our NEWKEYS is written and inbound keys
//! when the server's NEWKEYS arrives.

use std::sync::Arc;

use fynx_platform::{FynxError, FynxResult, TrustFailure};
use tracing::{debug, info};

use crate::kex::{
    check_negotiated, guess, ExchangeContext, KexInit, KexOutput, KexStep, KeyExchange,
    NegotiatedAlgorithms, NewKeys, Proposal,
};
use crate::keys::build_states;
use crate::packet::{OpeningState, PacketOpener};

use super::Shared;

enum Stage {
    Idle,
    Exchanging {
        method: Box<dyn KeyExchange>,
        ctx: ExchangeContext,
        negotiated: NegotiatedAlgorithms,
        skip_guessed: bool,
    },
    AwaitingNewKeys {
        opening: OpeningState,
        negotiated: NegotiatedAlgorithms,
    },
}

/// Per-session key exchange progress.
pub(crate) struct KexDriver {
    stage: Stage,
}

impl Default for KexDriver {
    fn default() -> Self {
        Self { stage: Stage::Idle }
    }
}

/// The server guessed right if its first choices are what was negotiated.
fn guessed_right(server: &Proposal, negotiated: &NegotiatedAlgorithms) -> bool {
    server.kex.first() == Some(&negotiated.kex)
        && server.host_key.first() == Some(&negotiated.host_key)
}

fn unexpected(what: &str) -> FynxError {
    FynxError::Protocol(format!("Unexpected {}", what))
}

impl KexDriver {
    pub(crate) fn in_progress(&self) -> bool {
        !matches!(self.stage, Stage::Idle)
    }

    /// Handles the server's KEXINIT and sends the method's first message.
    pub(crate) async fn on_kexinit(&mut self, shared: &Shared, payload: &[u8]) -> FynxResult<()> {
        if self.in_progress() {
            return Err(unexpected("KEXINIT during key exchange"));
        }
        let server = KexInit::from_bytes(payload)?;
        let client = shared.take_client_kexinit().await?;
        debug!(
            kex = ?server.proposal().kex,
            host_key = ?server.proposal().host_key,
            "Received server KEXINIT"
        );

        let negotiated = guess(server.proposal(), client.proposal())?;
        check_negotiated(&negotiated, shared.is_authenticated())?;
        debug!("kex: algorithm: {}", negotiated.kex);
        debug!("kex: host key algorithm: {}", negotiated.host_key);
        debug!(
            "kex: server->client cipher: {} MAC: {} compression: {}",
            negotiated.cipher_s2c, negotiated.mac_s2c, negotiated.compression_s2c
        );
        debug!(
            "kex: client->server cipher: {} MAC: {} compression: {}",
            negotiated.cipher_c2s, negotiated.mac_c2s, negotiated.compression_c2s
        );

        let skip_guessed =
            server.first_kex_packet_follows() && !guessed_right(server.proposal(), &negotiated);
        let mut method = shared.registry.kex(&negotiated.kex)?;
        let ctx = ExchangeContext {
            client_version: shared.client_version.as_str().to_string(),
            server_version: shared.server_version(),
            client_kexinit: client.as_bytes().to_vec(),
            server_kexinit: payload.to_vec(),
            host_key_algorithm: negotiated.host_key.clone(),
            registry: Arc::clone(&shared.registry),
        };

        let first = method.start(&shared.rng)?;
        shared.send_or_queue(first).await?;
        debug!(method = method.name(), "Key exchange started");
        self.stage = Stage::Exchanging {
            method,
            ctx,
            negotiated,
            skip_guessed,
        };
        Ok(())
    }

    /// Handles a method message (30-49).
    pub(crate) async fn on_method_message(
        &mut self,
        shared: &Shared,
        payload: &[u8],
    ) -> FynxResult<()> {
        let step = match &mut self.stage {
            Stage::Exchanging {
                method,
                ctx,
                skip_guessed,
                ..
            } => {
                if *skip_guessed {
                    *skip_guessed = false;
                    debug!("Ignoring wrongly guessed key exchange packet");
                    return Ok(());
                }
                method.handle(ctx, payload, &shared.rng)?
            }
            _ => return Err(unexpected(&format!("key exchange message {}", payload[0]))),
        };

        match step {
            KexStep::Send(message) => shared.send_or_queue(message).await,
            KexStep::Done(output) => {
                let negotiated = match std::mem::replace(&mut self.stage, Stage::Idle) {
                    Stage::Exchanging { negotiated, .. } => negotiated,
                    _ => return Err(unexpected("key exchange completion")),
                };
                self.check_host_key(shared, &output)?;
                let session_id = shared.session_id_or_init(&output.exchange_hash);
                let (sealing, opening) = build_states(
                    &shared.registry,
                    &negotiated,
                    output.hash,
                    &output.shared_secret,
                    &output.exchange_hash,
                    &session_id,
                    shared.is_authenticated(),
                )?;
                shared.send_newkeys(sealing).await?;
                debug!("SSH_MSG_NEWKEYS sent");
                self.stage = Stage::AwaitingNewKeys {
                    opening,
                    negotiated,
                };
                Ok(())
            }
        }
    }

    /// First exchange: trust policy. Later exchanges: the key must not
    /// change.
    fn check_host_key(&self, shared: &Shared, output: &KexOutput) -> FynxResult<()> {
        match shared.trusted_host_key() {
            None => {
                shared.verifier.verify(&shared.host, &output.host_key)?;
                shared.set_host_key(output.host_key.clone());
                Ok(())
            }
            Some(trusted) if trusted.blob() == output.host_key.blob() => Ok(()),
            Some(_) => Err(FynxError::TrustRejected(TrustFailure::HostKeyChanged {
                host: shared.host.clone(),
                fingerprint: output.host_key.fingerprint(),
            })),
        }
    }

    /// Handles the server's NEWKEYS: switches inbound keys.
    pub(crate) async fn on_newkeys(
        &mut self,
        shared: &Shared,
        opener: &mut PacketOpener,
        payload: &[u8],
    ) -> FynxResult<()> {
        NewKeys::from_bytes(payload)?;
        let (opening, negotiated) = match std::mem::replace(&mut self.stage, Stage::Idle) {
            Stage::AwaitingNewKeys {
                opening,
                negotiated,
            } => (opening, negotiated),
            _ => return Err(unexpected("SSH_MSG_NEWKEYS")),
        };
        debug!("SSH_MSG_NEWKEYS received");
        opener.install(opening);

        let count = shared.kex_finished();
        if count == 1 {
            info!(kex = %negotiated.kex, "Key exchange complete");
        } else {
            info!(kex = %negotiated.kex, count, "Rekey complete");
        }
        Ok(())
    }
}
