//! Integration tests for the client session engine.
//!
//! Each test runs a scripted server over `tokio::io::duplex` and checks
//! what the client does on the wire and what it reports to the caller:
//! - Version exchange and first key exchange
//! - Host key trust decisions
//! - Authentication hand-off and delayed phase changes
//! - Channel flow control and channel events
//! - Rekeying, the rekey barrier, global requests and remote forwarding
//! - Keep-alive probes
//! - Peer disconnect and unknown messages

mod common;

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use common::{host_key, host_key_blob, known_hosts_line, ScriptedServer, HOST, SERVER_VERSION};
use fynx_platform::{FynxError, FynxResult, TrustFailure};
use fynx_ssh::auth::{NoneAuth, PasswordAuth};
use fynx_ssh::channel::ChannelEvent;
use fynx_ssh::config::SessionConfig;
use fynx_ssh::connection::{
    channel_message, ChannelData, ChannelOpen, ChannelOpenConfirmation, ChannelRequest,
    ChannelRequestType, ChannelType, ChannelWindowAdjust,
};
use fynx_ssh::hostkey::fingerprint;
use fynx_ssh::kex::{KexInit, EXT_INFO_CLIENT};
use fynx_ssh::known_hosts::KnownHosts;
use fynx_ssh::message::{Disconnect, DisconnectReason, MessageType};
use fynx_ssh::session::{GlobalReply, Session, SessionBuilder, SessionPhase, KEEPALIVE_REQUEST};
use fynx_ssh::trust::StrictHostKeyChecking;
use fynx_ssh::wire::{read_u32, read_utf8, write_string};
use tokio::io::DuplexStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration, Instant};

const PIPE_SIZE: usize = 1 << 20;
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn trusted_store() -> Arc<KnownHosts> {
    Arc::new(KnownHosts::from_string(&known_hosts_line(&host_key(9))))
}

async fn connect(store: Arc<KnownHosts>, io: DuplexStream) -> FynxResult<Session> {
    connect_with(store, io, SessionConfig::default()).await
}

async fn connect_with(
    store: Arc<KnownHosts>,
    io: DuplexStream,
    config: SessionConfig,
) -> FynxResult<Session> {
    common::init_tracing();
    SessionBuilder::new(store)
        .config(config)
        .connect(io, HOST, 22)
        .await
}

/// Spawns a server that completes the handshake and then runs `script`.
fn spawn_server<F, Fut>(io: DuplexStream, script: F) -> JoinHandle<FynxResult<()>>
where
    F: FnOnce(ScriptedServer) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = FynxResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut server = ScriptedServer::new(io, host_key(9), "aes256-ctr");
        server.handshake().await?;
        script(server).await
    })
}

/// Keeps the connection open until the client sends something or leaves.
async fn idle(mut server: ScriptedServer) -> FynxResult<()> {
    server.recv().await.map(|_| ())
}

/// Handshake plus `ssh-userauth`, as seen from the client.
async fn authenticated_session(io: DuplexStream) -> FynxResult<Session> {
    authenticated_session_with(io, SessionConfig::default()).await
}

async fn authenticated_session_with(io: DuplexStream, config: SessionConfig) -> FynxResult<Session> {
    let session = connect_with(trusted_store(), io, config).await?;
    let result = session
        .authenticate("alice", &mut PasswordAuth::new("secret"))
        .await?;
    assert!(result.is_success());
    Ok(session)
}

#[tokio::test]
async fn test_handshake_negotiates_aes256_ctr() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let server = tokio::spawn(async move {
        let mut server = ScriptedServer::new(server_io, host_key(9), "aes256-ctr");
        server.exchange_versions().await?;
        let kexinit = server.expect(20).await?;
        let offered = KexInit::from_bytes(&kexinit)?.proposal().kex.clone();
        let negotiated = server.kex(kexinit).await?;
        server.accept_auth().await?;
        server.expect(1).await?;
        Ok::<_, FynxError>((negotiated, offered, server.session_id().map(<[u8]>::to_vec)))
    });

    let session = timeout(TEST_TIMEOUT, connect(trusted_store(), client_io)).await??;
    assert_eq!(session.phase(), SessionPhase::Authenticating);
    assert_eq!(session.server_version(), SERVER_VERSION);
    assert!(session.client_version().starts_with("SSH-2.0-Fynx_"));
    assert_eq!(session.kex_count(), 1);
    let host_key = session.host_key().ok_or("no host key")?;
    assert_eq!(host_key.fingerprint(), fingerprint(&host_key_blob(&common::host_key(9))));

    let result = session
        .authenticate("alice", &mut PasswordAuth::new("secret"))
        .await?;
    assert!(result.is_success());
    assert!(session.is_authenticated());
    assert_eq!(session.phase(), SessionPhase::Established);
    let session_id = session.session_id();
    session.disconnect().await?;

    let (negotiated, offered, server_session_id) = timeout(TEST_TIMEOUT, server).await???;
    assert_eq!(negotiated.kex, "curve25519-sha256");
    assert_eq!(negotiated.host_key, "ssh-ed25519");
    assert_eq!(negotiated.cipher_c2s, "aes256-ctr");
    assert_eq!(negotiated.cipher_s2c, "aes256-ctr");
    assert_eq!(negotiated.mac_c2s, "hmac-sha2-256");
    assert!(offered.iter().any(|name| name == EXT_INFO_CLIENT));
    assert_eq!(session_id, server_session_id);
    Ok(())
}

#[tokio::test]
async fn test_phase_starts_connecting() -> TestResult {
    common::init_tracing();
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let _server = tokio::spawn(async move {
        let mut server = ScriptedServer::new(server_io, host_key(9), "aes256-ctr");
        let _ = go_rx.await;
        server.handshake().await?;
        idle(server).await
    });

    let builder = SessionBuilder::new(trusted_store());
    let phases = builder.watch_phase();
    assert_eq!(*phases.borrow(), SessionPhase::Connecting);

    let connecting = builder.connect(client_io, HOST, 22);
    tokio::pin!(connecting);
    // No server identification yet.
    assert!(timeout(Duration::from_millis(100), &mut connecting).await.is_err());
    assert_eq!(*phases.borrow(), SessionPhase::Connecting);

    go_tx.send(()).map_err(|_| "server gone")?;
    let session = timeout(TEST_TIMEOUT, connecting).await??;
    assert_eq!(session.phase(), SessionPhase::Authenticating);
    assert_eq!(*phases.borrow(), SessionPhase::Authenticating);
    Ok(())
}

#[tokio::test]
async fn test_failed_version_exchange_ends_disconnected() -> TestResult {
    common::init_tracing();
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    drop(server_io);

    let builder = SessionBuilder::new(trusted_store());
    let phases = builder.watch_phase();
    let result = timeout(TEST_TIMEOUT, builder.connect(client_io, HOST, 22)).await?;
    assert!(result.is_err());
    assert_eq!(*phases.borrow(), SessionPhase::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_handshake_with_aead_cipher() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let server = tokio::spawn(async move {
        let mut server = ScriptedServer::new(server_io, host_key(9), "aes256-gcm@openssh.com");
        let negotiated = server.handshake().await?;
        server.accept_auth().await?;
        server.expect(1).await?;
        Ok::<_, FynxError>(negotiated)
    });

    let session = timeout(TEST_TIMEOUT, authenticated_session(client_io)).await??;
    assert_eq!(session.phase(), SessionPhase::Established);
    session.disconnect().await?;

    let negotiated = timeout(TEST_TIMEOUT, server).await???;
    assert_eq!(negotiated.cipher_c2s, "aes256-gcm@openssh.com");
    assert_eq!(negotiated.mac_c2s, "none");
    Ok(())
}

#[tokio::test]
async fn test_changed_host_key_rejected() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let server = tokio::spawn(async move {
        // Presents key 2 while the store trusts key 9.
        let mut server = ScriptedServer::new(server_io, host_key(2), "aes256-ctr");
        server.handshake().await
    });

    let err = timeout(TEST_TIMEOUT, connect(trusted_store(), client_io))
        .await?
        .expect_err("changed key must be rejected");
    match err {
        FynxError::TrustRejected(TrustFailure::HostKeyChanged { host, .. }) => {
            assert_eq!(host, HOST)
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // The client never sends NEWKEYS for a rejected key.
    assert!(timeout(TEST_TIMEOUT, server).await??.is_err());
    Ok(())
}

#[tokio::test]
async fn test_unknown_host_strict_rejected() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let _server = spawn_server(server_io, idle);

    let err = timeout(TEST_TIMEOUT, connect(Arc::new(KnownHosts::new()), client_io))
        .await?
        .expect_err("unknown host must be rejected");
    assert!(matches!(
        err,
        FynxError::TrustRejected(TrustFailure::UnknownHost { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_unknown_host_accept_new_records_key() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let _server = spawn_server(server_io, idle);

    let store = Arc::new(KnownHosts::new());
    let mut config = SessionConfig::default();
    config.strict_host_key_checking = StrictHostKeyChecking::AcceptNew;
    let session = timeout(
        TEST_TIMEOUT,
        connect_with(Arc::clone(&store), client_io, config),
    )
    .await??;

    assert_eq!(session.phase(), SessionPhase::Authenticating);
    let entries = store.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key_blob(), host_key_blob(&host_key(9)).as_slice());
    Ok(())
}

#[tokio::test]
async fn test_none_auth_lists_methods() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let _server = spawn_server(server_io, |mut server| async move {
        server.expect(5).await?;
        let mut accept = BytesMut::new();
        accept.put_u8(6);
        write_string(&mut accept, b"ssh-userauth");
        server.send(&accept).await?;

        server.expect(50).await?;
        let mut banner = BytesMut::new();
        banner.put_u8(53);
        write_string(&mut banner, b"Authorized use only\n");
        write_string(&mut banner, b"");
        server.send(&banner).await?;

        let mut failure = BytesMut::new();
        failure.put_u8(51);
        write_string(&mut failure, b"publickey,password");
        failure.put_u8(0);
        server.send(&failure).await?;
        server.recv().await.map(|_| ())
    });

    let session = timeout(TEST_TIMEOUT, connect(trusted_store(), client_io)).await??;
    let result = session.authenticate("alice", &mut NoneAuth).await?;
    assert!(!result.is_success());
    assert!(!session.is_authenticated());
    assert_eq!(session.phase(), SessionPhase::Authenticating);
    Ok(())
}

#[tokio::test]
async fn test_channel_flow_control_and_events() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let server = spawn_server(server_io, |mut server| async move {
        server.accept_auth().await?;

        let open = ChannelOpen::from_bytes(&server.expect(90).await?)?;
        assert_eq!(open.channel_type(), &ChannelType::Session);
        let peer = open.sender_channel();
        server
            .send(&ChannelOpenConfirmation::new(peer, 5, 10, 32768).to_bytes())
            .await?;

        // Only the window's worth arrives until it is adjusted.
        let first = ChannelData::from_bytes(&server.expect(94).await?)?;
        assert_eq!(first.recipient_channel(), 5);
        assert_eq!(first.data(), b"0123456789");
        server
            .send(&ChannelWindowAdjust::new(peer, 100).to_bytes())
            .await?;
        let second = ChannelData::from_bytes(&server.expect(94).await?)?;
        assert_eq!(second.data(), b"abc");

        server
            .send(&ChannelData::new(peer, b"pong".to_vec()).to_bytes())
            .await?;
        let status = ChannelRequest::new(peer, ChannelRequestType::ExitStatus { exit_status: 3 }, false);
        server.send(&status.to_bytes()).await?;
        server
            .send(&channel_message(MessageType::ChannelEof, peer))
            .await?;
        server
            .send(&channel_message(MessageType::ChannelClose, peer))
            .await?;

        let close = server.expect(97).await?;
        let mut offset = 1;
        assert_eq!(read_u32(&close, &mut offset)?, 5);
        Ok(())
    });

    let session = timeout(TEST_TIMEOUT, authenticated_session(client_io)).await??;
    let mut channel = session.open_session().await?;
    assert_eq!(channel.id(), 0);
    assert_eq!(channel.remote_id(), 5);
    assert_eq!(channel.remote_window(), 10);

    timeout(TEST_TIMEOUT, channel.write(b"0123456789abc")).await??;

    let mut events = Vec::new();
    while let Some(event) = timeout(TEST_TIMEOUT, channel.read()).await? {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            ChannelEvent::Data(b"pong".to_vec()),
            ChannelEvent::ExitStatus(3),
            ChannelEvent::Eof,
            ChannelEvent::Closed,
        ]
    );
    assert_eq!(channel.exit_status(), Some(3));

    timeout(TEST_TIMEOUT, server).await???;
    Ok(())
}

#[tokio::test]
async fn test_channel_open_refused() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let _server = spawn_server(server_io, |mut server| async move {
        server.accept_auth().await?;
        let open = ChannelOpen::from_bytes(&server.expect(90).await?)?;
        let mut failure = BytesMut::new();
        failure.put_u8(92);
        failure.put_u32(open.sender_channel());
        failure.put_u32(1);
        write_string(&mut failure, b"not allowed");
        write_string(&mut failure, b"");
        server.send(&failure).await?;
        server.recv().await.map(|_| ())
    });

    let session = timeout(TEST_TIMEOUT, authenticated_session(client_io)).await??;
    let err = session
        .open_direct_tcpip("db.internal", 5432, "127.0.0.1", 40000)
        .await
        .expect_err("open must be refused");
    assert!(matches!(err, FynxError::Channel(_)));
    assert_eq!(session.channel_count(), 0);
    assert!(!session.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_rekey_keeps_session_id() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let server = spawn_server(server_io, |mut server| async move {
        server.accept_auth().await?;

        let kexinit = server.expect(20).await?;
        let offered = KexInit::from_bytes(&kexinit)?.proposal().kex.clone();
        assert!(!offered.iter().any(|name| name == EXT_INFO_CLIENT));
        server.kex(kexinit).await?;

        // Traffic flows under the new keys.
        let request = server.expect(80).await?;
        let mut offset = 1;
        assert_eq!(read_utf8(&request, &mut offset)?, "test@fynx");
        server.send(&[82]).await
    });

    let session = timeout(TEST_TIMEOUT, authenticated_session(client_io)).await??;
    let session_id = session.session_id();
    session.rekey().await?;
    let phase = timeout(TEST_TIMEOUT, session.wait_for_phase(SessionPhase::Established)).await?;
    assert_eq!(phase, SessionPhase::Established);
    assert_eq!(session.kex_count(), 2);
    assert_eq!(session.session_id(), session_id);

    let reply = timeout(TEST_TIMEOUT, session.global_request("test@fynx", true, Vec::new())).await??;
    assert_eq!(reply, GlobalReply::Failure);

    timeout(TEST_TIMEOUT, server).await???;
    Ok(())
}

#[tokio::test]
async fn test_traffic_waits_for_rekey() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let server = spawn_server(server_io, |mut server| async move {
        server.accept_auth().await?;
        let kexinit = server.expect(20).await?;
        let _ = go_rx.await;

        // Any non key exchange message before NEWKEYS fails one of the
        // expectations inside the exchange.
        server.kex(kexinit).await?;

        // Only readable under the new keys.
        let request = server.expect(80).await?;
        let mut offset = 1;
        assert_eq!(read_utf8(&request, &mut offset)?, "held@fynx");
        let mut success = BytesMut::new();
        success.put_u8(81);
        success.put_slice(b"ok");
        server.send(&success).await?;
        server.recv().await.map(|_| ())
    });

    let session = timeout(TEST_TIMEOUT, authenticated_session(client_io)).await??;
    session.rekey().await?;
    assert_eq!(session.phase(), SessionPhase::Rekeying);

    let request = session.global_request("held@fynx", true, Vec::new());
    tokio::pin!(request);
    assert!(timeout(Duration::from_millis(100), &mut request).await.is_err());

    go_tx.send(()).map_err(|_| "server gone")?;
    let reply = timeout(TEST_TIMEOUT, request).await??;
    assert_eq!(reply, GlobalReply::Success(b"ok".to_vec()));
    assert_eq!(session.kex_count(), 2);
    assert!(!session.is_closed());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rekey_timeout_fails_session() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let server = spawn_server(server_io, |mut server| async move {
        server.accept_auth().await?;
        server.expect(20).await?;
        // Never answered; the next packet is the client giving up.
        server.expect(1).await.map(|_| ())
    });

    let mut config = SessionConfig::default();
    config.rekey_timeout = Duration::from_secs(5);
    let session = timeout(TEST_TIMEOUT, authenticated_session_with(client_io, config)).await??;
    session.rekey().await?;

    let start = Instant::now();
    let err = session
        .global_request("late@fynx", true, Vec::new())
        .await
        .expect_err("request must not pass a stalled key exchange");
    assert!(matches!(err, FynxError::FlowControlTimeout(_)));
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(session.phase(), SessionPhase::Disconnected);
    assert!(matches!(
        session.take_failure(),
        Some(FynxError::FlowControlTimeout(_))
    ));

    timeout(TEST_TIMEOUT, server).await???;
    Ok(())
}

#[tokio::test]
async fn test_outbound_keys_switch_with_our_newkeys() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let (switched_tx, switched_rx) = oneshot::channel::<()>();
    let server = spawn_server(server_io, |mut server| async move {
        server.accept_auth().await?;
        let kexinit = server.expect(20).await?;
        let keys = server.kex_reply(kexinit).await?;

        // The server's NEWKEYS is withheld.
        server.expect(21).await?;
        server.switch_inbound(keys.opening);
        let _ = switched_tx.send(());

        let payload = server.expect(1).await?;
        assert_eq!(Disconnect::from_bytes(&payload)?.reason_code, 11);
        Ok(())
    });

    let session = timeout(TEST_TIMEOUT, authenticated_session(client_io)).await??;
    session.rekey().await?;
    timeout(TEST_TIMEOUT, switched_rx).await??;
    assert_eq!(session.phase(), SessionPhase::Rekeying);
    assert_eq!(session.kex_count(), 1);

    session.disconnect().await?;
    timeout(TEST_TIMEOUT, server).await???;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_misses_fail_session() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let server = spawn_server(server_io, |mut server| async move {
        server.accept_auth().await?;

        // Answering the first probe resets the miss count.
        let probe = server.expect(80).await?;
        let mut offset = 1;
        assert_eq!(read_utf8(&probe, &mut offset)?, KEEPALIVE_REQUEST);
        server.send(&[82]).await?;

        let mut unanswered = 0;
        loop {
            let payload = server.recv().await?;
            match payload.first() {
                Some(80) => unanswered += 1,
                Some(1) => break,
                other => {
                    return Err(FynxError::Protocol(format!(
                        "unexpected message {:?}",
                        other
                    )))
                }
            }
        }
        assert_eq!(unanswered, 2);
        Ok(())
    });

    let mut config = SessionConfig::default();
    config.keepalive_interval = Some(Duration::from_secs(10));
    config.keepalive_count_max = 2;
    let session = timeout(TEST_TIMEOUT, authenticated_session_with(client_io, config)).await??;

    let start = Instant::now();
    let phase = timeout(
        Duration::from_secs(300),
        session.wait_for_phase(SessionPhase::Disconnected),
    )
    .await?;
    assert_eq!(phase, SessionPhase::Disconnected);

    // One answered probe at 10s, then count_max + 1 silent intervals.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(40), "closed after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(50), "closed after {:?}", elapsed);
    assert!(matches!(
        session.take_failure(),
        Some(FynxError::FlowControlTimeout(_))
    ));

    timeout(Duration::from_secs(300), server).await???;
    Ok(())
}

#[tokio::test]
async fn test_remote_forward_and_incoming_channels() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let server = spawn_server(server_io, |mut server| async move {
        server.accept_auth().await?;

        let request = server.expect(80).await?;
        let mut offset = 1;
        assert_eq!(read_utf8(&request, &mut offset)?, "tcpip-forward");
        let mut success = BytesMut::new();
        success.put_u8(81);
        success.put_u32(4242);
        server.send(&success).await?;

        let forwarded = |port: u32| ChannelType::ForwardedTcpip {
            connected_address: "127.0.0.1".to_string(),
            connected_port: port,
            originator_address: "10.0.0.1".to_string(),
            originator_port: 5555,
        };
        server
            .send(&ChannelOpen::new(forwarded(4242), 9, 1000, 32768).to_bytes())
            .await?;
        let confirmation = ChannelOpenConfirmation::from_bytes(&server.expect(91).await?)?;
        assert_eq!(confirmation.recipient_channel(), 9);

        // Nothing was requested for this port.
        server
            .send(&ChannelOpen::new(forwarded(9999), 10, 1000, 32768).to_bytes())
            .await?;
        let failure = server.expect(92).await?;
        let mut offset = 1;
        assert_eq!(read_u32(&failure, &mut offset)?, 10);
        assert_eq!(read_u32(&failure, &mut offset)?, 1);
        Ok(())
    });

    let session = timeout(TEST_TIMEOUT, authenticated_session(client_io)).await??;
    let port = timeout(TEST_TIMEOUT, session.tcpip_forward("127.0.0.1", 0)).await??;
    assert_eq!(port, 4242);

    let (channel_type, channel) = timeout(TEST_TIMEOUT, session.accept())
        .await?
        .ok_or("no incoming channel")?;
    assert!(matches!(
        channel_type,
        ChannelType::ForwardedTcpip { connected_port: 4242, .. }
    ));
    assert_eq!(channel.remote_id(), 9);

    timeout(TEST_TIMEOUT, server).await???;
    Ok(())
}

#[tokio::test]
async fn test_peer_disconnect_closes_session() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let _server = spawn_server(server_io, |mut server| async move {
        let bye = Disconnect::new(DisconnectReason::ByApplication, "maintenance");
        server.send(&bye.to_bytes()).await
    });

    let session = timeout(TEST_TIMEOUT, connect(trusted_store(), client_io)).await??;
    let phase = timeout(TEST_TIMEOUT, session.wait_for_phase(SessionPhase::Disconnected)).await?;
    assert_eq!(phase, SessionPhase::Disconnected);
    assert!(session.is_closed());

    let disconnect = session.peer_disconnect().ok_or("no disconnect recorded")?;
    assert_eq!(disconnect.reason_code, 11);
    assert_eq!(disconnect.description, "maintenance");
    assert!(matches!(
        session.open_session().await,
        Err(FynxError::Closed(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_unknown_message_gets_unimplemented() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let server = spawn_server(server_io, |mut server| async move {
        let sequence = server.next_sequence();
        server.send(&[200, 1, 2, 3]).await?;
        let reply = server.expect(3).await?;
        let mut offset = 1;
        assert_eq!(read_u32(&reply, &mut offset)?, sequence);
        Ok(())
    });

    let _session = timeout(TEST_TIMEOUT, connect(trusted_store(), client_io)).await??;
    timeout(TEST_TIMEOUT, server).await???;
    Ok(())
}

#[tokio::test]
async fn test_disconnect_sends_by_application() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(PIPE_SIZE);
    let server = spawn_server(server_io, |mut server| async move {
        let payload = server.expect(1).await?;
        let disconnect = Disconnect::from_bytes(&payload)?;
        assert_eq!(disconnect.reason_code, 11);
        Ok(())
    });

    let session = timeout(TEST_TIMEOUT, connect(trusted_store(), client_io)).await??;
    session.disconnect().await?;
    assert!(session.is_closed());
    assert_eq!(session.phase(), SessionPhase::Disconnected);

    timeout(TEST_TIMEOUT, server).await???;
    Ok(())
}
