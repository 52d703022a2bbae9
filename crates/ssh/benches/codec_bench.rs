//! Packet codec and key schedule benchmarks.
//!
//! Measures sealing and opening throughput per cipher mode, key
//! derivation, and KEXINIT parsing.
//!
//! Run with: `cargo bench --bench codec_bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use fynx_ssh::compression::{Compressor, Decompressor};
use fynx_ssh::crypto::{HashAlgorithm, MacKey};
use fynx_ssh::kex::{KexInit, Proposal};
use fynx_ssh::keys::{derive_key, DirectionAlgorithms, SessionKeys};
use fynx_ssh::packet::{OpeningState, PacketOpener, PacketSealer, SealingState};
use fynx_ssh::registry::AlgorithmRegistry;
use fynx_ssh::rng::SecureRandom;

const PAYLOAD_SIZES: &[usize] = &[64, 1024, 32 * 1024];

/// Sealer and opener sharing client-to-server keys.
fn codec_pair(cipher: &str, mac: &str) -> (PacketSealer, PacketOpener) {
    let registry = AlgorithmRegistry::with_defaults();
    let algorithms = DirectionAlgorithms::resolve(&registry, cipher, mac, "none")
        .expect("algorithms are registered");
    let keys = SessionKeys::derive(
        HashAlgorithm::Sha256,
        &[0, 0, 0, 1, 0x42],
        &[0x11; 32],
        &[0x11; 32],
        &algorithms,
        &algorithms,
    );
    let mac_key = || {
        algorithms
            .mac
            .map(|m| MacKey::new(m, &keys.mac_c2s))
            .transpose()
            .expect("mac key")
    };

    let mut sealer = PacketSealer::new(SecureRandom::new());
    sealer.install(SealingState::new(
        algorithms.cipher,
        algorithms
            .cipher
            .sealing(&keys.enc_c2s, &keys.iv_c2s)
            .expect("sealing cipher"),
        mac_key(),
        Compressor::new(algorithms.compression, false),
    ));
    let mut opener = PacketOpener::new();
    opener.install(OpeningState::new(
        algorithms.cipher,
        algorithms
            .cipher
            .opening(&keys.enc_c2s, &keys.iv_c2s)
            .expect("opening cipher"),
        mac_key(),
        Decompressor::new(algorithms.compression, false),
    ));
    (sealer, opener)
}

fn bench_packet_codec(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let modes = [
        ("aes256-ctr+hmac-sha2-256", "aes256-ctr", "hmac-sha2-256"),
        (
            "aes128-ctr+hmac-sha2-256-etm",
            "aes128-ctr",
            "hmac-sha2-256-etm@openssh.com",
        ),
        ("aes256-gcm", "aes256-gcm@openssh.com", "none"),
        ("chacha20-poly1305", "chacha20-poly1305@openssh.com", "none"),
    ];

    let mut group = c.benchmark_group("packet_codec");
    for (label, cipher, mac) in modes {
        for &size in PAYLOAD_SIZES {
            let mut payload = vec![0xA5u8; size];
            payload[0] = 94;
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_function(format!("{}/{}", label, size), |b| {
                let (mut sealer, mut opener) = codec_pair(cipher, mac);
                b.iter(|| {
                    let packet = sealer.seal(black_box(&payload)).expect("seal");
                    let mut input = packet.as_slice();
                    let decoded = runtime
                        .block_on(opener.read_packet(&mut input))
                        .expect("open");
                    black_box(decoded);
                })
            });
        }
    }
    group.finish();
}

fn bench_key_derivation(c: &mut Criterion) {
    let k = [0x7Fu8; 33];
    let h = [0x22u8; 32];
    c.bench_function("derive_key/sha256/64", |b| {
        b.iter(|| derive_key(HashAlgorithm::Sha256, &k, &h, &h, b'C', black_box(64)))
    });
    c.bench_function("derive_key/sha512/64", |b| {
        b.iter(|| derive_key(HashAlgorithm::Sha512, &k, &h, &h, b'C', black_box(64)))
    });
}

fn bench_kexinit_parse(c: &mut Criterion) {
    let list = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let proposal = Proposal {
        kex: list(&[
            "mlkem768x25519-sha256",
            "curve25519-sha256",
            "ecdh-sha2-nistp256",
            "diffie-hellman-group14-sha256",
        ]),
        host_key: list(&["ssh-ed25519", "ecdsa-sha2-nistp256", "rsa-sha2-512"]),
        cipher_c2s: list(&["chacha20-poly1305@openssh.com", "aes256-ctr"]),
        cipher_s2c: list(&["chacha20-poly1305@openssh.com", "aes256-ctr"]),
        mac_c2s: list(&["hmac-sha2-256-etm@openssh.com", "hmac-sha2-256"]),
        mac_s2c: list(&["hmac-sha2-256-etm@openssh.com", "hmac-sha2-256"]),
        compression_c2s: list(&["none", "zlib@openssh.com"]),
        compression_s2c: list(&["none", "zlib@openssh.com"]),
        language_c2s: Vec::new(),
        language_s2c: Vec::new(),
    };
    let bytes = KexInit::with_cookie([3u8; 16], proposal).as_bytes().to_vec();
    c.bench_function("kexinit/parse", |b| {
        b.iter(|| KexInit::from_bytes(black_box(&bytes)).expect("parse"))
    });
}

criterion_group!(
    benches,
    bench_packet_codec,
    bench_key_derivation,
    bench_kexinit_parse
);
criterion_main!(benches);
