//! Fuzz target for inbound packet decoding and message parsing.
//!
//! Feeds arbitrary bytes to the plaintext packet reader and to every
//! message parser the session applies to server input. None of them may
//! panic, loop, or allocate beyond the packet size limit.
//!
//! Run with:
//! ```bash
//! cd crates/ssh
//! cargo +nightly fuzz run ssh_packet -- -max_total_time=300
//! ```

#![no_main]
use fynx_ssh::connection::{ChannelData, ChannelOpen, ChannelRequest};
use fynx_ssh::hostkey::HostKey;
use fynx_ssh::kex::KexInit;
use fynx_ssh::message::Disconnect;
use fynx_ssh::packet::{PacketOpener, MAX_PACKET_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(_) => return,
    };
    let mut opener = PacketOpener::new();
    let mut input = data;
    runtime.block_on(async {
        while let Ok(packet) = opener.read_packet(&mut input).await {
            assert!(!packet.payload.is_empty());
            assert!(packet.payload.len() <= MAX_PACKET_SIZE);
        }
    });

    let _ = KexInit::from_bytes(data);
    let _ = Disconnect::from_bytes(data);
    let _ = ChannelOpen::from_bytes(data);
    let _ = ChannelData::from_bytes(data);
    let _ = ChannelRequest::from_bytes(data);
    let _ = HostKey::parse(data);
});
