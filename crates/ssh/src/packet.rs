//! SSH binary packet protocol (RFC 4253 Section 6).
//!
//! # Packet Format
//!
//! ```text
//! uint32    packet_length
//! byte      padding_length
//! byte[n1]  payload (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding (n2 = padding_length)
//! byte[m]   mac or AEAD tag
//! ```
//!
//! # Modes
//!
//! - **Cipher + MAC**: MAC over `sequence || plaintext packet`, the whole
//!   packet (length included) is encrypted.
//! - **Encrypt-then-MAC**: length stays in clear, MAC over
//!   `sequence || length || ciphertext`.
//! - **AEAD**: AES-GCM authenticates the clear length as associated data,
//!   ChaCha20-Poly1305 encrypts the length with its own key.
//!
//! For Encrypt-then-MAC and AEAD the length field is excluded from block
//! alignment.
//!
//! # Security
//!
//! - Decoded lengths outside `5..=262144` or not block aligned are rejected.
//! - AEAD and EtM packets are authenticated before any field is used.
//! - CBC with a separate MAC cannot authenticate the length before using
//!   it. A bad length or bad MAC there triggers a discard: the reader keeps
//!   consuming (and decrypting and MACing) bytes up to the maximum packet
//!   size before reporting `packet corrupt`, so the failure timing does not
//!   reveal which check failed.
//! - Sequence numbers advance exactly once per packet and wrap at 2^32.

use bytes::{BufMut, BytesMut};
use fynx_platform::{FynxError, FynxResult};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

use crate::compression::{CompressionAlgorithm, Compressor, Decompressor};
use crate::crypto::{CipherAlgorithm, MacKey, OpeningCipher, SealingCipher};
use crate::rng::SecureRandom;

/// Maximum `packet_length` accepted or produced (256 KiB).
pub const MAX_PACKET_SIZE: usize = 256 * 1024;

/// Minimum `packet_length`: padding length byte plus minimum padding.
pub const MIN_PACKET_LEN: usize = 5;

/// Minimum padding length in bytes (RFC 4253 Section 6).
pub const MIN_PADDING_LEN: usize = 4;

/// Alignment used when the cipher block is smaller (or absent).
pub const MIN_BLOCK_SIZE: usize = 8;

/// Outbound cipher, MAC and compression for one set of keys.
pub struct SealingState {
    algorithm: CipherAlgorithm,
    cipher: SealingCipher,
    mac: Option<MacKey>,
    compressor: Compressor,
}

impl SealingState {
    /// State used before the first NEWKEYS.
    pub fn plaintext() -> Self {
        Self::new(
            CipherAlgorithm::None,
            SealingCipher::None,
            None,
            Compressor::new(CompressionAlgorithm::None, false),
        )
    }

    /// Assembles a state from negotiated parts. AEAD ciphers ignore `mac`.
    pub fn new(
        algorithm: CipherAlgorithm,
        cipher: SealingCipher,
        mac: Option<MacKey>,
        compressor: Compressor,
    ) -> Self {
        let mac = if algorithm.is_aead() { None } else { mac };
        Self {
            algorithm,
            cipher,
            mac,
            compressor,
        }
    }

    fn is_etm(&self) -> bool {
        self.mac.as_ref().map_or(false, |m| m.algorithm().is_etm())
    }
}

/// Inbound cipher, MAC and decompression for one set of keys.
pub struct OpeningState {
    algorithm: CipherAlgorithm,
    cipher: OpeningCipher,
    mac: Option<MacKey>,
    decompressor: Decompressor,
}

impl OpeningState {
    /// State used before the first NEWKEYS.
    pub fn plaintext() -> Self {
        Self::new(
            CipherAlgorithm::None,
            OpeningCipher::None,
            None,
            Decompressor::new(CompressionAlgorithm::None, false),
        )
    }

    /// Assembles a state from negotiated parts. AEAD ciphers ignore `mac`.
    pub fn new(
        algorithm: CipherAlgorithm,
        cipher: OpeningCipher,
        mac: Option<MacKey>,
        decompressor: Decompressor,
    ) -> Self {
        let mac = if algorithm.is_aead() { None } else { mac };
        Self {
            algorithm,
            cipher,
            mac,
            decompressor,
        }
    }

    fn is_etm(&self) -> bool {
        self.mac.as_ref().map_or(false, |m| m.algorithm().is_etm())
    }
}

/// Encoder for the client-to-server direction.
pub struct PacketSealer {
    state: SealingState,
    sequence: u32,
    bytes_since_keys: u64,
    rng: SecureRandom,
}

impl PacketSealer {
    /// Creates an unencrypted sealer starting at sequence number 0.
    pub fn new(rng: SecureRandom) -> Self {
        Self {
            state: SealingState::plaintext(),
            sequence: 0,
            bytes_since_keys: 0,
            rng,
        }
    }

    /// Sequence number the next packet will carry.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Bytes sealed since the current keys were installed.
    pub fn bytes_since_keys(&self) -> u64 {
        self.bytes_since_keys
    }

    /// Switches to new keys. The sequence number is not reset.
    pub fn install(&mut self, state: SealingState) {
        trace!(cipher = state.algorithm.name(), "Installing outbound keys");
        self.state = state;
        self.bytes_since_keys = 0;
    }

    /// Activates delayed compression.
    pub fn activate_compression(&mut self) {
        self.state.compressor.activate();
    }

    /// Returns true if outbound compression is producing output.
    pub fn compression_active(&self) -> bool {
        self.state.compressor.is_active()
    }

    #[cfg(test)]
    pub(crate) fn set_sequence(&mut self, sequence: u32) {
        self.sequence = sequence;
    }

    /// Packet and padding length for a payload of `payload_len` bytes.
    fn frame(&self, payload_len: usize) -> FynxResult<(usize, usize)> {
        let algorithm = self.state.algorithm;
        let block_size = algorithm.block_size().max(MIN_BLOCK_SIZE);
        let unaligned = if algorithm.is_aead() || self.state.is_etm() { 4 } else { 0 };

        let unpadded = 4 + 1 + payload_len - unaligned;
        let mut padding_len = block_size - unpadded % block_size;
        if padding_len < MIN_PADDING_LEN {
            padding_len += block_size;
        }
        let packet_len = 1 + payload_len + padding_len;
        if packet_len > MAX_PACKET_SIZE {
            return Err(FynxError::Protocol(format!(
                "Packet too large: {} bytes (maximum {})",
                packet_len, MAX_PACKET_SIZE
            )));
        }
        Ok((packet_len, padding_len))
    }

    /// Frames, pads, encrypts and authenticates one payload.
    ///
    /// An oversized payload is refused before the compression stream sees
    /// it. Any other error leaves the sealer unusable.
    pub fn seal(&mut self, payload: &[u8]) -> FynxResult<Vec<u8>> {
        self.frame(payload.len())?;
        let payload = self.state.compressor.compress(payload.to_vec())?;
        let (packet_len, padding_len) = self.frame(payload.len())?;
        let algorithm = self.state.algorithm;
        let etm = self.state.is_etm();

        let mut padding = vec![0u8; padding_len];
        self.rng.fill(&mut padding);

        let mac_len = self.state.mac.as_ref().map_or(0, |m| m.algorithm().mac_size());
        let mut buf = BytesMut::with_capacity(4 + packet_len + mac_len + algorithm.tag_size());
        buf.put_u32(packet_len as u32);
        buf.put_u8(padding_len as u8);
        buf.put_slice(&payload);
        buf.put_slice(&padding);
        let mut packet = buf.to_vec();

        let sequence = self.sequence;
        if algorithm.is_aead() {
            self.state.cipher.seal(sequence, &mut packet)?;
        } else if etm {
            self.state.cipher.encrypt(&mut packet[4..]);
            if let Some(mac) = &self.state.mac {
                let tag = mac.compute(sequence, &[&packet[..]]);
                packet.extend_from_slice(&tag);
            }
        } else {
            let tag = self.state.mac.as_ref().map(|m| m.compute(sequence, &[&packet[..]]));
            self.state.cipher.encrypt(&mut packet);
            if let Some(tag) = tag {
                packet.extend_from_slice(&tag);
            }
        }

        self.sequence = sequence.wrapping_add(1);
        self.bytes_since_keys += packet.len() as u64;
        Ok(packet)
    }
}

/// A decoded inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPacket {
    /// Sequence number the packet arrived with
    pub sequence: u32,
    /// Decrypted, decompressed payload (message type byte first)
    pub payload: Vec<u8>,
}

impl InboundPacket {
    /// Message type byte.
    pub fn message_type(&self) -> u8 {
        self.payload[0]
    }
}

/// Decoder for the server-to-client direction.
pub struct PacketOpener {
    state: OpeningState,
    sequence: u32,
    bytes_since_keys: u64,
}

impl Default for PacketOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketOpener {
    /// Creates an unencrypted opener starting at sequence number 0.
    pub fn new() -> Self {
        Self {
            state: OpeningState::plaintext(),
            sequence: 0,
            bytes_since_keys: 0,
        }
    }

    /// Sequence number expected on the next packet.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Bytes read since the current keys were installed.
    pub fn bytes_since_keys(&self) -> u64 {
        self.bytes_since_keys
    }

    /// Switches to new keys. The sequence number is not reset.
    pub fn install(&mut self, state: OpeningState) {
        trace!(cipher = state.algorithm.name(), "Installing inbound keys");
        self.state = state;
        self.bytes_since_keys = 0;
    }

    /// Activates delayed decompression.
    pub fn activate_compression(&mut self) {
        self.state.decompressor.activate();
    }

    /// Returns true if inbound payloads are being inflated.
    pub fn compression_active(&self) -> bool {
        self.state.decompressor.is_active()
    }

    #[cfg(test)]
    pub(crate) fn set_sequence(&mut self, sequence: u32) {
        self.sequence = sequence;
    }

    /// Reads, authenticates and decodes one packet.
    pub async fn read_packet<R>(&mut self, reader: &mut R) -> FynxResult<InboundPacket>
    where
        R: AsyncRead + Unpin,
    {
        let sequence = self.sequence;
        let algorithm = self.state.algorithm;
        let block_size = algorithm.block_size().max(MIN_BLOCK_SIZE);

        let packet = if algorithm.is_aead() {
            self.read_aead(reader, sequence, block_size).await?
        } else if self.state.is_etm() {
            self.read_etm(reader, sequence, block_size).await?
        } else {
            self.read_classic(reader, sequence, block_size).await?
        };

        // packet = length(4) | padding_length | payload | padding
        let packet_len = packet.len() - 4;
        let padding_len = packet[4] as usize;
        if padding_len < MIN_PADDING_LEN || padding_len + 1 >= packet_len {
            return Err(FynxError::Protocol(format!(
                "Invalid padding length {} for packet of {} bytes",
                padding_len, packet_len
            )));
        }
        let payload = packet[5..4 + packet_len - padding_len].to_vec();
        let payload = self.state.decompressor.decompress(payload)?;
        if payload.is_empty() {
            return Err(FynxError::Protocol("Empty payload after decompression".to_string()));
        }

        self.sequence = sequence.wrapping_add(1);
        self.bytes_since_keys += packet.len() as u64;
        Ok(InboundPacket { sequence, payload })
    }

    async fn read_aead<R>(&mut self, reader: &mut R, sequence: u32, block_size: usize) -> FynxResult<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        let mut raw_len = [0u8; 4];
        reader.read_exact(&mut raw_len).await?;
        let clear_len = self.state.cipher.decrypt_length(sequence, raw_len);
        let len = u32::from_be_bytes(clear_len) as usize;
        check_length(len, block_size, false)?;

        let mut packet = vec![0u8; 4 + len + self.state.algorithm.tag_size()];
        packet[..4].copy_from_slice(&raw_len);
        reader.read_exact(&mut packet[4..]).await?;
        self.state.cipher.open(sequence, &mut packet)?;
        Ok(packet)
    }

    async fn read_etm<R>(&mut self, reader: &mut R, sequence: u32, block_size: usize) -> FynxResult<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        let mac_len = self.state.mac.as_ref().map_or(0, |m| m.algorithm().mac_size());
        let mut raw_len = [0u8; 4];
        reader.read_exact(&mut raw_len).await?;
        let len = u32::from_be_bytes(raw_len) as usize;
        check_length(len, block_size, false)?;

        let mut packet = vec![0u8; 4 + len + mac_len];
        packet[..4].copy_from_slice(&raw_len);
        reader.read_exact(&mut packet[4..]).await?;
        let received = packet.split_off(4 + len);
        let authentic = self
            .state
            .mac
            .as_ref()
            .map_or(false, |mac| mac.verify(sequence, &[&packet[..]], &received));
        if !authentic {
            return Err(corrupt());
        }
        self.state.cipher.decrypt(&mut packet[4..]);
        Ok(packet)
    }

    async fn read_classic<R>(&mut self, reader: &mut R, sequence: u32, block_size: usize) -> FynxResult<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        let mut packet = vec![0u8; block_size];
        reader.read_exact(&mut packet).await?;
        self.state.cipher.decrypt(&mut packet);
        let len = u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]) as usize;

        if let Err(e) = check_length(len, block_size, true) {
            if self.discard_applies() {
                return Err(self.discard(reader, sequence, block_size).await);
            }
            return Err(e);
        }

        let first = packet.len();
        packet.resize(4 + len, 0);
        reader.read_exact(&mut packet[first..]).await?;
        self.state.cipher.decrypt(&mut packet[first..]);

        if let Some(mac) = &self.state.mac {
            let mut received = vec![0u8; mac.algorithm().mac_size()];
            reader.read_exact(&mut received).await?;
            if !mac.verify(sequence, &[&packet[..]], &received) {
                if self.discard_applies() {
                    let consumed = packet.len() + received.len();
                    return Err(self.discard(reader, sequence, consumed).await);
                }
                return Err(corrupt());
            }
        }
        Ok(packet)
    }

    fn discard_applies(&self) -> bool {
        self.state.algorithm.is_cbc() && self.state.mac.is_some()
    }

    /// Keeps reading up to the maximum packet size, running the cipher and
    /// the MAC over everything, then fails.
    async fn discard<R>(&mut self, reader: &mut R, sequence: u32, consumed: usize) -> FynxError
    where
        R: AsyncRead + Unpin,
    {
        warn!(consumed, "Corrupt CBC packet, discarding input before failing");
        let mut remaining = MAX_PACKET_SIZE.saturating_sub(consumed);
        let mut discarded = Vec::with_capacity(remaining.min(64 * 1024));
        let mut chunk = vec![0u8; 4096];
        while remaining > 0 {
            let want = remaining.min(chunk.len());
            match reader.read(&mut chunk[..want]).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    discarded.extend_from_slice(&chunk[..n]);
                    remaining -= n;
                }
            }
        }
        let whole = discarded.len() - discarded.len() % 16;
        self.state.cipher.decrypt(&mut discarded[..whole]);
        if let Some(mac) = &self.state.mac {
            let _ = mac.compute(sequence, &[&discarded[..]]);
        }
        corrupt()
    }
}

fn corrupt() -> FynxError {
    FynxError::CryptoVerification("packet corrupt".to_string())
}

/// Validates a decoded `packet_length`.
///
/// `includes_length_field` selects whether the 4-byte length counts towards
/// block alignment.
fn check_length(len: usize, block_size: usize, includes_length_field: bool) -> FynxResult<()> {
    if !(MIN_PACKET_LEN..=MAX_PACKET_SIZE).contains(&len) {
        return Err(FynxError::Protocol(format!(
            "Invalid packet length: {} (allowed {}..={})",
            len, MIN_PACKET_LEN, MAX_PACKET_SIZE
        )));
    }
    let aligned = if includes_length_field { len + 4 } else { len };
    if aligned % block_size != 0 {
        return Err(FynxError::Protocol(format!(
            "Packet length {} not aligned to block size {}",
            len, block_size
        )));
    }
    Ok(())
}
