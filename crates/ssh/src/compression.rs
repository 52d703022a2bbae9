//! Payload compression (RFC 4253 Section 6.2).
//!
//! `zlib` starts right after NEWKEYS. `zlib@openssh.com` is negotiated the
//! same way but stays dormant until the client observes
//! SSH_MSG_USERAUTH_SUCCESS. Both directions keep one zlib stream for the
//! whole session and flush with a partial/sync flush after every packet.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use fynx_platform::{FynxError, FynxResult};

/// Upper bound for an inflated payload.
const MAX_INFLATED: usize = 256 * 1024;

/// Negotiated compression method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionAlgorithm {
    /// No compression
    None,
    /// zlib, active immediately
    Zlib,
    /// zlib, active after user authentication
    ZlibOpenssh,
}

impl CompressionAlgorithm {
    /// All methods this crate implements.
    pub const ALL: [CompressionAlgorithm; 3] = [
        CompressionAlgorithm::None,
        CompressionAlgorithm::ZlibOpenssh,
        CompressionAlgorithm::Zlib,
    ];

    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Zlib => "zlib",
            CompressionAlgorithm::ZlibOpenssh => "zlib@openssh.com",
        }
    }

    /// Parses compression algorithm from name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    /// Returns true if activation waits for USERAUTH_SUCCESS.
    pub fn is_delayed(&self) -> bool {
        matches!(self, CompressionAlgorithm::ZlibOpenssh)
    }
}

/// Outbound compression state.
pub struct Compressor {
    algorithm: CompressionAlgorithm,
    stream: Option<Compress>,
}

impl Compressor {
    /// Creates a compressor; delayed methods start inactive unless the
    /// session is already authenticated.
    pub fn new(algorithm: CompressionAlgorithm, authenticated: bool) -> Self {
        let mut c = Self {
            algorithm,
            stream: None,
        };
        if algorithm == CompressionAlgorithm::Zlib || (algorithm.is_delayed() && authenticated) {
            c.activate();
        }
        c
    }

    /// Starts compressing. No-op for `none` or if already active.
    pub fn activate(&mut self) {
        if self.algorithm != CompressionAlgorithm::None && self.stream.is_none() {
            self.stream = Some(Compress::new(Compression::default(), true));
        }
    }

    /// Returns true once compressed output is being produced.
    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns the negotiated method.
    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    /// Compresses one payload, flushing so the peer can inflate it alone.
    pub fn compress(&mut self, payload: Vec<u8>) -> FynxResult<Vec<u8>> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Ok(payload),
        };
        let mut out = Vec::with_capacity(payload.len() + 64);
        let start = stream.total_in();
        loop {
            if out.capacity() - out.len() < 64 {
                out.reserve(1024);
            }
            let consumed = (stream.total_in() - start) as usize;
            stream
                .compress_vec(&payload[consumed..], &mut out, FlushCompress::Partial)
                .map_err(|e| FynxError::Protocol(format!("Compression failed: {}", e)))?;
            let done = (stream.total_in() - start) as usize == payload.len();
            if done && out.len() < out.capacity() {
                return Ok(out);
            }
        }
    }
}

/// Inbound decompression state.
pub struct Decompressor {
    algorithm: CompressionAlgorithm,
    stream: Option<Decompress>,
}

impl Decompressor {
    /// Creates a decompressor; see [`Compressor::new`].
    pub fn new(algorithm: CompressionAlgorithm, authenticated: bool) -> Self {
        let mut d = Self {
            algorithm,
            stream: None,
        };
        if algorithm == CompressionAlgorithm::Zlib || (algorithm.is_delayed() && authenticated) {
            d.activate();
        }
        d
    }

    /// Starts inflating. No-op for `none` or if already active.
    pub fn activate(&mut self) {
        if self.algorithm != CompressionAlgorithm::None && self.stream.is_none() {
            self.stream = Some(Decompress::new(true));
        }
    }

    /// Returns true once inbound payloads are inflated.
    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Inflates one payload.
    pub fn decompress(&mut self, payload: Vec<u8>) -> FynxResult<Vec<u8>> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Ok(payload),
        };
        let mut out = Vec::with_capacity(payload.len() * 2 + 64);
        let start = stream.total_in();
        loop {
            if out.capacity() - out.len() < 64 {
                if out.len() >= MAX_INFLATED {
                    return Err(FynxError::Protocol(
                        "Decompressed payload too large".to_string(),
                    ));
                }
                out.reserve(4096);
            }
            let consumed = (stream.total_in() - start) as usize;
            let status = stream
                .decompress_vec(&payload[consumed..], &mut out, FlushDecompress::Sync)
                .map_err(|e| FynxError::Protocol(format!("Decompression failed: {}", e)))?;
            let done = (stream.total_in() - start) as usize == payload.len();
            if (done && out.len() < out.capacity()) || status == Status::StreamEnd {
                return Ok(out);
            }
            if status == Status::BufError && out.len() < out.capacity() {
                return Err(FynxError::Protocol(
                    "Truncated compressed payload".to_string(),
                ));
            }
        }
    }
}
