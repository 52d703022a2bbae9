//! Client-side SSH2 transport and session engine for the Fynx security
//! ecosystem.
//!
//! The crate covers the transport and connection layers of SSH:
//!
//! - **Transport** (RFC 4253): version exchange, binary packet protocol,
//!   algorithm negotiation, key exchange and rekeying
//! - **Host trust**: known_hosts style stores, OpenSSH host certificates
//!   and a strict / ask / accept-new policy
//! - **Connection** (RFC 4254): channel multiplexing with flow control,
//!   global requests and remote port forwarding
//! - **Authentication hook** (RFC 4252): the `ssh-userauth` service with
//!   pluggable methods
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fynx_ssh::auth::PasswordAuth;
//! use fynx_ssh::config::SessionConfig;
//! use fynx_ssh::known_hosts::KnownHosts;
//! use fynx_ssh::session::SessionBuilder;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = SessionConfig::default();
//! config.ciphers_c2s = vec!["aes256-gcm@openssh.com".to_string()];
//! config.ciphers_s2c = config.ciphers_c2s.clone();
//!
//! let stream = tokio::net::TcpStream::connect("server.example.com:22").await?;
//! let store = Arc::new(KnownHosts::new());
//! let session = SessionBuilder::new(store)
//!     .config(config)
//!     .connect(stream, "server.example.com", 22)
//!     .await?;
//! session.authenticate("alice", &mut PasswordAuth::new("secret")).await?;
//!
//! let mut channel = session.open_session().await?;
//! channel.exec("id").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! - Cryptographic primitives come from `ring`, the RustCrypto crates and
//!   the `dalek` crates
//! - MAC tags are compared in constant time
//! - Key material is zeroed on drop with `zeroize`
//! - Host keys are checked against the trust store before any user data
//!   is sent
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252) - SSH Authentication Protocol
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol
//! - [RFC 8308](https://datatracker.ietf.org/doc/html/rfc8308) - Extension Negotiation
//! - [RFC 8731](https://datatracker.ietf.org/doc/html/rfc8731) - Curve25519 Key Exchange

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod certificate;
pub mod channel;
pub mod compression;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod hostkey;
pub mod kex;
pub mod kex_dh;
pub mod kex_ecdh;
pub mod kex_hybrid;
pub mod keys;
pub mod known_hosts;
pub mod message;
pub mod packet;
pub mod registry;
pub mod rng;
pub mod session;
pub mod trust;
pub mod version;
pub mod wire;

pub use fynx_platform::{FynxError, FynxResult};
pub use session::{Session, SessionBuilder, SessionPhase};
