//! SSH protocol version exchange (RFC 4253 Section 4.2).
//!
//! Both sides send an identification string:
//!
//! ```text
//! SSH-protoversion-softwareversion SP comments CR LF
//! ```
//!
//! A server may print other lines before its identification string; those
//! are skipped. Protocol 1.x is refused, `1.99` (compatible with 2.0) is
//! accepted.
//!
//! # Example
//!
//! ```rust
//! use fynx_ssh::version::Version;
//!
//! let parsed = Version::parse("SSH-2.0-OpenSSH_8.9").unwrap();
//! assert_eq!(parsed.software(), "OpenSSH_8.9");
//! assert!(Version::parse("SSH-1.5-Old").is_err());
//! ```

use fynx_platform::{FynxError, FynxResult};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::debug;

/// Maximum length of the identification line including CR LF (RFC 4253
/// Section 4.2).
pub const MAX_VERSION_LENGTH: usize = 255;

/// Maximum length of a pre-identification line.
const MAX_PREAMBLE_LINE: u64 = 1024;

/// Maximum number of pre-identification lines tolerated.
const MAX_PREAMBLE_LINES: usize = 1024;

/// SSH identification string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    proto_version: String,
    software_version: String,
    comments: Option<String>,
    /// Identification line exactly as exchanged, without CR LF
    raw: String,
}

impl Version {
    /// Creates a protocol 2.0 identification string.
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        let mut raw = format!("SSH-2.0-{}", software);
        if let Some(c) = comments {
            raw.push(' ');
            raw.push_str(c);
        }
        Self {
            proto_version: "2.0".to_string(),
            software_version: software.to_string(),
            comments: comments.map(String::from),
            raw,
        }
    }

    /// Parses an identification line (with or without CR LF).
    ///
    /// # Errors
    ///
    /// Returns [`FynxError::Protocol`] if the line is too long, contains a
    /// null byte, does not start with `SSH-`, or names an SSH 1.x protocol
    /// other than `1.99`.
    pub fn parse(line: &str) -> FynxResult<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');

        if line.len() + 2 > MAX_VERSION_LENGTH {
            return Err(FynxError::Protocol(format!(
                "Version string too long: {} bytes plus CR LF (max {})",
                line.len(),
                MAX_VERSION_LENGTH
            )));
        }
        if line.contains('\0') {
            return Err(FynxError::Protocol(
                "Version string contains null byte".to_string(),
            ));
        }
        if !line.starts_with("SSH-") {
            return Err(FynxError::Protocol(format!(
                "Invalid version string: must start with 'SSH-', got '{}'",
                line
            )));
        }

        let parts: Vec<&str> = line.splitn(3, '-').collect();
        if parts.len() < 3 {
            return Err(FynxError::Protocol(format!(
                "Invalid version string format: '{}'",
                line
            )));
        }
        let proto_version = parts[1];
        if proto_version != "2.0" && proto_version != "1.99" {
            return Err(FynxError::Protocol(format!(
                "Unsupported protocol version: '{}' (expected '2.0' or '1.99')",
                proto_version
            )));
        }

        let (software_version, comments) = match parts[2].split_once(' ') {
            Some((software, comments)) => (software.to_string(), Some(comments.trim().to_string())),
            None => (parts[2].to_string(), None),
        };

        Ok(Self {
            proto_version: proto_version.to_string(),
            software_version,
            comments,
            raw: line.to_string(),
        })
    }

    /// Returns the protocol version (e.g., "2.0").
    pub fn proto_version(&self) -> &str {
        &self.proto_version
    }

    /// Returns the software version (e.g., "OpenSSH_8.9").
    pub fn software(&self) -> &str {
        &self.software_version
    }

    /// Returns the comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Returns the identification line without CR LF, as hashed into H.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// OpenSSH 7.4 omits rsa-sha2-* from its `server-sig-algs` extension
    /// although it accepts them.
    pub fn advertises_incomplete_sig_algs(&self) -> bool {
        self.raw.starts_with("SSH-2.0-OpenSSH_7.4")
    }

    /// Converts to wire format (with CR LF).
    pub fn to_wire_format(&self) -> Vec<u8> {
        format!("{}\r\n", self.raw).into_bytes()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Reads the peer identification string, skipping any preceding lines.
pub async fn read_version<R>(reader: &mut R) -> FynxResult<Version>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(MAX_VERSION_LENGTH);
    for _ in 0..MAX_PREAMBLE_LINES {
        line.clear();
        let n = (&mut *reader)
            .take(MAX_PREAMBLE_LINE)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            return Err(FynxError::Protocol(
                "Connection closed during version exchange".to_string(),
            ));
        }
        if line.last() != Some(&b'\n') && n as u64 == MAX_PREAMBLE_LINE {
            return Err(FynxError::Protocol(
                "Version exchange line too long".to_string(),
            ));
        }
        let text = String::from_utf8_lossy(&line);
        if text.starts_with("SSH-") {
            let version = Version::parse(&text)?;
            debug!(remote_version = %version, "Received identification string");
            return Ok(version);
        }
        debug!(line = %text.trim_end(), "Ignoring pre-identification line");
    }
    Err(FynxError::Protocol(
        "Too many lines before identification string".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn test_version_display() {
        let version = Version::new("Fynx_0.2.0", Some("comment"));
        assert_eq!(version.to_string(), "SSH-2.0-Fynx_0.2.0 comment");
        assert_eq!(version.to_wire_format(), b"SSH-2.0-Fynx_0.2.0 comment\r\n");
    }

    #[test]
    fn test_version_parse_with_comments() {
        let version = Version::parse("SSH-2.0-OpenSSH_8.9 Ubuntu-3ubuntu0.1\r\n").unwrap();
        assert_eq!(version.software(), "OpenSSH_8.9");
        assert_eq!(version.comments(), Some("Ubuntu-3ubuntu0.1"));
        assert_eq!(version.as_str(), "SSH-2.0-OpenSSH_8.9 Ubuntu-3ubuntu0.1");
    }

    #[test]
    fn test_version_accepts_1_99() {
        let version = Version::parse("SSH-1.99-Cisco-1.25").unwrap();
        assert_eq!(version.proto_version(), "1.99");
        assert_eq!(version.software(), "Cisco-1.25");
    }

    #[test]
    fn test_version_rejects_ssh1() {
        match Version::parse("SSH-1.5-OldServer") {
            Err(FynxError::Protocol(msg)) => assert!(msg.contains("Unsupported protocol version")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_version_parse_too_long() {
        let long_string = format!("SSH-2.0-{}", "A".repeat(300));
        assert!(Version::parse(&long_string).is_err());
    }

    #[test]
    fn test_version_length_counts_cr_lf() {
        let fits = format!("SSH-2.0-{}", "A".repeat(253 - 8));
        assert_eq!(fits.len(), 253);
        assert!(Version::parse(&format!("{}\r\n", fits)).is_ok());

        let over = format!("{}A", fits);
        match Version::parse(&format!("{}\r\n", over)) {
            Err(FynxError::Protocol(msg)) => assert!(msg.contains("too long")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
        assert!(Version::parse(&over).is_err());
    }

    #[test]
    fn test_version_parse_null_byte() {
        assert!(Version::parse("SSH-2.0-Test\0Bad").is_err());
    }

    #[test]
    fn test_openssh_7_4_compat_flag() {
        assert!(Version::parse("SSH-2.0-OpenSSH_7.4").unwrap().advertises_incomplete_sig_algs());
        assert!(!Version::parse("SSH-2.0-OpenSSH_7.9").unwrap().advertises_incomplete_sig_algs());
    }

    #[tokio::test]
    async fn test_read_version_skips_banner_lines() {
        let input: &[u8] = b"Welcome to the host\r\nauthorized use only\r\nSSH-2.0-OpenSSH_9.6\r\nrest";
        let mut reader = BufReader::new(input);
        let version = read_version(&mut reader).await.unwrap();
        assert_eq!(version.software(), "OpenSSH_9.6");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"rest");
    }

    #[tokio::test]
    async fn test_read_version_eof() {
        let input: &[u8] = b"no identification\r\n";
        let mut reader = BufReader::new(input);
        assert!(read_version(&mut reader).await.is_err());
    }
}
