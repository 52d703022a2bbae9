//! User authentication hook (RFC 4252).
//!
//! The session does not implement authentication methods itself. It
//! requests the `ssh-userauth` service and hands a caller-supplied
//! [`UserAuth`] an [`AuthTransport`] that only carries authentication
//! messages (50-79). Banners are logged and skipped by the transport.
//!
//! Two methods are built in: [`NoneAuth`] (lists the methods the server
//! accepts) and [`PasswordAuth`].

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use fynx_platform::{FynxError, FynxResult};
use zeroize::Zeroizing;

use crate::message::{expect_type, MessageType};
use crate::wire::{read_bool, read_name_list, write_bool, write_string};

/// Service started after authentication.
pub const CONNECTION_SERVICE: &str = "ssh-connection";

/// Outcome of one authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    /// SSH_MSG_USERAUTH_SUCCESS
    Success,
    /// SSH_MSG_USERAUTH_FAILURE
    Failure {
        /// Methods that can continue
        methods: Vec<String>,
        /// Partial success flag
        partial_success: bool,
    },
}

impl AuthResult {
    /// Parses USERAUTH_SUCCESS or USERAUTH_FAILURE. Returns `None` for
    /// any other authentication message.
    pub fn from_message(data: &[u8]) -> FynxResult<Option<Self>> {
        match data.first().copied().and_then(MessageType::from_u8) {
            Some(MessageType::UserauthSuccess) => Ok(Some(AuthResult::Success)),
            Some(MessageType::UserauthFailure) => {
                let mut offset = 0;
                expect_type(data, &mut offset, MessageType::UserauthFailure)?;
                let methods = read_name_list(data, &mut offset)?;
                let partial_success = read_bool(data, &mut offset)?;
                Ok(Some(AuthResult::Failure {
                    methods,
                    partial_success,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Returns true for [`AuthResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, AuthResult::Success)
    }
}

/// Restricted view of the session used during authentication.
#[async_trait]
pub trait AuthTransport: Send {
    /// Session identifier (H of the first key exchange), needed for
    /// signature-based methods.
    fn session_id(&self) -> &[u8];

    /// Sends an authentication message (50-79).
    async fn send(&mut self, payload: Vec<u8>) -> FynxResult<()>;

    /// Receives the next authentication message, skipping banners.
    async fn receive(&mut self) -> FynxResult<Vec<u8>>;
}

/// An authentication method.
#[async_trait]
pub trait UserAuth: Send {
    /// Method name as sent on the wire.
    fn method(&self) -> &str;

    /// Runs the method to completion.
    async fn authenticate(
        &mut self,
        username: &str,
        transport: &mut dyn AuthTransport,
    ) -> FynxResult<AuthResult>;
}

/// Builds the common USERAUTH_REQUEST prefix.
///
/// ```text
/// byte      SSH_MSG_USERAUTH_REQUEST (50)
/// string    user name
/// string    service name
/// string    method name
/// ```
pub fn request_header(username: &str, method: &str) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(MessageType::UserauthRequest as u8);
    write_string(&mut buf, username.as_bytes());
    write_string(&mut buf, CONNECTION_SERVICE.as_bytes());
    write_string(&mut buf, method.as_bytes());
    buf
}

/// Waits for SUCCESS or FAILURE, rejecting anything else.
async fn await_result(transport: &mut dyn AuthTransport) -> FynxResult<AuthResult> {
    let reply = transport.receive().await?;
    AuthResult::from_message(&reply)?.ok_or_else(|| {
        FynxError::Protocol(format!(
            "Unexpected authentication message {}",
            reply.first().copied().unwrap_or(0)
        ))
    })
}

/// The `none` method. Servers answer with the list of usable methods.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneAuth;

#[async_trait]
impl UserAuth for NoneAuth {
    fn method(&self) -> &str {
        "none"
    }

    async fn authenticate(
        &mut self,
        username: &str,
        transport: &mut dyn AuthTransport,
    ) -> FynxResult<AuthResult> {
        transport
            .send(request_header(username, "none").to_vec())
            .await?;
        await_result(transport).await
    }
}

/// The `password` method. The password is zeroed on drop.
pub struct PasswordAuth {
    password: Zeroizing<String>,
}

impl PasswordAuth {
    /// Creates the method.
    pub fn new(password: &str) -> Self {
        Self {
            password: Zeroizing::new(password.to_string()),
        }
    }
}

impl std::fmt::Debug for PasswordAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordAuth")
            .field("password", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl UserAuth for PasswordAuth {
    fn method(&self) -> &str {
        "password"
    }

    async fn authenticate(
        &mut self,
        username: &str,
        transport: &mut dyn AuthTransport,
    ) -> FynxResult<AuthResult> {
        let mut buf = request_header(username, "password");
        write_bool(&mut buf, false);
        write_string(&mut buf, self.password.as_bytes());
        let request = Zeroizing::new(buf.to_vec());
        buf.fill(0);
        transport.send(request.to_vec()).await?;

        let reply = transport.receive().await?;
        if reply.first() == Some(&(MessageType::UserauthPkOk as u8)) {
            // SSH_MSG_USERAUTH_PASSWD_CHANGEREQ shares number 60.
            return Err(FynxError::Protocol(
                "Server requires a password change".to_string(),
            ));
        }
        AuthResult::from_message(&reply)?.ok_or_else(|| {
            FynxError::Protocol(format!(
                "Unexpected authentication message {}",
                reply.first().copied().unwrap_or(0)
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{read_utf8, write_name_list};
    use std::collections::VecDeque;

    struct ScriptedTransport {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
    }

    #[async_trait]
    impl AuthTransport for ScriptedTransport {
        fn session_id(&self) -> &[u8] {
            &[1; 32]
        }

        async fn send(&mut self, payload: Vec<u8>) -> FynxResult<()> {
            self.sent.push(payload);
            Ok(())
        }

        async fn receive(&mut self) -> FynxResult<Vec<u8>> {
            self.replies
                .pop_front()
                .ok_or_else(|| FynxError::Closed("no more replies".to_string()))
        }
    }

    fn failure(methods: &[&str]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(51);
        let methods: Vec<String> = methods.iter().map(|m| m.to_string()).collect();
        write_name_list(&mut buf, &methods);
        write_bool(&mut buf, false);
        buf.to_vec()
    }

    fn transport(replies: Vec<Vec<u8>>) -> ScriptedTransport {
        ScriptedTransport {
            sent: Vec::new(),
            replies: replies.into(),
        }
    }

    #[tokio::test]
    async fn test_none_lists_methods() {
        let mut t = transport(vec![failure(&["publickey", "password"])]);
        let result = NoneAuth.authenticate("alice", &mut t).await.unwrap();
        assert_eq!(
            result,
            AuthResult::Failure {
                methods: vec!["publickey".to_string(), "password".to_string()],
                partial_success: false,
            }
        );

        let sent = &t.sent[0];
        let mut offset = 1;
        assert_eq!(sent[0], 50);
        assert_eq!(read_utf8(sent, &mut offset).unwrap(), "alice");
        assert_eq!(read_utf8(sent, &mut offset).unwrap(), "ssh-connection");
        assert_eq!(read_utf8(sent, &mut offset).unwrap(), "none");
    }

    #[tokio::test]
    async fn test_password_success() {
        let mut t = transport(vec![vec![52]]);
        let mut auth = PasswordAuth::new("hunter2");
        assert!(auth.authenticate("bob", &mut t).await.unwrap().is_success());
        assert!(t.sent[0].ends_with(b"\0\0\0\0\x07hunter2"));
    }

    #[tokio::test]
    async fn test_password_change_request_is_error() {
        let mut t = transport(vec![vec![60, 0, 0, 0, 0, 0, 0, 0, 0]]);
        let mut auth = PasswordAuth::new("old");
        assert!(auth.authenticate("bob", &mut t).await.is_err());
    }

    #[test]
    fn test_password_debug_redacted() {
        let shown = format!("{:?}", PasswordAuth::new("secret"));
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn test_result_ignores_other_messages() {
        assert_eq!(AuthResult::from_message(&[53, 0, 0, 0, 0]).unwrap(), None);
        assert!(AuthResult::from_message(&[51, 0, 0]).is_err());
    }
}
