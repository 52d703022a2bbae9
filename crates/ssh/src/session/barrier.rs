//! Rekey barrier.
//!
//! From the moment our KEXINIT is written until the new outbound keys are
//! installed, only transport and key exchange messages may be sent.
//! Everything else waits here, up to the configured rekey timeout.

use std::time::Duration;

use fynx_platform::{FynxError, FynxResult};
use tokio::sync::watch;

use crate::message::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BarrierState {
    Open,
    Rekeying,
    Closed,
}

/// Gate for non-KEX traffic. State changes happen under the writer lock.
#[derive(Debug)]
pub(crate) struct RekeyBarrier {
    state: watch::Sender<BarrierState>,
}

impl Default for RekeyBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl RekeyBarrier {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(BarrierState::Open);
        Self { state }
    }

    pub(crate) fn is_rekeying(&self) -> bool {
        *self.state.borrow() == BarrierState::Rekeying
    }

    /// Returns true if a message of this type may be written now.
    pub(crate) fn allows(&self, msg_type: u8) -> bool {
        MessageType::is_kex_message(msg_type) || !self.is_rekeying()
    }

    pub(crate) fn raise(&self) {
        self.state.send_modify(|s| {
            if *s == BarrierState::Open {
                *s = BarrierState::Rekeying;
            }
        });
    }

    pub(crate) fn release(&self) {
        self.state.send_modify(|s| {
            if *s == BarrierState::Rekeying {
                *s = BarrierState::Open;
            }
        });
    }

    /// Wakes every waiter for good.
    pub(crate) fn close(&self) {
        self.state.send_replace(BarrierState::Closed);
    }

    /// Waits until the barrier is released or closed.
    pub(crate) async fn wait(&self, timeout: Duration) -> FynxResult<()> {
        let mut rx = self.state.subscribe();
        let released = rx.wait_for(|s| *s != BarrierState::Rekeying);
        let result = match tokio::time::timeout(timeout, released).await {
            Ok(_) => Ok(()),
            Err(_) => Err(FynxError::FlowControlTimeout(format!(
                "key exchange did not complete within {:?}",
                timeout
            ))),
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_allow_list_while_rekeying() {
        let barrier = RekeyBarrier::new();
        assert!(barrier.allows(94));
        barrier.raise();
        assert!(barrier.allows(MessageType::KexInit as u8));
        assert!(barrier.allows(MessageType::NewKeys as u8));
        assert!(barrier.allows(31));
        assert!(barrier.allows(MessageType::Disconnect as u8));
        assert!(!barrier.allows(MessageType::ChannelData as u8));
        assert!(!barrier.allows(MessageType::Ignore as u8));
        barrier.release();
        assert!(barrier.allows(94));
    }

    #[tokio::test]
    async fn test_wait_returns_when_released() {
        let barrier = Arc::new(RekeyBarrier::new());
        barrier.raise();
        let waiter = {
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move { barrier.wait(Duration::from_secs(10)).await })
        };
        tokio::task::yield_now().await;
        barrier.release();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let barrier = RekeyBarrier::new();
        barrier.raise();
        let err = barrier.wait(Duration::from_secs(3)).await.unwrap_err();
        assert!(matches!(err, FynxError::FlowControlTimeout(_)));
    }

    #[tokio::test]
    async fn test_close_wakes_waiters_and_stays_closed() {
        let barrier = RekeyBarrier::new();
        barrier.raise();
        barrier.close();
        barrier.wait(Duration::from_millis(10)).await.unwrap();
        barrier.raise();
        assert!(!barrier.is_rekeying());
    }
}
