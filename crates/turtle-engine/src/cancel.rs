use tokio::sync::watch;

use crate::error::{EngineError, EngineResult};

/// Cooperative cancellation signal checked between log round-trips.
///
/// Cloning is cheap; every clone observes the same signal.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Follow an existing shutdown channel; `true` means cancelled.
    pub fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// `Err(Cancelled)` once the signal has fired.
    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Sending side of a [`CancelToken`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken::from_receiver(self.tx.subscribe())
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
        tracing::debug!("cancellation requested");
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_is_never_cancelled() {
        assert!(CancelToken::never().check().is_ok());
    }

    #[test]
    fn cancel_reaches_existing_and_later_tokens() {
        let handle = CancelHandle::new();
        let early = handle.token();
        assert!(!early.is_cancelled());

        handle.cancel();
        assert!(matches!(early.check(), Err(EngineError::Cancelled)));
        assert!(handle.token().is_cancelled());
    }
}
