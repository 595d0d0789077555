use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation signal.
///
/// Clones observe the same trip. Delivery is advisory: nothing is interrupted
/// until the work reaches a suspension point that selects on [`cancelled`] or
/// checks [`is_cancelled`].
///
/// [`cancelled`]: CancelToken::cancelled
/// [`is_cancelled`]: CancelToken::is_cancelled
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trips the token. Sticky and idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token trips; selectable at any suspension point.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow_and_update() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow_and_update() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
