//! Single-settle completion cell
//!
//! Resolves once, never rejects: the value is the outcome. Settling twice is a
//! contract violation and panics.

use tokio::sync::watch;

/// A value that is set exactly once and can be awaited by any number of tasks
#[derive(Debug)]
pub struct Completion<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Completion<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Store the value and wake every waiter
    ///
    /// # Panics
    ///
    /// When the completion was already settled.
    pub fn settle(&self, value: T) {
        let mut value = Some(value);
        let fresh = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = value.take();
            true
        });
        assert!(fresh, "completion settled twice");
    }

    /// The value, if settled
    pub fn peek(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Wait until settled
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().clone() {
                return value;
            }
            // The sender lives in `self`, so the channel cannot close here.
            let _ = rx.changed().await;
        }
    }
}
