//! Cancellation context for the blocking steps of a build.
//!
//! A [`CancelHandle`] fires every [`Cancellation`] cloned from the pair it was
//! created with. Steps race their work against [`Cancellation::cancelled`] in
//! a `tokio::select!`.

use tokio::sync::watch;

/// Fires the paired [`Cancellation`].
#[derive(Debug)]
pub struct CancelHandle {
  tx: watch::Sender<bool>,
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct Cancellation {
  rx: watch::Receiver<bool>,
}

/// Create a connected handle and context.
pub fn cancellation() -> (CancelHandle, Cancellation) {
  let (tx, rx) = watch::channel(false);
  (CancelHandle { tx }, Cancellation { rx })
}

impl CancelHandle {
  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }
}

impl Cancellation {
  /// A context that is never cancelled.
  pub fn never() -> Self {
    let (_, rx) = watch::channel(false);
    Self { rx }
  }

  pub fn is_cancelled(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolve once cancellation is requested. Never resolves if the handle was
  /// dropped without cancelling.
  pub async fn cancelled(&self) {
    let mut rx = self.rx.clone();
    loop {
      if *rx.borrow_and_update() {
        return;
      }
      if rx.changed().await.is_err() {
        std::future::pending::<()>().await;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn cancel_wakes_waiters() {
    let (handle, cancel) = cancellation();
    let waiter = tokio::spawn({
      let cancel = cancel.clone();
      async move { cancel.cancelled().await }
    });

    handle.cancel();

    tokio::time::timeout(Duration::from_secs(5), waiter)
      .await
      .expect("waiter should wake")
      .unwrap();
    assert!(cancel.is_cancelled());
  }

  #[tokio::test]
  async fn already_cancelled_resolves_immediately() {
    let (handle, cancel) = cancellation();
    handle.cancel();

    tokio::time::timeout(Duration::from_millis(100), cancel.cancelled())
      .await
      .expect("should resolve immediately");
  }

  #[tokio::test]
  async fn never_does_not_resolve() {
    let cancel = Cancellation::never();
    let result = tokio::time::timeout(Duration::from_millis(50), cancel.cancelled()).await;

    assert!(result.is_err());
    assert!(!cancel.is_cancelled());
  }

  #[tokio::test]
  async fn dropped_handle_does_not_cancel() {
    let (handle, cancel) = cancellation();
    drop(handle);

    let result = tokio::time::timeout(Duration::from_millis(50), cancel.cancelled()).await;
    assert!(result.is_err());
  }
}
