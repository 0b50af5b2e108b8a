//! Remote watch primitives.
//!
//! A watcher delivers change notifications; the consumer re-fetches whatever
//! it cares about after each one. Every watcher sends an initial event as soon
//! as it is created.

use tokio::sync::mpsc;

use super::RemoteError;

/// The consuming end of a watch.
#[derive(Debug)]
pub struct Watcher<T> {
    rx: mpsc::UnboundedReceiver<Result<T, RemoteError>>,
}

/// Payload-free watcher: "something changed, look again".
pub type NotifyWatcher = Watcher<()>;

/// Watcher whose events name the keys that changed.
pub type StringsWatcher = Watcher<Vec<String>>;

impl<T> Watcher<T> {
    /// Create a connected source/watcher pair.
    pub fn channel() -> (WatchSource<T>, Watcher<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WatchSource { tx }, Watcher { rx })
    }

    /// Wait for the next change. Cancel-safe.
    ///
    /// Returns the error the watch failed with, or
    /// [`RemoteError::WatcherStopped`] if the source went away.
    pub async fn changed(&mut self) -> Result<T, RemoteError> {
        match self.rx.recv().await {
            Some(event) => event,
            None => Err(RemoteError::WatcherStopped),
        }
    }

    /// Stop the watch. Consumes the watcher, so it is stopped exactly once.
    pub fn stop(mut self) -> Result<(), RemoteError> {
        self.rx.close();
        Ok(())
    }
}

/// The producing end of a watch.
#[derive(Debug)]
pub struct WatchSource<T> {
    tx: mpsc::UnboundedSender<Result<T, RemoteError>>,
}

impl<T> Clone for WatchSource<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> WatchSource<T> {
    /// Deliver a change. Returns false once the watcher has been stopped.
    pub fn send(&self, event: T) -> bool {
        self.tx.send(Ok(event)).is_ok()
    }

    /// Fail the watch with `err`.
    pub fn fail(&self, err: RemoteError) {
        let _ = self.tx.send(Err(err));
    }

    /// Check if the consumer has stopped (or dropped) the watcher.
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}

impl WatchSource<()> {
    /// Deliver a payload-free change.
    pub fn notify(&self) -> bool {
        self.send(())
    }
}
