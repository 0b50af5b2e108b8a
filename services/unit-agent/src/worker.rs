//! Worker lifecycle primitives.
//!
//! Every control loop in the agent runs as a [`Worker`]: a tokio task that owns
//! its state exclusively and finishes with a terminal `Result`. The loop gets a
//! [`KillSignal`] it must watch at every suspension point; helper tasks it
//! spawns share the same signal, so killing the worker (or the worker failing)
//! tears everything down together.
//!
//! - `kill()` asks the worker to stop; it does not wait
//! - `wait()` blocks until the worker has finished and returns its terminal
//!   error, the same value on every call
//! - a loop that returns [`WorkerError::Dying`] because it was killed has
//!   finished cleanly, so `wait()` reports `Ok(())`

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::remote::RemoteError;

// =============================================================================
// Errors
// =============================================================================

/// Terminal errors of a worker loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker was asked to stop.
    #[error("worker is dying")]
    Dying,

    /// The unit or its service is gone for good; the whole agent must stop.
    #[error("agent should be terminated")]
    TerminateAgent,

    /// A remote call failed.
    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: RemoteError,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Wraps a remote failure with what the worker was doing.
    pub fn remote(context: impl Into<String>, source: RemoteError) -> Self {
        WorkerError::Remote {
            context: context.into(),
            source,
        }
    }

    /// Returns true if the agent as a whole should shut down.
    pub fn is_terminate_agent(&self) -> bool {
        matches!(self, WorkerError::TerminateAgent)
    }
}

// =============================================================================
// Kill signal
// =============================================================================

/// The owning side of a kill signal.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    tx: Arc<watch::Sender<bool>>,
}

impl KillSwitch {
    /// Create a switch that has not been thrown.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Throw the switch. Idempotent.
    pub fn kill(&self) {
        self.tx.send_replace(true);
    }

    /// Check whether the switch has been thrown.
    pub fn is_killed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Get a signal observing this switch.
    pub fn signal(&self) -> KillSignal {
        KillSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

/// The observing side of a kill signal.
///
/// If every [`KillSwitch`] for a signal is dropped the signal counts as
/// thrown: nobody is left who could keep the work alive.
#[derive(Debug, Clone)]
pub struct KillSignal {
    rx: watch::Receiver<bool>,
}

impl KillSignal {
    /// Check if the kill signal has fired.
    pub fn is_dying(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the kill signal fires.
    pub async fn dying(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|dying| *dying).await;
    }

    /// Runs `fut` unless the kill signal fires first, in which case `fut` is
    /// dropped (cancelling it) and [`WorkerError::Dying`] is returned.
    pub async fn until_dying<F: Future>(&self, fut: F) -> Result<F::Output, WorkerError> {
        tokio::select! {
            biased;

            _ = self.dying() => Err(WorkerError::Dying),
            out = fut => Ok(out),
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

type Outcome = Option<Result<(), WorkerError>>;

/// Handle to a spawned control loop.
pub struct Worker {
    name: String,
    switch: KillSwitch,
    outcome: watch::Receiver<Outcome>,
}

impl Worker {
    /// Spawn `body` as a worker task named `name`.
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(KillSignal) -> Fut,
        Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        let name = name.into();
        let switch = KillSwitch::new();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let fut = body(switch.signal());
        let task_switch = switch.clone();
        let task_name = name.clone();
        tokio::spawn(async move {
            let result = fut.await;
            let killed = task_switch.is_killed();
            // Helpers share this signal and must not outlive the loop.
            task_switch.kill();

            let result = match result {
                Err(WorkerError::Dying) if killed => Ok(()),
                other => other,
            };
            match &result {
                Ok(()) => info!(worker = %task_name, "Worker stopped"),
                Err(e) if e.is_terminate_agent() => {
                    info!(worker = %task_name, "Worker requested agent termination")
                }
                Err(e) => error!(worker = %task_name, error = %e, "Worker failed"),
            }
            outcome_tx.send_replace(Some(result));
        });

        debug!(worker = %name, "Spawned worker");
        Self {
            name,
            switch,
            outcome: outcome_rx,
        }
    }

    /// The worker's name, for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the worker to stop.
    pub fn kill(&self) {
        self.switch.kill();
    }

    /// A signal that fires when this worker is killed or finishes.
    pub fn kill_signal(&self) -> KillSignal {
        self.switch.signal()
    }

    /// Check if the worker has finished.
    pub fn is_dead(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Resolves once the worker has finished.
    pub async fn dead(&self) {
        let _ = self.wait().await;
    }

    /// Wait for the worker to finish and return its terminal error.
    pub async fn wait(&self) -> Result<(), WorkerError> {
        let mut rx = self.outcome.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(Ok(())),
            Err(_) => Err(WorkerError::Internal(format!(
                "worker {} exited without reporting a result",
                self.name
            ))),
        };
        outcome
    }

    /// Kill the worker and wait for it to finish.
    pub async fn stop(&self) -> Result<(), WorkerError> {
        self.kill();
        self.wait().await
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.switch.kill();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_killed_worker_stops_cleanly() {
        let worker = Worker::spawn("test", |kill| async move {
            kill.dying().await;
            Err(WorkerError::Dying)
        });

        assert!(!worker.is_dead());
        worker.kill();
        assert_eq!(worker.wait().await, Ok(()));
        assert!(worker.is_dead());
    }

    #[tokio::test]
    async fn test_failure_is_reported_to_every_waiter() {
        let worker = Worker::spawn("test", |_kill| async move {
            Err(WorkerError::Internal("boom".to_string()))
        });

        let expected = Err(WorkerError::Internal("boom".to_string()));
        assert_eq!(worker.wait().await, expected);
        assert_eq!(worker.wait().await, expected);
        assert_eq!(worker.stop().await, expected);
    }

    #[tokio::test]
    async fn test_failure_fires_kill_signal() {
        let worker = Worker::spawn("test", |_kill| async move { Err(WorkerError::TerminateAgent) });
        let signal = worker.kill_signal();

        signal.dying().await;
        assert!(signal.is_dying());
        assert!(worker.wait().await.unwrap_err().is_terminate_agent());
    }

    #[tokio::test]
    async fn test_dying_without_kill_is_an_error() {
        let worker = Worker::spawn("test", |_kill| async move { Err(WorkerError::Dying) });
        assert_eq!(worker.wait().await, Err(WorkerError::Dying));
    }

    #[tokio::test]
    async fn test_until_dying_cancels_pending_future() {
        let switch = KillSwitch::new();
        let signal = switch.signal();
        switch.kill();

        let result = signal.until_dying(std::future::pending::<()>()).await;
        assert_eq!(result, Err(WorkerError::Dying));
    }

    #[tokio::test]
    async fn test_dropped_switch_counts_as_killed() {
        let switch = KillSwitch::new();
        let signal = switch.signal();
        assert!(!signal.is_dying());

        drop(switch);
        assert!(signal.is_dying());
        signal.dying().await;
    }
}
