//! The leadership tracker loop.

use std::sync::Arc;
use std::time::Duration;

use fleet_names::{ServiceName, UnitTag};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::remote::{LeadershipManager, RemoteError};
use crate::worker::{KillSignal, Worker, WorkerError};

/// Queued ticket requests before `claim_leader` callers wait for the loop.
const TICKET_QUEUE_SIZE: usize = 32;

/// Answer to a single leadership query.
#[derive(Debug)]
pub struct Ticket {
    rx: oneshot::Receiver<bool>,
}

impl Ticket {
    /// Wait for the answer. A ticket that is never resolved (because the
    /// tracker stopped) reads as `false`.
    pub async fn wait(self) -> bool {
        self.rx.await.unwrap_or(false)
    }
}

/// Tracks leadership of a service on behalf of one of its units.
pub struct Tracker {
    unit: UnitTag,
    service: ServiceName,
    duration: Duration,
    tickets: mpsc::Sender<oneshot::Sender<bool>>,
    worker: Worker,
}

impl Tracker {
    /// Start tracking leadership of `unit`'s service. The first claim is
    /// made immediately.
    pub fn new(unit: UnitTag, manager: Arc<dyn LeadershipManager>, duration: Duration) -> Self {
        let service = unit.service();
        let (tickets_tx, tickets_rx) = mpsc::channel(TICKET_QUEUE_SIZE);

        let tracker_loop = TrackerLoop {
            unit: unit.clone(),
            service: service.clone(),
            duration,
            manager,
            tickets: tickets_rx,
            role: Role::Minion,
            release_waiter: None,
        };
        let worker = Worker::spawn("leadership-tracker", move |kill| tracker_loop.run(kill));

        Self {
            unit,
            service,
            duration,
            tickets: tickets_tx,
            worker,
        }
    }

    pub fn unit(&self) -> &UnitTag {
        &self.unit
    }

    pub fn service_name(&self) -> &ServiceName {
        &self.service
    }

    /// The duration for which a `true` ticket guarantees leadership.
    pub fn claim_duration(&self) -> Duration {
        self.duration
    }

    /// Ask whether this unit is leader. The answer is delivered through the
    /// returned ticket once the loop has verified it.
    pub async fn claim_leader(&self) -> Ticket {
        let (tx, rx) = oneshot::channel();
        // A stopped loop drops the sender, which resolves the ticket false.
        let _ = self.tickets.send(tx).await;
        Ticket { rx }
    }

    pub fn kill(&self) {
        self.worker.kill();
    }

    pub async fn wait(&self) -> Result<(), WorkerError> {
        self.worker.wait().await
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }
}

// =============================================================================
// Loop
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Holds a confirmed claim that must be renewed at `renew_at`.
    Leader { renew_at: Instant },
    /// Claim denied; waiting for the lease to be released.
    Minion,
}

struct TrackerLoop {
    unit: UnitTag,
    service: ServiceName,
    duration: Duration,
    manager: Arc<dyn LeadershipManager>,
    tickets: mpsc::Receiver<oneshot::Sender<bool>>,
    role: Role,
    release_waiter: Option<JoinHandle<()>>,
}

impl TrackerLoop {
    async fn run(mut self, kill: KillSignal) -> Result<(), WorkerError> {
        let result = self.serve(&kill).await;

        if let Some(waiter) = self.release_waiter.take() {
            waiter.abort();
        }
        self.tickets.close();
        while let Ok(ticket) = self.tickets.try_recv() {
            let _ = ticket.send(false);
        }
        result
    }

    async fn serve(&mut self, kill: &KillSignal) -> Result<(), WorkerError> {
        info!(unit = %self.unit, service = %self.service, "Making initial leadership claim");
        self.refresh(kill).await?;

        loop {
            tokio::select! {
                biased;

                _ = kill.dying() => return Err(WorkerError::Dying),

                _ = released(&mut self.release_waiter) => {
                    self.release_waiter = None;
                    info!(unit = %self.unit, service = %self.service, "Claiming released leadership");
                    self.refresh(kill).await?;
                }

                _ = renew_due(self.role) => {
                    info!(unit = %self.unit, service = %self.service, "Renewing leadership");
                    self.refresh(kill).await?;
                }

                Some(ticket) = self.tickets.recv() => {
                    self.resolve(ticket, kill).await?;
                }
            }
        }
    }

    /// Claim leadership and update the role to match the answer.
    async fn refresh(&mut self, kill: &KillSignal) -> Result<(), WorkerError> {
        debug!(unit = %self.unit, service = %self.service, "Checking leadership");
        let lease = self
            .duration
            .checked_mul(2)
            .ok_or_else(|| WorkerError::Internal(format!("leadership duration {:?} too long", self.duration)))?;
        let claimed_at = Instant::now();
        let renew_at = claimed_at
            .checked_add(self.duration)
            .ok_or_else(|| WorkerError::Internal(format!("leadership duration {:?} too long", self.duration)))?;
        let claim = self
            .manager
            .claim_leadership(&self.service, &self.unit, lease);

        match kill.until_dying(claim).await? {
            Ok(()) => self.set_leader(renew_at, lease),
            Err(RemoteError::ClaimDenied) => self.set_minion(kill),
            Err(e) => return Err(WorkerError::remote("leadership failure", e)),
        }
        Ok(())
    }

    fn set_leader(&mut self, renew_at: Instant, lease: Duration) {
        let expires = chrono::Duration::from_std(lease)
            .ok()
            .and_then(|lease| chrono::Utc::now().checked_add_signed(lease))
            .map(|expires| expires.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        info!(
            unit = %self.unit,
            service = %self.service,
            expires = %expires,
            "Leadership confirmed"
        );
        self.role = Role::Leader { renew_at };
    }

    fn set_minion(&mut self, kill: &KillSignal) {
        info!(unit = %self.unit, service = %self.service, "Leadership denied");
        self.role = Role::Minion;
        if self.release_waiter.is_some() {
            return;
        }

        let manager = Arc::clone(&self.manager);
        let service = self.service.clone();
        let unit = self.unit.clone();
        let kill = kill.clone();
        self.release_waiter = Some(tokio::spawn(async move {
            debug!(unit = %unit, service = %service, "Waiting for leadership release");
            let released = manager.block_until_leadership_released(&service);
            if let Ok(Err(e)) = kill.until_dying(released).await {
                // The loop retries the claim either way; a real failure
                // surfaces from that claim.
                warn!(unit = %unit, service = %service, error = %e, "Leadership release wait failed");
            }
        }));
    }

    async fn resolve(
        &mut self,
        ticket: oneshot::Sender<bool>,
        kill: &KillSignal,
    ) -> Result<(), WorkerError> {
        debug!(unit = %self.unit, service = %self.service, "Resolving leadership ticket");
        if let Role::Leader { renew_at } = self.role {
            if Instant::now() >= renew_at {
                info!(unit = %self.unit, service = %self.service, "Renewing leadership");
                self.refresh(kill).await?;
            }
        }

        let is_leader = matches!(self.role, Role::Leader { .. });
        if !is_leader {
            debug!(unit = %self.unit, service = %self.service, "Not leader");
        }
        let _ = ticket.send(is_leader);
        Ok(())
    }
}

async fn released(waiter: &mut Option<JoinHandle<()>>) {
    match waiter {
        Some(handle) => {
            let _ = handle.await;
        }
        None => std::future::pending().await,
    }
}

async fn renew_due(role: Role) {
    match role {
        Role::Leader { renew_at } => tokio::time::sleep_until(renew_at).await,
        Role::Minion => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryModel;

    fn setup() -> (MemoryModel, UnitTag, UnitTag) {
        let model = MemoryModel::new();
        let service = ServiceName::parse("wordpress").unwrap();
        model.add_service(
            &service,
            &fleet_names::CharmUrl::parse("cs:quantal/wordpress-1").unwrap(),
        );
        let unit0 = model.add_unit(&service).unwrap();
        let unit1 = model.add_unit(&service).unwrap();
        (model, unit0, unit1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_accessors() {
        let (model, unit0, _) = setup();
        let tracker = Tracker::new(unit0.clone(), Arc::new(model), Duration::from_secs(30));
        assert_eq!(tracker.service_name().as_str(), "wordpress");
        assert_eq!(tracker.claim_duration(), Duration::from_secs(30));
        assert_eq!(tracker.unit(), &unit0);
        tracker.kill();
        tracker.wait().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_claims_twice_the_duration() {
        let (model, unit0, unit1) = setup();
        let tracker = Tracker::new(unit0.clone(), Arc::new(model.clone()), Duration::from_secs(30));
        assert!(tracker.claim_leader().await.wait().await);

        // Still held well past a single duration.
        tokio::time::advance(Duration::from_secs(59)).await;
        let service = unit0.service();
        assert_eq!(model.leader(&service), Some(unit0));
        assert_eq!(
            model
                .claim_leadership(&service, &unit1, Duration::from_secs(1))
                .await,
            Err(RemoteError::ClaimDenied)
        );
        tracker.kill();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_tickets_resolve_false_on_failure() {
        let (model, unit0, _) = setup();
        model.fail(
            crate::remote::Op::ClaimLeadership,
            RemoteError::Failed("lease manager unavailable".to_string()),
        );
        let tracker = Tracker::new(unit0, Arc::new(model), Duration::from_secs(30));

        let err = tracker.wait().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "leadership failure: lease manager unavailable"
        );
        assert!(!tracker.claim_leader().await.wait().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_duration_fails_cleanly() {
        let (model, unit0, _) = setup();
        let tracker = Tracker::new(unit0, Arc::new(model.clone()), Duration::from_secs(u64::MAX));

        let err = tracker.wait().await.unwrap_err();
        assert!(matches!(err, WorkerError::Internal(_)));
        assert!(err.to_string().contains("too long"));
        assert!(!tracker.claim_leader().await.wait().await);
        assert_eq!(model.claim_count(), 0);
    }
}
