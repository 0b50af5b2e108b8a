//! The filter loop and its handle.

use std::sync::Arc;

use fleet_names::{CharmUrl, RelationId, ServiceName, UnitTag};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use super::mailbox::{EventReceiver, Mailbox, UnitDying};
use crate::remote::{
    Life, NotifyWatcher, RemoteError, ResolvedMode, StringsWatcher, UnitAccessor, UnitInfo,
    Watcher,
};
use crate::worker::{KillSignal, Worker, WorkerError};

const REQUEST_QUEUE_SIZE: usize = 16;

type Reply = oneshot::Sender<()>;

#[derive(Debug)]
enum Request {
    SetCharm { url: Option<CharmUrl>, reply: Reply },
    WantUpgradeEvent { force: bool, reply: Reply },
    WantResolvedEvent { reply: Reply },
    ClearResolved { reply: Reply },
    DiscardConfigEvent { reply: Reply },
}

/// Handle to a running change filter.
pub struct Filter {
    unit: UnitTag,
    requests: mpsc::Sender<Request>,
    unit_dying: UnitDying,
    resolved: EventReceiver<ResolvedMode>,
    config: EventReceiver<()>,
    upgrade: EventReceiver<CharmUrl>,
    relations: EventReceiver<Vec<RelationId>>,
    worker: Worker,
}

impl Filter {
    /// Start filtering changes relevant to `unit`.
    pub fn new(accessor: Arc<dyn UnitAccessor>, unit: UnitTag) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE_SIZE);
        let (dying_tx, unit_dying) = UnitDying::channel();

        let filter_loop = FilterLoop {
            unit: unit.clone(),
            service: unit.service(),
            accessor,
            requests: requests_rx,
            dying: dying_tx,
            resolved_out: Mailbox::new(),
            config_out: Mailbox::new(),
            upgrade_out: Mailbox::new(),
            relations_out: Mailbox::new(),
            life: Life::Alive,
            resolved: ResolvedMode::None,
            upgrade_from: None,
            upgrade_from_force: false,
            upgrade_available: None,
            config_seen: false,
            parked_discards: Vec::new(),
            configw: None,
            relationsw: None,
        };
        let resolved = filter_loop.resolved_out.receiver();
        let config = filter_loop.config_out.receiver();
        let upgrade = filter_loop.upgrade_out.receiver();
        let relations = filter_loop.relations_out.receiver();

        let worker = Worker::spawn("filter", move |kill| filter_loop.run(kill));

        Self {
            unit,
            requests: requests_tx,
            unit_dying,
            resolved,
            config,
            upgrade,
            relations,
            worker,
        }
    }

    pub fn unit(&self) -> &UnitTag {
        &self.unit
    }

    /// Raised once, the first time the unit is seen Dying or Dead.
    pub fn unit_dying(&self) -> UnitDying {
        self.unit_dying.clone()
    }

    /// Resolved mode, whenever it becomes something other than None or is
    /// re-requested.
    pub fn resolved_events(&self) -> EventReceiver<ResolvedMode> {
        self.resolved.clone()
    }

    /// Config settings changed.
    pub fn config_events(&self) -> EventReceiver<()> {
        self.config.clone()
    }

    /// The charm the unit should upgrade to.
    pub fn upgrade_events(&self) -> EventReceiver<CharmUrl> {
        self.upgrade.clone()
    }

    /// Sorted ids of the relations that changed since the last delivery.
    pub fn relations_events(&self) -> EventReceiver<Vec<RelationId>> {
        self.relations.clone()
    }

    /// Record the charm the unit is running and restart the watches scoped
    /// to it. A missing or unusable charm stops the filter.
    pub async fn set_charm(&self, url: impl Into<Option<CharmUrl>>) -> Result<(), WorkerError> {
        let url = url.into();
        self.request(|reply| Request::SetCharm { url, reply }).await
    }

    /// Ask for an upgrade event. With `force` only forced upgrades qualify.
    pub async fn want_upgrade_event(&self, force: bool) -> Result<(), WorkerError> {
        self.request(|reply| Request::WantUpgradeEvent { force, reply })
            .await
    }

    /// Ask for the current resolved mode to be delivered again.
    pub async fn want_resolved_event(&self) -> Result<(), WorkerError> {
        self.request(|reply| Request::WantResolvedEvent { reply }).await
    }

    /// Clear the unit's resolved mode remotely.
    pub async fn clear_resolved(&self) -> Result<(), WorkerError> {
        self.request(|reply| Request::ClearResolved { reply }).await
    }

    /// Drop any undelivered config event. Waits until the first config
    /// notification has been seen.
    pub async fn discard_config_event(&self) -> Result<(), WorkerError> {
        self.request(|reply| Request::DiscardConfigEvent { reply })
            .await
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

    async fn request(&self, make: impl FnOnce(Reply) -> Request) -> Result<(), WorkerError> {
        let (reply, done) = oneshot::channel();
        self.requests
            .send(make(reply))
            .await
            .map_err(|_| WorkerError::Dying)?;
        done.await.map_err(|_| WorkerError::Dying)
    }
}

// =============================================================================
// Loop
// =============================================================================

/// Maps a failure to reach the unit or its service; if either is gone the
/// agent has nothing left to do.
fn lost(context: &str, err: RemoteError) -> WorkerError {
    if err.is_not_found_or_unauthorized() {
        WorkerError::TerminateAgent
    } else {
        WorkerError::remote(context, err)
    }
}

async fn changed<T>(watcher: &mut Option<Watcher<T>>) -> Result<T, RemoteError> {
    match watcher {
        Some(watcher) => watcher.changed().await,
        None => std::future::pending().await,
    }
}

fn stop<T>(watcher: &mut Option<Watcher<T>>) {
    if let Some(watcher) = watcher.take() {
        let _ = watcher.stop();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ServiceCharm {
    url: CharmUrl,
    force: bool,
}

struct FilterLoop {
    unit: UnitTag,
    service: ServiceName,
    accessor: Arc<dyn UnitAccessor>,
    requests: mpsc::Receiver<Request>,

    dying: watch::Sender<bool>,
    resolved_out: Mailbox<ResolvedMode>,
    config_out: Mailbox<()>,
    upgrade_out: Mailbox<CharmUrl>,
    relations_out: Mailbox<Vec<RelationId>>,

    life: Life,
    resolved: ResolvedMode,
    /// Charm the unit runs, once known.
    upgrade_from: Option<CharmUrl>,
    /// Only forced upgrades are wanted.
    upgrade_from_force: bool,
    /// Charm the service wants its units to run.
    upgrade_available: Option<ServiceCharm>,

    config_seen: bool,
    parked_discards: Vec<Reply>,

    configw: Option<NotifyWatcher>,
    relationsw: Option<StringsWatcher>,
}

impl FilterLoop {
    async fn run(mut self, kill: KillSignal) -> Result<(), WorkerError> {
        let result = self.serve(&kill).await;
        stop(&mut self.configw);
        stop(&mut self.relationsw);
        result
    }

    async fn serve(&mut self, kill: &KillSignal) -> Result<(), WorkerError> {
        let unit = self.unit_changed(kill).await?;
        self.service_changed(kill).await?;

        let mut unitw = kill
            .until_dying(self.accessor.watch_unit(&self.unit))
            .await?
            .map_err(|e| lost("cannot watch unit", e))?;
        let mut servicew = kill
            .until_dying(self.accessor.watch_service(&self.service))
            .await?
            .map_err(|e| lost("cannot watch service", e))?;

        if let Some(url) = unit.charm_url {
            self.configw = Some(self.watch_config(kill).await?);
            self.upgrade_from = Some(url);
        }
        self.relationsw = Some(self.watch_relations(kill).await?);

        info!(unit = %self.unit, "Filter started");
        let result = loop {
            let step = tokio::select! {
                biased;

                _ = kill.dying() => Err(WorkerError::Dying),

                change = unitw.changed() => match change {
                    Ok(()) => self.unit_changed(kill).await.map(|_| ()),
                    Err(e) => Err(lost("unit watcher failed", e)),
                },

                change = servicew.changed() => match change {
                    Ok(()) => self.service_changed(kill).await,
                    Err(e) => Err(lost("service watcher failed", e)),
                },

                change = changed(&mut self.configw) => match change {
                    Ok(()) => {
                        self.config_changed();
                        Ok(())
                    }
                    Err(e) => Err(WorkerError::remote("config watcher failed", e)),
                },

                change = changed(&mut self.relationsw) => match change {
                    Ok(keys) => self.relations_changed(keys, kill).await,
                    Err(e) => Err(WorkerError::remote("relations watcher failed", e)),
                },

                Some(request) = self.requests.recv() => self.handle(request, kill).await,
            };
            if let Err(e) = step {
                break Err(e);
            }
        };

        let _ = unitw.stop();
        let _ = servicew.stop();
        result
    }

    async fn handle(&mut self, request: Request, kill: &KillSignal) -> Result<(), WorkerError> {
        match request {
            Request::SetCharm { url, reply } => {
                self.set_charm(url, kill).await?;
                let _ = reply.send(());
            }
            Request::WantUpgradeEvent { force, reply } => {
                debug!(unit = %self.unit, force, "Upgrade event wanted");
                self.upgrade_from_force = force;
                self.upgrade_changed();
                let _ = reply.send(());
            }
            Request::WantResolvedEvent { reply } => {
                if !self.resolved.is_none() {
                    debug!(unit = %self.unit, "Resolved event wanted");
                    self.resolved_out.rearm();
                }
                let _ = reply.send(());
            }
            Request::ClearResolved { reply } => {
                debug!(unit = %self.unit, "Clearing resolved mode");
                self.resolved_out.clear();
                kill.until_dying(self.accessor.clear_resolved(&self.unit))
                    .await?
                    .map_err(|e| lost("cannot clear resolved mode", e))?;
                self.unit_changed(kill).await?;
                let _ = reply.send(());
            }
            Request::DiscardConfigEvent { reply } => {
                if self.config_seen {
                    debug!(unit = %self.unit, "Discarding config event");
                    self.config_out.clear();
                    let _ = reply.send(());
                } else {
                    self.parked_discards.push(reply);
                }
            }
        }
        Ok(())
    }

    async fn unit_changed(&mut self, kill: &KillSignal) -> Result<UnitInfo, WorkerError> {
        let unit = kill
            .until_dying(self.accessor.unit(&self.unit))
            .await?
            .map_err(|e| lost("cannot refresh unit", e))?;

        if unit.life != self.life {
            self.life = unit.life;
            match unit.life {
                Life::Alive => {}
                Life::Dying => {
                    info!(unit = %self.unit, "Unit is dying");
                    self.dying.send_replace(true);
                    self.upgrade_out.clear();
                }
                Life::Dead => {
                    info!(unit = %self.unit, "Unit is dead");
                    self.dying.send_replace(true);
                    return Err(WorkerError::TerminateAgent);
                }
            }
        }

        if unit.resolved != self.resolved {
            self.resolved = unit.resolved;
            if self.resolved.is_none() {
                self.resolved_out.clear();
            } else {
                debug!(unit = %self.unit, resolved = ?self.resolved, "Preparing resolved event");
                self.resolved_out.put(self.resolved);
            }
        }
        Ok(unit)
    }

    async fn service_changed(&mut self, kill: &KillSignal) -> Result<(), WorkerError> {
        let service = kill
            .until_dying(self.accessor.service(&self.service))
            .await?
            .map_err(|e| lost("cannot refresh service", e))?;

        self.upgrade_available = Some(ServiceCharm {
            url: service.charm_url,
            force: service.force_charm,
        });
        match service.life {
            Life::Alive => {}
            Life::Dying => {
                info!(unit = %self.unit, service = %self.service, "Service is dying, destroying unit");
                kill.until_dying(self.accessor.destroy_unit(&self.unit))
                    .await?
                    .map_err(|e| lost("cannot destroy unit", e))?;
            }
            Life::Dead => {
                info!(unit = %self.unit, service = %self.service, "Service is unexpectedly dead");
                return Err(WorkerError::TerminateAgent);
            }
        }
        self.upgrade_changed();
        Ok(())
    }

    /// Arm or disarm the upgrade topic to match current state.
    fn upgrade_changed(&mut self) {
        if !self.life.is_alive() {
            debug!(unit = %self.unit, "Charm check skipped, unit is not alive");
            self.upgrade_out.clear();
            return;
        }
        let (Some(from), Some(available)) = (&self.upgrade_from, &self.upgrade_available) else {
            debug!(unit = %self.unit, "Charm check skipped, charm not yet set");
            self.upgrade_out.clear();
            return;
        };
        if &available.url != from && (available.force || !self.upgrade_from_force) {
            debug!(unit = %self.unit, charm = %available.url, "Preparing upgrade event");
            self.upgrade_out.put(available.url.clone());
        } else {
            self.upgrade_out.clear();
        }
    }

    fn config_changed(&mut self) {
        debug!(unit = %self.unit, "Preparing config event");
        self.config_out.put(());
        self.config_seen = true;
        if !self.parked_discards.is_empty() {
            self.config_out.clear();
            for reply in self.parked_discards.drain(..) {
                let _ = reply.send(());
            }
        }
    }

    async fn relations_changed(
        &mut self,
        keys: Vec<String>,
        kill: &KillSignal,
    ) -> Result<(), WorkerError> {
        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            match kill
                .until_dying(self.accessor.relation(&key, &self.unit))
                .await?
            {
                Ok(relation) => ids.push(relation.id),
                // Removed before this unit could enter scope; it never
                // needs to hear about it.
                Err(e) if e.is_not_found_or_unauthorized() => {
                    debug!(unit = %self.unit, relation = %key, "Ignoring removed relation")
                }
                Err(e) => {
                    return Err(WorkerError::remote(
                        format!("cannot fetch relation {key:?}"),
                        e,
                    ))
                }
            }
        }
        if ids.is_empty() {
            return Ok(());
        }

        ids.sort_unstable();
        ids.dedup();
        debug!(unit = %self.unit, ?ids, "Preparing relations event");
        self.relations_out.merge(ids, |pending, new| {
            pending.extend(new);
            pending.sort_unstable();
            pending.dedup();
        });
        Ok(())
    }

    async fn set_charm(
        &mut self,
        url: Option<CharmUrl>,
        kill: &KillSignal,
    ) -> Result<(), WorkerError> {
        let url = url.ok_or_else(|| WorkerError::Internal("cannot set a nil charm URL".to_string()))?;
        kill.until_dying(self.accessor.charm(&url))
            .await?
            .map_err(|e| WorkerError::remote(format!("cannot read charm {url}"), e))?;

        info!(unit = %self.unit, charm = %url, "Setting charm");
        stop(&mut self.configw);
        kill.until_dying(self.accessor.set_unit_charm_url(&self.unit, &url))
            .await?
            .map_err(|e| lost("cannot set charm URL", e))?;
        self.configw = Some(self.watch_config(kill).await?);

        stop(&mut self.relationsw);
        self.relationsw = Some(self.watch_relations(kill).await?);

        self.upgrade_from = Some(url);
        self.upgrade_changed();
        Ok(())
    }

    async fn watch_config(&self, kill: &KillSignal) -> Result<NotifyWatcher, WorkerError> {
        kill.until_dying(self.accessor.watch_config_settings(&self.unit))
            .await?
            .map_err(|e| lost("cannot watch config settings", e))
    }

    async fn watch_relations(&self, kill: &KillSignal) -> Result<StringsWatcher, WorkerError> {
        kill.until_dying(self.accessor.watch_relations(&self.service))
            .await?
            .map_err(|e| lost("cannot watch relations", e))
    }
}
