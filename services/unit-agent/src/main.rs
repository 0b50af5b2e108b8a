//! Fleet Unit Agent
//!
//! Runs the leadership tracker, change filter and storage tracker for one
//! unit against an in-memory model, with an event pump standing in for the
//! hook execution engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet_hooks::{HookInfo, HookKind};
use fleet_names::{CharmUrl, RelationId, StorageTag, UnitTag};
use fleet_unit_agent::remote::{AttachmentRecord, Life, StorageAccessor, StorageKind};
use fleet_unit_agent::{
    Attachments, Config, Filter, KillSignal, KillSwitch, LogFormat, MemoryModel, Tracker, Worker,
    WorkerError,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How often the pump re-reads the unit's storage list.
const STORAGE_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);

    info!("Starting fleet unit agent");
    info!(
        unit = %config.unit,
        data_dir = %config.data_dir,
        charm = %config.charm_url,
        leadership_duration_secs = config.leadership_duration_secs,
        "Configuration loaded"
    );

    let model = seed_model(&config)?;
    let abort = KillSwitch::new();

    let tracker = Arc::new(Tracker::new(
        config.unit.clone(),
        Arc::new(model.clone()),
        config.leadership_duration(),
    ));
    let filter = Arc::new(Filter::new(Arc::new(model.clone()), config.unit.clone()));
    let storage = Arc::new(
        Attachments::new(
            Arc::new(model.clone()),
            config.unit.clone(),
            config.storage_state_dir(),
            abort.signal(),
        )
        .await
        .context("failed to start storage tracker")?,
    );

    let pump = Worker::spawn("event-pump", {
        let pump = EventPump {
            charm: config.charm_url.clone(),
            model: model.clone(),
            tracker: Arc::clone(&tracker),
            filter: Arc::clone(&filter),
            storage: Arc::clone(&storage),
        };
        move |kill| pump.run(kill)
    });

    let (first, result) = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            (None, Ok(()))
        }
        result = tracker.wait() => (Some("leadership-tracker"), result),
        result = filter.wait() => (Some("filter"), result),
        result = pump.wait() => (Some("event-pump"), result),
    };
    if let Some(worker) = first {
        match &result {
            Ok(()) => info!(worker, "Worker exited"),
            Err(e) if e.is_terminate_agent() => info!(worker, "Agent should be terminated"),
            Err(e) => error!(worker, error = %e, "Worker failed"),
        }
    }

    info!("Waiting for workers to shut down...");
    let (pump_result, filter_result, tracker_result) =
        tokio::join!(pump.stop(), filter.worker().stop(), tracker.worker().stop());
    for (worker, result) in [
        ("event-pump", pump_result),
        ("filter", filter_result),
        ("leadership-tracker", tracker_result),
    ] {
        if let Err(e) = result {
            warn!(worker, error = %e, "Worker stopped with error");
        }
    }
    if let Err(e) = storage.stop().await {
        warn!(error = %e, "Storage tracker stopped with error");
    }
    abort.kill();

    info!("Unit agent shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

/// Build a development model containing the configured unit, with one
/// block device attached to it.
fn seed_model(config: &Config) -> Result<MemoryModel> {
    let model = MemoryModel::new();
    let service = config.unit.service();
    model.add_service(&service, &config.charm_url);
    loop {
        let unit = model.add_unit(&service)?;
        if unit == config.unit {
            break;
        }
    }
    model.update_config(&service, "tuning", "safest")?;
    model.put_storage_attachment(AttachmentRecord {
        storage_tag: StorageTag::parse("data/0")?,
        unit_tag: config.unit.clone(),
        life: Life::Alive,
        kind: StorageKind::Block,
        location: "/dev/sdb".to_string(),
    });
    Ok(model)
}

/// Consumes events the way an execution engine would, logging the hooks it
/// would run.
struct EventPump {
    charm: CharmUrl,
    model: MemoryModel,
    tracker: Arc<Tracker>,
    filter: Arc<Filter>,
    storage: Arc<Attachments>,
}

impl EventPump {
    async fn run(self, kill: KillSignal) -> Result<(), WorkerError> {
        self.filter.set_charm(self.charm.clone()).await?;
        self.filter.want_upgrade_event(false).await?;

        let dying = self.filter.unit_dying();
        let config_events = self.filter.config_events();
        let upgrade_events = self.filter.upgrade_events();
        let resolved_events = self.filter.resolved_events();
        let relations_events = self.filter.relations_events();
        let mut storage_poll = tokio::time::interval(STORAGE_POLL_INTERVAL);
        let mut dying_seen = false;

        loop {
            tokio::select! {
                biased;

                _ = kill.dying() => return Err(WorkerError::Dying),

                _ = dying.wait(), if !dying_seen => {
                    dying_seen = true;
                    info!(unit = %self.filter.unit(), "Unit is dying");
                }

                Some(()) = config_events.recv() => {
                    let leader = self.tracker.claim_leader().await.wait().await;
                    self.run_hook(&HookInfo::new(HookKind::ConfigChanged), leader);
                }

                Some(url) = upgrade_events.recv() => {
                    info!(charm = %url, "Upgrading charm");
                    self.run_hook(&HookInfo::new(HookKind::UpgradeCharm), false);
                    self.filter.set_charm(url).await?;
                    self.filter.want_upgrade_event(false).await?;
                }

                Some(mode) = resolved_events.recv() => {
                    info!(resolved = ?mode, "Resolving unit");
                    self.filter.clear_resolved().await?;
                }

                Some(ids) = relations_events.recv() => {
                    for id in ids {
                        let hook = relation_changed(self.filter.unit(), id);
                        hook.validate().map_err(internal)?;
                        self.run_hook(&hook, false);
                    }
                }

                Some(hook) = self.storage.next_hook() => {
                    self.storage.validate_hook(&hook).map_err(internal)?;
                    if let Some(context) = hook.storage_id.as_ref().and_then(|tag| self.storage.storage(tag)) {
                        info!(storage = %context.tag(), location = %context.location(), "Storage context");
                    }
                    self.run_hook(&hook, false);
                    self.storage.commit_hook(&hook).await.map_err(internal)?;
                }

                _ = storage_poll.tick() => {
                    let unit = self.filter.unit();
                    let tags: Vec<StorageTag> = self
                        .model
                        .unit_storage_attachments(unit)
                        .await
                        .map_err(|e| WorkerError::remote("cannot list storage attachments", e))?
                        .into_iter()
                        .map(|record| record.storage_tag)
                        .collect();
                    self.storage.update_storage(&tags).await.map_err(internal)?;
                }
            }
        }
    }

    fn run_hook(&self, hook: &HookInfo, leader: bool) {
        info!(unit = %self.filter.unit(), hook = %hook, leader, "Running hook");
    }
}

fn internal(err: impl std::fmt::Display) -> WorkerError {
    WorkerError::Internal(err.to_string())
}

/// Relation membership is not tracked here, so the unit itself stands in
/// for the remote unit.
fn relation_changed(unit: &UnitTag, id: RelationId) -> HookInfo {
    HookInfo::relation(HookKind::RelationChanged, id, Some(unit.id()))
}
