//! Per-attachment watcher task.

use std::sync::Arc;

use fleet_names::{StorageTag, UnitTag};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::attachments::Shared;
use super::StorageError;
use crate::remote::StorageAccessor;
use crate::worker::{KillSignal, KillSwitch};

/// Watches one storage attachment and feeds what it sees to the tracker.
#[derive(Debug)]
pub(super) struct Storager {
    tag: StorageTag,
    switch: KillSwitch,
    handle: JoinHandle<Result<(), StorageError>>,
}

impl Storager {
    pub(super) fn start(
        shared: Arc<Shared>,
        accessor: Arc<dyn StorageAccessor>,
        unit: UnitTag,
        tag: StorageTag,
        abort: KillSignal,
    ) -> Self {
        let switch = KillSwitch::new();
        let stop = switch.signal();
        let task_tag = tag.clone();
        let handle = tokio::spawn(async move {
            let result = watch(&shared, accessor.as_ref(), &unit, &task_tag, &stop, &abort).await;
            if let Err(e) = &result {
                warn!(storage = %task_tag, error = %e, "Storager failed");
            }
            result
        });
        debug!(storage = %tag, "Started storager");
        Self {
            tag,
            switch,
            handle,
        }
    }

    pub(super) fn kill(&self) {
        self.switch.kill();
    }

    /// Stop the task and return its error, if it failed.
    pub(super) async fn stop(self) -> Result<(), StorageError> {
        self.switch.kill();
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(StorageError::Storager {
                storage: self.tag.id(),
                reason: e.to_string(),
            }),
        }
    }
}

async fn watch(
    shared: &Shared,
    accessor: &dyn StorageAccessor,
    unit: &UnitTag,
    tag: &StorageTag,
    stop: &KillSignal,
    abort: &KillSignal,
) -> Result<(), StorageError> {
    let mut watcher = tokio::select! {
        biased;
        _ = stop.dying() => return Ok(()),
        _ = abort.dying() => return Ok(()),
        watcher = accessor.watch_storage_attachment(tag, unit) => watcher
            .map_err(|e| StorageError::remote("cannot watch storage attachment", e))?,
    };

    let result = loop {
        tokio::select! {
            biased;
            _ = stop.dying() => break Ok(()),
            _ = abort.dying() => break Ok(()),
            change = watcher.changed() => {
                if let Err(e) = change {
                    break Err(StorageError::remote("storage attachment watcher failed", e));
                }
            }
        }

        let fetched = tokio::select! {
            biased;
            _ = stop.dying() => break Ok(()),
            _ = abort.dying() => break Ok(()),
            fetched = accessor.storage_attachment(tag, unit) => fetched,
        };
        match fetched {
            Ok(record) => shared.observe(record),
            Err(e) if e.is_not_found_or_unauthorized() => {
                debug!(storage = %tag, "Storage attachment removed");
                break Ok(());
            }
            Err(e) => break Err(StorageError::remote("cannot refresh storage attachment", e)),
        }
    };

    let _ = watcher.stop();
    result
}
