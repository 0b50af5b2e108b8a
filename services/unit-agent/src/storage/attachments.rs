//! The attachments tracker.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fleet_hooks::{HookInfo, HookKind};
use fleet_names::{StorageTag, UnitTag};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::state::StateFile;
use super::storager::Storager;
use super::{StorageContext, StorageError};
use crate::remote::{AttachmentRecord, Life, StorageAccessor};
use crate::worker::KillSignal;

#[derive(Debug)]
struct Tracked {
    state: StateFile,
    storager: Option<Storager>,
    /// Last remote life seen.
    life: Life,
    /// Context exposed to hooks; set once the attach hook is delivered.
    context: Option<StorageContext>,
    /// Context captured when the attach hook was queued.
    staged: Option<StorageContext>,
    /// Hook queued or delivered for this storage and not yet committed.
    pending: Option<HookKind>,
}

#[derive(Debug, Default)]
struct Inner {
    tracked: BTreeMap<StorageTag, Tracked>,
    queue: VecDeque<HookInfo>,
    /// Delivered and awaiting commit.
    in_flight: Option<HookInfo>,
    stopped: bool,
}

impl Inner {
    fn enqueue(&mut self, tag: &StorageTag, kind: HookKind) -> bool {
        let Some(tracked) = self.tracked.get_mut(tag) else {
            return false;
        };
        if tracked.pending.is_some() {
            return false;
        }
        tracked.pending = Some(kind);
        self.queue.push_back(HookInfo::storage(kind, tag.clone()));
        debug!(storage = %tag, hook = %kind, "Queued storage hook");
        true
    }

    fn is_in_flight(&self, tag: &StorageTag) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|hook| hook.storage_id.as_ref() == Some(tag))
    }

    fn pop(&mut self) -> Option<HookInfo> {
        if self.in_flight.is_some() {
            return None;
        }
        let hook = self.queue.pop_front()?;
        if hook.kind == HookKind::StorageAttached {
            if let Some(tracked) = hook
                .storage_id
                .as_ref()
                .and_then(|tag| self.tracked.get_mut(tag))
            {
                tracked.context = tracked.staged.take();
            }
        }
        self.in_flight = Some(hook.clone());
        Some(hook)
    }

    /// Drop the tracked entry and any hook still queued for it.
    fn untrack(&mut self, tag: &StorageTag) -> Option<Storager> {
        self.queue
            .retain(|hook| hook.storage_id.as_ref() != Some(tag));
        self.tracked.remove(tag).and_then(|tracked| tracked.storager)
    }
}

/// State shared between the tracker and its storagers.
#[derive(Debug, Default)]
pub(super) struct Shared {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a fresh view of a tracked attachment.
    pub(super) fn observe(&self, record: AttachmentRecord) {
        let queued = {
            let mut inner = self.lock();
            let tag = record.storage_tag.clone();
            let Some(tracked) = inner.tracked.get_mut(&tag) else {
                return;
            };
            tracked.life = record.life;

            if tracked.state.attached() {
                if tracked.context.is_none() && record.is_provisioned() {
                    tracked.context = Some(StorageContext::from(&record));
                }
                !record.life.is_alive() && inner.enqueue(&tag, HookKind::StorageDetached)
            } else if record.life.is_alive() && record.is_provisioned() && tracked.pending.is_none()
            {
                tracked.staged = Some(StorageContext::from(&record));
                inner.enqueue(&tag, HookKind::StorageAttached)
            } else {
                false
            }
        };
        if queued {
            self.notify.notify_waiters();
        }
    }
}

enum Decision {
    Nothing,
    Track,
    Remove {
        storager: Option<Storager>,
        remote: bool,
    },
}

/// Tracks the storage attached to one unit.
pub struct Attachments {
    accessor: Arc<dyn StorageAccessor>,
    unit: UnitTag,
    state_dir: PathBuf,
    abort: KillSignal,
    shared: Arc<Shared>,
}

impl Attachments {
    /// Create the tracker, creating `state_dir` if needed and resuming
    /// tracking for storage whose attach hook has already been committed.
    /// State files with no remote attachment are deleted.
    pub async fn new(
        accessor: Arc<dyn StorageAccessor>,
        unit: UnitTag,
        state_dir: impl Into<PathBuf>,
        abort: KillSignal,
    ) -> Result<Self, StorageError> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)?;

        let attachments = abort
            .until_dying(accessor.unit_storage_attachments(&unit))
            .await
            .map_err(|_| StorageError::Aborted)?
            .map_err(|e| StorageError::remote("cannot list storage attachments", e))?;

        let tracker = Self {
            accessor,
            unit,
            state_dir,
            abort,
            shared: Arc::new(Shared::default()),
        };

        let mut files = StateFile::read_all(&tracker.state_dir)?;
        for record in attachments {
            let Some(state) = files.remove(&record.storage_tag) else {
                continue;
            };
            info!(storage = %record.storage_tag, "Resuming storage tracking");
            tracker.track(state, record.life);
        }
        for (tag, mut state) in files {
            debug!(storage = %tag, "Removing state of departed storage");
            state.remove()?;
        }

        Ok(tracker)
    }

    pub fn unit(&self) -> &UnitTag {
        &self.unit
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Reconcile the given storage against its remote state.
    pub async fn update_storage(&self, tags: &[StorageTag]) -> Result<(), StorageError> {
        for tag in tags {
            self.update_one(tag).await?;
        }
        Ok(())
    }

    async fn update_one(&self, tag: &StorageTag) -> Result<(), StorageError> {
        let fetched = self
            .abort
            .until_dying(self.accessor.storage_attachment(tag, &self.unit))
            .await
            .map_err(|_| StorageError::Aborted)?;
        let record = match fetched {
            Ok(record) => Some(record),
            Err(e) if e.is_not_found_or_unauthorized() => None,
            Err(e) => return Err(StorageError::remote("cannot fetch storage attachment", e)),
        };
        let life = record.as_ref().map(|record| record.life);
        let alive = life.is_some_and(|life| life.is_alive());

        let decision = {
            let mut inner = self.shared.lock();
            let known = inner
                .tracked
                .get(tag)
                .map(|tracked| (tracked.state.attached(), tracked.pending));
            if let (Some(life), Some(tracked)) = (life, inner.tracked.get_mut(tag)) {
                tracked.life = life;
            }

            match known {
                None if alive => Decision::Track,
                None => Decision::Remove {
                    storager: None,
                    remote: record.is_some(),
                },
                Some(_) if alive => Decision::Nothing,
                Some((false, _)) if !inner.is_in_flight(tag) => {
                    info!(storage = %tag, "Storage departed before attaching, short-circuiting");
                    Decision::Remove {
                        storager: inner.untrack(tag),
                        remote: record.is_some(),
                    }
                }
                Some((attached, pending)) => {
                    if attached && pending.is_none() && record.is_some() {
                        inner.enqueue(tag, HookKind::StorageDetached);
                    }
                    Decision::Nothing
                }
            }
        };
        self.shared.notify.notify_waiters();

        match decision {
            Decision::Nothing => Ok(()),
            Decision::Track => {
                let state = StateFile::read(&self.state_dir, tag)?;
                self.track(state, Life::Alive);
                Ok(())
            }
            Decision::Remove { storager, remote } => {
                if let Some(storager) = storager {
                    if let Err(e) = storager.stop().await {
                        warn!(storage = %tag, error = %e, "Storager stopped with error");
                    }
                }
                if remote {
                    self.remove_remote(tag).await?;
                }
                Ok(())
            }
        }
    }

    /// Start tracking storage described by `state`.
    fn track(&self, state: StateFile, life: Life) {
        let tag = state.tag().clone();
        let mut inner = self.shared.lock();
        if inner.stopped || inner.tracked.contains_key(&tag) {
            return;
        }
        let storager = Storager::start(
            Arc::clone(&self.shared),
            Arc::clone(&self.accessor),
            self.unit.clone(),
            tag.clone(),
            self.abort.clone(),
        );
        inner.tracked.insert(
            tag,
            Tracked {
                state,
                storager: Some(storager),
                life,
                context: None,
                staged: None,
                pending: None,
            },
        );
    }

    async fn remove_remote(&self, tag: &StorageTag) -> Result<(), StorageError> {
        debug!(storage = %tag, unit = %self.unit, "Removing storage attachment");
        self.abort
            .until_dying(self.accessor.ensure_dead(tag, &self.unit))
            .await
            .map_err(|_| StorageError::Aborted)?
            .map_err(|e| StorageError::remote("cannot ensure storage attachment is dead", e))?;
        self.abort
            .until_dying(self.accessor.remove_storage_attachment(tag, &self.unit))
            .await
            .map_err(|_| StorageError::Aborted)?
            .map_err(|e| StorageError::remote("cannot remove storage attachment", e))
    }

    /// Check that `hook` is the next valid transition for tracked storage.
    pub fn validate_hook(&self, hook: &HookInfo) -> Result<(), StorageError> {
        let tag = storage_tag(hook)?;
        let inner = self.shared.lock();
        let tracked = inner
            .tracked
            .get(tag)
            .ok_or_else(|| StorageError::UnknownStorage(tag.clone()))?;
        tracked.state.validate_hook(hook)
    }

    /// Hook context for attached storage. Not available until the attach
    /// hook has been delivered.
    pub fn storage(&self, tag: &StorageTag) -> Option<StorageContext> {
        self.shared
            .lock()
            .tracked
            .get(tag)
            .and_then(|tracked| tracked.context.clone())
    }

    /// Record that `hook` has run. An attach persists the state file; a
    /// detach deletes it and removes the attachment remotely.
    pub async fn commit_hook(&self, hook: &HookInfo) -> Result<(), StorageError> {
        let tag = storage_tag(hook)?;
        let detached = {
            let mut inner = self.shared.lock();
            let inner = &mut *inner;
            let tracked = inner
                .tracked
                .get_mut(tag)
                .ok_or_else(|| StorageError::UnknownStorage(tag.clone()))?;
            tracked.state.commit_hook(hook)?;
            tracked.pending = None;
            inner.queue.retain(|queued| queued != hook);
            if inner
                .in_flight
                .as_ref()
                .is_some_and(|delivered| delivered == hook)
            {
                inner.in_flight = None;
            }

            match hook.kind {
                HookKind::StorageAttached => {
                    if tracked.context.is_none() {
                        tracked.context = tracked.staged.take();
                    }
                    if !tracked.life.is_alive() {
                        inner.enqueue(tag, HookKind::StorageDetached);
                    }
                    false
                }
                _ => true,
            }
        };
        self.shared.notify.notify_waiters();
        if !detached {
            return Ok(());
        }

        debug!(storage = %tag, unit = %self.unit, "Ensuring storage attachment is dead");
        self.abort
            .until_dying(self.accessor.ensure_dead(tag, &self.unit))
            .await
            .map_err(|_| StorageError::Aborted)?
            .map_err(|e| StorageError::remote("cannot ensure storage attachment is dead", e))?;
        self.abort
            .until_dying(self.accessor.remove_storage_attachment(tag, &self.unit))
            .await
            .map_err(|_| StorageError::Aborted)?
            .map_err(|e| StorageError::remote("cannot remove storage attachment", e))?;

        let storager = self.shared.lock().untrack(tag);
        if let Some(storager) = storager {
            if let Err(e) = storager.stop().await {
                warn!(storage = %tag, error = %e, "Storager stopped with error");
            }
        }
        info!(storage = %tag, "Storage detached");
        Ok(())
    }

    /// Wait for the next hook. Only one hook is handed out at a time: the
    /// next becomes available once the previous one is committed. Returns
    /// `None` after [`Attachments::stop`].
    pub async fn next_hook(&self) -> Option<HookInfo> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.shared.lock();
                if inner.stopped {
                    return None;
                }
                if let Some(hook) = inner.pop() {
                    return Some(hook);
                }
            }
            notified.await;
        }
    }

    /// Take the next hook if one is available now.
    pub fn try_next_hook(&self) -> Option<HookInfo> {
        let mut inner = self.shared.lock();
        if inner.stopped {
            return None;
        }
        inner.pop()
    }

    /// Number of hooks queued but not yet handed out.
    pub fn pending_hooks(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Tags currently tracked, in order.
    pub fn tracked(&self) -> Vec<StorageTag> {
        self.shared.lock().tracked.keys().cloned().collect()
    }

    /// Stop every storager and return the first error any of them hit.
    pub async fn stop(&self) -> Result<(), StorageError> {
        let storagers: Vec<Storager> = {
            let mut inner = self.shared.lock();
            inner.stopped = true;
            inner
                .tracked
                .values_mut()
                .filter_map(|tracked| tracked.storager.take())
                .collect()
        };
        self.shared.notify.notify_waiters();

        let mut first_error = None;
        for storager in storagers {
            if let Err(e) = storager.stop().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Attachments {
    fn drop(&mut self) {
        let inner = self.shared.lock();
        for storager in inner.tracked.values().filter_map(|t| t.storager.as_ref()) {
            storager.kill();
        }
    }
}

fn storage_tag(hook: &HookInfo) -> Result<&StorageTag, StorageError> {
    if !hook.kind.is_storage() {
        return Err(StorageError::NotStorageHook(hook.kind));
    }
    hook.validate()?;
    hook.storage_id
        .as_ref()
        .ok_or(StorageError::NotStorageHook(hook.kind))
}
