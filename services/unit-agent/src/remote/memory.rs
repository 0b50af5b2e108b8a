//! In-process model implementing every collaborator trait.
//!
//! Backs the development binary and the test suites. Mutators are plain
//! synchronous methods so tests can drive the model between awaits; every
//! mutation fires the relevant watchers.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use fleet_names::{CharmUrl, RelationId, ServiceName, StorageTag, UnitTag};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use super::{
    AttachmentRecord, CharmInfo, LeadershipManager, Life, NotifyWatcher, RelationInfo,
    RemoteError, ResolvedMode, ServiceInfo, StorageAccessor, StringsWatcher, UnitAccessor,
    UnitInfo, WatchSource, Watcher,
};

/// Remote operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ClaimLeadership,
    BlockUntilReleased,
    Unit,
    Service,
    Charm,
    SetUnitCharmUrl,
    ClearResolved,
    StorageAttachment,
    EnsureDead,
    RemoveAttachment,
}

// =============================================================================
// Documents
// =============================================================================

#[derive(Debug)]
struct UnitDoc {
    life: Life,
    resolved: ResolvedMode,
    charm_url: Option<CharmUrl>,
}

#[derive(Debug)]
struct ServiceDoc {
    life: Life,
    charm_url: CharmUrl,
    force_charm: bool,
    settings: BTreeMap<String, String>,
    next_unit: u32,
}

#[derive(Debug)]
struct RelationDoc {
    key: String,
    endpoints: [ServiceName; 2],
    life: Life,
    scope: BTreeSet<UnitTag>,
}

impl RelationDoc {
    fn involves(&self, service: &ServiceName) -> bool {
        self.endpoints.contains(service)
    }
}

#[derive(Debug)]
struct Lease {
    holder: UnitTag,
    expiry: Instant,
}

type AttachmentKey = (StorageTag, UnitTag);

#[derive(Debug, Default)]
struct Counters {
    claims: usize,
    ensure_dead: usize,
    removals: usize,
}

#[derive(Debug, Default)]
struct State {
    units: HashMap<UnitTag, UnitDoc>,
    services: HashMap<ServiceName, ServiceDoc>,
    charms: HashMap<CharmUrl, CharmInfo>,
    relations: BTreeMap<RelationId, RelationDoc>,
    next_relation_id: i32,
    leases: HashMap<ServiceName, Lease>,
    attachments: BTreeMap<AttachmentKey, AttachmentRecord>,

    unit_watchers: HashMap<UnitTag, Vec<WatchSource<()>>>,
    service_watchers: HashMap<ServiceName, Vec<WatchSource<()>>>,
    config_watchers: HashMap<ServiceName, Vec<WatchSource<()>>>,
    relation_watchers: HashMap<ServiceName, Vec<WatchSource<Vec<String>>>>,
    attachment_watchers: HashMap<AttachmentKey, Vec<WatchSource<()>>>,

    failures: HashMap<Op, RemoteError>,
    counters: Counters,
}

fn fire<T: Clone>(sources: Option<&mut Vec<WatchSource<T>>>, event: T) {
    if let Some(sources) = sources {
        sources.retain(|source| source.send(event.clone()));
    }
}

impl State {
    fn check(&self, op: Op) -> Result<(), RemoteError> {
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn unit(&self, tag: &UnitTag) -> Result<&UnitDoc, RemoteError> {
        self.units
            .get(tag)
            .ok_or_else(|| RemoteError::NotFound(format!("unit {tag:?}", tag = tag.id())))
    }

    fn unit_mut(&mut self, tag: &UnitTag) -> Result<&mut UnitDoc, RemoteError> {
        self.units
            .get_mut(tag)
            .ok_or_else(|| RemoteError::NotFound(format!("unit {tag:?}", tag = tag.id())))
    }

    fn service(&self, name: &ServiceName) -> Result<&ServiceDoc, RemoteError> {
        self.services
            .get(name)
            .ok_or_else(|| RemoteError::NotFound(format!("service {:?}", name.as_str())))
    }

    fn service_mut(&mut self, name: &ServiceName) -> Result<&mut ServiceDoc, RemoteError> {
        self.services
            .get_mut(name)
            .ok_or_else(|| RemoteError::NotFound(format!("service {:?}", name.as_str())))
    }

    fn attachment(&self, key: &AttachmentKey) -> Result<&AttachmentRecord, RemoteError> {
        self.attachments.get(key).ok_or_else(|| {
            RemoteError::NotFound(format!(
                "storage attachment {}:{}",
                key.0.id(),
                key.1.id()
            ))
        })
    }

    fn fire_unit(&mut self, tag: &UnitTag) {
        fire(self.unit_watchers.get_mut(tag), ());
    }

    fn fire_service(&mut self, name: &ServiceName) {
        fire(self.service_watchers.get_mut(name), ());
    }

    fn fire_relation(&mut self, id: RelationId) {
        let Some(doc) = self.relations.get(&id) else {
            return;
        };
        let key = doc.key.clone();
        let endpoints = doc.endpoints.clone();
        for service in endpoints.iter() {
            fire(self.relation_watchers.get_mut(service), vec![key.clone()]);
        }
    }

    fn fire_attachment(&mut self, key: &AttachmentKey) {
        fire(self.attachment_watchers.get_mut(key), ());
    }

    fn lease_holder(&self, service: &ServiceName, now: Instant) -> Option<&Lease> {
        self.leases.get(service).filter(|lease| lease.expiry > now)
    }
}

// =============================================================================
// MemoryModel
// =============================================================================

/// A shared in-memory model. Cloning yields another handle to the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryModel {
    state: Arc<Mutex<State>>,
    lease_changed: Arc<Notify>,
}

impl MemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Setup
    // -------------------------------------------------------------------------

    /// Register a charm so units can use it.
    pub fn add_charm(&self, url: &CharmUrl) {
        let info = CharmInfo {
            url: url.clone(),
            bundle_sha256: format!("{:064x}", self.lock().charms.len() + 1),
        };
        self.lock().charms.insert(url.clone(), info);
    }

    /// Add a service running `charm_url`, registering the charm as well.
    pub fn add_service(&self, name: &ServiceName, charm_url: &CharmUrl) {
        self.add_charm(charm_url);
        self.lock().services.insert(
            name.clone(),
            ServiceDoc {
                life: Life::Alive,
                charm_url: charm_url.clone(),
                force_charm: false,
                settings: BTreeMap::new(),
                next_unit: 0,
            },
        );
    }

    /// Add a unit to an existing service. The unit has no charm URL yet.
    pub fn add_unit(&self, service: &ServiceName) -> Result<UnitTag, RemoteError> {
        let mut state = self.lock();
        let doc = state.service_mut(service)?;
        let tag = service.unit(doc.next_unit);
        doc.next_unit += 1;
        state.units.insert(
            tag.clone(),
            UnitDoc {
                life: Life::Alive,
                resolved: ResolvedMode::None,
                charm_url: None,
            },
        );
        Ok(tag)
    }

    // -------------------------------------------------------------------------
    // Units and services
    // -------------------------------------------------------------------------

    pub fn set_unit_life(&self, unit: &UnitTag, life: Life) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.unit_mut(unit)?.life = life;
        state.fire_unit(unit);
        Ok(())
    }

    /// Delete the unit. Its watchers see one last change and then NotFound.
    pub fn remove_unit(&self, unit: &UnitTag) {
        let mut state = self.lock();
        state.units.remove(unit);
        state.fire_unit(unit);
    }

    pub fn set_resolved(&self, unit: &UnitTag, mode: ResolvedMode) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.unit_mut(unit)?.resolved = mode;
        state.fire_unit(unit);
        Ok(())
    }

    pub fn unit_charm_url(&self, unit: &UnitTag) -> Option<CharmUrl> {
        self.lock().units.get(unit).and_then(|doc| doc.charm_url.clone())
    }

    /// Change the service's charm, registering it as well.
    pub fn set_service_charm(
        &self,
        service: &ServiceName,
        url: &CharmUrl,
        force: bool,
    ) -> Result<(), RemoteError> {
        self.add_charm(url);
        let mut state = self.lock();
        let doc = state.service_mut(service)?;
        doc.charm_url = url.clone();
        doc.force_charm = force;
        state.fire_service(service);
        Ok(())
    }

    pub fn set_service_life(&self, service: &ServiceName, life: Life) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.service_mut(service)?.life = life;
        state.fire_service(service);
        Ok(())
    }

    /// Change one setting of the service's charm config.
    pub fn update_config(
        &self,
        service: &ServiceName,
        key: &str,
        value: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state
            .service_mut(service)?
            .settings
            .insert(key.to_string(), value.to_string());
        fire(state.config_watchers.get_mut(service), ());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Relations
    // -------------------------------------------------------------------------

    /// Relate two services and return the new relation's id.
    pub fn add_relation(&self, a: &ServiceName, b: &ServiceName) -> RelationId {
        let mut state = self.lock();
        let id = RelationId::new(state.next_relation_id);
        state.next_relation_id += 1;
        state.relations.insert(
            id,
            RelationDoc {
                key: format!("{}:server {}:db #{}", a, b, id),
                endpoints: [a.clone(), b.clone()],
                life: Life::Alive,
                scope: BTreeSet::new(),
            },
        );
        state.fire_relation(id);
        id
    }

    pub fn relation_key(&self, id: RelationId) -> Option<String> {
        self.lock().relations.get(&id).map(|doc| doc.key.clone())
    }

    pub fn enter_scope(&self, id: RelationId, unit: &UnitTag) {
        if let Some(doc) = self.lock().relations.get_mut(&id) {
            doc.scope.insert(unit.clone());
        }
    }

    pub fn leave_scope(&self, id: RelationId, unit: &UnitTag) {
        let mut state = self.lock();
        let Some(doc) = state.relations.get_mut(&id) else {
            return;
        };
        doc.scope.remove(unit);
        if doc.life != Life::Alive && doc.scope.is_empty() {
            state.fire_relation(id);
            state.relations.remove(&id);
        }
    }

    /// Destroy a relation: it becomes Dying while units are in scope, and is
    /// removed outright otherwise.
    pub fn destroy_relation(&self, id: RelationId) {
        let mut state = self.lock();
        let Some(doc) = state.relations.get_mut(&id) else {
            return;
        };
        if doc.scope.is_empty() {
            state.fire_relation(id);
            state.relations.remove(&id);
        } else {
            doc.life = Life::Dying;
            state.fire_relation(id);
        }
    }

    // -------------------------------------------------------------------------
    // Leadership
    // -------------------------------------------------------------------------

    /// Current holder of the service's lease, if it has not expired.
    pub fn leader(&self, service: &ServiceName) -> Option<UnitTag> {
        self.lock()
            .lease_holder(service, Instant::now())
            .map(|lease| lease.holder.clone())
    }

    /// Drop the service's lease and wake anyone waiting for it.
    pub fn release_leadership(&self, service: &ServiceName) {
        self.lock().leases.remove(service);
        self.lease_changed.notify_waiters();
    }

    pub fn claim_count(&self) -> usize {
        self.lock().counters.claims
    }

    // -------------------------------------------------------------------------
    // Storage
    // -------------------------------------------------------------------------

    /// Add or replace an attachment and fire its watchers.
    pub fn put_storage_attachment(&self, record: AttachmentRecord) {
        let key = (record.storage_tag.clone(), record.unit_tag.clone());
        let mut state = self.lock();
        state.attachments.insert(key.clone(), record);
        state.fire_attachment(&key);
    }

    pub fn set_attachment_life(
        &self,
        storage: &StorageTag,
        unit: &UnitTag,
        life: Life,
    ) -> Result<(), RemoteError> {
        let key = (storage.clone(), unit.clone());
        let mut state = self.lock();
        state.attachment(&key)?;
        if let Some(record) = state.attachments.get_mut(&key) {
            record.life = life;
        }
        state.fire_attachment(&key);
        Ok(())
    }

    pub fn storage_attachment_record(
        &self,
        storage: &StorageTag,
        unit: &UnitTag,
    ) -> Option<AttachmentRecord> {
        self.lock()
            .attachments
            .get(&(storage.clone(), unit.clone()))
            .cloned()
    }

    pub fn ensure_dead_count(&self) -> usize {
        self.lock().counters.ensure_dead
    }

    pub fn remove_count(&self) -> usize {
        self.lock().counters.removals
    }

    // -------------------------------------------------------------------------
    // Failure injection
    // -------------------------------------------------------------------------

    /// Make every call of `op` fail with `err` until cleared.
    pub fn fail(&self, op: Op, err: RemoteError) {
        self.lock().failures.insert(op, err);
    }

    pub fn clear_failure(&self, op: Op) {
        self.lock().failures.remove(&op);
    }

    /// Fail every live watcher of the unit with `err`.
    pub fn fail_unit_watchers(&self, unit: &UnitTag, err: RemoteError) {
        if let Some(sources) = self.lock().unit_watchers.remove(unit) {
            for source in sources {
                source.fail(err.clone());
            }
        }
    }
}

// =============================================================================
// LeadershipManager
// =============================================================================

#[async_trait]
impl LeadershipManager for MemoryModel {
    async fn claim_leadership(
        &self,
        service: &ServiceName,
        unit: &UnitTag,
        duration: Duration,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.counters.claims += 1;
        state.check(Op::ClaimLeadership)?;

        let now = Instant::now();
        let expiry = now
            .checked_add(duration)
            .ok_or_else(|| RemoteError::Failed(format!("lease duration {duration:?} too long")))?;
        if let Some(lease) = state.lease_holder(service, now) {
            if &lease.holder != unit {
                return Err(RemoteError::ClaimDenied);
            }
        }
        state.leases.insert(
            service.clone(),
            Lease {
                holder: unit.clone(),
                expiry,
            },
        );
        debug!(service = %service, unit = %unit, "Lease granted");
        Ok(())
    }

    async fn block_until_leadership_released(
        &self,
        service: &ServiceName,
    ) -> Result<(), RemoteError> {
        loop {
            let notified = self.lease_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let expiry = {
                let state = self.lock();
                state.check(Op::BlockUntilReleased)?;
                match state.lease_holder(service, Instant::now()) {
                    Some(lease) => lease.expiry,
                    None => return Ok(()),
                }
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(expiry) => {}
            }
        }
    }
}

// =============================================================================
// UnitAccessor
// =============================================================================

#[async_trait]
impl UnitAccessor for MemoryModel {
    async fn unit(&self, unit: &UnitTag) -> Result<UnitInfo, RemoteError> {
        let state = self.lock();
        state.check(Op::Unit)?;
        let doc = state.unit(unit)?;
        Ok(UnitInfo {
            tag: unit.clone(),
            life: doc.life,
            resolved: doc.resolved,
            charm_url: doc.charm_url.clone(),
        })
    }

    async fn watch_unit(&self, unit: &UnitTag) -> Result<NotifyWatcher, RemoteError> {
        let mut state = self.lock();
        state.unit(unit)?;
        let (source, watcher) = Watcher::channel();
        source.notify();
        state.unit_watchers.entry(unit.clone()).or_default().push(source);
        Ok(watcher)
    }

    async fn destroy_unit(&self, unit: &UnitTag) -> Result<(), RemoteError> {
        let mut state = self.lock();
        let doc = state.unit_mut(unit)?;
        if doc.life == Life::Alive {
            doc.life = Life::Dying;
            state.fire_unit(unit);
        }
        Ok(())
    }

    async fn set_unit_charm_url(&self, unit: &UnitTag, url: &CharmUrl) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.check(Op::SetUnitCharmUrl)?;
        if !state.charms.contains_key(url) {
            return Err(RemoteError::NotFound(format!("charm {:?}", url.to_string())));
        }
        state.unit_mut(unit)?.charm_url = Some(url.clone());
        state.fire_unit(unit);
        Ok(())
    }

    async fn clear_resolved(&self, unit: &UnitTag) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.check(Op::ClearResolved)?;
        state.unit_mut(unit)?.resolved = ResolvedMode::None;
        state.fire_unit(unit);
        Ok(())
    }

    async fn watch_config_settings(&self, unit: &UnitTag) -> Result<NotifyWatcher, RemoteError> {
        let mut state = self.lock();
        if state.unit(unit)?.charm_url.is_none() {
            return Err(RemoteError::NoCharmUrl(unit.clone()));
        }
        let (source, watcher) = Watcher::channel();
        source.notify();
        state
            .config_watchers
            .entry(unit.service())
            .or_default()
            .push(source);
        Ok(watcher)
    }

    async fn service(&self, service: &ServiceName) -> Result<ServiceInfo, RemoteError> {
        let state = self.lock();
        state.check(Op::Service)?;
        let doc = state.service(service)?;
        Ok(ServiceInfo {
            name: service.clone(),
            life: doc.life,
            charm_url: doc.charm_url.clone(),
            force_charm: doc.force_charm,
        })
    }

    async fn watch_service(&self, service: &ServiceName) -> Result<NotifyWatcher, RemoteError> {
        let mut state = self.lock();
        state.service(service)?;
        let (source, watcher) = Watcher::channel();
        source.notify();
        state
            .service_watchers
            .entry(service.clone())
            .or_default()
            .push(source);
        Ok(watcher)
    }

    async fn watch_relations(&self, service: &ServiceName) -> Result<StringsWatcher, RemoteError> {
        let mut state = self.lock();
        state.service(service)?;
        let keys: Vec<String> = state
            .relations
            .values()
            .filter(|doc| doc.involves(service))
            .map(|doc| doc.key.clone())
            .collect();
        let (source, watcher) = Watcher::channel();
        source.send(keys);
        state
            .relation_watchers
            .entry(service.clone())
            .or_default()
            .push(source);
        Ok(watcher)
    }

    async fn relation(&self, key: &str, unit: &UnitTag) -> Result<RelationInfo, RemoteError> {
        let state = self.lock();
        let (id, doc) = state
            .relations
            .iter()
            .find(|(_, doc)| doc.key == key)
            .ok_or_else(|| RemoteError::NotFound(format!("relation {key:?}")))?;
        if !doc.involves(&unit.service()) {
            return Err(RemoteError::Unauthorized);
        }
        Ok(RelationInfo {
            id: *id,
            key: doc.key.clone(),
            life: doc.life,
        })
    }

    async fn charm(&self, url: &CharmUrl) -> Result<CharmInfo, RemoteError> {
        let state = self.lock();
        state.check(Op::Charm)?;
        state
            .charms
            .get(url)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("charm {:?}", url.to_string())))
    }
}

// =============================================================================
// StorageAccessor
// =============================================================================

#[async_trait]
impl StorageAccessor for MemoryModel {
    async fn unit_storage_attachments(
        &self,
        unit: &UnitTag,
    ) -> Result<Vec<AttachmentRecord>, RemoteError> {
        let state = self.lock();
        Ok(state
            .attachments
            .values()
            .filter(|record| &record.unit_tag == unit)
            .cloned()
            .collect())
    }

    async fn watch_storage_attachment(
        &self,
        storage: &StorageTag,
        unit: &UnitTag,
    ) -> Result<NotifyWatcher, RemoteError> {
        let (source, watcher) = Watcher::channel();
        source.notify();
        self.lock()
            .attachment_watchers
            .entry((storage.clone(), unit.clone()))
            .or_default()
            .push(source);
        Ok(watcher)
    }

    async fn storage_attachment(
        &self,
        storage: &StorageTag,
        unit: &UnitTag,
    ) -> Result<AttachmentRecord, RemoteError> {
        let state = self.lock();
        state.check(Op::StorageAttachment)?;
        state
            .attachment(&(storage.clone(), unit.clone()))
            .cloned()
    }

    async fn ensure_dead(&self, storage: &StorageTag, unit: &UnitTag) -> Result<(), RemoteError> {
        let key = (storage.clone(), unit.clone());
        let mut state = self.lock();
        state.counters.ensure_dead += 1;
        state.check(Op::EnsureDead)?;
        match state.attachments.get_mut(&key) {
            Some(record) => record.life = Life::Dead,
            None => return Ok(()),
        }
        state.fire_attachment(&key);
        Ok(())
    }

    async fn remove_storage_attachment(
        &self,
        storage: &StorageTag,
        unit: &UnitTag,
    ) -> Result<(), RemoteError> {
        let key = (storage.clone(), unit.clone());
        let mut state = self.lock();
        state.counters.removals += 1;
        state.check(Op::RemoveAttachment)?;
        if let Some(record) = state.attachments.get(&key) {
            if record.life != Life::Dead {
                return Err(RemoteError::Failed(format!(
                    "storage attachment {}:{} is not dead",
                    storage.id(),
                    unit.id()
                )));
            }
        }
        state.attachments.remove(&key);
        state.fire_attachment(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> (MemoryModel, ServiceName, UnitTag) {
        let model = MemoryModel::new();
        let service = ServiceName::parse("mysql").unwrap();
        model.add_service(&service, &CharmUrl::parse("cs:quantal/mysql-1").unwrap());
        let unit = model.add_unit(&service).unwrap();
        (model, service, unit)
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_denied_until_expiry() {
        let (model, service, unit0) = model();
        let unit1 = model.add_unit(&service).unwrap();

        model
            .claim_leadership(&service, &unit0, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            model
                .claim_leadership(&service, &unit1, Duration::from_secs(60))
                .await,
            Err(RemoteError::ClaimDenied)
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        model
            .claim_leadership(&service, &unit1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(model.leader(&service), Some(unit1));
        assert_eq!(model.claim_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_until_released() {
        let (model, service, unit) = model();
        model
            .claim_leadership(&service, &unit, Duration::from_secs(60))
            .await
            .unwrap();

        let waiter = {
            let model = model.clone();
            let service = service.clone();
            tokio::spawn(async move { model.block_until_leadership_released(&service).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        model.release_leadership(&service);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_config_watch_requires_charm() {
        let (model, _, unit) = model();
        assert_eq!(
            model.watch_config_settings(&unit).await.err(),
            Some(RemoteError::NoCharmUrl(unit.clone()))
        );

        let url = CharmUrl::parse("cs:quantal/mysql-1").unwrap();
        model.set_unit_charm_url(&unit, &url).await.unwrap();
        let mut watcher = model.watch_config_settings(&unit).await.unwrap();
        watcher.changed().await.unwrap();
    }

    #[tokio::test]
    async fn test_relation_visibility() {
        let (model, service, unit) = model();
        let wordpress = ServiceName::parse("wordpress").unwrap();
        let logging = ServiceName::parse("logging").unwrap();
        let url = CharmUrl::parse("cs:quantal/wordpress-3").unwrap();
        model.add_service(&wordpress, &url);
        model.add_service(&logging, &url);

        let id = model.add_relation(&service, &wordpress);
        let other = model.add_relation(&wordpress, &logging);

        let key = model.relation_key(id).unwrap();
        assert_eq!(model.relation(&key, &unit).await.unwrap().id, id);

        let other_key = model.relation_key(other).unwrap();
        assert_eq!(
            model.relation(&other_key, &unit).await,
            Err(RemoteError::Unauthorized)
        );

        model.destroy_relation(id);
        assert!(model.relation(&key, &unit).await.unwrap_err().is_not_found_or_unauthorized());
    }
}
