//! Contracts of the remote collaborators the agent depends on.
//!
//! The data store, its transport and its server-side watchers live elsewhere;
//! the agent sees them only through these traits:
//!
//! - [`LeadershipManager`]: lease claims and release notification
//! - [`UnitAccessor`]: unit, service, relation, charm and config state
//! - [`StorageAccessor`]: storage attachments of a unit
//!
//! [`MemoryModel`] implements all three in-process for development and tests.

mod memory;
mod params;
mod watcher;

use std::time::Duration;

use async_trait::async_trait;
use fleet_names::{CharmUrl, ServiceName, StorageTag, UnitTag};
use thiserror::Error;

pub use memory::{MemoryModel, Op};
pub use params::{
    AttachmentRecord, CharmInfo, Life, RelationInfo, ResolvedMode, ServiceInfo, StorageKind,
    UnitInfo,
};
pub use watcher::{NotifyWatcher, StringsWatcher, WatchSource, Watcher};

// =============================================================================
// Errors
// =============================================================================

/// Errors returned by remote calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Another unit holds the lease. Normal control flow, not a failure.
    #[error("leadership claim denied")]
    ClaimDenied,

    /// The entity does not exist (any more).
    #[error("{0} not found")]
    NotFound(String),

    /// The caller may not see the entity.
    #[error("permission denied")]
    Unauthorized,

    /// The unit has not recorded a charm yet.
    #[error("unit {0} has no charm URL set")]
    NoCharmUrl(UnitTag),

    /// The watcher was stopped or its connection went away.
    #[error("watcher stopped")]
    WatcherStopped,

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl RemoteError {
    /// Returns true if the entity is gone or hidden from this agent.
    pub fn is_not_found_or_unauthorized(&self) -> bool {
        matches!(self, RemoteError::NotFound(_) | RemoteError::Unauthorized)
    }
}

// =============================================================================
// Collaborator traits
// =============================================================================

/// Lease-based leadership of a service.
#[async_trait]
pub trait LeadershipManager: Send + Sync {
    /// Claim (or extend) leadership of `service` for `unit` for `duration`.
    /// Returns [`RemoteError::ClaimDenied`] if another unit holds the lease.
    async fn claim_leadership(
        &self,
        service: &ServiceName,
        unit: &UnitTag,
        duration: Duration,
    ) -> Result<(), RemoteError>;

    /// Block until nobody holds leadership of `service`.
    async fn block_until_leadership_released(&self, service: &ServiceName) -> Result<(), RemoteError>;
}

/// Unit-scoped view of the model used by the change filter.
#[async_trait]
pub trait UnitAccessor: Send + Sync {
    async fn unit(&self, unit: &UnitTag) -> Result<UnitInfo, RemoteError>;

    async fn watch_unit(&self, unit: &UnitTag) -> Result<NotifyWatcher, RemoteError>;

    /// Start the unit's departure (Alive -> Dying).
    async fn destroy_unit(&self, unit: &UnitTag) -> Result<(), RemoteError>;

    /// Record the charm the unit is running.
    async fn set_unit_charm_url(&self, unit: &UnitTag, url: &CharmUrl) -> Result<(), RemoteError>;

    async fn clear_resolved(&self, unit: &UnitTag) -> Result<(), RemoteError>;

    /// Watch the settings of the unit's charm. Fails with
    /// [`RemoteError::NoCharmUrl`] until a charm URL has been recorded.
    async fn watch_config_settings(&self, unit: &UnitTag) -> Result<NotifyWatcher, RemoteError>;

    async fn service(&self, service: &ServiceName) -> Result<ServiceInfo, RemoteError>;

    async fn watch_service(&self, service: &ServiceName) -> Result<NotifyWatcher, RemoteError>;

    /// Watch the relations of a service. Each event lists the keys of the
    /// relations that were added, removed or changed life.
    async fn watch_relations(&self, service: &ServiceName) -> Result<StringsWatcher, RemoteError>;

    /// Fetch a relation by key, as seen by `unit`.
    async fn relation(&self, key: &str, unit: &UnitTag) -> Result<RelationInfo, RemoteError>;

    /// Fetch a charm; fails if it does not exist.
    async fn charm(&self, url: &CharmUrl) -> Result<CharmInfo, RemoteError>;
}

/// Storage attachments of a unit.
#[async_trait]
pub trait StorageAccessor: Send + Sync {
    async fn unit_storage_attachments(
        &self,
        unit: &UnitTag,
    ) -> Result<Vec<AttachmentRecord>, RemoteError>;

    async fn watch_storage_attachment(
        &self,
        storage: &StorageTag,
        unit: &UnitTag,
    ) -> Result<NotifyWatcher, RemoteError>;

    async fn storage_attachment(
        &self,
        storage: &StorageTag,
        unit: &UnitTag,
    ) -> Result<AttachmentRecord, RemoteError>;

    async fn ensure_dead(&self, storage: &StorageTag, unit: &UnitTag) -> Result<(), RemoteError>;

    /// Remove a dead attachment.
    async fn remove_storage_attachment(
        &self,
        storage: &StorageTag,
        unit: &UnitTag,
    ) -> Result<(), RemoteError>;
}
