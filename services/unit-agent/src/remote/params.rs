//! Snapshots of remote state.

use fleet_names::{CharmUrl, RelationId, ServiceName, StorageTag, UnitTag};
use serde::{Deserialize, Serialize};

/// Lifecycle of a remote entity. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Life {
    Alive,
    Dying,
    Dead,
}

impl Life {
    pub fn is_alive(&self) -> bool {
        matches!(self, Life::Alive)
    }
}

impl std::fmt::Display for Life {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Life::Alive => write!(f, "alive"),
            Life::Dying => write!(f, "dying"),
            Life::Dead => write!(f, "dead"),
        }
    }
}

/// How an operator asked a unit in an error state to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedMode {
    #[default]
    None,
    RetryHooks,
    NoHooks,
}

impl ResolvedMode {
    pub fn is_none(&self) -> bool {
        matches!(self, ResolvedMode::None)
    }
}

/// Kind of storage behind an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[default]
    Unknown,
    Block,
    Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub tag: UnitTag,
    pub life: Life,
    pub resolved: ResolvedMode,
    pub charm_url: Option<CharmUrl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: ServiceName,
    pub life: Life,
    pub charm_url: CharmUrl,
    /// Whether units must upgrade even if they are in an error state.
    pub force_charm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationInfo {
    pub id: RelationId,
    pub key: String,
    pub life: Life,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharmInfo {
    pub url: CharmUrl,
    pub bundle_sha256: String,
}

/// A storage instance attached to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub storage_tag: StorageTag,
    pub unit_tag: UnitTag,
    pub life: Life,
    pub kind: StorageKind,
    /// Device path or mount point; empty until provisioned.
    pub location: String,
}

impl AttachmentRecord {
    /// True once kind and location are known, i.e. the storage can be used.
    pub fn is_provisioned(&self) -> bool {
        self.kind != StorageKind::Unknown && !self.location.is_empty()
    }
}
