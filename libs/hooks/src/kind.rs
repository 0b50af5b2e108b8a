//! The closed set of hook kinds.

use serde::{Deserialize, Serialize};

use crate::HookError;

/// Every hook the agent can ask the execution engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    Install,
    Start,
    ConfigChanged,
    UpgradeCharm,
    Stop,
    LeaderElected,
    LeaderDeposed,
    LeaderSettingsChanged,
    RelationJoined,
    RelationChanged,
    RelationDeparted,
    RelationBroken,
    StorageAttached,
    StorageDetached,
}

impl HookKind {
    /// All hook kinds, in declaration order.
    pub const ALL: [HookKind; 14] = [
        HookKind::Install,
        HookKind::Start,
        HookKind::ConfigChanged,
        HookKind::UpgradeCharm,
        HookKind::Stop,
        HookKind::LeaderElected,
        HookKind::LeaderDeposed,
        HookKind::LeaderSettingsChanged,
        HookKind::RelationJoined,
        HookKind::RelationChanged,
        HookKind::RelationDeparted,
        HookKind::RelationBroken,
        HookKind::StorageAttached,
        HookKind::StorageDetached,
    ];

    /// The hook's name as the engine sees it.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Install => "install",
            HookKind::Start => "start",
            HookKind::ConfigChanged => "config-changed",
            HookKind::UpgradeCharm => "upgrade-charm",
            HookKind::Stop => "stop",
            HookKind::LeaderElected => "leader-elected",
            HookKind::LeaderDeposed => "leader-deposed",
            HookKind::LeaderSettingsChanged => "leader-settings-changed",
            HookKind::RelationJoined => "relation-joined",
            HookKind::RelationChanged => "relation-changed",
            HookKind::RelationDeparted => "relation-departed",
            HookKind::RelationBroken => "relation-broken",
            HookKind::StorageAttached => "storage-attached",
            HookKind::StorageDetached => "storage-detached",
        }
    }

    /// True for hooks scoped to a relation.
    pub fn is_relation(&self) -> bool {
        match self {
            HookKind::RelationJoined
            | HookKind::RelationChanged
            | HookKind::RelationDeparted
            | HookKind::RelationBroken => true,
            HookKind::Install
            | HookKind::Start
            | HookKind::ConfigChanged
            | HookKind::UpgradeCharm
            | HookKind::Stop
            | HookKind::LeaderElected
            | HookKind::LeaderDeposed
            | HookKind::LeaderSettingsChanged
            | HookKind::StorageAttached
            | HookKind::StorageDetached => false,
        }
    }

    /// True for relation hooks that concern one remote unit.
    pub fn needs_remote_unit(&self) -> bool {
        matches!(
            self,
            HookKind::RelationJoined | HookKind::RelationChanged | HookKind::RelationDeparted
        )
    }

    /// True for hooks scoped to a storage instance.
    pub fn is_storage(&self) -> bool {
        match self {
            HookKind::StorageAttached | HookKind::StorageDetached => true,
            HookKind::Install
            | HookKind::Start
            | HookKind::ConfigChanged
            | HookKind::UpgradeCharm
            | HookKind::Stop
            | HookKind::LeaderElected
            | HookKind::LeaderDeposed
            | HookKind::LeaderSettingsChanged
            | HookKind::RelationJoined
            | HookKind::RelationChanged
            | HookKind::RelationDeparted
            | HookKind::RelationBroken => false,
        }
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HookKind {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| HookError::UnknownKind(s.to_string()))
    }
}
