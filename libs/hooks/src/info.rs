//! Hook descriptors.

use fleet_names::{RelationId, StorageTag};
use serde::{Deserialize, Serialize};

use crate::{HookError, HookKind};

/// Identifies one hook to run: its kind plus the relation or storage it
/// concerns, where applicable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HookInfo {
    pub kind: HookKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_id: Option<RelationId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_id: Option<StorageTag>,
}

impl HookInfo {
    /// A hook that concerns the unit as a whole.
    pub fn new(kind: HookKind) -> Self {
        Self {
            kind,
            relation_id: None,
            remote_unit: None,
            storage_id: None,
        }
    }

    /// A relation hook.
    pub fn relation(kind: HookKind, relation_id: RelationId, remote_unit: Option<String>) -> Self {
        Self {
            kind,
            relation_id: Some(relation_id),
            remote_unit,
            storage_id: None,
        }
    }

    /// A storage hook.
    pub fn storage(kind: HookKind, storage_id: StorageTag) -> Self {
        Self {
            kind,
            relation_id: None,
            remote_unit: None,
            storage_id: Some(storage_id),
        }
    }

    /// Checks that the descriptor carries exactly the fields its kind needs.
    pub fn validate(&self) -> Result<(), HookError> {
        let kind = self.kind;
        if kind.is_relation() {
            if self.relation_id.is_none() {
                return Err(HookError::MissingRelation(kind));
            }
            if kind.needs_remote_unit() && self.remote_unit.is_none() {
                return Err(HookError::MissingRemoteUnit(kind));
            }
        } else {
            if self.relation_id.is_some() {
                return Err(HookError::UnexpectedField {
                    kind,
                    field: "relation id",
                });
            }
            if self.remote_unit.is_some() {
                return Err(HookError::UnexpectedField {
                    kind,
                    field: "remote unit",
                });
            }
        }

        if kind.is_storage() {
            if self.storage_id.is_none() {
                return Err(HookError::MissingStorage(kind));
            }
        } else if self.storage_id.is_some() {
            return Err(HookError::UnexpectedField {
                kind,
                field: "storage id",
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for HookInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind.as_str())?;
        if let Some(id) = self.relation_id {
            write!(f, " (relation {id}")?;
            if let Some(unit) = &self.remote_unit {
                write!(f, ", unit {unit}")?;
            }
            f.write_str(")")?;
        }
        if let Some(storage) = &self.storage_id {
            write!(f, " (storage {storage})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data0() -> StorageTag {
        StorageTag::parse("data/0").unwrap()
    }

    #[test]
    fn test_validate_storage_hooks() {
        assert!(HookInfo::storage(HookKind::StorageAttached, data0())
            .validate()
            .is_ok());
        assert_eq!(
            HookInfo::new(HookKind::StorageDetached).validate(),
            Err(HookError::MissingStorage(HookKind::StorageDetached))
        );
        assert_eq!(
            HookInfo::storage(HookKind::ConfigChanged, data0()).validate(),
            Err(HookError::UnexpectedField {
                kind: HookKind::ConfigChanged,
                field: "storage id"
            })
        );
    }

    #[test]
    fn test_validate_relation_hooks() {
        let rel = RelationId::new(2);
        assert!(HookInfo::relation(HookKind::RelationBroken, rel, None)
            .validate()
            .is_ok());
        assert_eq!(
            HookInfo::relation(HookKind::RelationJoined, rel, None).validate(),
            Err(HookError::MissingRemoteUnit(HookKind::RelationJoined))
        );
        assert_eq!(
            HookInfo::new(HookKind::RelationChanged).validate(),
            Err(HookError::MissingRelation(HookKind::RelationChanged))
        );
    }

    #[test]
    fn test_json_shape() {
        let hook = HookInfo::storage(HookKind::StorageAttached, data0());
        let json = serde_json::to_string(&hook).unwrap();
        assert_eq!(json, r#"{"kind":"storage-attached","storage_id":"data/0"}"#);
        assert_eq!(hook.to_string(), "storage-attached (storage data/0)");
    }
}
