//! Typed identifier definitions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::macros::define_tag;
use crate::NameError;

// =============================================================================
// Validation helpers
// =============================================================================

/// Checks an entity name: lowercase alphanumeric segments joined by single
/// hyphens, starting with a letter. Every segment after the first must hold a
/// letter, so `<name>-<number>` stays unambiguous.
pub(crate) fn is_valid_name(s: &str) -> bool {
    let mut segments = s.split('-');
    let Some(first) = segments.next() else {
        return false;
    };
    if !first.starts_with(|c: char| c.is_ascii_lowercase()) || !is_alnum(first) {
        return false;
    }
    segments.all(|seg| is_alnum(seg) && seg.chars().any(|c| c.is_ascii_lowercase()))
}

fn is_alnum(seg: &str) -> bool {
    !seg.is_empty()
        && seg
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Parses a non-negative decimal without sign or leading zeros.
pub(crate) fn parse_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

// =============================================================================
// Units
// =============================================================================

define_tag!(UnitTag, "unit");

impl UnitTag {
    /// The service this unit belongs to.
    pub fn service(&self) -> ServiceName {
        ServiceName(self.name().to_string())
    }
}

// =============================================================================
// Storage
// =============================================================================

define_tag!(StorageTag, "storage");

impl StorageTag {
    /// The name of the local state file tracking this storage (`data-0`).
    pub fn file_name(&self) -> String {
        format!("{}-{}", self.name(), self.number())
    }

    /// Inverse of [`StorageTag::file_name`].
    pub fn from_file_name(s: &str) -> Result<Self, NameError> {
        let invalid = || NameError::InvalidNumber {
            kind: Self::KIND,
            actual: s.to_string(),
        };
        let (name, number) = s.rsplit_once('-').ok_or_else(invalid)?;
        let number = parse_number(number).ok_or_else(invalid)?;
        Self::new(name, number)
    }
}

// =============================================================================
// Services
// =============================================================================

/// The name of a service (the group units belong to and lead).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceName(String);

impl ServiceName {
    /// Parses and validates a service name.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        if s.is_empty() {
            return Err(NameError::Empty { kind: "service" });
        }
        if !is_valid_name(s) {
            return Err(NameError::InvalidName {
                kind: "service",
                actual: s.to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the tag of this service's unit with the given number.
    pub fn unit(&self, number: u32) -> UnitTag {
        UnitTag {
            name: self.0.clone(),
            number,
        }
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ServiceName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ServiceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ServiceName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Relations
// =============================================================================

/// Numeric relation identifier, unique within a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(i32);

impl RelationId {
    /// Creates a relation id.
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the underlying integer.
    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for RelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for RelationId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl From<RelationId> for i32 {
    fn from(id: RelationId) -> Self {
        id.0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("mysql/0", "mysql", 0)]
    #[case("wordpress/12", "wordpress", 12)]
    #[case("my-sql2/3", "my-sql2", 3)]
    fn test_unit_tag_parse(#[case] input: &str, #[case] name: &str, #[case] number: u32) {
        let tag = UnitTag::parse(input).unwrap();
        assert_eq!(tag.name(), name);
        assert_eq!(tag.number(), number);
        assert_eq!(tag.to_string(), input);
    }

    #[rstest]
    #[case("")]
    #[case("mysql")]
    #[case("mysql/")]
    #[case("mysql/01")]
    #[case("mysql/-1")]
    #[case("MySQL/0")]
    #[case("0mysql/0")]
    #[case("my--sql/0")]
    #[case("mysql-/0")]
    #[case("mysql-1/0")]
    fn test_unit_tag_parse_rejects(#[case] input: &str) {
        assert!(UnitTag::parse(input).is_err(), "accepted {input:?}");
    }

    #[test]
    fn test_unit_tag_string_forms() {
        let tag = UnitTag::parse("my-sql/7").unwrap();
        assert_eq!(tag.tag_string(), "unit-my-sql-7");
        assert_eq!(UnitTag::parse_tag("unit-my-sql-7").unwrap(), tag);
        assert!(UnitTag::parse_tag("storage-my-sql-7").is_err());
        assert!(UnitTag::parse_tag("unit-mysql").is_err());
    }

    #[test]
    fn test_unit_service() {
        let tag = UnitTag::parse("wordpress/3").unwrap();
        assert_eq!(tag.service().as_str(), "wordpress");
        assert_eq!(tag.service().unit(3), tag);
    }

    #[test]
    fn test_storage_tag_file_name() {
        let tag = StorageTag::parse("data/0").unwrap();
        assert_eq!(tag.file_name(), "data-0");
        assert_eq!(tag.tag_string(), "storage-data-0");
        assert_eq!(StorageTag::from_file_name("data-0").unwrap(), tag);

        let hyphenated = StorageTag::parse("shared-fs/11").unwrap();
        assert_eq!(hyphenated.file_name(), "shared-fs-11");
        assert_eq!(StorageTag::from_file_name("shared-fs-11").unwrap(), hyphenated);

        assert!(StorageTag::from_file_name("data").is_err());
        assert!(StorageTag::from_file_name("data-0.tmp").is_err());
    }

    #[test]
    fn test_service_name_validation() {
        assert!(ServiceName::parse("mysql").is_ok());
        assert!(ServiceName::parse("mysql-server").is_ok());
        assert!(ServiceName::parse("").unwrap_err().is_empty());
        assert!(ServiceName::parse("mysql-0").is_err());
        assert!(ServiceName::parse("mysql/0").is_err());
    }

    #[test]
    fn test_serde_uses_canonical_strings() {
        let tag = StorageTag::parse("data/1").unwrap();
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"data/1\"");
        let parsed: StorageTag = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tag);

        assert!(serde_json::from_str::<UnitTag>("\"nope\"").is_err());
        assert_eq!(serde_json::to_string(&RelationId::new(4)).unwrap(), "4");
    }

    #[test]
    fn test_relation_ids_sort_numerically() {
        let mut ids = vec![RelationId::new(10), RelationId::new(2), RelationId::new(0)];
        ids.sort();
        assert_eq!(ids, vec![RelationId::new(0), RelationId::new(2), RelationId::new(10)]);
    }
}
