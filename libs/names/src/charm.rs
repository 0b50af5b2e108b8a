//! Charm URLs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{is_valid_name, parse_number};
use crate::NameError;

const SCHEMAS: [&str; 2] = ["cs", "local"];

/// Identifies a charm: `<schema>:[<series>/]<name>[-<revision>]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CharmUrl {
    schema: String,
    series: Option<String>,
    name: String,
    revision: Option<u32>,
}

impl CharmUrl {
    /// Parses a charm URL such as `cs:trusty/mysql-3` or `local:wordpress`.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        let invalid = |reason| NameError::InvalidCharmUrl {
            actual: s.to_string(),
            reason,
        };
        if s.is_empty() {
            return Err(NameError::Empty { kind: "charm URL" });
        }
        let (schema, rest) = s.split_once(':').ok_or_else(|| invalid("missing schema"))?;
        if !SCHEMAS.contains(&schema) {
            return Err(invalid("schema must be \"cs\" or \"local\""));
        }

        let (series, rest) = match rest.split_once('/') {
            Some((series, rest)) => {
                if !is_valid_series(series) {
                    return Err(invalid("invalid series"));
                }
                (Some(series.to_string()), rest)
            }
            None => (None, rest),
        };

        let (name, revision) = match rest.rsplit_once('-') {
            Some((name, rev)) if rev.chars().all(|c| c.is_ascii_digit()) => {
                let revision = parse_number(rev).ok_or_else(|| invalid("invalid revision"))?;
                (name, Some(revision))
            }
            _ => (rest, None),
        };
        if !is_valid_name(name) {
            return Err(invalid("invalid name"));
        }

        Ok(Self {
            schema: schema.to_string(),
            series,
            name: name.to_string(),
            revision,
        })
    }

    /// The schema, `cs` or `local`.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The series, if the URL names one.
    pub fn series(&self) -> Option<&str> {
        self.series.as_deref()
    }

    /// The charm name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The revision, if the URL pins one.
    pub fn revision(&self) -> Option<u32> {
        self.revision
    }

    /// Returns a copy of this URL pinned to the given revision.
    #[must_use]
    pub fn with_revision(&self, revision: u32) -> Self {
        Self {
            revision: Some(revision),
            ..self.clone()
        }
    }
}

fn is_valid_series(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_lowercase())
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

impl std::fmt::Display for CharmUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.schema)?;
        if let Some(series) = &self.series {
            write!(f, "{series}/")?;
        }
        f.write_str(&self.name)?;
        if let Some(revision) = self.revision {
            write!(f, "-{revision}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for CharmUrl {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CharmUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CharmUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cs:trusty/mysql-3", "cs", Some("trusty"), "mysql", Some(3))]
    #[case("local:precise/wordpress", "local", Some("precise"), "wordpress", None)]
    #[case("cs:mysql-server-12", "cs", None, "mysql-server", Some(12))]
    #[case("cs:mysql-server", "cs", None, "mysql-server", None)]
    fn test_charm_url_parse(
        #[case] input: &str,
        #[case] schema: &str,
        #[case] series: Option<&str>,
        #[case] name: &str,
        #[case] revision: Option<u32>,
    ) {
        let url = CharmUrl::parse(input).unwrap();
        assert_eq!(url.schema(), schema);
        assert_eq!(url.series(), series);
        assert_eq!(url.name(), name);
        assert_eq!(url.revision(), revision);
        assert_eq!(url.to_string(), input);
    }

    #[rstest]
    #[case("")]
    #[case("trusty/mysql-1")]
    #[case("http:trusty/mysql-1")]
    #[case("cs:Trusty/mysql-1")]
    #[case("cs:trusty/mysql-01")]
    #[case("cs:trusty/")]
    #[case("cs:trusty/-1")]
    fn test_charm_url_rejects(#[case] input: &str) {
        assert!(CharmUrl::parse(input).is_err(), "accepted {input:?}");
    }

    #[test]
    fn test_with_revision() {
        let url = CharmUrl::parse("cs:trusty/mysql").unwrap();
        assert_eq!(url.with_revision(7).to_string(), "cs:trusty/mysql-7");
        assert_ne!(url, url.with_revision(7));
    }
}
