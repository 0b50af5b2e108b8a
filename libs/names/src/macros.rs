//! Macros for defining numbered entity tags.

/// Defines a tag for an entity identified as `<name>/<number>`.
///
/// This generates a struct with:
/// - `KIND` (tag prefix) constant
/// - `new()`, `parse()` (from the id) and `parse_tag()` (from the tag string)
/// - `name()`, `number()`, `id()` and `tag_string()`
/// - `Display` (the id), `FromStr`, `Serialize` and `Deserialize`
macro_rules! define_tag {
    ($name:ident, $kind:literal) => {
        /// A typed `<name>/<number>` identifier.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name {
            name: String,
            number: u32,
        }

        impl $name {
            /// The tag prefix for this entity kind.
            pub const KIND: &'static str = $kind;

            /// Creates a tag from a validated name and a number.
            pub fn new(name: &str, number: u32) -> Result<Self, $crate::NameError> {
                if !$crate::types::is_valid_name(name) {
                    return Err($crate::NameError::InvalidName {
                        kind: Self::KIND,
                        actual: name.to_string(),
                    });
                }
                Ok(Self {
                    name: name.to_string(),
                    number,
                })
            }

            /// Parses an id of the form `<name>/<number>`.
            pub fn parse(s: &str) -> Result<Self, $crate::NameError> {
                if s.is_empty() {
                    return Err($crate::NameError::Empty { kind: Self::KIND });
                }
                let Some((name, number)) = s.split_once('/') else {
                    return Err($crate::NameError::InvalidNumber {
                        kind: Self::KIND,
                        actual: s.to_string(),
                    });
                };
                let number = $crate::types::parse_number(number).ok_or_else(|| {
                    $crate::NameError::InvalidNumber {
                        kind: Self::KIND,
                        actual: s.to_string(),
                    }
                })?;
                Self::new(name, number)
            }

            /// Parses a tag string of the form `<kind>-<name>-<number>`.
            pub fn parse_tag(s: &str) -> Result<Self, $crate::NameError> {
                let invalid = || $crate::NameError::InvalidTag {
                    expected: Self::KIND,
                    actual: s.to_string(),
                };
                let rest = s
                    .strip_prefix(Self::KIND)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .ok_or_else(invalid)?;
                let (name, number) = rest.rsplit_once('-').ok_or_else(invalid)?;
                let number = $crate::types::parse_number(number).ok_or_else(invalid)?;
                Self::new(name, number).map_err(|_| invalid())
            }

            /// The name portion (`mysql` for `mysql/0`).
            pub fn name(&self) -> &str {
                &self.name
            }

            /// The number portion (`0` for `mysql/0`).
            pub fn number(&self) -> u32 {
                self.number
            }

            /// The id, `<name>/<number>`.
            pub fn id(&self) -> String {
                format!("{}/{}", self.name, self.number)
            }

            /// The tag string, `<kind>-<name>-<number>`.
            pub fn tag_string(&self) -> String {
                format!("{}-{}-{}", Self::KIND, self.name, self.number)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}/{}", self.name, self.number)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::NameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.id())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use define_tag;
