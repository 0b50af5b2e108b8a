//! # fleet-names
//!
//! Typed identifiers for the entities a unit agent deals with.
//!
//! ## Design Principles
//!
//! - Every identifier has one canonical string form with strict parsing
//! - Identifiers are typed so a unit can never be passed where storage is expected
//! - Serialization always uses the canonical string form
//!
//! ## Formats
//!
//! | type | id | tag string |
//! |---|---|---|
//! | `UnitTag` | `mysql/0` | `unit-mysql-0` |
//! | `StorageTag` | `data/0` | `storage-data-0` |
//! | `ServiceName` | `mysql` | - |
//! | `RelationId` | `3` | - |
//! | `CharmUrl` | `cs:trusty/mysql-3` | - |

mod charm;
mod error;
mod macros;
mod types;

pub use charm::CharmUrl;
pub use error::NameError;
pub use types::*;
