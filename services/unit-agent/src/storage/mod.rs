//! Storage attachment tracking.
//!
//! Reconciles the storage attached to a unit against a directory of local
//! state files and produces the `storage-attached` / `storage-detached` hooks
//! the execution engine has to run.
//!
//! ## Design Principles
//!
//! - **One file per attachment**: a state file exists exactly while the
//!   attach hook has been committed and the detach hook has not
//! - **Replay-safe**: state is read back on start, so a restart never
//!   re-delivers an attach hook that has already run
//! - **Short-circuit**: storage that departs before its attach hook was
//!   delivered is cleaned up remotely without running any hook
//! - **One storager per attachment**: a background task watches each tracked
//!   attachment and queues hooks as it changes

mod attachments;
mod state;
mod storager;

use std::path::PathBuf;

use fleet_hooks::{HookError, HookKind};
use fleet_names::{NameError, StorageTag};
use thiserror::Error;

use crate::remote::{AttachmentRecord, RemoteError, StorageKind};

pub use attachments::Attachments;
pub use state::StateFile;

/// Errors from the storage tracker.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The hook names storage that is not being tracked.
    #[error("unknown storage {:?}", .0.id())]
    UnknownStorage(StorageTag),

    /// The hook does not fit the storage's current state.
    #[error("inappropriate {kind:?} hook for storage {storage:?}: {reason}")]
    InappropriateHook {
        kind: String,
        storage: String,
        reason: String,
    },

    /// The hook does not concern storage at all.
    #[error("{0} is not a storage hook")]
    NotStorageHook(HookKind),

    #[error("invalid storage state file {}: {reason}", path.display())]
    InvalidStateFile { path: PathBuf, reason: String },

    #[error("storage tracker aborted")]
    Aborted,

    #[error("storager for {storage:?} failed: {reason}")]
    Storager { storage: String, reason: String },

    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: RemoteError,
    },

    #[error("storage state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage state encoding error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Hook(#[from] HookError),
}

impl StorageError {
    pub(crate) fn remote(context: impl Into<String>, source: RemoteError) -> Self {
        StorageError::Remote {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn inappropriate(kind: HookKind, storage: &StorageTag, reason: &str) -> Self {
        StorageError::InappropriateHook {
            kind: kind.to_string(),
            storage: storage.id(),
            reason: reason.to_string(),
        }
    }
}

/// What a hook needs to know about an attached storage instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageContext {
    tag: StorageTag,
    kind: StorageKind,
    location: String,
}

impl StorageContext {
    pub fn tag(&self) -> &StorageTag {
        &self.tag
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    /// Device path or mount point.
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl From<&AttachmentRecord> for StorageContext {
    fn from(record: &AttachmentRecord) -> Self {
        Self {
            tag: record.storage_tag.clone(),
            kind: record.kind,
            location: record.location.clone(),
        }
    }
}
