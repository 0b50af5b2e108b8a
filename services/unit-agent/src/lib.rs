//! Fleet Unit Agent Library
//!
//! The unit agent runs one unit of a service. It tracks leadership of the
//! service, filters changes to the unit's remote state down to the events an
//! execution engine acts on, and keeps the unit's storage attachments in
//! step with local state.
//!
//! ## Architecture
//!
//! Every component is a [`worker::Worker`] with its own control loop:
//!
//! ```text
//! unit-agent
//! ├── leadership::Tracker   (lease claims, leadership tickets)
//! ├── filter::Filter        (coalesced unit/service/relation/config events)
//! └── storage::Attachments  (state files, storagers, storage hooks)
//! ```
//!
//! ## Modules
//!
//! - `worker`: kill/wait primitive shared by every loop
//! - `remote`: collaborator traits, watchers and the in-memory model
//! - `leadership`: leadership tracker
//! - `filter`: change filter
//! - `storage`: storage attachment tracker
//! - `config`: environment configuration

pub mod config;
pub mod filter;
pub mod leadership;
pub mod remote;
pub mod storage;
pub mod worker;

pub use config::{Config, LogFormat};
pub use filter::Filter;
pub use leadership::{Ticket, Tracker};
pub use remote::{MemoryModel, RemoteError};
pub use storage::{Attachments, StorageContext, StorageError};
pub use worker::{KillSignal, KillSwitch, Worker, WorkerError};
