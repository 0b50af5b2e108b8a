//! # fleet-hooks
//!
//! Hook kinds and hook descriptors.
//!
//! A hook is an idempotent action the execution engine runs in response to a
//! change in the unit's assigned state. The agent's trackers decide *which*
//! hook comes next and hand the engine a [`HookInfo`]; the engine runs it and
//! reports back so the tracker can commit the transition.
//!
//! Hook kinds form a closed set. Every dispatch site matches on [`HookKind`]
//! exhaustively, so adding a kind forces each consumer to decide what it means.

mod error;
mod info;
mod kind;

pub use error::HookError;
pub use info::HookInfo;
pub use kind::HookKind;
