//! Change filter for a unit.
//!
//! Watches the unit, its service, its relations and its charm config, and
//! turns the stream of remote notifications into a handful of coalesced
//! topics an execution engine can consume at its own pace.
//!
//! ## Design Principles
//!
//! - **Coalescing**: every topic is a single slot; a burst of changes between
//!   two deliveries yields one event carrying the latest value
//! - **Explicit re-arm**: resolved and upgrade events are only redelivered
//!   when the consumer asks for them again
//! - **Loop-owned state**: requests from the consumer are messages to the
//!   loop, answered once they have taken effect
//! - **Terminal states**: a removed unit or service (or a Dead one) stops the
//!   filter with [`WorkerError::TerminateAgent`](crate::worker::WorkerError)

mod mailbox;
mod unit_filter;

pub use mailbox::{EventReceiver, Mailbox, UnitDying};
pub use unit_filter::Filter;
