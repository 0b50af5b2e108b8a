//! Leadership tracking for a single unit.
//!
//! The tracker claims leadership of the unit's service and keeps the claim
//! alive, so that callers can ask "am I leader right now?" without a remote
//! round trip per question.
//!
//! ## Design Principles
//!
//! - **Claim twice, renew once**: every claim covers `2 × duration` and is
//!   renewed after `duration`, so a confirmed answer stays valid for at least
//!   `duration` after it is given
//! - **Loop-owned state**: leader/minion state is only touched by the tracker
//!   loop; callers interact through [`Ticket`]s
//! - **One release waiter**: a minion arms at most one background wait for
//!   the current lease to be released, tied to the tracker's kill signal

mod tracker;

pub use tracker::{Ticket, Tracker};
