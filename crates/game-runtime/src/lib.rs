#![deny(warnings)]

//! Runtime for mounted mini-game sessions.
//!
//! The controller in `game-core` is pure; this crate owns the mutable side:
//! the latest snapshot, fire-once timers and the host collaborators
//! (completion callback, navigator). A session that has been torn down
//! never runs another callback.

pub mod scheduler;
pub mod session;

pub use scheduler::{Scheduler, TimerId};
pub use session::{CompletionReporter, Navigator, Outcome, RuntimeError, Session};
