#![deny(warnings)]

//! Core session model for the learning arcade mini-games.
//!
//! Every game shares one shape: a linear list of rounds, a resource ledger
//! mutated by validated player input, and a one-shot completion report.
//! This crate holds that shape as data ([`Snapshot`]) plus a pure reducer
//! ([`Controller::reduce`]) so the games can be driven and tested without
//! any rendering environment.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod controller;
pub mod ledger;
pub mod rules;

pub use controller::{Action, Controller, Effect, SetupError, Snapshot, TimerTask, Transition};
pub use ledger::{Change, Constraint, Delta, Ledger, LedgerError, ResourceKey};
pub use rules::{
    Accepted, GameRules, Message, MessageToken, Rejection, Round, ScoreContext, SessionView,
    Timing, Tone, TransientMessage,
};

/// Lifecycle status of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Mounted, waiting for the first action.
    Setup,
    /// Rounds in progress.
    Active,
    /// Final round completed.
    Won,
    /// Failed; reason kept on the snapshot.
    Lost,
}

impl Status {
    /// `Won` and `Lost` only leave through a reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Won | Status::Lost)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Setup => "setup",
            Status::Active => "active",
            Status::Won => "won",
            Status::Lost => "lost",
        };
        f.write_str(s)
    }
}

/// Identifier of a round or challenge, e.g. "water" or "day-3".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoundId(pub String);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final score, always within [0, 100].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Score(Decimal);

impl Score {
    /// Clamp a raw score into [0, 100].
    pub fn clamped(raw: Decimal) -> Self {
        Self(raw.clamp(Decimal::ZERO, Decimal::from(100)))
    }

    /// `part / whole * 100`, or zero when `whole` is zero.
    pub fn ratio(part: usize, whole: usize) -> Self {
        if whole == 0 {
            return Self(Decimal::ZERO);
        }
        Self::clamped(Decimal::from(part as u64) * Decimal::from(100) / Decimal::from(whole as u64))
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    /// Numeric form handed to the host page.
    pub fn as_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.round_dp(1))
    }
}
