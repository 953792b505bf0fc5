//! The seam between the shared controller and a concrete game.

use crate::ledger::{Delta, Ledger, LedgerError};
use crate::{RoundId, Status};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Read-only round content.
pub trait Round {
    fn id(&self) -> &RoundId;
    fn title(&self) -> &str;
}

/// Visual weight of a transient message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Info,
    Success,
    Warning,
    Error,
}

/// Message requested by an accepted input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub tone: Tone,
    /// How long the host shows it before clearing.
    pub ttl: Duration,
}

/// Identifies one posted message so a late clear cannot hit a newer one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageToken(pub u64);

/// Message currently on screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientMessage {
    pub text: String,
    pub tone: Tone,
    pub token: MessageToken,
}

/// Why an action was refused. Refusals never change ledger, round or status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("{0}")]
    InsufficientResource(String),
    #[error("{0}")]
    PreconditionNotMet(String),
    #[error("{0}")]
    InvalidTarget(String),
    #[error("this round is not complete yet")]
    RoundIncomplete,
    #[error("this round is already complete")]
    RoundCleared,
    #[error("the game is over, reset to play again")]
    SessionOver,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result of a successful validation: the mutation to perform.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Accepted {
    pub delta: Delta,
    pub message: Option<Message>,
    /// Set when the accepted input ends the session as lost.
    pub fail: Option<String>,
}

impl Accepted {
    pub fn with_delta(delta: Delta) -> Self {
        Self {
            delta,
            ..Self::default()
        }
    }

    pub fn message(mut self, text: impl Into<String>, tone: Tone, ttl: Duration) -> Self {
        self.message = Some(Message {
            text: text.into(),
            tone,
            ttl,
        });
        self
    }

    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail = Some(reason.into());
        self
    }
}

/// What a validator sees of the session.
#[derive(Debug)]
pub struct SessionView<'a, R> {
    pub status: Status,
    pub round_index: usize,
    pub round: &'a R,
    pub ledger: &'a Ledger,
    pub total_rounds: usize,
}

impl<R> SessionView<'_, R> {
    pub fn is_last_round(&self) -> bool {
        self.round_index + 1 == self.total_rounds
    }
}

/// Inputs to a game's scoring function.
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext<'a> {
    pub ledger: &'a Ledger,
    pub rounds_cleared: usize,
    pub total_rounds: usize,
}

/// Timer settings of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// Display time of rejection advisories.
    pub rejection_ttl: Duration,
    /// Delay before an automatic advance once a round is cleared; `None`
    /// waits for an explicit advance.
    pub advance_delay: Option<Duration>,
    /// Delay between winning and the completion report.
    pub completion_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            rejection_ttl: Duration::from_millis(2000),
            advance_delay: None,
            completion_delay: Duration::ZERO,
        }
    }
}

/// Game-specific rules plugged into the shared [`crate::Controller`].
pub trait GameRules {
    type Round: Round;
    type Input: fmt::Debug + Clone;

    /// Short name used in logs.
    fn name(&self) -> &str;

    fn rounds(&self) -> &[Self::Round];

    /// Ledger before the first round is entered.
    fn initial_ledger(&self) -> Result<Ledger, LedgerError>;

    /// Prepare the ledger when a round starts. The default keeps it as is.
    fn enter_round(&self, _round: &Self::Round, ledger: &Ledger) -> Result<Ledger, LedgerError> {
        Ok(ledger.clone())
    }

    /// Accept or reject a candidate input. Must not have side effects.
    fn validate(
        &self,
        view: &SessionView<'_, Self::Round>,
        input: &Self::Input,
    ) -> Result<Accepted, Rejection>;

    /// Completion predicate of a round.
    fn round_complete(&self, round: &Self::Round, ledger: &Ledger) -> bool;

    /// Raw score; the controller clamps it to [0, 100].
    fn score(&self, ctx: &ScoreContext<'_>) -> Decimal;

    fn timing(&self) -> Timing;

    /// Fixed route handed to the navigator on exit.
    fn exit_route(&self) -> &str;
}
