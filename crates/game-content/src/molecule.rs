//! Molecule Builder: add atoms until the build matches the target molecule.

use crate::{ContentError, TimingConfig};
use game_core::{
    Accepted, Constraint, Delta, GameRules, Ledger, LedgerError, Rejection, Round, RoundId,
    ScoreContext, SessionView, Timing, Tone,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

/// An element offered on the palette.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomSpec {
    pub element: String,
    pub name: String,
    pub valence: u8,
    pub emoji: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAtom {
    pub element: String,
    pub count: u32,
}

/// One molecule to build.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: RoundId,
    pub title: String,
    pub emoji: String,
    pub description: String,
    pub target: Vec<TargetAtom>,
}

impl Challenge {
    /// Required count of `element`; zero when the molecule has none.
    pub fn required(&self, element: &str) -> u32 {
        self.target
            .iter()
            .filter(|t| t.element == element)
            .map(|t| t.count)
            .sum()
    }
}

impl Round for Challenge {
    fn id(&self) -> &RoundId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoleculeMessages {
    pub complete_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoleculeConfig {
    pub title: String,
    pub palette: Vec<AtomSpec>,
    pub challenges: Vec<Challenge>,
    pub messages: MoleculeMessages,
    pub timing: TimingConfig,
    pub exit_route: String,
}

impl MoleculeConfig {
    pub fn validate(&self) -> Result<(), ContentError> {
        let mut seen = BTreeSet::new();
        for atom in &self.palette {
            if atom.element.trim().is_empty() || !seen.insert(atom.element.as_str()) {
                return Err(ContentError::Invalid(format!(
                    "palette element {:?} is empty or repeated",
                    atom.element
                )));
            }
        }
        if self.challenges.is_empty() {
            return Err(ContentError::Invalid("molecule needs a challenge".into()));
        }
        for ch in &self.challenges {
            if ch.target.iter().all(|t| t.count == 0) {
                return Err(ContentError::Invalid(format!("challenge {} is empty", ch.id)));
            }
            if let Some(t) = ch.target.iter().find(|t| !seen.contains(t.element.as_str())) {
                return Err(ContentError::Invalid(format!(
                    "challenge {} uses {} which is not on the palette",
                    ch.id, t.element
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoleculeInput {
    AddAtom(String),
    /// Remove every atom from the build area.
    Clear,
}

impl FromStr for MoleculeInput {
    type Err = ContentError;

    /// `add:<element>` or `clear`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            Some(("add", el)) if !el.trim().is_empty() => {
                Ok(MoleculeInput::AddAtom(el.trim().to_string()))
            }
            None if s == "clear" => Ok(MoleculeInput::Clear),
            _ => Err(ContentError::Invalid(format!("unknown molecule step: {s}"))),
        }
    }
}

fn atom_key(element: &str) -> String {
    format!("atom.{element}")
}

fn subscript(n: u32) -> String {
    const DIGITS: [char; 10] = ['₀', '₁', '₂', '₃', '₄', '₅', '₆', '₇', '₈', '₉'];
    n.to_string()
        .chars()
        .filter_map(|c| c.to_digit(10).map(|d| DIGITS[d as usize]))
        .collect()
}

#[derive(Debug)]
pub struct MoleculeBuilder {
    cfg: MoleculeConfig,
}

impl MoleculeBuilder {
    pub fn new(cfg: MoleculeConfig) -> Result<Self, ContentError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn palette(&self) -> &[AtomSpec] {
        &self.cfg.palette
    }

    fn count(&self, ledger: &Ledger, element: &str) -> u32 {
        ledger.value(&atom_key(element)).to_u32().unwrap_or(0)
    }

    /// Formula of the current build in Hill order: carbon, hydrogen, then
    /// the rest alphabetically. Empty when nothing is built.
    pub fn formula(&self, ledger: &Ledger) -> String {
        let mut counts: Vec<(&str, u32)> = self
            .cfg
            .palette
            .iter()
            .map(|a| (a.element.as_str(), self.count(ledger, &a.element)))
            .filter(|(_, n)| *n > 0)
            .collect();
        let has_carbon = counts.iter().any(|(e, _)| *e == "C");
        counts.sort_by_key(|(e, _)| match (*e, has_carbon) {
            ("C", true) => (0, String::new()),
            ("H", true) => (1, String::new()),
            (other, _) => (2, other.to_string()),
        });
        counts
            .into_iter()
            .map(|(e, n)| if n == 1 { e.to_string() } else { format!("{e}{}", subscript(n)) })
            .collect()
    }

    fn clear_delta(&self) -> Delta {
        self.cfg
            .palette
            .iter()
            .fold(Delta::new(), |d, a| d.assign(atom_key(&a.element), Decimal::ZERO))
    }

    /// Atoms placed so far.
    pub fn atoms_placed(&self, ledger: &Ledger) -> u32 {
        self.cfg
            .palette
            .iter()
            .map(|a| self.count(ledger, &a.element))
            .sum()
    }
}

impl GameRules for MoleculeBuilder {
    type Round = Challenge;
    type Input = MoleculeInput;

    fn name(&self) -> &str {
        "molecule"
    }

    fn rounds(&self) -> &[Challenge] {
        &self.cfg.challenges
    }

    fn initial_ledger(&self) -> Result<Ledger, LedgerError> {
        self.cfg.palette.iter().try_fold(Ledger::new(), |l, a| {
            l.with(atom_key(&a.element), Decimal::ZERO, Constraint::NonNegative)
        })
    }

    fn enter_round(&self, _round: &Challenge, ledger: &Ledger) -> Result<Ledger, LedgerError> {
        ledger.applied(&self.clear_delta())
    }

    fn validate(
        &self,
        view: &SessionView<'_, Challenge>,
        input: &MoleculeInput,
    ) -> Result<Accepted, Rejection> {
        match input {
            MoleculeInput::AddAtom(element) => {
                let Some(atom) = self.cfg.palette.iter().find(|a| &a.element == element) else {
                    return Err(Rejection::InvalidTarget(format!("Unknown element {element}")));
                };
                let needed = view.round.required(element);
                if self.count(view.ledger, element) >= needed {
                    return Err(Rejection::InvalidTarget(format!(
                        "No more {} needed for {}",
                        atom.name, view.round.title
                    )));
                }
                let delta = Delta::new().adjust(atom_key(element), Decimal::ONE);
                let after = view.ledger.applied(&delta)?;
                let accepted = Accepted::with_delta(delta);
                if self.round_complete(view.round, &after) {
                    Ok(accepted.message(
                        format!("{} {} complete!", view.round.emoji, view.round.title),
                        Tone::Success,
                        Duration::from_millis(self.cfg.messages.complete_ms),
                    ))
                } else {
                    Ok(accepted)
                }
            }
            MoleculeInput::Clear => Ok(Accepted::with_delta(self.clear_delta())),
        }
    }

    /// Multiset equality between the placed atoms and the target.
    fn round_complete(&self, round: &Challenge, ledger: &Ledger) -> bool {
        self.cfg
            .palette
            .iter()
            .all(|a| self.count(ledger, &a.element) == round.required(&a.element))
    }

    fn score(&self, ctx: &ScoreContext<'_>) -> Decimal {
        game_core::Score::ratio(ctx.rounds_cleared, ctx.total_rounds).value()
    }

    fn timing(&self) -> Timing {
        self.cfg.timing.to_timing()
    }

    fn exit_route(&self) -> &str {
        &self.cfg.exit_route
    }
}
