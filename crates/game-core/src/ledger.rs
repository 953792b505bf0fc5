//! Named numeric resources with per-resource constraints.
//!
//! A [`Ledger`] only changes through [`Ledger::apply`], which is all-or-nothing:
//! every resulting value is staged and checked before anything is written.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Name of a tracked resource, e.g. "capital" or "atom.H".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey(pub String);

impl ResourceKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ResourceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Domain constraint a resource value must always satisfy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Any value.
    #[default]
    Unbounded,
    /// Value >= 0 (capital, inventory, counts).
    NonNegative,
    /// Inclusive range.
    Range { min: Decimal, max: Decimal },
}

impl Constraint {
    /// Whether `value` satisfies this constraint.
    pub fn admits(&self, value: Decimal) -> bool {
        match *self {
            Constraint::Unbounded => true,
            Constraint::NonNegative => value >= Decimal::ZERO,
            Constraint::Range { min, max } => value >= min && value <= max,
        }
    }
}

/// One change to a single resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    /// Signed adjustment added to the current value.
    Adjust(Decimal),
    /// Replace the current value.
    Assign(Decimal),
}

/// An ordered batch of changes applied atomically.
///
/// Changes to the same key compose in order, so `adjust(k, 5).adjust(k, -2)`
/// nets +3.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    changes: Vec<(ResourceKey, Change)>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adjust(mut self, key: impl Into<ResourceKey>, amount: Decimal) -> Self {
        self.changes.push((key.into(), Change::Adjust(amount)));
        self
    }

    pub fn assign(mut self, key: impl Into<ResourceKey>, value: Decimal) -> Self {
        self.changes.push((key.into(), Change::Assign(value)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[(ResourceKey, Change)] {
        &self.changes
    }
}

/// Errors raised when a delta cannot be applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The delta names a resource the ledger does not track.
    #[error("unknown resource: {0}")]
    UnknownResource(ResourceKey),
    /// A resource was declared twice.
    #[error("resource declared twice: {0}")]
    DuplicateResource(ResourceKey),
    /// The resulting value would break the resource's constraint.
    #[error("{key} would become {value}, which violates {constraint:?}")]
    ConstraintViolated {
        key: ResourceKey,
        value: Decimal,
        constraint: Constraint,
    },
    /// Decimal arithmetic overflowed.
    #[error("arithmetic overflow on {0}")]
    Overflow(ResourceKey),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Entry {
    value: Decimal,
    constraint: Constraint,
}

/// Resource ledger owned by a single session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    entries: BTreeMap<ResourceKey, Entry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource with its initial value and constraint.
    pub fn with(
        mut self,
        key: impl Into<ResourceKey>,
        initial: Decimal,
        constraint: Constraint,
    ) -> Result<Self, LedgerError> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(LedgerError::DuplicateResource(key));
        }
        if !constraint.admits(initial) {
            return Err(LedgerError::ConstraintViolated {
                key,
                value: initial,
                constraint,
            });
        }
        self.entries.insert(
            key,
            Entry {
                value: initial,
                constraint,
            },
        );
        Ok(self)
    }

    /// Current value of a resource, if tracked.
    pub fn get(&self, key: &str) -> Option<Decimal> {
        self.entries.get(key).map(|e| e.value)
    }

    /// Current value, treating untracked resources as zero.
    pub fn value(&self, key: &str) -> Decimal {
        self.get(key).unwrap_or(Decimal::ZERO)
    }

    pub fn constraint(&self, key: &str) -> Option<Constraint> {
        self.entries.get(key).map(|e| e.constraint)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate resources in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, Decimal)> {
        self.entries.iter().map(|(k, e)| (k, e.value))
    }

    /// Apply a delta atomically. On error nothing is written.
    pub fn apply(&mut self, delta: &Delta) -> Result<(), LedgerError> {
        let mut staged: BTreeMap<&ResourceKey, Decimal> = BTreeMap::new();
        for (key, change) in delta.changes() {
            let entry = self
                .entries
                .get(key)
                .ok_or_else(|| LedgerError::UnknownResource(key.clone()))?;
            let current = staged.get(key).copied().unwrap_or(entry.value);
            let next = match *change {
                Change::Adjust(amount) => current
                    .checked_add(amount)
                    .ok_or_else(|| LedgerError::Overflow(key.clone()))?,
                Change::Assign(value) => value,
            };
            staged.insert(key, next);
        }
        for (key, value) in &staged {
            let constraint = self.entries[*key].constraint;
            if !constraint.admits(*value) {
                return Err(LedgerError::ConstraintViolated {
                    key: (*key).clone(),
                    value: *value,
                    constraint,
                });
            }
        }
        let writes: Vec<(ResourceKey, Decimal)> =
            staged.into_iter().map(|(k, v)| (k.clone(), v)).collect();
        for (key, value) in writes {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.value = value;
            }
        }
        Ok(())
    }

    /// Pure variant of [`Ledger::apply`].
    pub fn applied(&self, delta: &Delta) -> Result<Ledger, LedgerError> {
        let mut next = self.clone();
        next.apply(delta)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn shop() -> Ledger {
        Ledger::new()
            .with("capital", Decimal::new(1000, 0), Constraint::NonNegative)
            .unwrap()
            .with("inventory", Decimal::ZERO, Constraint::NonNegative)
            .unwrap()
    }

    #[test]
    fn apply_moves_capital_into_inventory() {
        let mut l = shop();
        let d = Delta::new()
            .adjust("capital", Decimal::new(-990, 0))
            .assign("inventory", Decimal::new(33, 0));
        l.apply(&d).unwrap();
        assert_eq!(l.value("capital"), Decimal::new(10, 0));
        assert_eq!(l.value("inventory"), Decimal::new(33, 0));
    }

    #[test]
    fn violation_leaves_ledger_untouched() {
        let mut l = shop();
        let before = l.clone();
        let d = Delta::new()
            .assign("inventory", Decimal::new(50, 0))
            .adjust("capital", Decimal::new(-1500, 0));
        let err = l.apply(&d).unwrap_err();
        assert!(matches!(err, LedgerError::ConstraintViolated { .. }));
        assert_eq!(l, before);
    }

    #[test]
    fn unknown_resource_is_rejected() {
        let mut l = shop();
        let err = l
            .apply(&Delta::new().adjust("gold", Decimal::ONE))
            .unwrap_err();
        assert_eq!(err, LedgerError::UnknownResource(ResourceKey::from("gold")));
    }

    #[test]
    fn changes_to_one_key_compose() {
        let mut l = shop();
        // Intermediate negative is fine as long as the final value is admitted.
        let d = Delta::new()
            .adjust("capital", Decimal::new(-1200, 0))
            .adjust("capital", Decimal::new(300, 0));
        l.apply(&d).unwrap();
        assert_eq!(l.value("capital"), Decimal::new(100, 0));
    }

    #[test]
    fn declaration_checks_constraint_and_duplicates() {
        let range = Constraint::Range {
            min: Decimal::ZERO,
            max: Decimal::new(270, 0),
        };
        assert!(Ledger::new()
            .with("tile.0", Decimal::new(360, 0), range)
            .is_err());
        assert!(shop()
            .with("capital", Decimal::ZERO, Constraint::Unbounded)
            .is_err());
    }

    proptest! {
        #[test]
        fn non_negative_never_goes_negative(steps in proptest::collection::vec(-500i64..500, 1..64)) {
            let mut l = shop();
            for s in steps {
                let _ = l.apply(&Delta::new().adjust("capital", Decimal::new(s, 0)));
                prop_assert!(l.value("capital") >= Decimal::ZERO);
            }
        }
    }
}
