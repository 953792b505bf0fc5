#![deny(warnings)]

//! The three learning-arcade games as [`game_core::GameRules`] impls, plus
//! the YAML content catalog that configures them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub mod circuit;
pub mod molecule;
pub mod tycoon;

pub use circuit::{Circuit, CircuitConfig, CircuitInput, CircuitWinRule};
pub use molecule::{MoleculeBuilder, MoleculeConfig, MoleculeInput};
pub use tycoon::{Tycoon, TycoonConfig, TycoonInput};

const BUILTIN_CATALOG: &str = include_str!("../content/catalog.yaml");

/// Errors loading or validating content.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid content: {0}")]
    Invalid(String),
    #[error(transparent)]
    Econ(#[from] game_econ::EconError),
}

/// Which game to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Tycoon,
    Molecule,
    Circuit,
}

impl FromStr for GameKind {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tycoon" | "business" => Ok(GameKind::Tycoon),
            "molecule" | "chemistry" => Ok(GameKind::Molecule),
            "circuit" | "lightup" => Ok(GameKind::Circuit),
            other => Err(ContentError::Invalid(format!("unknown game: {other}"))),
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameKind::Tycoon => "tycoon",
            GameKind::Molecule => "molecule",
            GameKind::Circuit => "circuit",
        };
        f.write_str(s)
    }
}

/// Timer settings as written in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub rejection_ms: u64,
    #[serde(default)]
    pub advance_ms: Option<u64>,
    #[serde(default)]
    pub completion_ms: u64,
}

impl TimingConfig {
    pub fn to_timing(self) -> game_core::Timing {
        game_core::Timing {
            rejection_ttl: Duration::from_millis(self.rejection_ms),
            advance_delay: self.advance_ms.map(Duration::from_millis),
            completion_delay: Duration::from_millis(self.completion_ms),
        }
    }
}

/// All game content.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    pub tycoon: TycoonConfig,
    pub molecule: MoleculeConfig,
    pub circuit: CircuitConfig,
}

impl Catalog {
    /// Content shipped with the crate.
    pub fn builtin() -> Result<Self, ContentError> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ContentError> {
        let catalog: Catalog = serde_yaml::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ContentError> {
        let text = fs::read_to_string(path.as_ref())?;
        info!(path = %path.as_ref().display(), "loading catalog");
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), ContentError> {
        self.tycoon.validate()?;
        self.molecule.validate()?;
        self.circuit.validate()?;
        Ok(())
    }
}
