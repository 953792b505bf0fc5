//! Technology Village Light-Up: rotate wire tiles until the village lights up.
//!
//! Levels are square grids. Tile shapes and starting rotations come from a
//! seeded RNG so a level is the same every time it is played.

use crate::{ContentError, TimingConfig};
use game_core::{
    Accepted, Constraint, Delta, GameRules, Ledger, LedgerError, Rejection, Round, RoundId,
    ScoreContext, Score, SessionView, Timing,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use tracing::warn;

const NORTH: u8 = 0b0001;
const EAST: u8 = 0b0010;
const SOUTH: u8 = 0b0100;
const WEST: u8 = 0b1000;

/// How a level is judged complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitWinRule {
    /// Every tile sits at the same rotation. Ignores whether neighbouring
    /// wires actually meet.
    UniformRotation { degrees: u16 },
    /// Open edges form a path from the top-left tile to the bottom-right one.
    Connected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub grid: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub title: String,
    pub seed: u64,
    pub levels: Vec<LevelSpec>,
    /// Written as `connected` or `uniform_rotation: { degrees: 180 }`.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub win_rule: CircuitWinRule,
    pub timing: TimingConfig,
    pub exit_route: String,
}

impl CircuitConfig {
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.levels.is_empty() {
            return Err(ContentError::Invalid("circuit needs a level".into()));
        }
        if let Some(l) = self.levels.iter().find(|l| l.grid == 0 || l.grid > 16) {
            return Err(ContentError::Invalid(format!(
                "circuit grid {} out of range 1..=16",
                l.grid
            )));
        }
        if let CircuitWinRule::UniformRotation { degrees } = self.win_rule {
            if degrees % 90 != 0 || degrees >= 360 {
                return Err(ContentError::Invalid(format!(
                    "win rotation {degrees} is not a quarter turn"
                )));
            }
        }
        Ok(())
    }
}

/// A wire tile. `connections` is 1..=4 open sides at rotation 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    pub id: usize,
    pub connections: u8,
    pub initial_rotation: u16,
}

impl Tile {
    /// Open sides at rotation 0.
    fn base_mask(&self) -> u8 {
        match self.connections {
            1 => NORTH,
            2 => EAST | WEST,
            3 => EAST | SOUTH | WEST,
            _ => NORTH | EAST | SOUTH | WEST,
        }
    }

    /// Open sides after turning clockwise by `rotation` degrees.
    pub fn openings(&self, rotation: u16) -> u8 {
        let turns = (rotation / 90) % 4;
        (0..turns).fold(self.base_mask(), |m, _| ((m << 1) | (m >> 3)) & 0b1111)
    }
}

/// One grid of tiles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Level {
    id: RoundId,
    title: String,
    pub grid: usize,
    pub tiles: Vec<Tile>,
    solution: Vec<u16>,
}

impl Level {
    /// A rotation per tile that completes the level.
    pub fn solution(&self) -> &[u16] {
        &self.solution
    }
}

impl Round for Level {
    fn id(&self) -> &RoundId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitInput {
    /// Turn a tile 90 degrees clockwise.
    Rotate(usize),
}

impl FromStr for CircuitInput {
    type Err = ContentError;

    /// `rotate:<tile>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once(':') {
            Some(("rotate", n)) => n
                .trim()
                .parse::<usize>()
                .map(CircuitInput::Rotate)
                .map_err(|e| ContentError::Invalid(format!("bad tile {n}: {e}"))),
            _ => Err(ContentError::Invalid(format!("unknown circuit step: {s}"))),
        }
    }
}

fn tile_key(id: usize) -> String {
    format!("tile.{id}")
}

fn rotation_range() -> Constraint {
    Constraint::Range {
        min: Decimal::ZERO,
        max: Decimal::from(270),
    }
}

/// Rerolls allowed for a routed level that would start out already lit.
const MAX_REROLLS: usize = 32;

fn generate_level(index: usize, spec: LevelSpec, seed: u64, rule: CircuitWinRule) -> Level {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(index as u64));
    let n = spec.grid;
    let (tiles, solution) = match rule {
        CircuitWinRule::UniformRotation { degrees } => {
            let tiles: Vec<Tile> = (0..n * n).map(|id| random_tile(&mut rng, id)).collect();
            let solution = vec![degrees; tiles.len()];
            (tiles, solution)
        }
        CircuitWinRule::Connected => {
            let mut routed = routed_tiles(&mut rng, n);
            for _ in 0..MAX_REROLLS {
                let start: Vec<u8> = routed
                    .0
                    .iter()
                    .map(|t| t.openings(t.initial_rotation))
                    .collect();
                if !corners_linked(n, &start) {
                    break;
                }
                routed = routed_tiles(&mut rng, n);
            }
            routed
        }
    };
    Level {
        id: RoundId(format!("level-{}", index + 1)),
        title: format!("Level {}", index + 1),
        grid: n,
        tiles,
        solution,
    }
}

fn random_tile(rng: &mut ChaCha8Rng, id: usize) -> Tile {
    Tile {
        id,
        connections: rng.gen_range(1..=4),
        initial_rotation: if rng.gen_bool(0.5) { 90 } else { 0 },
    }
}

/// Monotone route of tile indices from the top-left to the bottom-right.
fn route(rng: &mut ChaCha8Rng, n: usize) -> Vec<usize> {
    let (mut row, mut col) = (0, 0);
    let mut path = vec![0];
    while row + 1 < n || col + 1 < n {
        let down = if row + 1 == n {
            false
        } else if col + 1 == n {
            true
        } else {
            rng.gen_bool(0.5)
        };
        if down {
            row += 1;
        } else {
            col += 1;
        }
        path.push(row * n + col);
    }
    path
}

/// Tiles laid around a random route, each route tile given a shape that can
/// open both of its route sides. Returns the tiles and a lighting rotation
/// per tile.
fn routed_tiles(rng: &mut ChaCha8Rng, n: usize) -> (Vec<Tile>, Vec<u16>) {
    let total = n * n;
    let mut needed = vec![0u8; total];
    let path = route(rng, n);
    for step in path.windows(2) {
        let (a, b) = (step[0], step[1]);
        if b == a + 1 {
            needed[a] |= EAST;
            needed[b] |= WEST;
        } else {
            needed[a] |= SOUTH;
            needed[b] |= NORTH;
        }
    }
    let mut tiles = Vec::with_capacity(total);
    let mut solution = Vec::with_capacity(total);
    for (id, &sides) in needed.iter().enumerate() {
        let mut tile = random_tile(rng, id);
        if sides == 0 {
            solution.push(tile.initial_rotation);
            tiles.push(tile);
            continue;
        }
        tile.connections = match sides {
            s if s == NORTH | SOUTH || s == EAST | WEST => {
                if rng.gen_bool(0.5) { 2 } else { 4 }
            }
            s if s.count_ones() == 2 => {
                if rng.gen_bool(0.5) { 3 } else { 4 }
            }
            _ => tile.connections,
        };
        // Every shape covers a single side, straights cover opposite
        // sides and tees cover adjacent ones, so a turn always exists.
        let turn = [0, 90, 180, 270]
            .into_iter()
            .find(|r| tile.openings(*r) & sides == sides)
            .unwrap_or(0);
        solution.push(turn);
        tiles.push(tile);
    }
    (tiles, solution)
}

/// Breadth-first search over mutually open edges of an `n`×`n` grid.
fn corners_linked(n: usize, open: &[u8]) -> bool {
    let total = n * n;
    if total == 0 || open.len() < total {
        return false;
    }
    let mut seen = vec![false; total];
    let mut queue = VecDeque::from([0usize]);
    seen[0] = true;
    while let Some(i) = queue.pop_front() {
        if i == total - 1 {
            return true;
        }
        let (row, col) = (i / n, i % n);
        let neighbours = [
            (NORTH, SOUTH, row > 0, i.wrapping_sub(n)),
            (EAST, WEST, col + 1 < n, i + 1),
            (SOUTH, NORTH, row + 1 < n, i + n),
            (WEST, EAST, col > 0, i.wrapping_sub(1)),
        ];
        for (out, back, inside, j) in neighbours {
            if inside && open[i] & out != 0 && open[j] & back != 0 && !seen[j] {
                seen[j] = true;
                queue.push_back(j);
            }
        }
    }
    false
}

#[derive(Debug)]
pub struct Circuit {
    cfg: CircuitConfig,
    levels: Vec<Level>,
}

impl Circuit {
    pub fn new(cfg: CircuitConfig) -> Result<Self, ContentError> {
        cfg.validate()?;
        if let CircuitWinRule::UniformRotation { degrees } = cfg.win_rule {
            warn!(
                degrees,
                "circuit levels are judged by tile rotation only; wire adjacency is not checked"
            );
        }
        let levels = cfg
            .levels
            .iter()
            .enumerate()
            .map(|(i, spec)| generate_level(i, *spec, cfg.seed, cfg.win_rule))
            .collect();
        Ok(Self { cfg, levels })
    }

    pub fn win_rule(&self) -> CircuitWinRule {
        self.cfg.win_rule
    }

    /// Current rotation of a tile in degrees.
    pub fn rotation(&self, ledger: &Ledger, tile: usize) -> u16 {
        ledger.value(&tile_key(tile)).to_u16().unwrap_or(0)
    }

    /// Whether open edges link the top-left tile to the bottom-right tile.
    pub fn is_connected(&self, level: &Level, ledger: &Ledger) -> bool {
        let open: Vec<u8> = level
            .tiles
            .iter()
            .map(|t| t.openings(self.rotation(ledger, t.id)))
            .collect();
        corners_linked(level.grid, &open)
    }
}

impl GameRules for Circuit {
    type Round = Level;
    type Input = CircuitInput;

    fn name(&self) -> &str {
        "circuit"
    }

    fn rounds(&self) -> &[Level] {
        &self.levels
    }

    fn initial_ledger(&self) -> Result<Ledger, LedgerError> {
        Ok(Ledger::new())
    }

    /// Each level brings its own tiles; the previous grid is dropped.
    fn enter_round(&self, level: &Level, _ledger: &Ledger) -> Result<Ledger, LedgerError> {
        level.tiles.iter().try_fold(Ledger::new(), |l, t| {
            l.with(
                tile_key(t.id),
                Decimal::from(t.initial_rotation),
                rotation_range(),
            )
        })
    }

    fn validate(
        &self,
        view: &SessionView<'_, Level>,
        input: &CircuitInput,
    ) -> Result<Accepted, Rejection> {
        let CircuitInput::Rotate(tile) = *input;
        if tile >= view.round.tiles.len() {
            return Err(Rejection::InvalidTarget(format!(
                "No tile {tile} on {}",
                view.round.title
            )));
        }
        let next = (self.rotation(view.ledger, tile) + 90) % 360;
        Ok(Accepted::with_delta(
            Delta::new().assign(tile_key(tile), Decimal::from(next)),
        ))
    }

    fn round_complete(&self, level: &Level, ledger: &Ledger) -> bool {
        match self.cfg.win_rule {
            CircuitWinRule::UniformRotation { degrees } => level
                .tiles
                .iter()
                .all(|t| self.rotation(ledger, t.id) == degrees),
            CircuitWinRule::Connected => self.is_connected(level, ledger),
        }
    }

    fn score(&self, ctx: &ScoreContext<'_>) -> Decimal {
        Score::ratio(ctx.rounds_cleared, ctx.total_rounds).value()
    }

    fn timing(&self) -> Timing {
        self.cfg.timing.to_timing()
    }

    fn exit_route(&self) -> &str {
        &self.cfg.exit_route
    }
}
