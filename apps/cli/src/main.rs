#![deny(warnings)]

//! Headless CLI that mounts one mini-game and plays a scripted session.
//!
//! Example:
//!   cli --game tycoon --script "buy,price:50,sell,wait:1500" --json

use anyhow::{bail, Context, Result};
use game_content::{
    Catalog, Circuit, CircuitWinRule, ContentError, GameKind, MoleculeBuilder, Tycoon,
};
use game_core::{Action, GameRules, Round, Score};
use game_runtime::{Outcome, Session};
use std::cell::Cell;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

const TYCOON_SCRIPT: &str = "buy,price:50,sell,wait:1500,sell,wait:1500,sell,wait:1500,\
buy,sell,wait:1500,sell,wait:1500,sell,wait:1500,sell,wait:1500";
const MOLECULE_SCRIPT: &str = "start,add:H,add:O,add:H,wait:1500,add:O,add:O,wait:1500,\
add:C,add:H,add:H,add:H,add:H,wait:1500";
const CIRCUIT_SCRIPT: &str = "start,rotate:0,rotate:0,rotate:1,advance";

#[derive(Debug, Default)]
struct Args {
    game: Option<String>,
    config: Option<String>,
    script: Option<String>,
    seed: Option<u64>,
    win_rule: Option<String>,
    realtime: bool,
    json: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--game" => args.game = it.next(),
            "--config" => args.config = it.next(),
            "--script" => args.script = it.next(),
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--win-rule" => args.win_rule = it.next(),
            "--realtime" => args.realtime = true,
            "--json" => args.json = true,
            other => warn!(arg = other, "ignoring unknown argument"),
        }
    }
    args
}

/// One scripted step.
enum Step<I> {
    Act(Action<I>),
    Wait(Duration),
}

fn parse_step<I>(token: &str) -> Result<Step<I>>
where
    I: FromStr<Err = ContentError>,
{
    let token = token.trim();
    let step = match token.split_once(':') {
        Some(("wait", ms)) => Step::Wait(Duration::from_millis(
            ms.trim().parse().with_context(|| format!("bad wait {ms}"))?,
        )),
        Some(("fail", reason)) => Step::Act(Action::Fail(reason.trim().to_string())),
        _ => match token {
            "start" => Step::Act(Action::Start),
            "advance" => Step::Act(Action::Advance),
            "reset" => Step::Act(Action::Reset),
            "exit" => Step::Act(Action::Exit),
            _ => Step::Act(Action::Input(token.parse()?)),
        },
    };
    Ok(step)
}

async fn wait(session: &mut Session<impl GameRules>, by: Duration, realtime: bool) -> Result<()> {
    if realtime {
        tokio::time::sleep(by).await;
    }
    session.advance_time(by)?;
    Ok(())
}

async fn play<G>(rules: G, script: &str, realtime: bool, json: bool) -> Result<()>
where
    G: GameRules,
    G::Input: FromStr<Err = ContentError>,
{
    let reported: Rc<Cell<Option<Score>>> = Rc::new(Cell::new(None));
    let sink = reported.clone();
    let mut session = Session::new(rules, move |score| sink.set(Some(score)))?
        .with_navigator(|route: &str| info!(route, "leaving game"));

    let steps = script
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .map(parse_step::<G::Input>)
        .collect::<Result<Vec<_>>>()?;

    for step in steps {
        if session.is_torn_down() {
            break;
        }
        match step {
            Step::Wait(by) => wait(&mut session, by, realtime).await?,
            Step::Act(action) => {
                if let Outcome::Rejected(r) = session.dispatch(action)? {
                    println!("rejected: {r}");
                }
                if let Some(m) = &session.snapshot().message {
                    println!("[{:?}] {}", m.tone, m.text);
                }
            }
        }
    }
    while let Some(deadline) = session.next_deadline() {
        let by = deadline.saturating_sub(session.now());
        wait(&mut session, by, realtime).await?;
    }

    let snap = session.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(snap)?);
    } else {
        let round = session
            .current_round()
            .map(|r| r.title().to_string())
            .unwrap_or_default();
        println!(
            "{} | status: {} | round: {} ({}/{}) | cleared: {}",
            session.rules().name(),
            snap.status,
            round,
            snap.round_index + 1,
            session.controller().total_rounds(),
            snap.rounds_cleared
        );
        for (key, value) in snap.ledger.iter() {
            println!("  {key}: {value}");
        }
        if let Some(reason) = &snap.lost_reason {
            println!("lost: {reason}");
        }
    }
    match reported.get() {
        Some(score) => println!("score reported: {score}"),
        None => println!("no score reported"),
    }
    Ok(())
}

fn parse_win_rule(s: &str) -> Result<CircuitWinRule> {
    match s {
        "connected" => Ok(CircuitWinRule::Connected),
        "uniform" => Ok(CircuitWinRule::UniformRotation { degrees: 180 }),
        other => bail!("unknown win rule {other}, expected connected|uniform"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args();
    info!(?args, "starting CLI");

    let mut catalog = match &args.config {
        Some(path) => Catalog::from_path(path).with_context(|| format!("loading {path}"))?,
        None => Catalog::builtin()?,
    };
    if let Some(seed) = args.seed {
        catalog.circuit.seed = seed;
    }
    if let Some(rule) = &args.win_rule {
        catalog.circuit.win_rule = parse_win_rule(rule)?;
    }

    let kind: GameKind = args.game.as_deref().unwrap_or("tycoon").parse()?;
    let script = args.script.as_deref();
    match kind {
        GameKind::Tycoon => {
            let rules = Tycoon::new(catalog.tycoon)?;
            play(rules, script.unwrap_or(TYCOON_SCRIPT), args.realtime, args.json).await
        }
        GameKind::Molecule => {
            let rules = MoleculeBuilder::new(catalog.molecule)?;
            play(rules, script.unwrap_or(MOLECULE_SCRIPT), args.realtime, args.json).await
        }
        GameKind::Circuit => {
            let rules = Circuit::new(catalog.circuit)?;
            play(rules, script.unwrap_or(CIRCUIT_SCRIPT), args.realtime, args.json).await
        }
    }
}
