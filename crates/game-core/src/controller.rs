//! Progression controller: the shared state machine of every mini-game.
//!
//! `Setup -> Active -> {Won | Lost}`, with `Active` looping once per round.
//! [`Controller::reduce`] maps `(snapshot, action)` to a new snapshot plus
//! effects for the host to run (timers, completion report, navigation).

use crate::ledger::{Ledger, LedgerError};
use crate::rules::{
    GameRules, MessageToken, Rejection, Round, ScoreContext, SessionView, Tone, TransientMessage,
};
use crate::{Score, Status};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors building a controller from rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("game {0} has no rounds")]
    NoRounds(String),
    #[error("initial ledger is invalid: {0}")]
    Ledger(#[from] LedgerError),
}

/// Controller state. Replaced wholesale on every transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub round_index: usize,
    pub status: Status,
    pub ledger: Ledger,
    pub message: Option<TransientMessage>,
    /// Current round's predicate has been met.
    pub round_cleared: bool,
    pub rounds_cleared: usize,
    pub final_score: Option<Score>,
    pub completion_reported: bool,
    pub lost_reason: Option<String>,
    message_seq: u64,
}

impl Snapshot {
    fn fresh(ledger: Ledger) -> Self {
        Self {
            round_index: 0,
            status: Status::Setup,
            ledger,
            message: None,
            round_cleared: false,
            rounds_cleared: 0,
            final_score: None,
            completion_reported: false,
            lost_reason: None,
            message_seq: 0,
        }
    }

    fn post(&mut self, text: String, tone: Tone, ttl: Duration, effects: &mut Vec<Effect>) {
        self.message_seq += 1;
        let token = MessageToken(self.message_seq);
        self.message = Some(TransientMessage { text, tone, token });
        effects.push(Effect::Schedule {
            after: ttl,
            task: TimerTask::ClearMessage(token),
        });
    }
}

/// Deferred work a timer turns back into an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerTask {
    ClearMessage(MessageToken),
    /// Leave the round with this index; stale once the round has changed.
    Advance(usize),
    ReportCompletion,
}

/// Everything that can happen to a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action<I> {
    /// Leave `Setup` (intro dismissed).
    Start,
    /// Game-specific player input.
    Input(I),
    /// Move past the current round.
    Advance,
    /// End the session as lost.
    Fail(String),
    /// Back to the initial snapshot, from any state.
    Reset,
    /// Leave the game view.
    Exit,
    /// A scheduled timer fired.
    Timer(TimerTask),
}

/// Side effects the host must perform after a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Schedule { after: Duration, task: TimerTask },
    CancelTimers,
    ReportCompletion(Score),
    Navigate(String),
}

/// Output of [`Controller::reduce`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub snapshot: Snapshot,
    pub effects: Vec<Effect>,
    pub outcome: Result<(), Rejection>,
}

impl Transition {
    fn unchanged(snap: &Snapshot) -> Self {
        Self {
            snapshot: snap.clone(),
            effects: Vec::new(),
            outcome: Ok(()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Shared progression controller configured by a [`GameRules`] impl.
#[derive(Debug)]
pub struct Controller<G: GameRules> {
    rules: G,
    initial: Snapshot,
}

impl<G: GameRules> Controller<G> {
    pub fn new(rules: G) -> Result<Self, SetupError> {
        let first = rules
            .rounds()
            .first()
            .ok_or_else(|| SetupError::NoRounds(rules.name().to_string()))?;
        let ledger = rules.enter_round(first, &rules.initial_ledger()?)?;
        let initial = Snapshot::fresh(ledger);
        Ok(Self { rules, initial })
    }

    pub fn rules(&self) -> &G {
        &self.rules
    }

    /// Snapshot a session starts from and returns to on reset.
    pub fn initial(&self) -> &Snapshot {
        &self.initial
    }

    pub fn total_rounds(&self) -> usize {
        self.rules.rounds().len()
    }

    pub fn current_round(&self, snap: &Snapshot) -> Option<&G::Round> {
        self.rules.rounds().get(snap.round_index)
    }

    /// Pure transition function.
    pub fn reduce(&self, snap: &Snapshot, action: Action<G::Input>) -> Transition {
        match action {
            Action::Reset => {
                info!(game = self.rules.name(), "session reset");
                Transition {
                    snapshot: self.initial.clone(),
                    effects: vec![Effect::CancelTimers],
                    outcome: Ok(()),
                }
            }
            Action::Exit => Transition {
                snapshot: snap.clone(),
                effects: vec![
                    Effect::CancelTimers,
                    Effect::Navigate(self.rules.exit_route().to_string()),
                ],
                outcome: Ok(()),
            },
            Action::Timer(task) => self.on_timer(snap, task),
            _ if snap.status.is_terminal() => self.reject(snap, Rejection::SessionOver),
            Action::Start => {
                let mut next = snap.clone();
                if next.status == Status::Setup {
                    next.status = Status::Active;
                    info!(game = self.rules.name(), "session started");
                }
                Transition {
                    snapshot: next,
                    effects: Vec::new(),
                    outcome: Ok(()),
                }
            }
            Action::Fail(reason) => {
                let mut next = snap.clone();
                self.lose(&mut next, reason);
                Transition {
                    snapshot: next,
                    effects: Vec::new(),
                    outcome: Ok(()),
                }
            }
            Action::Advance => match self.advance(snap) {
                Ok(t) => t,
                Err(r) => self.reject(snap, r),
            },
            Action::Input(input) => self.input(snap, &input),
        }
    }

    fn reject(&self, snap: &Snapshot, rejection: Rejection) -> Transition {
        debug!(game = self.rules.name(), %rejection, "action rejected");
        let mut next = snap.clone();
        let mut effects = Vec::new();
        next.post(
            rejection.to_string(),
            Tone::Warning,
            self.rules.timing().rejection_ttl,
            &mut effects,
        );
        Transition {
            snapshot: next,
            effects,
            outcome: Err(rejection),
        }
    }

    fn lose(&self, next: &mut Snapshot, reason: String) {
        info!(game = self.rules.name(), %reason, "session lost");
        next.status = Status::Lost;
        next.lost_reason = Some(reason);
    }

    fn input(&self, snap: &Snapshot, input: &G::Input) -> Transition {
        let Some(round) = self.current_round(snap) else {
            return self.reject(snap, Rejection::SessionOver);
        };
        if snap.round_cleared {
            return self.reject(snap, Rejection::RoundCleared);
        }
        let view = SessionView {
            status: snap.status,
            round_index: snap.round_index,
            round,
            ledger: &snap.ledger,
            total_rounds: self.total_rounds(),
        };
        let accepted = match self.rules.validate(&view, input) {
            Ok(a) => a,
            Err(r) => return self.reject(snap, r),
        };
        let ledger = match snap.ledger.applied(&accepted.delta) {
            Ok(l) => l,
            Err(e) => return self.reject(snap, e.into()),
        };
        debug!(game = self.rules.name(), ?input, "input accepted");

        let mut next = snap.clone();
        let mut effects = Vec::new();
        next.ledger = ledger;
        if next.status == Status::Setup {
            next.status = Status::Active;
        }
        if let Some(m) = accepted.message {
            next.post(m.text, m.tone, m.ttl, &mut effects);
        }
        if let Some(reason) = accepted.fail {
            self.lose(&mut next, reason);
        } else if self.rules.round_complete(round, &next.ledger) {
            next.round_cleared = true;
            next.rounds_cleared += 1;
            info!(
                game = self.rules.name(),
                round = %round.id(),
                "round cleared"
            );
            if let Some(after) = self.rules.timing().advance_delay {
                effects.push(Effect::Schedule {
                    after,
                    task: TimerTask::Advance(snap.round_index),
                });
            }
        }
        Transition {
            snapshot: next,
            effects,
            outcome: Ok(()),
        }
    }

    fn advance(&self, snap: &Snapshot) -> Result<Transition, Rejection> {
        if snap.status.is_terminal() {
            return Err(Rejection::SessionOver);
        }
        let round = self.current_round(snap).ok_or(Rejection::SessionOver)?;
        if !self.rules.round_complete(round, &snap.ledger) {
            return Err(Rejection::RoundIncomplete);
        }
        let mut next = snap.clone();
        let mut effects = Vec::new();
        if !next.round_cleared {
            next.rounds_cleared += 1;
        }
        if next.status == Status::Setup {
            next.status = Status::Active;
        }
        let next_index = snap.round_index + 1;
        match self.rules.rounds().get(next_index) {
            Some(upcoming) => {
                next.ledger = self.rules.enter_round(upcoming, &snap.ledger)?;
                next.round_index = next_index;
                next.round_cleared = false;
                debug!(game = self.rules.name(), round = %upcoming.id(), "advanced");
            }
            None => {
                next.round_cleared = true;
                self.win(&mut next, &mut effects);
            }
        }
        Ok(Transition {
            snapshot: next,
            effects,
            outcome: Ok(()),
        })
    }

    fn win(&self, next: &mut Snapshot, effects: &mut Vec<Effect>) {
        let ctx = ScoreContext {
            ledger: &next.ledger,
            rounds_cleared: next.rounds_cleared,
            total_rounds: self.total_rounds(),
        };
        let score = Score::clamped(self.rules.score(&ctx));
        next.status = Status::Won;
        next.final_score = Some(score);
        info!(game = self.rules.name(), %score, "session won");
        let delay = self.rules.timing().completion_delay;
        if delay.is_zero() {
            next.completion_reported = true;
            effects.push(Effect::ReportCompletion(score));
        } else {
            effects.push(Effect::Schedule {
                after: delay,
                task: TimerTask::ReportCompletion,
            });
        }
    }

    fn on_timer(&self, snap: &Snapshot, task: TimerTask) -> Transition {
        match task {
            TimerTask::ClearMessage(token) => {
                let mut next = snap.clone();
                match &snap.message {
                    Some(m) if m.token == token => next.message = None,
                    _ => debug!(?token, "stale message clear ignored"),
                }
                Transition {
                    snapshot: next,
                    effects: Vec::new(),
                    outcome: Ok(()),
                }
            }
            TimerTask::Advance(index) if index != snap.round_index => {
                debug!(index, current = snap.round_index, "stale advance ignored");
                Transition::unchanged(snap)
            }
            TimerTask::Advance(_) => match self.advance(snap) {
                Ok(t) => t,
                Err(r) => {
                    warn!(game = self.rules.name(), %r, "scheduled advance dropped");
                    Transition {
                        outcome: Err(r),
                        ..Transition::unchanged(snap)
                    }
                }
            },
            TimerTask::ReportCompletion => match snap.final_score {
                Some(score) if snap.status == Status::Won && !snap.completion_reported => {
                    let mut next = snap.clone();
                    next.completion_reported = true;
                    Transition {
                        snapshot: next,
                        effects: vec![Effect::ReportCompletion(score)],
                        outcome: Ok(()),
                    }
                }
                _ => {
                    warn!(game = self.rules.name(), "completion report already sent");
                    Transition::unchanged(snap)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Constraint, Delta};
    use crate::rules::{Accepted, Timing};
    use crate::RoundId;
    use rust_decimal::Decimal;

    #[derive(Debug)]
    struct Target {
        id: RoundId,
        goal: i64,
    }

    impl Round for Target {
        fn id(&self) -> &RoundId {
            &self.id
        }
        fn title(&self) -> &str {
            "target"
        }
    }

    #[derive(Clone, Debug)]
    enum Tap {
        Add(i64),
        Bust,
    }

    #[derive(Debug)]
    struct Counter {
        rounds: Vec<Target>,
        timing: Timing,
    }

    fn counter(goals: &[i64], timing: Timing) -> Controller<Counter> {
        let rounds = goals
            .iter()
            .enumerate()
            .map(|(i, g)| Target {
                id: RoundId(format!("r{i}")),
                goal: *g,
            })
            .collect();
        Controller::new(Counter { rounds, timing }).unwrap()
    }

    impl GameRules for Counter {
        type Round = Target;
        type Input = Tap;

        fn name(&self) -> &str {
            "counter"
        }
        fn rounds(&self) -> &[Target] {
            &self.rounds
        }
        fn initial_ledger(&self) -> Result<Ledger, LedgerError> {
            Ledger::new()
                .with("count", Decimal::ZERO, Constraint::NonNegative)?
                .with("taps", Decimal::ZERO, Constraint::NonNegative)
        }
        fn enter_round(&self, _round: &Target, ledger: &Ledger) -> Result<Ledger, LedgerError> {
            ledger.applied(&Delta::new().assign("count", Decimal::ZERO))
        }
        fn validate(
            &self,
            _view: &SessionView<'_, Target>,
            input: &Tap,
        ) -> Result<Accepted, Rejection> {
            match input {
                Tap::Add(n) if *n > 0 => Ok(Accepted::with_delta(
                    Delta::new()
                        .adjust("count", Decimal::from(*n))
                        .adjust("taps", Decimal::ONE),
                )),
                Tap::Add(_) => Err(Rejection::InvalidTarget("must add".into())),
                Tap::Bust => Ok(Accepted::default().failing("bust")),
            }
        }
        fn round_complete(&self, round: &Target, ledger: &Ledger) -> bool {
            ledger.value("count") >= Decimal::from(round.goal)
        }
        fn score(&self, ctx: &ScoreContext<'_>) -> Decimal {
            ctx.ledger.value("taps") * Decimal::from(40)
        }
        fn timing(&self) -> Timing {
            self.timing
        }
        fn exit_route(&self) -> &str {
            "/home"
        }
    }

    fn run(c: &Controller<Counter>, snap: &Snapshot, a: Action<Tap>) -> Transition {
        c.reduce(snap, a)
    }

    #[test]
    fn advance_rejected_until_predicate_holds() {
        let c = counter(&[2, 1], Timing::default());
        let s0 = c.initial().clone();
        let t = run(&c, &s0, Action::Advance);
        assert_eq!(t.outcome, Err(Rejection::RoundIncomplete));
        assert_eq!(t.snapshot.round_index, 0);
        assert_eq!(t.snapshot.ledger, s0.ledger);
        assert!(t.snapshot.message.is_some());
    }

    #[test]
    fn input_activates_and_clears_round() {
        let c = counter(&[2, 1], Timing::default());
        let t = run(&c, c.initial(), Action::Input(Tap::Add(2)));
        assert!(t.is_accepted());
        assert_eq!(t.snapshot.status, Status::Active);
        assert!(t.snapshot.round_cleared);
        // Manual advance game: no timer scheduled.
        assert!(t.effects.is_empty());
        let t = run(&c, &t.snapshot, Action::Input(Tap::Add(1)));
        assert_eq!(t.outcome, Err(Rejection::RoundCleared));
    }

    #[test]
    fn last_round_wins_and_reports_once() {
        let c = counter(&[1, 1], Timing::default());
        let mut s = c.initial().clone();
        for a in [
            Action::Input(Tap::Add(1)),
            Action::Advance,
            Action::Input(Tap::Add(1)),
        ] {
            s = run(&c, &s, a).snapshot;
        }
        assert_eq!(s.round_index, 1);
        let t = run(&c, &s, Action::Advance);
        assert_eq!(t.snapshot.status, Status::Won);
        let reports: Vec<_> = t
            .effects
            .iter()
            .filter(|e| matches!(e, Effect::ReportCompletion(_)))
            .collect();
        assert_eq!(reports.len(), 1);
        assert_eq!(t.snapshot.final_score, Some(Score::clamped(Decimal::from(80))));
        assert!(t.snapshot.completion_reported);

        // Terminal: everything but reset/exit/timers is refused.
        let again = run(&c, &t.snapshot, Action::Advance);
        assert_eq!(again.outcome, Err(Rejection::SessionOver));
        assert_eq!(again.snapshot.status, Status::Won);
        let late = run(&c, &t.snapshot, Action::Timer(TimerTask::ReportCompletion));
        assert!(late.effects.is_empty());
    }

    #[test]
    fn delayed_advance_and_completion() {
        let timing = Timing {
            rejection_ttl: Duration::from_millis(2000),
            advance_delay: Some(Duration::from_millis(1500)),
            completion_delay: Duration::from_millis(1000),
        };
        let c = counter(&[1], timing);
        let t = run(&c, c.initial(), Action::Input(Tap::Add(5)));
        assert_eq!(
            t.effects,
            vec![Effect::Schedule {
                after: Duration::from_millis(1500),
                task: TimerTask::Advance(0)
            }]
        );
        let t = run(&c, &t.snapshot, Action::Timer(TimerTask::Advance(0)));
        assert_eq!(t.snapshot.status, Status::Won);
        assert!(!t.snapshot.completion_reported);
        assert_eq!(
            t.effects,
            vec![Effect::Schedule {
                after: Duration::from_millis(1000),
                task: TimerTask::ReportCompletion
            }]
        );
        let t = run(&c, &t.snapshot, Action::Timer(TimerTask::ReportCompletion));
        assert!(matches!(t.effects.as_slice(), [Effect::ReportCompletion(_)]));
        let t = run(&c, &t.snapshot, Action::Timer(TimerTask::ReportCompletion));
        assert!(t.effects.is_empty());
    }

    #[test]
    fn early_advance_leaves_old_timer_stale() {
        let timing = Timing {
            advance_delay: Some(Duration::from_millis(1500)),
            ..Timing::default()
        };
        let c = counter(&[1, 1, 1], timing);
        let t = run(&c, c.initial(), Action::Input(Tap::Add(1)));
        assert!(t.effects.contains(&Effect::Schedule {
            after: Duration::from_millis(1500),
            task: TimerTask::Advance(0)
        }));
        let s = run(&c, &t.snapshot, Action::Advance).snapshot;
        let t = run(&c, &s, Action::Input(Tap::Add(1)));
        assert!(t.effects.contains(&Effect::Schedule {
            after: Duration::from_millis(1500),
            task: TimerTask::Advance(1)
        }));

        // The first round's timer fires late: round 1 stays put.
        let stale = run(&c, &t.snapshot, Action::Timer(TimerTask::Advance(0)));
        assert!(stale.is_accepted());
        assert_eq!(stale.snapshot, t.snapshot);
        assert_eq!(stale.snapshot.round_index, 1);

        let due = run(&c, &stale.snapshot, Action::Timer(TimerTask::Advance(1)));
        assert_eq!(due.snapshot.round_index, 2);
        assert!(!due.snapshot.round_cleared);
    }

    #[test]
    fn score_is_clamped() {
        let c = counter(&[1], Timing::default());
        let mut s = c.initial().clone();
        for _ in 0..3 {
            // Round 0 clears on the first tap; later taps are refused.
            s = run(&c, &s, Action::Input(Tap::Add(1))).snapshot;
        }
        let t = run(&c, &s, Action::Advance);
        assert_eq!(t.snapshot.final_score, Some(Score::clamped(Decimal::from(40))));
        let c = counter(&[10], Timing::default());
        let mut s = c.initial().clone();
        for _ in 0..10 {
            s = run(&c, &s, Action::Input(Tap::Add(1))).snapshot;
        }
        let t = run(&c, &s, Action::Advance);
        assert_eq!(t.snapshot.final_score.unwrap().value(), Decimal::from(100));
    }

    #[test]
    fn failing_input_is_terminal() {
        let c = counter(&[3], Timing::default());
        let t = run(&c, c.initial(), Action::Input(Tap::Bust));
        assert_eq!(t.snapshot.status, Status::Lost);
        assert_eq!(t.snapshot.lost_reason.as_deref(), Some("bust"));
        let t2 = run(&c, &t.snapshot, Action::Input(Tap::Add(3)));
        assert_eq!(t2.outcome, Err(Rejection::SessionOver));
        assert_eq!(t2.snapshot.ledger, t.snapshot.ledger);
    }

    #[test]
    fn fail_and_reset_restore_initial() {
        let c = counter(&[3, 3], Timing::default());
        let s = run(&c, c.initial(), Action::Input(Tap::Add(1))).snapshot;
        let lost = run(&c, &s, Action::Fail("gave up".into()));
        assert_eq!(lost.snapshot.status, Status::Lost);
        let t = run(&c, &lost.snapshot, Action::Reset);
        assert_eq!(&t.snapshot, c.initial());
        assert_eq!(t.effects, vec![Effect::CancelTimers]);
    }

    #[test]
    fn rejection_posts_message_without_mutation() {
        let c = counter(&[3], Timing::default());
        let s0 = c.initial();
        let t = run(&c, s0, Action::Input(Tap::Add(0)));
        assert!(matches!(t.outcome, Err(Rejection::InvalidTarget(_))));
        assert_eq!(t.snapshot.ledger, s0.ledger);
        assert_eq!(t.snapshot.status, Status::Setup);
        assert_eq!(t.snapshot.message.as_ref().map(|m| m.text.as_str()), Some("must add"));
    }

    #[test]
    fn stale_clear_keeps_newer_message() {
        let c = counter(&[3], Timing::default());
        let first = run(&c, c.initial(), Action::Input(Tap::Add(0)));
        let stale = first.snapshot.message.as_ref().unwrap().token;
        let second = run(&c, &first.snapshot, Action::Input(Tap::Add(-1)));
        let t = run(&c, &second.snapshot, Action::Timer(TimerTask::ClearMessage(stale)));
        assert!(t.snapshot.message.is_some());
        let fresh = second.snapshot.message.as_ref().unwrap().token;
        let t = run(&c, &t.snapshot, Action::Timer(TimerTask::ClearMessage(fresh)));
        assert!(t.snapshot.message.is_none());
    }

    #[test]
    fn exit_navigates_to_fixed_route() {
        let c = counter(&[3], Timing::default());
        let t = run(&c, c.initial(), Action::Exit);
        assert_eq!(
            t.effects,
            vec![Effect::CancelTimers, Effect::Navigate("/home".into())]
        );
    }

    #[test]
    fn empty_rules_are_refused() {
        let err = Controller::new(Counter {
            rounds: vec![],
            timing: Timing::default(),
        })
        .unwrap_err();
        assert_eq!(err, SetupError::NoRounds("counter".into()));
    }
}
