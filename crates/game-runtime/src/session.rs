//! A mounted game: controller, latest snapshot, timers and host collaborators.

use crate::scheduler::Scheduler;
use game_core::{Action, Controller, Effect, GameRules, Rejection, Score, SetupError, Snapshot, TimerTask};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("session has been torn down")]
    TornDown,
    #[error(transparent)]
    Setup(#[from] SetupError),
}

/// Result of dispatching one action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Rejected(Rejection),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted)
    }
}

/// Leaves the game view. Receives the game's fixed exit route.
pub trait Navigator {
    fn navigate(&mut self, route: &str);
}

impl<F: FnMut(&str)> Navigator for F {
    fn navigate(&mut self, route: &str) {
        self(route)
    }
}

/// Hands the final score to the host page, at most once.
pub struct CompletionReporter {
    callback: Option<Box<dyn FnOnce(Score)>>,
}

impl CompletionReporter {
    pub fn new(callback: impl FnOnce(Score) + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Returns true if this call delivered the score.
    pub fn report(&mut self, score: Score) -> bool {
        match self.callback.take() {
            Some(cb) => {
                info!(%score, "reporting completion");
                cb(score);
                true
            }
            None => {
                warn!(%score, "completion already reported");
                false
            }
        }
    }

    pub fn is_spent(&self) -> bool {
        self.callback.is_none()
    }

    fn disarm(&mut self) {
        self.callback = None;
    }
}

impl fmt::Debug for CompletionReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionReporter")
            .field("spent", &self.is_spent())
            .finish()
    }
}

/// One live game session. Dropping it tears it down.
///
/// The host hears about at most one win per mount; a win after `Reset`
/// keeps its score on the snapshot with `completion_reported` left false.
pub struct Session<G: GameRules> {
    controller: Controller<G>,
    snapshot: Snapshot,
    scheduler: Scheduler<TimerTask>,
    reporter: CompletionReporter,
    navigator: Option<Box<dyn Navigator>>,
    torn_down: bool,
}

impl<G: GameRules> Session<G> {
    /// Mount a session; `on_complete` receives the score when the game is won.
    pub fn new(rules: G, on_complete: impl FnOnce(Score) + 'static) -> Result<Self, RuntimeError> {
        let controller = Controller::new(rules)?;
        let snapshot = controller.initial().clone();
        info!(game = controller.rules().name(), rounds = controller.total_rounds(), "session mounted");
        Ok(Self {
            controller,
            snapshot,
            scheduler: Scheduler::new(),
            reporter: CompletionReporter::new(on_complete),
            navigator: None,
            torn_down: false,
        })
    }

    pub fn with_navigator(mut self, navigator: impl Navigator + 'static) -> Self {
        self.navigator = Some(Box::new(navigator));
        self
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn controller(&self) -> &Controller<G> {
        &self.controller
    }

    pub fn rules(&self) -> &G {
        self.controller.rules()
    }

    pub fn current_round(&self) -> Option<&G::Round> {
        self.controller.current_round(&self.snapshot)
    }

    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn dispatch(&mut self, action: Action<G::Input>) -> Result<Outcome, RuntimeError> {
        if self.torn_down {
            return Err(RuntimeError::TornDown);
        }
        let transition = self.controller.reduce(&self.snapshot, action);
        self.snapshot = transition.snapshot;
        for effect in transition.effects {
            self.run_effect(effect);
        }
        Ok(match transition.outcome {
            Ok(()) => Outcome::Accepted,
            Err(r) => Outcome::Rejected(r),
        })
    }

    pub fn input(&mut self, input: G::Input) -> Result<Outcome, RuntimeError> {
        self.dispatch(Action::Input(input))
    }

    /// Move the clock forward by `by`, firing every timer that falls due.
    /// Returns how many timers fired.
    pub fn advance_time(&mut self, by: Duration) -> Result<usize, RuntimeError> {
        if self.torn_down {
            return Err(RuntimeError::TornDown);
        }
        let until = self.scheduler.now() + by;
        let mut fired = 0;
        while let Some((id, task)) = self.scheduler.pop_due(until) {
            debug!(?id, ?task, at = ?self.scheduler.now(), "timer fired");
            self.dispatch(Action::Timer(task))?;
            fired += 1;
            if self.torn_down {
                return Ok(fired);
            }
        }
        self.scheduler.advance_to(until);
        Ok(fired)
    }

    /// Fire timers until none are pending.
    pub fn run_until_idle(&mut self) -> Result<usize, RuntimeError> {
        let mut fired = 0;
        while let Some(deadline) = self.scheduler.next_deadline() {
            let by = deadline.saturating_sub(self.scheduler.now());
            fired += self.advance_time(by)?;
        }
        Ok(fired)
    }

    /// Unmount: cancel timers and drop the completion callback. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        let dropped = self.scheduler.cancel_all();
        self.reporter.disarm();
        self.torn_down = true;
        info!(game = self.controller.rules().name(), dropped, "session torn down");
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Schedule { after, task } => {
                self.scheduler.schedule(after, task);
            }
            Effect::CancelTimers => {
                let n = self.scheduler.cancel_all();
                debug!(cancelled = n, "timers cancelled");
            }
            Effect::ReportCompletion(score) => {
                // One report per mounted session, resets included.
                if !self.reporter.report(score) {
                    self.snapshot.completion_reported = false;
                }
            }
            Effect::Navigate(route) => {
                match self.navigator.as_mut() {
                    Some(nav) => nav.navigate(&route),
                    None => warn!(%route, "no navigator attached"),
                }
                self.teardown();
            }
        }
    }
}

impl<G: GameRules> Drop for Session<G> {
    fn drop(&mut self) {
        self.teardown();
    }
}
