//! Mini Business Tycoon: run a lemonade stall for a fixed number of days.
//!
//! Each day is one round. Buy a batch with all available capital, set a
//! price at or above unit cost, then serve customers; demand falls as the
//! markup rises. The score is total profit against a target.

use crate::{ContentError, TimingConfig};
use game_core::{
    Accepted, Constraint, Delta, GameRules, Ledger, LedgerError, Rejection, Round, RoundId,
    ScoreContext, SessionView, Status, Timing, Tone,
};
use game_econ::{max_affordable_units, profit_margin_pct, profit_score, sell_day, DemandCurve};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const CAPITAL: &str = "capital";
pub const INVENTORY: &str = "inventory";
pub const SELL_PRICE: &str = "sell_price";
pub const DAYS_SOLD: &str = "days_sold";
pub const TOTAL_PROFIT: &str = "total_profit";
pub const DAY_PROFIT: &str = "day_profit";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TycoonMessages {
    pub buy_ms: u64,
    pub price_ms: u64,
    pub sale_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TycoonConfig {
    pub title: String,
    pub starting_capital: Decimal,
    pub unit_cost: Decimal,
    pub days: u32,
    pub profit_target: Decimal,
    /// Prices offered as buttons by the host.
    pub price_options: Vec<Decimal>,
    pub demand: DemandCurve,
    pub messages: TycoonMessages,
    pub timing: TimingConfig,
    pub exit_route: String,
}

impl TycoonConfig {
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.unit_cost <= Decimal::ZERO {
            return Err(ContentError::Invalid("tycoon unit_cost must be > 0".into()));
        }
        if self.starting_capital < Decimal::ZERO {
            return Err(ContentError::Invalid(
                "tycoon starting_capital must be >= 0".into(),
            ));
        }
        if self.days == 0 {
            return Err(ContentError::Invalid("tycoon needs at least one day".into()));
        }
        if self.profit_target <= Decimal::ZERO {
            return Err(ContentError::Invalid(
                "tycoon profit_target must be > 0".into(),
            ));
        }
        if let Some(p) = self.price_options.iter().find(|p| **p < self.unit_cost) {
            return Err(ContentError::Invalid(format!(
                "price option {p} is below unit cost"
            )));
        }
        self.demand.validate()?;
        Ok(())
    }
}

/// One selling day.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayRound {
    id: RoundId,
    title: String,
    pub day: u32,
}

impl Round for DayRound {
    fn id(&self) -> &RoundId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TycoonInput {
    /// Spend capital on as many units as it buys.
    BuyInventory,
    SetPrice(Decimal),
    /// Serve today's customers.
    SellDay,
}

impl FromStr for TycoonInput {
    type Err = ContentError;

    /// `buy`, `price:<amount>` or `sell`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            Some(("price", amount)) => amount
                .trim()
                .parse::<Decimal>()
                .map(TycoonInput::SetPrice)
                .map_err(|e| ContentError::Invalid(format!("bad price {amount}: {e}"))),
            None if s == "buy" => Ok(TycoonInput::BuyInventory),
            None if s == "sell" => Ok(TycoonInput::SellDay),
            _ => Err(ContentError::Invalid(format!("unknown tycoon step: {s}"))),
        }
    }
}

#[derive(Debug)]
pub struct Tycoon {
    cfg: TycoonConfig,
    rounds: Vec<DayRound>,
}

impl Tycoon {
    pub fn new(cfg: TycoonConfig) -> Result<Self, ContentError> {
        cfg.validate()?;
        let rounds = (1..=cfg.days)
            .map(|day| DayRound {
                id: RoundId(format!("day-{day}")),
                title: format!("Day {day}"),
                day,
            })
            .collect();
        Ok(Self { cfg, rounds })
    }

    pub fn config(&self) -> &TycoonConfig {
        &self.cfg
    }

    /// Units the current capital would buy.
    pub fn max_units(&self, ledger: &Ledger) -> u64 {
        max_affordable_units(ledger.value(CAPITAL), self.cfg.unit_cost).unwrap_or(0)
    }

    /// Margin of the current price, if one is set.
    pub fn margin_pct(&self, ledger: &Ledger) -> Option<Decimal> {
        profit_margin_pct(ledger.value(SELL_PRICE), self.cfg.unit_cost)
    }

    fn ttl(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn buy(&self, ledger: &Ledger) -> Result<Accepted, Rejection> {
        if ledger.value(INVENTORY) > Decimal::ZERO {
            return Err(Rejection::PreconditionNotMet(
                "Sell your current inventory first!".into(),
            ));
        }
        let units = max_affordable_units(ledger.value(CAPITAL), self.cfg.unit_cost)
            .map_err(|e| Rejection::InsufficientResource(e.to_string()))?;
        if units == 0 {
            let reason = "Not enough capital to buy inventory!";
            return Ok(Accepted::default()
                .message(reason, Tone::Error, Self::ttl(self.cfg.messages.buy_ms))
                .failing(reason));
        }
        let qty = Decimal::from(units);
        let delta = Delta::new()
            .adjust(CAPITAL, -(qty * self.cfg.unit_cost))
            .assign(INVENTORY, qty);
        Ok(Accepted::with_delta(delta).message(
            format!("Created {units} items! Now set your selling price."),
            Tone::Success,
            Self::ttl(self.cfg.messages.buy_ms),
        ))
    }

    fn set_price(&self, status: Status, price: Decimal) -> Result<Accepted, Rejection> {
        if status == Status::Setup {
            return Err(Rejection::PreconditionNotMet(
                "Buy materials before setting a price!".into(),
            ));
        }
        if price < self.cfg.unit_cost {
            return Err(Rejection::InvalidTarget(
                "Price must be higher than cost!".into(),
            ));
        }
        Ok(
            Accepted::with_delta(Delta::new().assign(SELL_PRICE, price)).message(
                format!("Set price to ₹{price} per item"),
                Tone::Info,
                Self::ttl(self.cfg.messages.price_ms),
            ),
        )
    }

    fn sell(&self, ledger: &Ledger) -> Result<Accepted, Rejection> {
        let price = ledger.value(SELL_PRICE);
        if price.is_zero() {
            return Err(Rejection::PreconditionNotMet(
                "Set a selling price first!".into(),
            ));
        }
        let inventory = ledger.value(INVENTORY).to_u64().unwrap_or(0);
        if inventory == 0 {
            return Err(Rejection::InsufficientResource(
                "Make inventory first!".into(),
            ));
        }
        let sales = sell_day(price, self.cfg.unit_cost, inventory, &self.cfg.demand)
            .map_err(|e| Rejection::InvalidTarget(e.to_string()))?;
        let delta = Delta::new()
            .adjust(INVENTORY, -Decimal::from(sales.units))
            .adjust(CAPITAL, sales.revenue)
            .assign(DAY_PROFIT, sales.profit)
            .adjust(TOTAL_PROFIT, sales.profit)
            .adjust(DAYS_SOLD, Decimal::ONE);
        Ok(Accepted::with_delta(delta).message(
            format!("Sold {} items! Profit: ₹{}", sales.units, sales.profit),
            Tone::Success,
            Self::ttl(self.cfg.messages.sale_ms),
        ))
    }
}

impl GameRules for Tycoon {
    type Round = DayRound;
    type Input = TycoonInput;

    fn name(&self) -> &str {
        "tycoon"
    }

    fn rounds(&self) -> &[DayRound] {
        &self.rounds
    }

    fn initial_ledger(&self) -> Result<Ledger, LedgerError> {
        Ledger::new()
            .with(CAPITAL, self.cfg.starting_capital, Constraint::NonNegative)?
            .with(INVENTORY, Decimal::ZERO, Constraint::NonNegative)?
            .with(SELL_PRICE, Decimal::ZERO, Constraint::NonNegative)?
            .with(DAYS_SOLD, Decimal::ZERO, Constraint::NonNegative)?
            .with(TOTAL_PROFIT, Decimal::ZERO, Constraint::Unbounded)?
            .with(DAY_PROFIT, Decimal::ZERO, Constraint::Unbounded)
    }

    fn validate(
        &self,
        view: &SessionView<'_, DayRound>,
        input: &TycoonInput,
    ) -> Result<Accepted, Rejection> {
        match input {
            TycoonInput::BuyInventory => self.buy(view.ledger),
            TycoonInput::SetPrice(p) => self.set_price(view.status, *p),
            TycoonInput::SellDay => self.sell(view.ledger),
        }
    }

    fn round_complete(&self, round: &DayRound, ledger: &Ledger) -> bool {
        ledger.value(DAYS_SOLD) >= Decimal::from(round.day)
    }

    fn score(&self, ctx: &ScoreContext<'_>) -> Decimal {
        profit_score(ctx.ledger.value(TOTAL_PROFIT), self.cfg.profit_target)
            .unwrap_or(Decimal::ZERO)
    }

    fn timing(&self) -> Timing {
        self.cfg.timing.to_timing()
    }

    fn exit_route(&self) -> &str {
        &self.cfg.exit_route
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Catalog;
    use game_core::{Action, Controller, Effect, Snapshot, TimerTask};

    fn controller() -> Controller<Tycoon> {
        let cfg = Catalog::builtin().unwrap().tycoon;
        Controller::new(Tycoon::new(cfg).unwrap()).unwrap()
    }

    fn step(c: &Controller<Tycoon>, s: &Snapshot, i: TycoonInput) -> Snapshot {
        let t = c.reduce(s, Action::Input(i));
        assert!(t.is_accepted(), "{:?}", t.outcome);
        t.snapshot
    }

    #[test]
    fn buying_spends_capital_on_whole_units() {
        let c = controller();
        let s = step(&c, c.initial(), TycoonInput::BuyInventory);
        assert_eq!(s.status, Status::Active);
        assert_eq!(s.ledger.value(INVENTORY), Decimal::from(33));
        assert_eq!(s.ledger.value(CAPITAL), Decimal::from(10));
        assert_eq!(
            s.message.as_ref().map(|m| m.text.as_str()),
            Some("Created 33 items! Now set your selling price.")
        );
    }

    #[test]
    fn selling_at_fifty_moves_fifteen_units() {
        let c = controller();
        let s = step(&c, c.initial(), TycoonInput::BuyInventory);
        let s = step(&c, &s, TycoonInput::SetPrice(Decimal::from(50)));
        let t = c.reduce(&s, Action::Input(TycoonInput::SellDay));
        let s = t.snapshot;
        assert_eq!(s.ledger.value(INVENTORY), Decimal::from(18));
        assert_eq!(s.ledger.value(DAY_PROFIT), Decimal::from(300));
        assert_eq!(s.ledger.value(TOTAL_PROFIT), Decimal::from(300));
        assert_eq!(s.ledger.value(CAPITAL), Decimal::from(760));
        assert!(s.round_cleared);
        assert!(t.effects.contains(&Effect::Schedule {
            after: Duration::from_millis(1500),
            task: TimerTask::Advance(0)
        }));
    }

    #[test]
    fn buying_with_stock_on_hand_is_rejected() {
        let c = controller();
        let s = step(&c, c.initial(), TycoonInput::BuyInventory);
        let t = c.reduce(&s, Action::Input(TycoonInput::BuyInventory));
        assert!(matches!(t.outcome, Err(Rejection::PreconditionNotMet(_))));
        assert_eq!(t.snapshot.ledger, s.ledger);
        assert_eq!(
            t.snapshot.message.as_ref().map(|m| m.text.as_str()),
            Some("Sell your current inventory first!")
        );
    }

    #[test]
    fn price_below_cost_and_selling_without_price() {
        let c = controller();
        let s = step(&c, c.initial(), TycoonInput::BuyInventory);
        let t = c.reduce(&s, Action::Input(TycoonInput::SetPrice(Decimal::from(20))));
        assert!(matches!(t.outcome, Err(Rejection::InvalidTarget(_))));
        let t = c.reduce(&s, Action::Input(TycoonInput::SellDay));
        assert!(matches!(t.outcome, Err(Rejection::PreconditionNotMet(_))));
        assert_eq!(t.snapshot.ledger, s.ledger);
        let t = c.reduce(c.initial(), Action::Input(TycoonInput::SetPrice(Decimal::from(50))));
        assert!(t.outcome.is_err());
        assert_eq!(t.snapshot.status, Status::Setup);
    }

    #[test]
    fn broke_stall_loses() {
        let mut cfg = Catalog::builtin().unwrap().tycoon;
        cfg.starting_capital = Decimal::from(20);
        let c = Controller::new(Tycoon::new(cfg).unwrap()).unwrap();
        let t = c.reduce(c.initial(), Action::Input(TycoonInput::BuyInventory));
        assert_eq!(t.snapshot.status, Status::Lost);
        assert_eq!(
            t.snapshot.lost_reason.as_deref(),
            Some("Not enough capital to buy inventory!")
        );
        assert_eq!(t.snapshot.ledger.value(CAPITAL), Decimal::from(20));
    }

    #[test]
    fn seven_days_win_with_profit_score() {
        let c = controller();
        let mut s = step(&c, c.initial(), TycoonInput::BuyInventory);
        s = step(&c, &s, TycoonInput::SetPrice(Decimal::from(50)));
        for day in 0..7 {
            if s.ledger.value(INVENTORY).is_zero() {
                s = step(&c, &s, TycoonInput::BuyInventory);
            }
            s = step(&c, &s, TycoonInput::SellDay);
            let t = c.reduce(&s, Action::Timer(TimerTask::Advance(day)));
            s = t.snapshot;
            if day < 6 {
                assert_eq!(s.round_index, day + 1);
            }
        }
        assert_eq!(s.status, Status::Won);
        // Every unit earns 20 at this price, so profit far exceeds the target.
        assert_eq!(s.final_score.map(|x| x.as_f64()), Some(100.0));
    }

    #[test]
    fn score_is_profit_over_target() {
        let c = controller();
        let mut l = c.rules().initial_ledger().unwrap();
        l.apply(&Delta::new().assign(TOTAL_PROFIT, Decimal::from(250)))
            .unwrap();
        let ctx = ScoreContext {
            ledger: &l,
            rounds_cleared: 7,
            total_rounds: 7,
        };
        assert_eq!(c.rules().score(&ctx), Decimal::from(50));
    }

    #[test]
    fn read_model_helpers() {
        let c = controller();
        let s = c.initial();
        assert_eq!(c.rules().max_units(&s.ledger), 33);
        assert_eq!(c.rules().margin_pct(&s.ledger), None);
    }

    #[test]
    fn parses_script_steps() {
        assert_eq!("buy".parse::<TycoonInput>().unwrap(), TycoonInput::BuyInventory);
        assert_eq!(
            "price:80".parse::<TycoonInput>().unwrap(),
            TycoonInput::SetPrice(Decimal::from(80))
        );
        assert!("price:abc".parse::<TycoonInput>().is_err());
    }
}
