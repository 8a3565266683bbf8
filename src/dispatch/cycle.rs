//! Per-slot orchestration: base strategy, then grid-limit enforcement.

use tracing::{debug, warn};

use crate::config::SiteConfig;
use crate::series::Slot;
use crate::store::LoadStateStore;

use super::grid_limit::GridLimitEnforcer;
use super::strategy::{DispatchStrategy, SlotContext, Strategy};
use super::types::ControlDecision;

/// Decides one slot at a time for a single run.
///
/// Owns the site configuration and the selected strategy. A decision depends
/// only on the slot index, the series and the store, so one cycle can be
/// reused across runs. Performs no I/O; the caller records the load outcome
/// in its [`LoadStateStore`] after each call.
#[derive(Debug, Clone)]
pub struct ControlCycle {
    config: SiteConfig,
    strategy: Strategy,
}

impl ControlCycle {
    pub fn new(config: SiteConfig) -> Self {
        let strategy = Strategy::from_config(&config);
        Self { config, strategy }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Control decision for `series[slot_index]`.
    ///
    /// Entries after `slot_index` serve as lookahead; a short tail only
    /// shortens the horizon. An index past the end yields an idle decision.
    pub fn decide<S: LoadStateStore + ?Sized>(
        &self,
        slot_index: usize,
        series: &[Slot],
        store: &S,
    ) -> ControlDecision {
        let Some(ctx) = SlotContext::new(&self.config, series, slot_index) else {
            warn!(slot_index, len = series.len(), "slot index outside the series");
            return ControlDecision::idle(slot_index, "slot index outside the series");
        };
        let base = self.strategy.base_decision(&ctx, store);
        let decision = GridLimitEnforcer::new(&ctx).enforce(base);
        debug!(
            slot = slot_index,
            strategy = self.strategy.name(),
            battery_kw = decision.battery_kw,
            load_on = decision.load_on,
            pv_setpoint_kw = decision.pv_setpoint_kw,
            grid_kw = decision.grid_kw,
            "decision"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::dispatch::ShavingMode;
    use crate::store::LoadHistory;
    use chrono::{NaiveDateTime, TimeDelta};

    fn series(n: usize) -> Vec<Slot> {
        (0..n)
            .map(|i| {
                Slot::new(NaiveDateTime::default() + TimeDelta::minutes(15 * i as i64))
                    .with_prices(60.0 + i as f32, 30.0)
                    .with_consumption(2.0)
                    .with_pv(1.0)
                    .with_soc(50.0)
            })
            .collect()
    }

    #[test]
    fn index_past_end_is_idle() {
        let cycle = ControlCycle::new(SiteConfig::residential());
        let store = LoadHistory::new(TimeDelta::minutes(15));
        let d = cycle.decide(3, &series(3), &store);
        assert_eq!(d.battery_kw, 0.0);
        assert!(d.battery_reason.mentions("outside"));
    }

    #[test]
    fn repeated_calls_agree() {
        let cycle = ControlCycle::new(SiteConfig::residential());
        let store = LoadHistory::new(TimeDelta::minutes(15));
        let s = series(8);
        let a = cycle.decide(0, &s, &store);
        let b = cycle.decide(0, &s, &store);
        assert_eq!(a, b);
    }

    #[test]
    fn current_slot_only_series_decides() {
        let cycle = ControlCycle::new(SiteConfig::residential());
        let store = LoadHistory::new(TimeDelta::minutes(15));
        let d = cycle.decide(0, &series(1), &store);
        assert!(d.within_limits());
    }

    #[test]
    fn redeciding_after_a_later_slot_agrees() {
        let mut cfg = SiteConfig::residential();
        cfg.simulation.strategy = StrategyKind::PeakShaving;
        cfg.load = None;
        let s: Vec<Slot> = series(2)
            .into_iter()
            .zip([7.0, 9.0])
            .map(|(slot, c)| slot.with_consumption(c).with_pv(0.0))
            .collect();
        let cycle = ControlCycle::new(cfg);
        let store = LoadHistory::new(TimeDelta::minutes(15));

        let first = cycle.decide(0, &s, &store);
        let later = cycle.decide(1, &s, &store);
        let again = cycle.decide(0, &s, &store);
        assert_eq!(first, again);
        assert_eq!(first.shaving_mode, ShavingMode::Idle);
        assert_eq!(first.battery_kw, 0.0);
        assert_eq!(later.shaving_mode, ShavingMode::Discharging);
    }
}
