//! Four-threshold hysteresis on grid power.

use tracing::debug;

use crate::config::PeakShavingConfig;
use crate::store::LoadStateStore;

use super::load::LoadSchedulingPolicy;
use super::strategy::{DispatchStrategy, SlotContext};
use super::trading::TradingOverride;
use super::types::{BatteryOutcome, ControlDecision, ShavingMode};

/// Peak-shaving strategy.
///
/// Holds no state between calls. The mode a slot starts in is replayed from
/// earlier slots of the series with the load state recorded in the store,
/// so deciding any slot again, in any order, gives the same result.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeakShaver;

impl PeakShaver {
    /// Mode after observing pre-battery grid power `grid_kw` in `mode`.
    ///
    /// Leaving an active mode re-checks the start thresholds in the same
    /// step, so applying the transition twice to the same power is a no-op.
    pub fn next_mode(mode: ShavingMode, grid_kw: f32, thresholds: &PeakShavingConfig) -> ShavingMode {
        let import = grid_kw;
        let export = -grid_kw;
        match mode {
            ShavingMode::Discharging if import >= thresholds.stop_discharge_kw => {
                ShavingMode::Discharging
            }
            ShavingMode::Charging if export >= thresholds.stop_charge_kw => ShavingMode::Charging,
            _ if import > thresholds.start_discharge_kw => ShavingMode::Discharging,
            _ if export > thresholds.start_charge_kw => ShavingMode::Charging,
            _ => ShavingMode::Idle,
        }
    }

    /// Whether `grid_kw` leads to the same mode whatever the mode before.
    fn resets_mode(grid_kw: f32, thresholds: &PeakShavingConfig) -> bool {
        let idle = Self::next_mode(ShavingMode::Idle, grid_kw, thresholds);
        idle == Self::next_mode(ShavingMode::Discharging, grid_kw, thresholds)
            && idle == Self::next_mode(ShavingMode::Charging, grid_kw, thresholds)
    }

    /// Mode the slot before `ctx.slot_index` ended in.
    ///
    /// Replays from the latest earlier slot whose mode did not depend on its
    /// predecessor, or from the start of the series in `Idle`. Slots without
    /// a recorded load state count as load off.
    pub fn previous_mode<S: LoadStateStore + ?Sized>(ctx: &SlotContext<'_>, store: &S) -> ShavingMode {
        let thresholds = &ctx.config.peak_shaving;
        let grid_at = |index: usize| ctx.uncontrolled_grid_kw(index, store.get(index).unwrap_or(false));
        let start = (0..ctx.slot_index)
            .rev()
            .find(|&index| Self::resets_mode(grid_at(index), thresholds))
            .unwrap_or(0);
        (start..ctx.slot_index).fold(ShavingMode::Idle, |mode, index| {
            Self::next_mode(mode, grid_at(index), thresholds)
        })
    }

    fn battery_outcome(ctx: &SlotContext<'_>, mode: ShavingMode, grid_kw: f32) -> BatteryOutcome {
        let slot = ctx.slot();
        if let Some(ov) = TradingOverride::from_slot(slot, ctx.config.trading.enabled) {
            let charge = ov.charge_outcome(&ctx.headroom);
            return if charge.is_idle() {
                ov.discharge_outcome(&ctx.headroom, slot.consumption_price)
            } else {
                charge
            };
        }

        let thresholds = &ctx.config.peak_shaving;
        match mode {
            ShavingMode::Discharging if slot.consumption_price < 0.0 => {
                BatteryOutcome::idle("peak shaving: never discharge at negative consumption price")
            }
            ShavingMode::Discharging => {
                let excess = grid_kw - thresholds.stop_discharge_kw;
                let power = excess.min(ctx.headroom.discharge_limit_kw);
                BatteryOutcome::discharge(
                    power,
                    format!(
                        "peak shaving: import {grid_kw:.2} kW, discharging {:.2} kW toward {:.2} kW",
                        power.max(0.0),
                        thresholds.stop_discharge_kw
                    ),
                )
            }
            ShavingMode::Charging => {
                let excess = -grid_kw - thresholds.stop_charge_kw;
                let power = excess.min(ctx.headroom.charge_limit_kw);
                BatteryOutcome::charge(
                    power,
                    format!(
                        "peak shaving: export {:.2} kW, charging {:.2} kW toward {:.2} kW",
                        -grid_kw,
                        power.max(0.0),
                        thresholds.stop_charge_kw
                    ),
                )
            }
            ShavingMode::Idle => {
                BatteryOutcome::idle(format!("peak shaving: grid {grid_kw:.2} kW within thresholds"))
            }
        }
    }
}

impl DispatchStrategy for PeakShaver {
    fn name(&self) -> &'static str {
        "peak_shaving"
    }

    fn base_decision<S: LoadStateStore + ?Sized>(
        &self,
        ctx: &SlotContext<'_>,
        store: &S,
    ) -> ControlDecision {
        let load = LoadSchedulingPolicy::new(ctx.config).decide(&ctx.window, ctx.slot_index, store);
        let load_kw = ctx.load_kw(load.on);
        let grid_kw = ctx.uncontrolled_grid_kw(ctx.slot_index, load.on);

        let previous = Self::previous_mode(ctx, store);
        let mode = Self::next_mode(previous, grid_kw, &ctx.config.peak_shaving);
        if mode != previous {
            debug!(slot = ctx.slot_index, from = %previous, to = %mode, grid_kw, "peak shaving mode change");
        }

        let battery = Self::battery_outcome(ctx, mode, grid_kw);
        let setpoint = ctx.pv().setpoint(&ctx.window, battery.power_kw, load_kw);
        ctx.decision(battery, load, setpoint, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoadConfig, SiteConfig, StrategyKind};
    use crate::series::Slot;
    use crate::store::LoadHistory;
    use chrono::{NaiveDateTime, TimeDelta};

    fn thresholds() -> PeakShavingConfig {
        PeakShavingConfig {
            start_discharge_kw: 8.0,
            stop_discharge_kw: 6.0,
            start_charge_kw: 4.0,
            stop_charge_kw: 2.0,
        }
    }

    #[test]
    fn hysteresis_transitions() {
        let t = thresholds();
        assert_eq!(PeakShaver::next_mode(ShavingMode::Idle, 7.0, &t), ShavingMode::Idle);
        assert_eq!(PeakShaver::next_mode(ShavingMode::Idle, 9.0, &t), ShavingMode::Discharging);
        assert_eq!(
            PeakShaver::next_mode(ShavingMode::Discharging, 7.0, &t),
            ShavingMode::Discharging
        );
        assert_eq!(PeakShaver::next_mode(ShavingMode::Discharging, 5.0, &t), ShavingMode::Idle);
        assert_eq!(PeakShaver::next_mode(ShavingMode::Idle, -5.0, &t), ShavingMode::Charging);
        assert_eq!(PeakShaver::next_mode(ShavingMode::Charging, -3.0, &t), ShavingMode::Charging);
        assert_eq!(PeakShaver::next_mode(ShavingMode::Charging, -1.0, &t), ShavingMode::Idle);
        // swing straight from one side to the other
        assert_eq!(
            PeakShaver::next_mode(ShavingMode::Discharging, -5.0, &t),
            ShavingMode::Charging
        );
    }

    #[test]
    fn transition_is_idempotent() {
        let t = thresholds();
        for mode in [ShavingMode::Idle, ShavingMode::Discharging, ShavingMode::Charging] {
            for grid in [-10.0, -4.5, -3.0, -1.0, 0.0, 5.0, 7.0, 9.0] {
                let once = PeakShaver::next_mode(mode, grid, &t);
                assert_eq!(PeakShaver::next_mode(once, grid, &t), once, "{mode} at {grid}");
            }
        }
    }

    fn config() -> SiteConfig {
        let mut cfg = SiteConfig::residential();
        cfg.simulation.strategy = StrategyKind::PeakShaving;
        cfg.load = None;
        cfg.peak_shaving = thresholds();
        cfg
    }

    fn slots(consumption: &[f32]) -> Vec<Slot> {
        consumption
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Slot::new(NaiveDateTime::default() + TimeDelta::minutes(15 * i as i64))
                    .with_prices(100.0, 50.0)
                    .with_consumption(c)
                    .with_soc(50.0)
            })
            .collect()
    }

    fn decide_with<S: LoadStateStore>(cfg: &SiteConfig, s: &[Slot], i: usize, store: &S) -> ControlDecision {
        SlotContext::new(cfg, s, i)
            .map(|ctx| PeakShaver.base_decision(&ctx, store))
            .unwrap_or_else(|| ControlDecision::idle(i, "no slot"))
    }

    fn decide(cfg: &SiteConfig, s: &[Slot], i: usize) -> ControlDecision {
        decide_with(cfg, s, i, &LoadHistory::new(TimeDelta::minutes(15)))
    }

    #[test]
    fn discharges_down_to_stop_threshold_and_holds() {
        let cfg = config();
        let s = slots(&[9.0, 7.0, 5.0]);

        let d = decide(&cfg, &s, 0);
        assert_eq!(d.shaving_mode, ShavingMode::Discharging);
        assert!((d.battery_kw + 3.0).abs() < 1e-4);

        let d = decide(&cfg, &s, 1);
        assert_eq!(d.shaving_mode, ShavingMode::Discharging);
        assert!((d.battery_kw + 1.0).abs() < 1e-4);

        let d = decide(&cfg, &s, 2);
        assert_eq!(d.shaving_mode, ShavingMode::Idle);
        assert_eq!(d.battery_kw, 0.0);
    }

    #[test]
    fn band_without_earlier_peak_stays_idle() {
        let cfg = config();
        let s = slots(&[5.0, 7.0, 7.0]);
        let d = decide(&cfg, &s, 2);
        assert_eq!(d.shaving_mode, ShavingMode::Idle);
        assert_eq!(d.battery_kw, 0.0);
    }

    #[test]
    fn charges_from_export() {
        let cfg = config();
        let s: Vec<Slot> = slots(&[1.0])
            .into_iter()
            .map(|slot| slot.with_pv(6.0))
            .collect();
        let d = decide(&cfg, &s, 0);
        assert_eq!(d.shaving_mode, ShavingMode::Charging);
        // export 5 kW, stop at 2 kW
        assert!((d.battery_kw - 3.0).abs() < 1e-4);
    }

    #[test]
    fn decisions_do_not_depend_on_call_order() {
        let cfg = config();
        let s = slots(&[7.0, 9.0, 7.0]);
        let first = decide(&cfg, &s, 0);
        let next = decide(&cfg, &s, 1);
        let again = decide(&cfg, &s, 0);
        assert_eq!(first, again);
        assert_eq!(first.shaving_mode, ShavingMode::Idle);
        assert_eq!(next.shaving_mode, ShavingMode::Discharging);

        let late = decide(&cfg, &s, 2);
        let early = decide(&cfg, &s, 0);
        assert_eq!(decide(&cfg, &s, 2), late);
        assert_eq!(early, first);
        assert_eq!(late.shaving_mode, ShavingMode::Discharging);
    }

    #[test]
    fn recorded_load_state_feeds_the_replay() {
        let mut cfg = config();
        cfg.load = Some(LoadConfig::default());
        let mut s = slots(&[6.5, 5.0]);
        // negative price forces the load on, putting slot 1 at 7 kW inside the band
        s[1].consumption_price = -1.0;

        let fresh = LoadHistory::new(TimeDelta::minutes(15));
        assert_eq!(decide_with(&cfg, &s, 1, &fresh).shaving_mode, ShavingMode::Idle);

        // with the load on in slot 0 that slot peaked at 8.5 kW
        let mut store = LoadHistory::new(TimeDelta::minutes(15));
        store.set(0, true);
        let d = decide_with(&cfg, &s, 1, &store);
        assert!(d.load_on);
        assert_eq!(d.shaving_mode, ShavingMode::Discharging);
        assert_eq!(d.battery_kw, 0.0, "no discharge at negative price");
    }
}
