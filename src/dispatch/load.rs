//! Runtime-constrained scheduling of the controllable load.

use chrono::{TimeDelta, Timelike};
use tracing::debug;

use crate::config::SiteConfig;
use crate::store::LoadStateStore;

use super::types::LoadOutcome;
use super::window::ForecastWindow;

/// Decides whether the controllable load runs in the current slot.
///
/// Priority: negative price, then the minimum-activation hold, then the
/// daily runtime schedule (PV-surplus slots first, cheapest slots after).
#[derive(Debug, Clone, Copy)]
pub struct LoadSchedulingPolicy<'a> {
    config: &'a SiteConfig,
}

impl<'a> LoadSchedulingPolicy<'a> {
    pub fn new(config: &'a SiteConfig) -> Self {
        Self { config }
    }

    /// On/off for the slot at `slot_index`, the first slot of `window`.
    pub fn decide<S: LoadStateStore + ?Sized>(
        &self,
        window: &ForecastWindow<'_>,
        slot_index: usize,
        store: &S,
    ) -> LoadOutcome {
        let Some(load) = &self.config.load else {
            return LoadOutcome::off("no controllable load configured");
        };
        let now = window.current();

        if now.consumption_price < 0.0 {
            return LoadOutcome::on(format!(
                "negative consumption price ({:.2}/MWh)",
                now.consumption_price
            ));
        }

        let min_activation = TimeDelta::minutes(i64::from(load.min_runtime_per_activation_minutes));
        let activation = store.activation_runtime(slot_index);
        if store.previous(slot_index) && activation < min_activation {
            return LoadOutcome::on(format!(
                "holding for minimum activation runtime ({} of {} min)",
                activation.num_minutes(),
                min_activation.num_minutes()
            ));
        }

        let slot_minutes = i64::from(self.config.simulation.slot_minutes);
        if slot_minutes <= 0 {
            return LoadOutcome::off("zero slot length");
        }
        let today = store.today_runtime(slot_index, now.timestamp);
        let remaining_minutes =
            (i64::from(load.min_runtime_daily_minutes) - today.num_minutes()).max(0);
        let needed = usize::try_from((remaining_minutes + slot_minutes - 1) / slot_minutes).unwrap_or(0);
        if needed == 0 {
            return LoadOutcome::off(format!(
                "daily runtime reached ({} min)",
                today.num_minutes()
            ));
        }

        let date = now.timestamp.date();
        // (offset, price, affordable PV surplus)
        let candidates: Vec<(usize, f32, f32)> = window
            .iter()
            .take_while(|(_, slot)| slot.timestamp.date() == date)
            .filter(|(_, slot)| slot.timestamp.hour() <= load.deadline_hour)
            .map(|(offset, slot)| {
                let surplus = window.affordable_pv_kw(offset, slot.consumption_price)
                    - window.consumption_kw(offset);
                (offset, slot.consumption_price, surplus)
            })
            .collect();

        if candidates.first().is_none_or(|&(offset, _, _)| offset != 0) {
            return LoadOutcome::off(format!(
                "past deadline hour {:02}:59 with {needed} slots unmet",
                load.deadline_hour
            ));
        }

        let mut pv_slots: Vec<(usize, f32)> = candidates
            .iter()
            .filter(|&&(_, _, surplus)| surplus >= load.activation_power_kw)
            .map(|&(offset, _, surplus)| (offset, surplus))
            .collect();
        pv_slots.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        pv_slots.truncate(needed);

        let mut cheap_slots: Vec<(usize, f32)> = candidates
            .iter()
            .filter(|&&(offset, _, _)| !pv_slots.iter().any(|&(o, _)| o == offset))
            .map(|&(offset, price, _)| (offset, price))
            .collect();
        cheap_slots.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        cheap_slots.truncate(needed - pv_slots.len());

        debug!(
            needed,
            candidates = candidates.len(),
            pv_selected = pv_slots.len(),
            cheap_selected = cheap_slots.len(),
            "load schedule"
        );

        if let Some(&(_, surplus)) = pv_slots.iter().find(|&&(offset, _)| offset == 0) {
            return LoadOutcome::on(format!(
                "selected for PV surplus ({surplus:.2} kW), {needed} slots needed today"
            ));
        }
        if cheap_slots.iter().any(|&(offset, _)| offset == 0) {
            return LoadOutcome::on(format!(
                "selected for being cheapest ({:.2}/MWh), {needed} slots needed today",
                now.consumption_price
            ));
        }
        LoadOutcome::off(format!(
            "{needed} slots needed today, better slots up to {:02}:59",
            load.deadline_hour
        ))
    }
}
