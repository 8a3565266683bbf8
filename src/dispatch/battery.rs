//! Battery charge/discharge policy for cost optimization.

use tracing::debug;

use crate::config::{BatteryConfig, SiteConfig};

use super::horizon::NegativePriceHorizon;
use super::trading::TradingOverride;
use super::types::{BatteryOutcome, ENERGY_EPSILON, POWER_EPSILON, PRICE_EPSILON};
use super::window::ForecastWindow;

/// Energy and power the battery can still absorb or deliver this slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryHeadroom {
    /// Energy until max SoC (kWh).
    pub headroom_kwh: f32,
    /// Energy above min SoC (kWh).
    pub usable_kwh: f32,
    /// Charge power limit: rate capped by headroom over one slot (kW).
    pub charge_limit_kw: f32,
    /// Discharge power limit: rate capped by usable energy over one slot (kW).
    pub discharge_limit_kw: f32,
}

impl BatteryHeadroom {
    /// Derives headroom from the battery configuration and current SoC.
    ///
    /// Zero capacity, `min_soc >= max_soc`, or a zero slot length yield an
    /// all-zero headroom.
    pub fn new(battery: &BatteryConfig, soc_pct: f32, dt_hours: f32) -> Self {
        if battery.capacity_kwh <= 0.0
            || battery.max_soc_pct <= battery.min_soc_pct
            || dt_hours <= 0.0
        {
            return Self::empty();
        }
        let energy = battery.capacity_kwh * soc_pct / 100.0;
        let min_energy = battery.capacity_kwh * battery.min_soc_pct / 100.0;
        let max_energy = battery.capacity_kwh * battery.max_soc_pct / 100.0;

        let headroom_kwh = (max_energy - energy).max(0.0);
        let usable_kwh = (energy - min_energy).max(0.0);
        Self {
            headroom_kwh,
            usable_kwh,
            charge_limit_kw: battery.max_charge_kw.max(0.0).min(headroom_kwh / dt_hours),
            discharge_limit_kw: battery.max_discharge_kw.max(0.0).min(usable_kwh / dt_hours),
        }
    }

    /// A battery that can neither charge nor discharge.
    pub fn empty() -> Self {
        Self {
            headroom_kwh: 0.0,
            usable_kwh: 0.0,
            charge_limit_kw: 0.0,
            discharge_limit_kw: 0.0,
        }
    }
}

/// Decides battery power for the current slot.
///
/// Charge evaluation runs first; discharge is only evaluated when charging
/// comes out at zero. Each stage returns at its first matching branch.
#[derive(Debug, Clone, Copy)]
pub struct BatteryDispatchPolicy<'a> {
    config: &'a SiteConfig,
}

impl<'a> BatteryDispatchPolicy<'a> {
    pub fn new(config: &'a SiteConfig) -> Self {
        Self { config }
    }

    /// Charge if warranted, otherwise discharge if warranted, otherwise idle.
    pub fn decide(&self, window: &ForecastWindow<'_>, headroom: &BatteryHeadroom) -> BatteryOutcome {
        let charge = self.evaluate_charge(window, headroom);
        if !charge.is_idle() {
            debug!(power_kw = charge.power_kw, reason = %charge.reason, "battery charge");
            return charge;
        }
        let discharge = self.evaluate_discharge(window, headroom);
        if !discharge.is_idle() {
            debug!(power_kw = discharge.power_kw, reason = %discharge.reason, "battery discharge");
            return discharge;
        }
        BatteryOutcome::idle(format!("{}; {}", charge.reason, discharge.reason))
    }

    /// Charge-side evaluation. Never returns a negative power.
    pub fn evaluate_charge(
        &self,
        window: &ForecastWindow<'_>,
        headroom: &BatteryHeadroom,
    ) -> BatteryOutcome {
        let now = window.current();

        if let Some(ov) = TradingOverride::from_slot(now, self.config.trading.enabled) {
            return ov.charge_outcome(headroom);
        }

        if headroom.charge_limit_kw <= POWER_EPSILON {
            return BatteryOutcome::idle(format!(
                "battery cannot charge (SoC {:.1}% vs max {:.1}%)",
                now.soc_pct, self.config.battery.max_soc_pct
            ));
        }

        if now.consumption_price < 0.0 {
            return self.negative_price_charge(window, headroom);
        }

        if let Some(offset) = self.negative_horizon(headroom).first_negative(window) {
            return BatteryOutcome::idle(format!(
                "keeping room for negative price in {offset} slots"
            ));
        }

        if let Some(outcome) = self.reservation_charge(window, headroom) {
            return outcome;
        }

        let surplus = window.affordable_pv_kw(0, now.consumption_price) - now.consumption_kw;
        if surplus > POWER_EPSILON {
            let power = surplus.min(headroom.charge_limit_kw);
            return BatteryOutcome::charge(
                power,
                format!("charging {power:.2} kW from affordable PV surplus of {surplus:.2} kW"),
            );
        }

        BatteryOutcome::idle("no reason to charge")
    }

    /// Discharge-side evaluation. Never returns a positive power.
    pub fn evaluate_discharge(
        &self,
        window: &ForecastWindow<'_>,
        headroom: &BatteryHeadroom,
    ) -> BatteryOutcome {
        let now = window.current();

        if let Some(ov) = TradingOverride::from_slot(now, self.config.trading.enabled) {
            return ov.discharge_outcome(headroom, now.consumption_price);
        }

        if headroom.discharge_limit_kw <= POWER_EPSILON {
            return BatteryOutcome::idle(format!(
                "battery cannot discharge (SoC {:.1}% vs min {:.1}%)",
                now.soc_pct, self.config.battery.min_soc_pct
            ));
        }

        if now.consumption_price < 0.0 {
            return BatteryOutcome::idle("never discharge at negative consumption price");
        }

        if now.injection_price > 0.0 {
            if let Some(offset) = self.negative_horizon(headroom).first_negative(window) {
                let power = headroom.discharge_limit_kw;
                return BatteryOutcome::discharge(
                    power,
                    format!("emptying battery at {power:.2} kW ahead of negative price in {offset} slots"),
                );
            }
        }

        let deficit = window.net_load_kw(0);
        if deficit <= POWER_EPSILON {
            return BatteryOutcome::idle("PV covers consumption");
        }

        let reserved = self.reserved_for_future_kwh(window, headroom);
        let allowed_kwh = headroom.usable_kwh - reserved;
        if allowed_kwh <= ENERGY_EPSILON {
            return BatteryOutcome::idle(format!(
                "reserving {reserved:.2} kWh for future expensive consumption"
            ));
        }

        let power = deficit
            .min(headroom.discharge_limit_kw)
            .min(allowed_kwh / self.config.slot_hours());
        let mut reason = format!("discharging {power:.2} kW to cover deficit of {deficit:.2} kW");
        if reserved > ENERGY_EPSILON {
            reason.push_str(&format!(", keeping {reserved:.2} kWh for pricier slots"));
        }
        BatteryOutcome::discharge(power, reason)
    }

    fn negative_horizon(&self, headroom: &BatteryHeadroom) -> NegativePriceHorizon {
        NegativePriceHorizon::new(
            headroom.usable_kwh,
            self.config.battery.max_discharge_kw,
            self.config.grid.export_limit_kw,
            self.config.slot_hours(),
        )
    }

    /// Splits battery headroom over the contiguous negative-price run,
    /// cheapest price group first, proportionally to each slot's capacity
    /// within a group.
    fn negative_price_charge(
        &self,
        window: &ForecastWindow<'_>,
        headroom: &BatteryHeadroom,
    ) -> BatteryOutcome {
        let dt = self.config.slot_hours();
        let import_limit = self.config.grid.import_limit_kw;
        let rate = self.config.battery.max_charge_kw;
        let price_now = window.current().consumption_price;

        // (offset, price, slot capacity in kWh)
        let run: Vec<(usize, f32, f32)> = window
            .iter()
            .take_while(|(_, slot)| slot.consumption_price < 0.0)
            .map(|(offset, slot)| {
                let capacity_kwh = rate.min(window.import_headroom_kw(offset, import_limit)) * dt;
                (offset, slot.consumption_price, capacity_kwh)
            })
            .collect();

        if run[0].2 <= ENERGY_EPSILON {
            return BatteryOutcome::idle(format!(
                "negative price ({price_now:.2}/MWh) but no import headroom"
            ));
        }

        let mut order: Vec<usize> = (0..run.len()).collect();
        order.sort_by(|&a, &b| run[a].1.total_cmp(&run[b].1).then(run[a].0.cmp(&run[b].0)));

        let mut remaining = headroom.headroom_kwh;
        let mut now_share = 0.0_f32;
        let mut start = 0;
        while start < order.len() && remaining > ENERGY_EPSILON {
            let group_price = run[order[start]].1;
            let end = order[start..]
                .iter()
                .position(|&i| (run[i].1 - group_price).abs() > PRICE_EPSILON)
                .map_or(order.len(), |p| start + p);
            let group = &order[start..end];
            let group_capacity: f32 = group.iter().map(|&i| run[i].2).sum();
            let granted = remaining.min(group_capacity);
            if group_capacity > 0.0 && group.iter().any(|&i| run[i].0 == 0) {
                now_share = granted * run[0].2 / group_capacity;
            }
            remaining -= granted;
            start = end;
        }

        let power = (now_share / dt).min(headroom.charge_limit_kw);
        if power <= POWER_EPSILON {
            return BatteryOutcome::idle(format!(
                "negative price ({price_now:.2}/MWh): deferring charge to cheaper slots in the \
                 {}-slot negative-price run",
                run.len()
            ));
        }
        BatteryOutcome::charge(
            power,
            format!(
                "negative price ({price_now:.2}/MWh): charging {power:.2} kW, headroom shared \
                 over {} negative-price slots",
                run.len()
            ),
        )
    }

    /// Pre-charges for upcoming expensive slots that clear the
    /// efficiency-adjusted price gap. `None` when nothing needs reserving.
    fn reservation_charge(
        &self,
        window: &ForecastWindow<'_>,
        headroom: &BatteryHeadroom,
    ) -> Option<BatteryOutcome> {
        let battery = &self.config.battery;
        if battery.round_trip_efficiency <= 0.0 {
            return None;
        }
        let dt = self.config.slot_hours();
        let price_now = window.current().consumption_price;
        let threshold = price_now / battery.round_trip_efficiency + battery.min_price_difference;
        let lookahead = self
            .config
            .hours_to_slots(self.config.simulation.reservation_lookahead_hours);

        let mut buffer_kwh = 0.0_f32;
        let mut deficit_kwh = 0.0_f32;
        let mut first_qualifying = None;
        for (offset, slot) in window.iter().skip(1).take(lookahead) {
            if slot.consumption_price < price_now {
                break;
            }
            if slot.consumption_price < threshold {
                continue;
            }
            first_qualifying.get_or_insert(offset);
            let net_kwh = window.net_load_kw(offset) * dt;
            if net_kwh > 0.0 {
                let offset_kwh = buffer_kwh.min(net_kwh);
                buffer_kwh -= offset_kwh;
                deficit_kwh += net_kwh - offset_kwh;
            } else {
                buffer_kwh = (buffer_kwh - net_kwh).min(headroom.headroom_kwh);
            }
        }

        let first_qualifying = first_qualifying?;
        let needed_kwh = deficit_kwh - headroom.usable_kwh;
        if needed_kwh <= ENERGY_EPSILON {
            return None;
        }
        let energy_kwh = needed_kwh.min(headroom.headroom_kwh);

        // spread over the same-price slots before the expensive stretch
        let import_limit = self.config.grid.import_limit_kw;
        let spread_kw: f32 = window
            .iter()
            .take(first_qualifying)
            .take_while(|(_, slot)| (slot.consumption_price - price_now).abs() <= PRICE_EPSILON)
            .map(|(offset, _)| window.import_headroom_kw(offset, import_limit))
            .sum();
        let now_kw = window.import_headroom_kw(0, import_limit);
        if spread_kw <= POWER_EPSILON || now_kw <= POWER_EPSILON {
            return Some(BatteryOutcome::idle(format!(
                "need {energy_kwh:.2} kWh before pricier slots but no import headroom"
            )));
        }

        let share_kwh = energy_kwh * now_kw / spread_kw;
        let power = (share_kwh / dt).min(headroom.charge_limit_kw);
        debug!(
            deficit_kwh,
            needed_kwh, energy_kwh, share_kwh, "reservation charge"
        );
        Some(BatteryOutcome::charge(
            power,
            format!(
                "pre-charging {power:.2} kW: {energy_kwh:.2} kWh needed before slots priced \
                 >= {threshold:.2}/MWh"
            ),
        ))
    }

    /// Energy to hold back for pricier slots within the reserve lookahead,
    /// net of PV surplus expected to recharge the battery meanwhile.
    fn reserved_for_future_kwh(
        &self,
        window: &ForecastWindow<'_>,
        headroom: &BatteryHeadroom,
    ) -> f32 {
        let dt = self.config.slot_hours();
        let price_now = window.current().consumption_price;
        let lookahead = self
            .config
            .hours_to_slots(self.config.simulation.discharge_reserve_hours);

        let mut reserved_kwh = 0.0_f32;
        let mut pv_surplus_kwh = 0.0_f32;
        for (offset, slot) in window.iter().skip(1).take(lookahead) {
            let net_kwh = window.net_load_kw(offset) * dt;
            if net_kwh < 0.0 {
                pv_surplus_kwh -= net_kwh;
            } else if slot.consumption_price > price_now + PRICE_EPSILON {
                reserved_kwh += net_kwh;
            }
        }
        (reserved_kwh - pv_surplus_kwh.min(headroom.headroom_kwh)).max(0.0)
    }
}
