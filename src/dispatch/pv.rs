//! Aggregate PV setpoint and its distribution over inverters.

use crate::config::InverterConfig;

use super::types::{POWER_EPSILON, SetpointOutcome};
use super::window::ForecastWindow;

const BISECTION_STEPS: usize = 40;

/// Setpoint assigned to one inverter.
#[derive(Debug, Clone, PartialEq)]
pub struct InverterSetpoint {
    /// Inverter name from the configuration.
    pub name: String,
    /// Output cap (kW).
    pub setpoint_kw: f32,
}

/// Chooses the aggregate PV setpoint and spreads it over the inverters.
///
/// Non-controllable inverters always count at full capacity, so the
/// setpoint never drops below [`fixed_capacity_kw`](Self::fixed_capacity_kw).
#[derive(Debug, Clone, Copy)]
pub struct PvSetpointAllocator<'a> {
    inverters: &'a [InverterConfig],
}

impl<'a> PvSetpointAllocator<'a> {
    pub fn new(inverters: &'a [InverterConfig]) -> Self {
        Self { inverters }
    }

    /// Combined nameplate capacity (kW).
    pub fn total_capacity_kw(&self) -> f32 {
        self.inverters.iter().map(|inv| inv.capacity_kw.max(0.0)).sum()
    }

    /// Capacity the setpoint can curtail (kW).
    pub fn controllable_capacity_kw(&self) -> f32 {
        self.inverters
            .iter()
            .filter(|inv| inv.controllable)
            .map(|inv| inv.capacity_kw.max(0.0))
            .sum()
    }

    /// Capacity that always runs unrestricted (kW).
    pub fn fixed_capacity_kw(&self) -> f32 {
        self.total_capacity_kw() - self.controllable_capacity_kw()
    }

    /// Aggregate setpoint for the current slot given the battery and load
    /// decisions already made.
    pub fn setpoint(
        &self,
        window: &ForecastWindow<'_>,
        battery_kw: f32,
        load_kw: f32,
    ) -> SetpointOutcome {
        let now = window.current();
        let total = self.total_capacity_kw();
        let fixed = self.fixed_capacity_kw();

        if now.consumption_price < 0.0 {
            let reason = if self.controllable_capacity_kw() > 0.0 {
                format!(
                    "negative consumption price ({:.2}/MWh): curtailing all controllable PV",
                    now.consumption_price
                )
            } else {
                "negative consumption price but no controllable inverter".to_string()
            };
            return SetpointOutcome {
                setpoint_kw: fixed,
                reason,
            };
        }

        if now.injection_price < 0.0 {
            let pv = window.pv_kw(0);
            let effective = now.consumption_kw + battery_kw + load_kw;
            let excess = pv - effective;
            if excess <= POWER_EPSILON {
                return SetpointOutcome {
                    setpoint_kw: total,
                    reason: format!(
                        "negative injection price ({:.2}/MWh) but no PV excess",
                        now.injection_price
                    ),
                };
            }
            let curtail = excess.min(self.controllable_generation_kw(window));
            let setpoint_kw = self.setpoint_for_output(window, pv - curtail);
            return SetpointOutcome {
                setpoint_kw,
                reason: format!(
                    "negative injection price ({:.2}/MWh): curtailing {curtail:.2} kW of \
                     {excess:.2} kW excess",
                    now.injection_price
                ),
            };
        }

        SetpointOutcome {
            setpoint_kw: total,
            reason: "no curtailment".to_string(),
        }
    }

    /// Splits an aggregate setpoint: fixed inverters at nameplate, the rest
    /// over controllable inverters in proportion to their capacity.
    pub fn distribute(&self, setpoint_kw: f32) -> Vec<InverterSetpoint> {
        let controllable = self.controllable_capacity_kw();
        let share = (setpoint_kw - self.fixed_capacity_kw()).clamp(0.0, controllable);
        self.inverters
            .iter()
            .map(|inv| {
                let capacity = inv.capacity_kw.max(0.0);
                let setpoint_kw = if !inv.controllable {
                    capacity
                } else if controllable > 0.0 {
                    share * capacity / controllable
                } else {
                    0.0
                };
                InverterSetpoint {
                    name: inv.name.clone(),
                    setpoint_kw,
                }
            })
            .collect()
    }

    /// PV output of the current slot under `setpoint_kw`.
    ///
    /// Each inverter delivers `min(its setpoint, its generation)`. Without
    /// configured inverters nothing can be curtailed and all PV is output.
    pub fn output_kw(&self, window: &ForecastWindow<'_>, setpoint_kw: f32) -> f32 {
        if self.inverters.is_empty() {
            return window.pv_kw(0);
        }
        self.distribute(setpoint_kw)
            .iter()
            .enumerate()
            .map(|(i, sp)| sp.setpoint_kw.min(window.inverter_kw(0, i)))
            .sum()
    }

    /// Lowest setpoint whose output reaches `target_kw`, bounded to
    /// `[fixed capacity, total capacity]`.
    pub fn setpoint_for_output(&self, window: &ForecastWindow<'_>, target_kw: f32) -> f32 {
        let mut lo = self.fixed_capacity_kw();
        let mut hi = self.total_capacity_kw();
        if self.output_kw(window, lo) >= target_kw - POWER_EPSILON {
            return lo;
        }
        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (lo + hi);
            if self.output_kw(window, mid) >= target_kw {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        hi
    }

    fn controllable_generation_kw(&self, window: &ForecastWindow<'_>) -> f32 {
        self.inverters
            .iter()
            .enumerate()
            .filter(|(_, inv)| inv.controllable)
            .map(|(i, _)| window.inverter_kw(0, i))
            .sum()
    }
}
