//! Per-slot simulation record.

use std::fmt;

use chrono::NaiveDateTime;

use crate::dispatch::ControlDecision;

/// Complete record of one simulated slot.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Slot timestamp.
    pub timestamp: NaiveDateTime,
    /// Baseline consumption (kW, positive).
    pub consumption_kw: f32,
    /// PV available before the setpoint (kW).
    pub pv_available_kw: f32,
    /// Controllable load draw (kW, zero when off).
    pub load_kw: f32,
    /// SoC before the slot (percent).
    pub soc_before_pct: f32,
    /// SoC after applying battery power (percent, clamped to the SoC window).
    pub soc_after_pct: f32,
    /// Consumption price (per MWh).
    pub consumption_price: f32,
    /// Injection price (per MWh).
    pub injection_price: f32,
    /// Import cost minus export revenue for the slot.
    pub cost: f32,
    /// The enforced decision.
    pub decision: ControlDecision,
}

impl StepResult {
    /// PV withheld by the setpoint (kW).
    pub fn curtailed_kw(&self) -> f32 {
        (self.pv_available_kw - self.decision.pv_output_kw).max(0.0)
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.decision;
        write!(
            f,
            "#{:>4} {} | grid={:>7.2} kW | cons={:.2}  pv={:.2}/{:.2}  load={:.2}  \
             bat={:>6.2} (SoC {:.1}% -> {:.1}%) | price={:.2}/{:.2}  cost={:.4}{} | \
             battery: {} | load: {} | pv: {}",
            d.slot_index,
            self.timestamp.format("%Y-%m-%d %H:%M"),
            d.grid_kw,
            self.consumption_kw,
            d.pv_output_kw,
            self.pv_available_kw,
            self.load_kw,
            d.battery_kw,
            self.soc_before_pct,
            self.soc_after_pct,
            self.consumption_price,
            self.injection_price,
            self.cost,
            if d.within_limits() { "" } else { "  LIMIT BREACH" },
            d.battery_reason,
            d.load_reason,
            d.curtailment_reason,
        )
    }
}
