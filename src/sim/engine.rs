//! Slot-by-slot simulation loop applying control decisions.

use tracing::info;

use crate::config::SiteConfig;
use crate::dispatch::ControlCycle;
use crate::series::Slot;
use crate::store::{LoadHistory, LoadStateStore};

use super::types::StepResult;

/// Runs the decision engine over a slot series.
///
/// Threads the cross-slot state explicitly: SoC is written into each slot
/// before it is decided, and the load outcome is recorded in the history
/// afterward. Slots are processed strictly in order.
#[derive(Debug, Clone)]
pub struct Simulation {
    cycle: ControlCycle,
    series: Vec<Slot>,
    history: LoadHistory,
    soc_pct: f32,
    next_slot: usize,
}

impl Simulation {
    /// Creates a simulation starting at `config.simulation.initial_soc_pct`.
    pub fn new(config: SiteConfig, series: Vec<Slot>) -> Self {
        let history = LoadHistory::new(config.slot_length());
        let soc_pct = config.simulation.initial_soc_pct;
        Self {
            cycle: ControlCycle::new(config),
            series,
            history,
            soc_pct,
            next_slot: 0,
        }
    }

    /// Decides and applies the next slot. `None` once the series is exhausted.
    pub fn step(&mut self) -> Option<StepResult> {
        let index = self.next_slot;
        let slot = self.series.get_mut(index)?;
        slot.soc_pct = self.soc_pct;

        let decision = self.cycle.decide(index, &self.series, &self.history);
        self.history.set(index, decision.load_on);
        self.next_slot += 1;

        let config = self.cycle.config();
        let slot = &self.series[index];
        let dt = config.slot_hours();
        let battery = &config.battery;

        let soc_before = self.soc_pct;
        if battery.capacity_kwh > 0.0 {
            let energy = battery.capacity_kwh * soc_before / 100.0 + decision.battery_kw * dt;
            self.soc_pct = (energy / battery.capacity_kwh * 100.0)
                .max(battery.min_soc_pct)
                .min(battery.max_soc_pct);
        }

        let import_kwh = decision.grid_kw.max(0.0) * dt;
        let export_kwh = (-decision.grid_kw).max(0.0) * dt;
        let cost = (import_kwh * slot.consumption_price - export_kwh * slot.injection_price) / 1000.0;

        let load_kw = match &config.load {
            Some(load) if decision.load_on => load.power_kw,
            _ => 0.0,
        };

        Some(StepResult {
            timestamp: slot.timestamp,
            consumption_kw: slot.consumption_kw,
            pv_available_kw: slot.pv_kw,
            load_kw,
            soc_before_pct: soc_before,
            soc_after_pct: self.soc_pct,
            consumption_price: slot.consumption_price,
            injection_price: slot.injection_price,
            cost,
            decision,
        })
    }

    /// Runs every remaining slot and returns their records.
    pub fn run(&mut self) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(self.series.len().saturating_sub(self.next_slot));
        while let Some(result) = self.step() {
            results.push(result);
        }
        let total_cost: f32 = results.iter().map(|r| r.cost).sum();
        info!(
            slots = results.len(),
            total_cost,
            final_soc_pct = self.soc_pct,
            "simulation finished"
        );
        results
    }

    /// Load-state history recorded so far.
    pub fn history(&self) -> &LoadHistory {
        &self.history
    }

    pub fn config(&self) -> &SiteConfig {
        self.cycle.config()
    }

    /// Current battery SoC (percent).
    pub fn soc_pct(&self) -> f32 {
        self.soc_pct
    }
}
