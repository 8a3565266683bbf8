//! Post-hoc KPI computation from simulation results.

use std::fmt;

use super::types::StepResult;

/// Aggregate key performance indicators derived from a complete simulation run.
///
/// Computed post-hoc from `Vec<StepResult>` so reported metrics always agree
/// with the step data.
#[derive(Debug, Clone, Default)]
pub struct KpiReport {
    /// Import cost minus export revenue over the run.
    pub total_cost: f32,
    /// Energy imported from the grid (kWh).
    pub import_kwh: f32,
    /// Energy exported to the grid (kWh).
    pub export_kwh: f32,
    /// Peak grid import power (kW, positive).
    pub peak_import_kw: f32,
    /// Peak grid export power (kW, positive magnitude).
    pub peak_export_kw: f32,
    /// PV energy withheld by setpoints (kWh).
    pub curtailed_kwh: f32,
    /// Total battery energy throughput (kWh, sum of |power| * dt).
    pub battery_throughput_kwh: f32,
    /// Battery equivalent full cycles (throughput / 2*capacity).
    pub battery_equivalent_full_cycles: f32,
    /// Controllable load runtime (hours).
    pub load_runtime_hours: f32,
    /// Number of slots where a grid limit stayed exceeded.
    pub limit_breach_count: usize,
}

impl KpiReport {
    /// Computes all KPIs from the complete step record vector.
    ///
    /// # Arguments
    ///
    /// * `results` - Complete simulation step results
    /// * `dt_hours` - Slot duration in hours
    /// * `battery_capacity_kwh` - Battery capacity for cycle calculation
    pub fn from_results(results: &[StepResult], dt_hours: f32, battery_capacity_kwh: f32) -> Self {
        let mut kpi = Self::default();

        for r in results {
            let d = &r.decision;
            kpi.total_cost += r.cost;
            kpi.import_kwh += d.grid_kw.max(0.0) * dt_hours;
            kpi.export_kwh += (-d.grid_kw).max(0.0) * dt_hours;
            kpi.peak_import_kw = kpi.peak_import_kw.max(d.grid_kw);
            kpi.peak_export_kw = kpi.peak_export_kw.max(-d.grid_kw);
            kpi.curtailed_kwh += r.curtailed_kw() * dt_hours;
            kpi.battery_throughput_kwh += d.battery_kw.abs() * dt_hours;
            if d.load_on {
                kpi.load_runtime_hours += dt_hours;
            }
            if !d.within_limits() {
                kpi.limit_breach_count += 1;
            }
        }

        if battery_capacity_kwh > 0.0 {
            kpi.battery_equivalent_full_cycles =
                kpi.battery_throughput_kwh / (2.0 * battery_capacity_kwh);
        }
        kpi
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Total cost:            {:.2}", self.total_cost)?;
        writeln!(f, "Grid import:           {:.2} kWh", self.import_kwh)?;
        writeln!(f, "Grid export:           {:.2} kWh", self.export_kwh)?;
        writeln!(f, "Peak import:           {:.2} kW", self.peak_import_kw)?;
        writeln!(f, "Peak export:           {:.2} kW", self.peak_export_kw)?;
        writeln!(f, "PV curtailed:          {:.2} kWh", self.curtailed_kwh)?;
        writeln!(
            f,
            "Battery throughput:    {:.2} kWh ({:.2} equiv. cycles)",
            self.battery_throughput_kwh, self.battery_equivalent_full_cycles
        )?;
        writeln!(f, "Load runtime:          {:.2} h", self.load_runtime_hours)?;
        write!(f, "Limit breaches:        {}", self.limit_breach_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ControlDecision, LimitBreach};
    use chrono::NaiveDateTime;

    fn make_result(grid_kw: f32, battery_kw: f32, cost: f32) -> StepResult {
        StepResult {
            timestamp: NaiveDateTime::default(),
            consumption_kw: 0.0,
            pv_available_kw: 0.0,
            load_kw: 0.0,
            soc_before_pct: 50.0,
            soc_after_pct: 50.0,
            consumption_price: 0.0,
            injection_price: 0.0,
            cost,
            decision: ControlDecision {
                battery_kw,
                grid_kw,
                ..ControlDecision::idle(0, "")
            },
        }
    }

    #[test]
    fn energy_and_cost_totals() {
        let results: Vec<StepResult> = [(4.0, 0.0, 0.1), (-2.0, 0.0, -0.02), (0.0, 0.0, 0.0)]
            .iter()
            .map(|&(g, b, c)| make_result(g, b, c))
            .collect();
        let kpi = KpiReport::from_results(&results, 0.25, 10.0);
        assert!((kpi.import_kwh - 1.0).abs() < 1e-6);
        assert!((kpi.export_kwh - 0.5).abs() < 1e-6);
        assert!((kpi.total_cost - 0.08).abs() < 1e-6);
    }

    #[test]
    fn battery_throughput_and_cycles() {
        // battery powers: [2.0, -3.0, 1.0, -1.0], dt=1.0
        // throughput = 2 + 3 + 1 + 1 = 7.0 kWh
        let results: Vec<StepResult> = [2.0, -3.0, 1.0, -1.0]
            .iter()
            .map(|&b| make_result(0.0, b, 0.0))
            .collect();
        let kpi = KpiReport::from_results(&results, 1.0, 10.0);
        assert!((kpi.battery_throughput_kwh - 7.0).abs() < 1e-4);
        assert!((kpi.battery_equivalent_full_cycles - 0.35).abs() < 1e-4);
    }

    #[test]
    fn peak_import_and_export() {
        let results: Vec<StepResult> = [3.0, -2.0, 5.0, -1.0]
            .iter()
            .map(|&g| make_result(g, 0.0, 0.0))
            .collect();
        let kpi = KpiReport::from_results(&results, 1.0, 10.0);
        assert_eq!(kpi.peak_import_kw, 5.0);
        assert_eq!(kpi.peak_export_kw, 2.0);
    }

    #[test]
    fn breach_and_load_counting() {
        let mut results = vec![make_result(0.0, 0.0, 0.0); 4];
        results[1].decision.limit_breach = Some(LimitBreach::Import { excess_kw: 1.0 });
        results[2].decision.load_on = true;
        results[3].decision.load_on = true;
        let kpi = KpiReport::from_results(&results, 0.5, 10.0);
        assert_eq!(kpi.limit_breach_count, 1);
        assert_eq!(kpi.load_runtime_hours, 1.0);
    }

    #[test]
    fn empty_results() {
        let kpi = KpiReport::from_results(&[], 1.0, 10.0);
        assert_eq!(kpi.total_cost, 0.0);
        assert_eq!(kpi.limit_breach_count, 0);
    }
}
