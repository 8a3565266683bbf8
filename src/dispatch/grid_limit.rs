//! Reconciles a base decision with the grid import/export limits.

use tracing::warn;

use super::strategy::SlotContext;
use super::types::{ControlDecision, LimitBreach, POWER_EPSILON};

/// Applies the fixed three-step cascade for whichever limit is exceeded.
///
/// Import: reduce charging, shed the load, relax curtailment.
/// Export: raise charging, start the load, deepen curtailment.
///
/// Every step is a function from decision to decision and runs at most once.
/// A limit still exceeded afterwards is reported in
/// [`ControlDecision::limit_breach`], never hidden.
#[derive(Debug, Clone, Copy)]
pub struct GridLimitEnforcer<'a> {
    ctx: &'a SlotContext<'a>,
}

impl<'a> GridLimitEnforcer<'a> {
    pub fn new(ctx: &'a SlotContext<'a>) -> Self {
        Self { ctx }
    }

    fn import_limit(&self) -> f32 {
        self.ctx.config.grid.import_limit_kw
    }

    fn export_limit(&self) -> f32 {
        self.ctx.config.grid.export_limit_kw
    }

    fn import_excess(&self, d: &ControlDecision) -> f32 {
        d.grid_kw - self.import_limit()
    }

    fn export_excess(&self, d: &ControlDecision) -> f32 {
        -d.grid_kw - self.export_limit()
    }

    pub fn enforce(&self, decision: ControlDecision) -> ControlDecision {
        let d = self.ctx.settle(decision);
        let d = if self.import_excess(&d) > POWER_EPSILON {
            let d = self.reduce_charging(d);
            let d = self.shed_load(d);
            self.relax_curtailment(d)
        } else if self.export_excess(&d) > POWER_EPSILON {
            let d = self.raise_charging(d);
            let d = self.start_load(d);
            self.deepen_curtailment(d)
        } else {
            d
        };
        self.report(d)
    }

    /// Import step 1: cut charging by the excess, not below zero.
    pub fn reduce_charging(&self, mut d: ControlDecision) -> ControlDecision {
        let excess = self.import_excess(&d);
        if excess <= POWER_EPSILON || d.battery_kw <= 0.0 {
            return d;
        }
        let cut = d.battery_kw.min(excess);
        d.battery_kw -= cut;
        d.battery_reason = d.battery_reason.append(format!(
            "charge reduced by {cut:.2} kW to respect import limit of {:.2} kW",
            self.import_limit()
        ));
        self.ctx.settle(d)
    }

    /// Import step 2: switch the load off.
    pub fn shed_load(&self, mut d: ControlDecision) -> ControlDecision {
        if self.import_excess(&d) <= POWER_EPSILON || !d.load_on {
            return d;
        }
        d.load_on = false;
        d.load_reason = d.load_reason.append(format!(
            "turned off to respect import limit of {:.2} kW",
            self.import_limit()
        ));
        self.ctx.settle(d)
    }

    /// Import step 3: raise the setpoint so more PV offsets the import.
    pub fn relax_curtailment(&self, mut d: ControlDecision) -> ControlDecision {
        let excess = self.import_excess(&d);
        if excess <= POWER_EPSILON {
            return d;
        }
        let pv = self.ctx.pv();
        let setpoint = pv
            .setpoint_for_output(&self.ctx.window, d.pv_output_kw + excess)
            .max(d.pv_setpoint_kw);
        if setpoint <= d.pv_setpoint_kw + POWER_EPSILON {
            return d;
        }
        d.pv_setpoint_kw = setpoint;
        d.curtailment_reason = d.curtailment_reason.append(format!(
            "setpoint raised to {setpoint:.2} kW to respect import limit of {:.2} kW",
            self.import_limit()
        ));
        self.ctx.settle(d)
    }

    /// Export step 1: raise battery power toward the charge ceiling.
    pub fn raise_charging(&self, mut d: ControlDecision) -> ControlDecision {
        let excess = self.export_excess(&d);
        let ceiling = self.ctx.headroom.charge_limit_kw;
        if excess <= POWER_EPSILON || d.battery_kw >= ceiling {
            return d;
        }
        let raise = (ceiling - d.battery_kw).min(excess);
        d.battery_kw += raise;
        d.battery_reason = d.battery_reason.append(format!(
            "charge raised by {raise:.2} kW to respect export limit of {:.2} kW",
            self.export_limit()
        ));
        self.ctx.settle(d)
    }

    /// Export step 2: switch the load on, unless that would breach the
    /// import limit instead.
    pub fn start_load(&self, mut d: ControlDecision) -> ControlDecision {
        let load_kw = self.ctx.load_kw(true);
        if self.export_excess(&d) <= POWER_EPSILON || d.load_on || load_kw <= 0.0 {
            return d;
        }
        if d.grid_kw + load_kw > self.import_limit() + POWER_EPSILON {
            return d;
        }
        d.load_on = true;
        d.load_reason = d.load_reason.append(format!(
            "turned on to respect export limit of {:.2} kW",
            self.export_limit()
        ));
        self.ctx.settle(d)
    }

    /// Export step 3: lower the setpoint, not below the non-controllable floor.
    pub fn deepen_curtailment(&self, mut d: ControlDecision) -> ControlDecision {
        let excess = self.export_excess(&d);
        if excess <= POWER_EPSILON {
            return d;
        }
        let pv = self.ctx.pv();
        let target = (d.pv_output_kw - excess).max(0.0);
        let setpoint = pv
            .setpoint_for_output(&self.ctx.window, target)
            .min(d.pv_setpoint_kw);
        if setpoint >= d.pv_setpoint_kw - POWER_EPSILON {
            return d;
        }
        d.pv_setpoint_kw = setpoint;
        d.curtailment_reason = d.curtailment_reason.append(format!(
            "setpoint lowered to {setpoint:.2} kW to respect export limit of {:.2} kW",
            self.export_limit()
        ));
        self.ctx.settle(d)
    }

    fn report(&self, mut d: ControlDecision) -> ControlDecision {
        let import = self.import_excess(&d);
        let export = self.export_excess(&d);
        d.limit_breach = if import > POWER_EPSILON {
            Some(LimitBreach::Import { excess_kw: import })
        } else if export > POWER_EPSILON {
            Some(LimitBreach::Export { excess_kw: export })
        } else {
            None
        };
        if let Some(breach) = d.limit_breach {
            warn!(
                slot = d.slot_index,
                grid_kw = d.grid_kw,
                excess_kw = breach.excess_kw(),
                "grid limit still exceeded after enforcement: {breach:?}"
            );
        }
        d
    }
}
