//! Per-slot context and the strategies computing the base decision.

use crate::config::{SiteConfig, StrategyKind};
use crate::series::Slot;
use crate::store::LoadStateStore;

use super::balance::site_net_kw;
use super::battery::{BatteryDispatchPolicy, BatteryHeadroom};
use super::load::LoadSchedulingPolicy;
use super::peak_shaving::PeakShaver;
use super::pv::PvSetpointAllocator;
use super::types::{BatteryOutcome, ControlDecision, LoadOutcome, Reason, SetpointOutcome, ShavingMode};
use super::window::{ForecastWindow, horizon_slots};

/// Everything a strategy needs to decide one slot.
#[derive(Debug, Clone, Copy)]
pub struct SlotContext<'a> {
    /// Index of the slot being decided.
    pub slot_index: usize,
    /// Lookahead starting at the slot.
    pub window: ForecastWindow<'a>,
    /// Site configuration.
    pub config: &'a SiteConfig,
    /// Battery headroom at the slot's SoC.
    pub headroom: BatteryHeadroom,
    /// The whole series, for strategies that look back.
    pub series: &'a [Slot],
}

impl<'a> SlotContext<'a> {
    /// Builds the context for `series[slot_index]`. `None` when the index is
    /// past the end of the series.
    pub fn new(config: &'a SiteConfig, series: &'a [Slot], slot_index: usize) -> Option<Self> {
        let window = ForecastWindow::new(
            series,
            slot_index,
            horizon_slots(config.simulation.slot_minutes),
            &config.inverters,
        )?;
        let headroom =
            BatteryHeadroom::new(&config.battery, window.current().soc_pct, config.slot_hours());
        Some(Self {
            slot_index,
            window,
            config,
            headroom,
            series,
        })
    }

    /// The slot being decided.
    pub fn slot(&self) -> &'a Slot {
        self.window.current()
    }

    pub fn pv(&self) -> PvSetpointAllocator<'a> {
        PvSetpointAllocator::new(&self.config.inverters)
    }

    /// Power the controllable load draws when `on`.
    pub fn load_kw(&self, on: bool) -> f32 {
        match &self.config.load {
            Some(load) if on => load.power_kw,
            _ => 0.0,
        }
    }

    /// Grid power at `series[index]` with PV uncurtailed, the battery idle
    /// and the load as given. Zero for an index past the end.
    pub fn uncontrolled_grid_kw(&self, index: usize, load_on: bool) -> f32 {
        let Some(window) = ForecastWindow::new(self.series, index, 1, &self.config.inverters) else {
            return 0.0;
        };
        let pv = self.pv();
        site_net_kw(
            window.current().consumption_kw,
            self.load_kw(load_on),
            pv.output_kw(&window, pv.total_capacity_kw()),
            0.0,
        )
    }

    /// Recomputes PV output and grid flow from the decision's controls.
    pub fn settle(&self, mut decision: ControlDecision) -> ControlDecision {
        decision.pv_output_kw = self.pv().output_kw(&self.window, decision.pv_setpoint_kw);
        decision.grid_kw = site_net_kw(
            self.slot().consumption_kw,
            self.load_kw(decision.load_on),
            decision.pv_output_kw,
            decision.battery_kw,
        );
        decision
    }

    /// Assembles a settled decision from the three policy outcomes.
    pub fn decision(
        &self,
        battery: BatteryOutcome,
        load: LoadOutcome,
        setpoint: SetpointOutcome,
        shaving_mode: ShavingMode,
    ) -> ControlDecision {
        self.settle(ControlDecision {
            slot_index: self.slot_index,
            battery_kw: battery.power_kw,
            pv_setpoint_kw: setpoint.setpoint_kw,
            load_on: load.on,
            battery_reason: Reason::new(battery.reason),
            load_reason: Reason::new(load.reason),
            curtailment_reason: Reason::new(setpoint.reason),
            shaving_mode,
            pv_output_kw: 0.0,
            grid_kw: 0.0,
            limit_breach: None,
        })
    }
}

/// Computes the decision for a slot before grid limits are enforced.
pub trait DispatchStrategy {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Battery, load and setpoint for the slot in `ctx`.
    fn base_decision<S: LoadStateStore + ?Sized>(
        &self,
        ctx: &SlotContext<'_>,
        store: &S,
    ) -> ControlDecision;
}

/// Price-driven battery, load and curtailment decisions.
#[derive(Debug, Default, Clone, Copy)]
pub struct CostOptimizer;

impl DispatchStrategy for CostOptimizer {
    fn name(&self) -> &'static str {
        "cost_optimization"
    }

    fn base_decision<S: LoadStateStore + ?Sized>(
        &self,
        ctx: &SlotContext<'_>,
        store: &S,
    ) -> ControlDecision {
        let battery = BatteryDispatchPolicy::new(ctx.config).decide(&ctx.window, &ctx.headroom);
        let load = LoadSchedulingPolicy::new(ctx.config).decide(&ctx.window, ctx.slot_index, store);
        let setpoint = ctx
            .pv()
            .setpoint(&ctx.window, battery.power_kw, ctx.load_kw(load.on));
        ctx.decision(battery, load, setpoint, ShavingMode::Idle)
    }
}

/// Strategy selected by configuration.
#[derive(Debug, Clone)]
pub enum Strategy {
    CostOptimization(CostOptimizer),
    PeakShaving(PeakShaver),
}

impl Strategy {
    pub fn from_config(config: &SiteConfig) -> Self {
        match config.simulation.strategy {
            StrategyKind::CostOptimization => Self::CostOptimization(CostOptimizer),
            StrategyKind::PeakShaving => Self::PeakShaving(PeakShaver::default()),
        }
    }
}

impl DispatchStrategy for Strategy {
    fn name(&self) -> &'static str {
        match self {
            Self::CostOptimization(s) => s.name(),
            Self::PeakShaving(s) => s.name(),
        }
    }

    fn base_decision<S: LoadStateStore + ?Sized>(
        &self,
        ctx: &SlotContext<'_>,
        store: &S,
    ) -> ControlDecision {
        match self {
            Self::CostOptimization(s) => s.base_decision(ctx, store),
            Self::PeakShaving(s) => s.base_decision(ctx, store),
        }
    }
}
