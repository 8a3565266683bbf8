//! Decision types shared by the dispatch policies.

use std::fmt;

/// Prices closer than this (per MWh) are treated as equal.
pub const PRICE_EPSILON: f32 = 0.01;

/// Power below this magnitude (kW) is treated as zero.
pub const POWER_EPSILON: f32 = 1e-3;

/// Energy below this amount (kWh) is treated as zero.
pub const ENERGY_EPSILON: f32 = 1e-4;

/// Human-readable justification that only ever grows.
///
/// Fragments are joined with `"; "`. There is no way to replace or clear
/// an existing fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reason(String);

impl Reason {
    /// Starts a reason with its first fragment.
    pub fn new(fragment: impl Into<String>) -> Self {
        Self(fragment.into())
    }

    /// Returns this reason with `fragment` appended.
    #[must_use]
    pub fn append(mut self, fragment: impl AsRef<str>) -> Self {
        let fragment = fragment.as_ref();
        if fragment.is_empty() {
            return self;
        }
        if !self.0.is_empty() {
            self.0.push_str("; ");
        }
        self.0.push_str(fragment);
        self
    }

    /// The full text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when any fragment contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.0.contains(needle)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Peak-shaving hysteresis state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShavingMode {
    /// Neither threshold pair is active.
    #[default]
    Idle,
    /// Import exceeded the start-discharge threshold and has not yet fallen
    /// below the stop-discharge threshold.
    Discharging,
    /// Export exceeded the start-charge threshold and has not yet fallen
    /// below the stop-charge threshold.
    Charging,
}

impl fmt::Display for ShavingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Discharging => "discharging",
            Self::Charging => "charging",
        };
        f.write_str(s)
    }
}

/// A grid limit still exceeded after every enforcement step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitBreach {
    /// Net import above the import limit by `excess_kw`.
    Import { excess_kw: f32 },
    /// Net export above the export limit by `excess_kw`.
    Export { excess_kw: f32 },
}

impl LimitBreach {
    /// Residual excess in kW.
    pub fn excess_kw(&self) -> f32 {
        match self {
            Self::Import { excess_kw } | Self::Export { excess_kw } => *excess_kw,
        }
    }
}

/// Battery power chosen by a policy, with its justification.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryOutcome {
    /// Signed power (kW; positive = charge, negative = discharge).
    pub power_kw: f32,
    /// Why this power was chosen.
    pub reason: String,
}

impl BatteryOutcome {
    /// Zero power with a reason.
    pub fn idle(reason: impl Into<String>) -> Self {
        Self {
            power_kw: 0.0,
            reason: reason.into(),
        }
    }

    /// Charge at `power_kw` (clamped to be non-negative).
    pub fn charge(power_kw: f32, reason: impl Into<String>) -> Self {
        Self {
            power_kw: power_kw.max(0.0),
            reason: reason.into(),
        }
    }

    /// Discharge at `power_kw` magnitude.
    pub fn discharge(power_kw: f32, reason: impl Into<String>) -> Self {
        Self {
            power_kw: -power_kw.max(0.0),
            reason: reason.into(),
        }
    }

    /// Returns `true` when the power is effectively zero.
    pub fn is_idle(&self) -> bool {
        self.power_kw.abs() <= POWER_EPSILON
    }
}

/// Load on/off chosen by the scheduling policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Whether the load runs this slot.
    pub on: bool,
    /// Why.
    pub reason: String,
}

impl LoadOutcome {
    pub fn on(reason: impl Into<String>) -> Self {
        Self {
            on: true,
            reason: reason.into(),
        }
    }

    pub fn off(reason: impl Into<String>) -> Self {
        Self {
            on: false,
            reason: reason.into(),
        }
    }
}

/// Aggregate PV setpoint chosen by the allocator.
#[derive(Debug, Clone, PartialEq)]
pub struct SetpointOutcome {
    /// Cap on total PV output (kW).
    pub setpoint_kw: f32,
    /// Why.
    pub reason: String,
}

/// Control decision for one slot.
///
/// Built fresh every slot, adjusted by the grid-limit cascade, and consumed
/// by the simulation loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlDecision {
    /// Slot this decision applies to.
    pub slot_index: usize,
    /// Battery power (kW; positive = charge, negative = discharge).
    pub battery_kw: f32,
    /// Cap on aggregate PV output (kW).
    pub pv_setpoint_kw: f32,
    /// Whether the controllable load runs.
    pub load_on: bool,
    /// Battery justification.
    pub battery_reason: Reason,
    /// Load justification.
    pub load_reason: Reason,
    /// Curtailment justification.
    pub curtailment_reason: Reason,
    /// Peak-shaving state after this slot (`Idle` under cost optimization).
    pub shaving_mode: ShavingMode,
    /// PV output under the setpoint (kW).
    pub pv_output_kw: f32,
    /// Net grid flow (kW; positive = import, negative = export).
    pub grid_kw: f32,
    /// Limit still exceeded after enforcement, if any.
    pub limit_breach: Option<LimitBreach>,
}

impl ControlDecision {
    /// Zero-power decision used when the slot cannot be evaluated.
    pub fn idle(slot_index: usize, reason: &str) -> Self {
        Self {
            slot_index,
            battery_kw: 0.0,
            pv_setpoint_kw: 0.0,
            load_on: false,
            battery_reason: Reason::new(reason),
            load_reason: Reason::new(reason),
            curtailment_reason: Reason::new(reason),
            shaving_mode: ShavingMode::Idle,
            pv_output_kw: 0.0,
            grid_kw: 0.0,
            limit_breach: None,
        }
    }

    /// Returns `true` when net flow respects the limits.
    pub fn within_limits(&self) -> bool {
        self.limit_breach.is_none()
    }
}
