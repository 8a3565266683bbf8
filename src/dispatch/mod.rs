//! Per-slot dispatch decision engine.
//!
//! A [`ControlCycle`] looks at a [`ForecastWindow`] starting at the current
//! slot, lets the configured strategy pick battery power, load state and a PV
//! setpoint, then runs the [`GridLimitEnforcer`] cascade over the result.

pub mod balance;
pub mod battery;
pub mod cycle;
pub mod grid_limit;
pub mod horizon;
pub mod load;
pub mod peak_shaving;
pub mod pv;
pub mod strategy;
pub mod trading;
pub mod types;
pub mod window;

pub use battery::{BatteryDispatchPolicy, BatteryHeadroom};
pub use cycle::ControlCycle;
pub use grid_limit::GridLimitEnforcer;
pub use horizon::NegativePriceHorizon;
pub use load::LoadSchedulingPolicy;
pub use peak_shaving::PeakShaver;
pub use pv::{InverterSetpoint, PvSetpointAllocator};
pub use strategy::{CostOptimizer, DispatchStrategy, SlotContext, Strategy};
pub use trading::TradingOverride;
pub use types::{ControlDecision, LimitBreach, Reason, ShavingMode};
pub use window::{FORECAST_HORIZON_HOURS, ForecastWindow, horizon_slots};
