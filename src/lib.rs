//! Site dispatch decision engine and slot-by-slot simulator.

pub mod config;
/// Per-slot battery, load and PV setpoint decisions under grid limits.
pub mod dispatch;
pub mod series;
/// Simulation loop and KPI reporting.
pub mod sim;
pub mod store;
