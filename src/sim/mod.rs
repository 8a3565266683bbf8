/// Simulation loop applying decisions slot by slot.
pub mod engine;
pub mod kpi;
pub mod types;

pub use engine::Simulation;
pub use kpi::KpiReport;
pub use types::StepResult;
