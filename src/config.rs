//! TOML-based site configuration and preset definitions.

use std::fs;
use std::path::Path;

use chrono::TimeDelta;
use serde::Deserialize;
use thiserror::Error;

/// Top-level site configuration parsed from TOML.
///
/// Every section except `[load]` defaults to the `residential` preset, so a
/// TOML file only needs to list what differs. Omitting `[load]` means the site
/// has no controllable load. Load with
/// [`SiteConfig::from_toml_file`] or use [`SiteConfig::residential`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Slot timing, strategy selection and lookahead lengths.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Battery storage parameters.
    #[serde(default)]
    pub battery: BatteryConfig,
    /// Controllable load; `None` when the site has no schedulable load.
    #[serde(default)]
    pub load: Option<LoadConfig>,
    /// Grid connection limits.
    #[serde(default)]
    pub grid: GridConfig,
    /// PV inverters behind the grid connection.
    #[serde(default = "default_inverters")]
    pub inverters: Vec<InverterConfig>,
    /// Hysteresis thresholds for the peak-shaving strategy.
    #[serde(default)]
    pub peak_shaving: PeakShavingConfig,
    /// External trading-signal channel.
    #[serde(default)]
    pub trading: TradingConfig,
}

/// Dispatch strategy computing the base decision before grid-limit enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Price-driven battery, load and curtailment decisions.
    #[default]
    CostOptimization,
    /// Four-threshold hysteresis on grid power.
    PeakShaving,
}

/// Slot timing, strategy selection and lookahead lengths.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Slot length in minutes (must divide a day evenly).
    pub slot_minutes: u32,
    /// Strategy used to compute the base decision.
    pub strategy: StrategyKind,
    /// How far ahead reservation charging looks for expensive slots (hours).
    pub reservation_lookahead_hours: f32,
    /// How far ahead discharge reserves energy for pricier slots (hours).
    pub discharge_reserve_hours: f32,
    /// Battery SoC at the start of a run (percent).
    pub initial_soc_pct: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            slot_minutes: 15,
            strategy: StrategyKind::CostOptimization,
            reservation_lookahead_hours: 8.0,
            discharge_reserve_hours: 6.0,
            initial_soc_pct: 50.0,
        }
    }
}

/// Battery storage parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    /// Total energy capacity (kWh).
    pub capacity_kwh: f32,
    /// Maximum charging power (kW).
    pub max_charge_kw: f32,
    /// Maximum discharging power (kW).
    pub max_discharge_kw: f32,
    /// Lowest permitted state of charge (percent).
    pub min_soc_pct: f32,
    /// Highest permitted state of charge (percent).
    pub max_soc_pct: f32,
    /// Round-trip efficiency (0.0–1.0).
    pub round_trip_efficiency: f32,
    /// Price gap (per MWh) a future slot must clear to justify pre-charging.
    pub min_price_difference: f32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 10.0,
            max_charge_kw: 5.0,
            max_discharge_kw: 5.0,
            min_soc_pct: 5.0,
            max_soc_pct: 95.0,
            round_trip_efficiency: 0.9,
            min_price_difference: 20.0,
        }
    }
}

/// Controllable load parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    /// Affordable PV surplus (kW) that makes a slot attractive for the load.
    pub activation_power_kw: f32,
    /// Nominal power drawn while on (kW).
    pub power_kw: f32,
    /// Minimum runtime once switched on (minutes).
    pub min_runtime_per_activation_minutes: u32,
    /// Minimum runtime per calendar day (minutes).
    pub min_runtime_daily_minutes: u32,
    /// Last hour of the day (0–23) in which daily runtime may be scheduled.
    pub deadline_hour: u32,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            activation_power_kw: 2.0,
            power_kw: 2.0,
            min_runtime_per_activation_minutes: 60,
            min_runtime_daily_minutes: 120,
            deadline_hour: 20,
        }
    }
}

/// Grid connection limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Maximum import power (kW).
    pub import_limit_kw: f32,
    /// Maximum export power (kW, positive magnitude).
    pub export_limit_kw: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            import_limit_kw: 17.0,
            export_limit_kw: 10.0,
        }
    }
}

/// One PV inverter.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InverterConfig {
    /// Display name.
    pub name: String,
    /// Nameplate AC capacity (kW).
    pub capacity_kw: f32,
    /// Price paid for its energy (per MWh); `None` for owned PV.
    #[serde(default)]
    pub price: Option<f32>,
    /// Whether the setpoint can curtail this inverter.
    #[serde(default = "default_controllable")]
    pub controllable: bool,
}

fn default_controllable() -> bool {
    true
}

fn default_inverters() -> Vec<InverterConfig> {
    vec![InverterConfig {
        name: "roof".to_string(),
        capacity_kw: 6.0,
        price: None,
        controllable: true,
    }]
}

/// Peak-shaving hysteresis thresholds (all kW, positive magnitudes).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeakShavingConfig {
    /// Import above which discharging starts.
    pub start_discharge_kw: f32,
    /// Import below which discharging stops.
    pub stop_discharge_kw: f32,
    /// Export above which charging starts.
    pub start_charge_kw: f32,
    /// Export below which charging stops.
    pub stop_charge_kw: f32,
}

impl Default for PeakShavingConfig {
    fn default() -> Self {
        Self {
            start_discharge_kw: 8.0,
            stop_discharge_kw: 6.0,
            start_charge_kw: 4.0,
            stop_charge_kw: 2.0,
        }
    }
}

/// External trading-signal channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TradingConfig {
    /// Honor `standby` and `overrule` signals carried by slots.
    pub enabled: bool,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"battery.max_soc_pct"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl SiteConfig {
    /// Available preset names.
    pub const PRESETS: &[&str] = &["residential", "commercial"];

    /// Single-family home: 10 kWh battery, one roof array, heat-pump style load.
    pub fn residential() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            battery: BatteryConfig::default(),
            load: Some(LoadConfig::default()),
            grid: GridConfig::default(),
            inverters: default_inverters(),
            peak_shaving: PeakShavingConfig::default(),
            trading: TradingConfig::default(),
        }
    }

    /// Commercial site: 200 kWh battery, a leased array alongside an
    /// uncontrollable legacy inverter, and a 50 kW process load.
    pub fn commercial() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            battery: BatteryConfig {
                capacity_kwh: 200.0,
                max_charge_kw: 50.0,
                max_discharge_kw: 50.0,
                min_price_difference: 15.0,
                ..BatteryConfig::default()
            },
            load: Some(LoadConfig {
                activation_power_kw: 50.0,
                power_kw: 50.0,
                min_runtime_per_activation_minutes: 60,
                min_runtime_daily_minutes: 240,
                deadline_hour: 22,
            }),
            grid: GridConfig {
                import_limit_kw: 90.0,
                export_limit_kw: 60.0,
            },
            inverters: vec![
                InverterConfig {
                    name: "carport".to_string(),
                    capacity_kw: 60.0,
                    price: Some(45.0),
                    controllable: true,
                },
                InverterConfig {
                    name: "legacy".to_string(),
                    capacity_kw: 20.0,
                    price: None,
                    controllable: false,
                },
            ],
            peak_shaving: PeakShavingConfig {
                start_discharge_kw: 80.0,
                stop_discharge_kw: 70.0,
                start_charge_kw: 50.0,
                stop_charge_kw: 40.0,
            },
            trading: TradingConfig { enabled: true },
        }
    }

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "residential" => Ok(Self::residential()),
            "commercial" => Ok(Self::commercial()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Slot length in hours.
    pub fn slot_hours(&self) -> f32 {
        self.simulation.slot_minutes as f32 / 60.0
    }

    /// Slot length as a duration.
    pub fn slot_length(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.simulation.slot_minutes))
    }

    /// Converts a duration in hours to a whole number of slots (rounded up).
    pub fn hours_to_slots(&self, hours: f32) -> usize {
        let slot_hours = self.slot_hours();
        if slot_hours <= 0.0 || hours <= 0.0 {
            return 0;
        }
        (hours / slot_hours).ceil() as usize
    }

    /// Combined nameplate capacity of all inverters (kW).
    pub fn total_inverter_capacity_kw(&self) -> f32 {
        self.inverters.iter().map(|inv| inv.capacity_kw).sum()
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let s = &self.simulation;
        if s.slot_minutes == 0 || 1440 % s.slot_minutes != 0 {
            errors.push(ConfigError::new(
                "simulation.slot_minutes",
                "must be > 0 and divide 1440",
            ));
        }
        if s.reservation_lookahead_hours < 0.0 {
            errors.push(ConfigError::new(
                "simulation.reservation_lookahead_hours",
                "must be >= 0",
            ));
        }
        if s.discharge_reserve_hours < 0.0 {
            errors.push(ConfigError::new(
                "simulation.discharge_reserve_hours",
                "must be >= 0",
            ));
        }

        let b = &self.battery;
        if b.capacity_kwh < 0.0 {
            errors.push(ConfigError::new("battery.capacity_kwh", "must be >= 0"));
        }
        if b.max_charge_kw < 0.0 {
            errors.push(ConfigError::new("battery.max_charge_kw", "must be >= 0"));
        }
        if b.max_discharge_kw < 0.0 {
            errors.push(ConfigError::new("battery.max_discharge_kw", "must be >= 0"));
        }
        if !(0.0..=100.0).contains(&b.min_soc_pct) {
            errors.push(ConfigError::new("battery.min_soc_pct", "must be in [0, 100]"));
        }
        if !(0.0..=100.0).contains(&b.max_soc_pct) {
            errors.push(ConfigError::new("battery.max_soc_pct", "must be in [0, 100]"));
        }
        if b.min_soc_pct > b.max_soc_pct {
            errors.push(ConfigError::new(
                "battery.min_soc_pct",
                "must be <= battery.max_soc_pct",
            ));
        }
        if !(b.round_trip_efficiency > 0.0 && b.round_trip_efficiency <= 1.0) {
            errors.push(ConfigError::new(
                "battery.round_trip_efficiency",
                "must be in (0.0, 1.0]",
            ));
        }
        if b.min_price_difference < 0.0 {
            errors.push(ConfigError::new("battery.min_price_difference", "must be >= 0"));
        }
        if !(b.min_soc_pct..=b.max_soc_pct).contains(&s.initial_soc_pct) {
            errors.push(ConfigError::new(
                "simulation.initial_soc_pct",
                "must lie within [battery.min_soc_pct, battery.max_soc_pct]",
            ));
        }

        if let Some(load) = &self.load {
            if load.power_kw < 0.0 {
                errors.push(ConfigError::new("load.power_kw", "must be >= 0"));
            }
            if load.activation_power_kw < 0.0 {
                errors.push(ConfigError::new("load.activation_power_kw", "must be >= 0"));
            }
            if load.deadline_hour > 23 {
                errors.push(ConfigError::new("load.deadline_hour", "must be in [0, 23]"));
            }
            if load.min_runtime_daily_minutes > 1440 {
                errors.push(ConfigError::new(
                    "load.min_runtime_daily_minutes",
                    "must be <= 1440",
                ));
            }
        }

        let g = &self.grid;
        if g.import_limit_kw < 0.0 {
            errors.push(ConfigError::new("grid.import_limit_kw", "must be >= 0"));
        }
        if g.export_limit_kw < 0.0 {
            errors.push(ConfigError::new("grid.export_limit_kw", "must be >= 0"));
        }

        for (i, inv) in self.inverters.iter().enumerate() {
            if inv.capacity_kw < 0.0 {
                errors.push(ConfigError::new(
                    format!("inverters[{i}].capacity_kw"),
                    "must be >= 0",
                ));
            }
            if inv.name.trim().is_empty() {
                errors.push(ConfigError::new(
                    format!("inverters[{i}].name"),
                    "must not be empty",
                ));
            }
        }

        let p = &self.peak_shaving;
        if p.stop_discharge_kw > p.start_discharge_kw {
            errors.push(ConfigError::new(
                "peak_shaving.stop_discharge_kw",
                "must be <= peak_shaving.start_discharge_kw",
            ));
        }
        if p.stop_charge_kw > p.start_charge_kw {
            errors.push(ConfigError::new(
                "peak_shaving.stop_charge_kw",
                "must be <= peak_shaving.start_charge_kw",
            ));
        }

        errors
    }
}
