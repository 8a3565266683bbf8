//! Slot series: the per-slot prices, consumption, PV and signals the engine reads.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

/// External trading signal carried by a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingSignal {
    /// Hold the battery idle.
    Standby,
    /// Let the site's own policy decide.
    Local,
    /// Use the requested power verbatim.
    Overrule,
}

/// One fixed-duration time step.
///
/// Power values are kW averages over the slot; prices are per MWh.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    /// Slot start in site-local time.
    pub timestamp: NaiveDateTime,
    /// Price paid for imported energy.
    pub consumption_price: f32,
    /// Price received for exported energy.
    pub injection_price: f32,
    /// Baseline consumption, excluding the controllable load (kW).
    pub consumption_kw: f32,
    /// Measured PV generation (kW).
    pub pv_kw: f32,
    /// Forecast PV generation (kW).
    pub pv_forecast_kw: f32,
    /// Measured generation per inverter, in configuration order. Empty when unknown.
    pub inverter_kw: Vec<f32>,
    /// Battery state of charge at slot start (percent).
    pub soc_pct: f32,
    /// Trading signal for this slot, if any.
    pub trading_signal: Option<TradingSignal>,
    /// Power requested by the trading channel (kW; positive = charge).
    pub requested_power_kw: Option<f32>,
}

impl Slot {
    /// Creates an empty slot at `timestamp`: zero prices, power and SoC, no signal.
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            consumption_price: 0.0,
            injection_price: 0.0,
            consumption_kw: 0.0,
            pv_kw: 0.0,
            pv_forecast_kw: 0.0,
            inverter_kw: Vec::new(),
            soc_pct: 0.0,
            trading_signal: None,
            requested_power_kw: None,
        }
    }

    /// Sets consumption and injection prices.
    pub fn with_prices(mut self, consumption_price: f32, injection_price: f32) -> Self {
        self.consumption_price = consumption_price;
        self.injection_price = injection_price;
        self
    }

    /// Sets baseline consumption.
    pub fn with_consumption(mut self, consumption_kw: f32) -> Self {
        self.consumption_kw = consumption_kw;
        self
    }

    /// Sets measured and forecast PV to the same value.
    pub fn with_pv(mut self, pv_kw: f32) -> Self {
        self.pv_kw = pv_kw;
        self.pv_forecast_kw = pv_kw;
        self
    }

    /// Sets per-inverter measured generation; `pv_kw` becomes their sum.
    pub fn with_inverter_kw(mut self, inverter_kw: Vec<f32>) -> Self {
        self.pv_kw = inverter_kw.iter().sum();
        self.inverter_kw = inverter_kw;
        self
    }

    /// Sets state of charge.
    pub fn with_soc(mut self, soc_pct: f32) -> Self {
        self.soc_pct = soc_pct;
        self
    }

    /// Attaches a trading signal and optional requested power.
    pub fn with_trading(mut self, signal: TradingSignal, requested_power_kw: Option<f32>) -> Self {
        self.trading_signal = Some(signal);
        self.requested_power_kw = requested_power_kw;
        self
    }
}

/// Errors raised while loading a slot series.
#[derive(Debug, Error)]
pub enum SeriesError {
    /// The source could not be opened.
    #[error("cannot read series \"{}\": {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A record could not be parsed.
    #[error("malformed series record: {0}")]
    Csv(#[from] csv::Error),
    /// A record parsed but holds invalid values.
    #[error("series row {row}: {message}")]
    InvalidRow { row: usize, message: String },
    /// The series has no slots.
    #[error("series is empty")]
    Empty,
}

/// Supplies the slot series a simulation runs over.
pub trait ForecastProvider {
    /// Returns the full series, history and forecast, in slot order.
    fn series(&self) -> Result<Vec<Slot>, SeriesError>;
}

/// CSV file with one row per slot.
///
/// Columns: `timestamp` (ISO 8601, e.g. `2025-06-01T00:00:00`),
/// `consumption_price`, `injection_price`, `consumption_kw`, `pv_kw`, and the
/// optional `pv_forecast_kw` (defaults to `pv_kw`), `inverter_kw`
/// (semicolon-separated, inverter order), `soc_pct`, `trading_signal`,
/// `requested_power_kw`.
#[derive(Debug, Clone)]
pub struct CsvSeries {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SlotRecord {
    timestamp: NaiveDateTime,
    consumption_price: f32,
    injection_price: f32,
    consumption_kw: f32,
    pv_kw: f32,
    #[serde(default)]
    pv_forecast_kw: Option<f32>,
    #[serde(default)]
    inverter_kw: Option<String>,
    #[serde(default)]
    soc_pct: Option<f32>,
    #[serde(default)]
    trading_signal: Option<TradingSignal>,
    #[serde(default)]
    requested_power_kw: Option<f32>,
}

impl CsvSeries {
    /// Creates a provider reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parses a series from any reader.
    ///
    /// # Errors
    ///
    /// Returns a `SeriesError` for unparseable records, invalid values, or an
    /// empty series.
    pub fn read_from(reader: impl io::Read) -> Result<Vec<Slot>, SeriesError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut slots = Vec::new();
        for (row, record) in rdr.deserialize::<SlotRecord>().enumerate() {
            slots.push(record?.into_slot(row + 1)?);
        }
        if slots.is_empty() {
            return Err(SeriesError::Empty);
        }
        Ok(slots)
    }

    /// Path this provider reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ForecastProvider for CsvSeries {
    fn series(&self) -> Result<Vec<Slot>, SeriesError> {
        let file = File::open(&self.path).map_err(|source| SeriesError::Io {
            path: self.path.clone(),
            source,
        })?;
        Self::read_from(file)
    }
}

impl SlotRecord {
    fn into_slot(self, row: usize) -> Result<Slot, SeriesError> {
        let invalid = |message: String| SeriesError::InvalidRow { row, message };

        if self.consumption_kw < 0.0 {
            return Err(invalid(format!(
                "consumption_kw must be >= 0, got {}",
                self.consumption_kw
            )));
        }
        if self.pv_kw < 0.0 {
            return Err(invalid(format!("pv_kw must be >= 0, got {}", self.pv_kw)));
        }

        let inverter_kw = match self.inverter_kw.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => raw
                .split(';')
                .map(|part| {
                    part.trim()
                        .parse::<f32>()
                        .map_err(|e| invalid(format!("inverter_kw value \"{part}\": {e}")))
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        let soc_pct = self.soc_pct.unwrap_or(0.0);
        if !(0.0..=100.0).contains(&soc_pct) {
            return Err(invalid(format!("soc_pct must be in [0, 100], got {soc_pct}")));
        }

        Ok(Slot {
            timestamp: self.timestamp,
            consumption_price: self.consumption_price,
            injection_price: self.injection_price,
            consumption_kw: self.consumption_kw,
            pv_kw: self.pv_kw,
            pv_forecast_kw: self.pv_forecast_kw.unwrap_or(self.pv_kw),
            inverter_kw,
            soc_pct,
            trading_signal: self.trading_signal,
            requested_power_kw: self.requested_power_kw,
        })
    }
}

/// Checks that consecutive slots are exactly one slot length apart.
///
/// # Errors
///
/// Returns `SeriesError::InvalidRow` naming the first out-of-step row.
pub fn check_spacing(series: &[Slot], slot_minutes: u32) -> Result<(), SeriesError> {
    let step = chrono::TimeDelta::minutes(i64::from(slot_minutes));
    for (i, pair) in series.windows(2).enumerate() {
        let gap = pair[1].timestamp - pair[0].timestamp;
        if gap != step {
            return Err(SeriesError::InvalidRow {
                row: i + 2,
                message: format!(
                    "expected {slot_minutes} min after previous slot, got {} min",
                    gap.num_minutes()
                ),
            });
        }
    }
    Ok(())
}
