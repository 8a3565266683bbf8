//! External trading-signal override.

use crate::series::{Slot, TradingSignal};

use super::battery::BatteryHeadroom;
use super::types::BatteryOutcome;

/// Override requested by the trading channel for one slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradingOverride {
    /// Battery held at zero.
    Standby,
    /// Battery follows `requested_kw` (positive = charge).
    Overrule { requested_kw: f32 },
}

impl TradingOverride {
    /// Reads the slot's signal. `None` when the channel is disabled, the slot
    /// carries no signal, or the signal is `local`.
    pub fn from_slot(slot: &Slot, enabled: bool) -> Option<Self> {
        if !enabled {
            return None;
        }
        match slot.trading_signal? {
            TradingSignal::Standby => Some(Self::Standby),
            TradingSignal::Overrule => Some(Self::Overrule {
                requested_kw: slot.requested_power_kw.unwrap_or(0.0),
            }),
            TradingSignal::Local => None,
        }
    }

    /// Charge-side outcome. Never negative.
    pub fn charge_outcome(&self, headroom: &BatteryHeadroom) -> BatteryOutcome {
        match *self {
            Self::Standby => BatteryOutcome::idle("trading signal standby"),
            Self::Overrule { requested_kw } if requested_kw > 0.0 => {
                let power = requested_kw.min(headroom.charge_limit_kw);
                BatteryOutcome::charge(
                    power,
                    format!("trading overrule: charge {power:.2} kW (requested {requested_kw:.2} kW)"),
                )
            }
            Self::Overrule { .. } => {
                BatteryOutcome::idle("trading overrule requests no charging")
            }
        }
    }

    /// Discharge-side outcome. Never positive, and zero while the consumption
    /// price is negative.
    pub fn discharge_outcome(&self, headroom: &BatteryHeadroom, consumption_price: f32) -> BatteryOutcome {
        match *self {
            Self::Standby => BatteryOutcome::idle("trading signal standby"),
            Self::Overrule { requested_kw } if requested_kw < 0.0 && consumption_price < 0.0 => {
                BatteryOutcome::idle(format!(
                    "trading overrule: discharge of {:.2} kW refused at negative consumption \
                     price ({consumption_price:.2}/MWh)",
                    -requested_kw
                ))
            }
            Self::Overrule { requested_kw } if requested_kw < 0.0 => {
                let power = (-requested_kw).min(headroom.discharge_limit_kw);
                BatteryOutcome::discharge(
                    power,
                    format!(
                        "trading overrule: discharge {power:.2} kW (requested {:.2} kW)",
                        -requested_kw
                    ),
                )
            }
            Self::Overrule { .. } => {
                BatteryOutcome::idle("trading overrule requests no discharging")
            }
        }
    }
}
