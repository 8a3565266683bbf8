//! Dynamic lookahead for negative-price avoidance.

use super::window::ForecastWindow;

/// How many slots ahead an upcoming negative price matters.
///
/// The horizon is the time it would take to empty the battery's usable
/// energy at the highest rate the site can export it. A negative-price slot
/// further away than that can still be met with an empty battery, so it does
/// not affect the current decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegativePriceHorizon {
    slots: usize,
}

impl NegativePriceHorizon {
    /// Derives the horizon from usable energy and the export path.
    ///
    /// The drain rate is the lesser of the discharge rate and the export
    /// limit. Returns a zero horizon when either the energy or the rate is
    /// zero.
    pub fn new(usable_kwh: f32, max_discharge_kw: f32, export_limit_kw: f32, dt_hours: f32) -> Self {
        let rate_kw = max_discharge_kw.min(export_limit_kw);
        if usable_kwh <= 0.0 || rate_kw <= 0.0 || dt_hours <= 0.0 {
            return Self { slots: 0 };
        }
        Self {
            slots: (usable_kwh / (rate_kw * dt_hours)).ceil() as usize,
        }
    }

    /// Horizon length in slots.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Offset of the first future slot inside the horizon with a negative
    /// consumption price.
    pub fn first_negative(&self, window: &ForecastWindow<'_>) -> Option<usize> {
        window
            .iter()
            .skip(1)
            .take(self.slots)
            .find(|(_, slot)| slot.consumption_price < 0.0)
            .map(|(offset, _)| offset)
    }
}
