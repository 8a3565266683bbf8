//! Bounded lookahead over the slot series.

use crate::config::InverterConfig;
use crate::series::Slot;

/// Lookahead length used by every policy, in hours.
pub const FORECAST_HORIZON_HOURS: u32 = 48;

/// Number of slots covered by [`FORECAST_HORIZON_HOURS`] at `slot_minutes`.
pub fn horizon_slots(slot_minutes: u32) -> usize {
    if slot_minutes == 0 {
        return 0;
    }
    (FORECAST_HORIZON_HOURS * 60).div_ceil(slot_minutes) as usize
}

/// Slice of the series starting at "now".
///
/// Offset 0 is the current slot and uses measured PV; later offsets use the
/// PV forecast. Never empty.
#[derive(Debug, Clone, Copy)]
pub struct ForecastWindow<'a> {
    slots: &'a [Slot],
    inverters: &'a [InverterConfig],
}

impl<'a> ForecastWindow<'a> {
    /// Builds the window `series[now .. now + min(horizon, remaining)]`.
    ///
    /// Returns `None` when `now` is past the end of the series. A zero
    /// horizon still yields the current slot.
    pub fn new(
        series: &'a [Slot],
        now: usize,
        horizon: usize,
        inverters: &'a [InverterConfig],
    ) -> Option<Self> {
        if now >= series.len() {
            return None;
        }
        let end = now.saturating_add(horizon.max(1)).min(series.len());
        Some(Self {
            slots: &series[now..end],
            inverters,
        })
    }

    /// Number of slots in the window, including the current one.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the window holds no slots; [`ForecastWindow::new`] never builds an empty one.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The current slot.
    pub fn current(&self) -> &'a Slot {
        &self.slots[0]
    }

    /// Slot at `offset`, if inside the window.
    pub fn slot(&self, offset: usize) -> Option<&'a Slot> {
        self.slots.get(offset)
    }

    /// `(offset, slot)` pairs from the current slot forward.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'a Slot)> + 'a {
        self.slots.iter().enumerate()
    }

    /// Inverters the window attributes PV to.
    pub fn inverters(&self) -> &'a [InverterConfig] {
        self.inverters
    }

    /// PV generation at `offset`: measured for the current slot, forecast after.
    pub fn pv_kw(&self, offset: usize) -> f32 {
        match self.slots.get(offset) {
            Some(slot) if offset == 0 => slot.pv_kw,
            Some(slot) => slot.pv_forecast_kw,
            None => 0.0,
        }
    }

    /// Baseline consumption at `offset`.
    pub fn consumption_kw(&self, offset: usize) -> f32 {
        self.slots.get(offset).map_or(0.0, |s| s.consumption_kw)
    }

    /// Consumption minus PV at `offset` (positive = deficit).
    pub fn net_load_kw(&self, offset: usize) -> f32 {
        self.consumption_kw(offset) - self.pv_kw(offset)
    }

    /// Generation of inverter `index` at `offset`.
    ///
    /// Uses the measured per-inverter value for the current slot when the
    /// slot carries one for every inverter; otherwise splits PV by capacity.
    pub fn inverter_kw(&self, offset: usize, index: usize) -> f32 {
        let Some(inverter) = self.inverters.get(index) else {
            return 0.0;
        };
        if offset == 0 {
            let measured = &self.current().inverter_kw;
            if measured.len() == self.inverters.len() {
                return measured[index].max(0.0);
            }
        }
        let total: f32 = self.inverters.iter().map(|inv| inv.capacity_kw).sum();
        if total <= 0.0 {
            return 0.0;
        }
        self.pv_kw(offset) * inverter.capacity_kw / total
    }

    /// PV at `offset` from inverters priced strictly below `price`.
    ///
    /// Unpriced inverters are always affordable. Without configured inverters
    /// all PV is treated as owned.
    pub fn affordable_pv_kw(&self, offset: usize, price: f32) -> f32 {
        if self.inverters.is_empty() {
            return self.pv_kw(offset);
        }
        self.inverters
            .iter()
            .enumerate()
            .filter(|(_, inv)| inv.price.is_none_or(|p| p < price))
            .map(|(i, _)| self.inverter_kw(offset, i))
            .sum()
    }

    /// Room left under `import_limit_kw` at `offset` given baseline net load.
    pub fn import_headroom_kw(&self, offset: usize, import_limit_kw: f32) -> f32 {
        (import_limit_kw - self.net_load_kw(offset)).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default()
    }

    fn series(n: usize) -> Vec<Slot> {
        (0..n)
            .map(|i| {
                Slot::new(t0() + TimeDelta::minutes(15 * i as i64))
                    .with_consumption(i as f32)
                    .with_pv(10.0)
            })
            .collect()
    }

    fn inverter(name: &str, capacity_kw: f32, price: Option<f32>) -> InverterConfig {
        InverterConfig {
            name: name.to_string(),
            capacity_kw,
            price,
            controllable: true,
        }
    }

    #[test]
    fn horizon_slot_count() {
        assert_eq!(horizon_slots(15), 192);
        assert_eq!(horizon_slots(60), 48);
        assert_eq!(horizon_slots(0), 0);
    }

    #[test]
    fn window_is_bounded_by_horizon_and_series() {
        let s = series(10);
        let w = ForecastWindow::new(&s, 2, 4, &[]);
        assert_eq!(w.map(|w| w.len()), Some(4));
        assert_eq!(w.map(|w| w.is_empty()), Some(false));
        let w = ForecastWindow::new(&s, 8, 4, &[]);
        assert_eq!(w.map(|w| w.len()), Some(2));
        assert_eq!(w.map(|w| w.current().consumption_kw), Some(8.0));
    }

    #[test]
    fn window_past_end_is_none() {
        let s = series(3);
        assert!(ForecastWindow::new(&s, 3, 4, &[]).is_none());
    }

    #[test]
    fn current_slot_uses_measured_pv() {
        let mut s = series(2);
        s[0].pv_forecast_kw = 99.0;
        s[1].pv_kw = 99.0;
        s[1].pv_forecast_kw = 4.0;
        let w = ForecastWindow::new(&s, 0, 2, &[]);
        assert_eq!(w.map(|w| w.pv_kw(0)), Some(10.0));
        assert_eq!(w.map(|w| w.pv_kw(1)), Some(4.0));
        assert_eq!(w.map(|w| w.pv_kw(5)), Some(0.0));
    }

    #[test]
    fn affordable_pv_excludes_pricier_inverters() {
        let s = series(2);
        let inverters = vec![
            inverter("owned", 6.0, None),
            inverter("leased", 4.0, Some(50.0)),
        ];
        let w = ForecastWindow::new(&s, 0, 2, &inverters);
        // 10 kW split 6:4 by capacity
        assert_eq!(w.map(|w| w.affordable_pv_kw(0, 40.0)), Some(6.0));
        assert_eq!(w.map(|w| w.affordable_pv_kw(0, 60.0)), Some(10.0));
    }

    #[test]
    fn measured_inverter_values_take_precedence() {
        let mut s = series(2);
        s[0] = s[0].clone().with_inverter_kw(vec![1.0, 9.0]);
        let inverters = vec![inverter("a", 6.0, None), inverter("b", 4.0, Some(50.0))];
        let w = ForecastWindow::new(&s, 0, 2, &inverters);
        assert_eq!(w.map(|w| w.inverter_kw(0, 1)), Some(9.0));
        assert_eq!(w.map(|w| w.affordable_pv_kw(0, 40.0)), Some(1.0));
    }

    #[test]
    fn import_headroom_never_negative() {
        let s = series(20);
        let w = ForecastWindow::new(&s, 0, 20, &[]);
        // offset 19: consumption 19, pv 10 → net 9
        assert_eq!(w.map(|w| w.import_headroom_kw(19, 5.0)), Some(0.0));
        assert_eq!(w.map(|w| w.import_headroom_kw(0, 5.0)), Some(15.0));
    }
}
