//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rand::Rng;
use rand::rngs::StdRng;

use dispatch_sim::config::{InverterConfig, LoadConfig, SiteConfig, StrategyKind};
use dispatch_sim::series::{Slot, TradingSignal};
use dispatch_sim::store::LoadHistory;

/// `2025-06-01 hour:minute`.
pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .unwrap_or_default()
}

/// `n` quarter-hour slots from `start` with a constant price, consumption and PV.
pub fn flat_series(start: NaiveDateTime, n: usize, price: f32, consumption_kw: f32, pv_kw: f32) -> Vec<Slot> {
    (0..n)
        .map(|i| {
            Slot::new(start + TimeDelta::minutes(15 * i as i64))
                .with_prices(price, price / 2.0)
                .with_consumption(consumption_kw)
                .with_pv(pv_kw)
        })
        .collect()
}

/// Commercial preset with trading off and a single 200 kW controllable array.
pub fn commercial_site() -> SiteConfig {
    let mut cfg = SiteConfig::commercial();
    cfg.trading.enabled = false;
    cfg.inverters = vec![InverterConfig {
        name: "field".to_string(),
        capacity_kw: 200.0,
        price: None,
        controllable: true,
    }];
    cfg
}

/// Empty load-state history with quarter-hour slots.
pub fn fresh_store() -> LoadHistory {
    LoadHistory::new(TimeDelta::minutes(15))
}

/// Valid random site with only controllable inverters.
pub fn random_config(rng: &mut StdRng, strategy: StrategyKind) -> SiteConfig {
    let mut cfg = SiteConfig::residential();
    cfg.simulation.strategy = strategy;
    cfg.simulation.reservation_lookahead_hours = rng.random_range(0.0..12.0);
    cfg.simulation.discharge_reserve_hours = rng.random_range(0.0..12.0);

    let b = &mut cfg.battery;
    b.capacity_kwh = if rng.random_bool(0.1) { 0.0 } else { rng.random_range(2.0..300.0) };
    b.max_charge_kw = rng.random_range(0.0..60.0);
    b.max_discharge_kw = rng.random_range(0.0..60.0);
    b.min_soc_pct = rng.random_range(0.0..30.0);
    b.max_soc_pct = rng.random_range(60.0..=100.0);
    b.round_trip_efficiency = rng.random_range(0.7..=1.0);
    b.min_price_difference = rng.random_range(0.0..40.0);
    cfg.simulation.initial_soc_pct = rng.random_range(b.min_soc_pct..=b.max_soc_pct);

    cfg.grid.import_limit_kw = rng.random_range(20.0..120.0);
    cfg.grid.export_limit_kw = rng.random_range(5.0..100.0);

    let count = rng.random_range(1..=3);
    cfg.inverters = (0..count)
        .map(|i| InverterConfig {
            name: format!("inv{i}"),
            capacity_kw: rng.random_range(5.0..80.0),
            price: rng.random_bool(0.4).then(|| rng.random_range(0.0..120.0)),
            controllable: true,
        })
        .collect();

    cfg.load = rng.random_bool(0.8).then(|| LoadConfig {
        activation_power_kw: rng.random_range(0.5..30.0),
        power_kw: rng.random_range(0.5..30.0),
        min_runtime_per_activation_minutes: 15 * rng.random_range(0..=8),
        min_runtime_daily_minutes: 15 * rng.random_range(0..=24),
        deadline_hour: rng.random_range(0..=23),
    });

    let stop_discharge = rng.random_range(0.0..60.0);
    let stop_charge = rng.random_range(0.0..40.0);
    cfg.peak_shaving.stop_discharge_kw = stop_discharge;
    cfg.peak_shaving.start_discharge_kw = stop_discharge + rng.random_range(0.0..20.0);
    cfg.peak_shaving.stop_charge_kw = stop_charge;
    cfg.peak_shaving.start_charge_kw = stop_charge + rng.random_range(0.0..20.0);

    cfg.trading.enabled = rng.random_bool(0.7);
    cfg
}

/// Random quarter-hour series for `cfg`, starting at midnight.
///
/// Consumption stays at or below 90% of the import limit and PV within the
/// installed capacity, so every slot has a feasible dispatch. Prices dip
/// below zero in occasional runs, and some slots carry trading signals with
/// requests up to half again the battery's rates.
pub fn random_series(rng: &mut StdRng, cfg: &SiteConfig, n: usize) -> Vec<Slot> {
    let start = at(0, 0);
    let max_consumption = 0.9 * cfg.grid.import_limit_kw;
    let capacity = cfg.total_inverter_capacity_kw();
    let max_charge = cfg.battery.max_charge_kw;
    let max_discharge = cfg.battery.max_discharge_kw;
    let mut negative_run = 0usize;
    (0..n)
        .map(|i| {
            if negative_run == 0 && rng.random_bool(0.05) {
                negative_run = rng.random_range(1..12);
            }
            let price = if negative_run > 0 {
                negative_run -= 1;
                rng.random_range(-60.0..0.0)
            } else {
                rng.random_range(0.0..300.0)
            };
            let injection = if rng.random_bool(0.1) {
                rng.random_range(-40.0..0.0)
            } else {
                price * rng.random_range(0.2..0.9)
            };
            let hour = (i / 4) % 24;
            let pv = if (6..20).contains(&hour) {
                rng.random_range(0.0..=capacity)
            } else {
                0.0
            };
            let slot = Slot::new(start + TimeDelta::minutes(15 * i as i64))
                .with_prices(price, injection)
                .with_consumption(rng.random_range(0.0..=max_consumption))
                .with_pv(pv);
            match rng.random_range(0..20) {
                0 | 1 => slot.with_trading(TradingSignal::Standby, None),
                2..=4 => {
                    let requested = rng.random_range(-1.5 * max_discharge..=1.5 * max_charge);
                    slot.with_trading(TradingSignal::Overrule, Some(requested))
                }
                5 => slot.with_trading(TradingSignal::Local, None),
                _ => slot,
            }
        })
        .collect()
}
