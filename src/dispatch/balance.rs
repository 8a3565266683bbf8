//! Site power balance at the grid connection.

/// Computes net grid flow at the connection point.
///
/// Inputs are magnitudes except `battery_kw`, which carries its own sign:
/// - `consumption_kw` - baseline consumption (positive)
/// - `load_kw` - controllable load draw, zero when off (positive)
/// - `pv_output_kw` - PV output after the setpoint is applied (positive)
/// - `battery_kw` - positive = charge, negative = discharge
///
/// # Returns
///
/// Net grid flow in kW (positive = import, negative = export)
pub fn site_net_kw(consumption_kw: f32, load_kw: f32, pv_output_kw: f32, battery_kw: f32) -> f32 {
    consumption_kw + load_kw + battery_kw - pv_output_kw
}
