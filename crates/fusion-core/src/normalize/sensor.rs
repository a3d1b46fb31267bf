// Environmental sensor records.

use serde_json::Value;

use crate::mapping::{SignalMapping, lookup, snake_case};
use crate::model::{FieldMap, Measurement, NormalizedRecord};
use crate::signals::{extract_signals, readings};

use super::DeviceContext;

/// Fields every sensor record carries, zero when not reported.
pub const SENSOR_FIELDS: [&str; 12] = [
    "wind_speed_ms",
    "wind_direction_deg",
    "pv_module_temperature_c",
    "ambient_temperature_c",
    "total_irradiance_wm2",
    "daily_irradiation1_mjm2",
    "total_irradiance2_wm2",
    "daily_irradiation2_mjm2",
    "custom1",
    "custom2",
    "daily_irradiation1_kwhm2",
    "daily_irradiation2_kwhm2",
];

/// Placeholder the loggers report for unwired custom channels.
pub const CUSTOM_CHANNEL_UNSET: f64 = 3276.7;

pub fn normalize_sensor(raw: &Value, ctx: &DeviceContext, mapping: &SignalMapping) -> NormalizedRecord {
    let signals = extract_signals(raw);
    let mut fields = FieldMap::new();

    for reading in readings(&signals) {
        let key = lookup(&mapping.sensor, reading.id, reading.name)
            .map_or_else(|| snake_case(reading.label()), str::to_owned);
        if key.is_empty() {
            continue;
        }
        fields.insert_default(&key, reading.value);
    }

    for key in SENSOR_FIELDS {
        let default = match key {
            "custom1" | "custom2" => CUSTOM_CHANNEL_UNSET,
            _ => 0.0,
        };
        fields.insert_default(key, default);
    }

    ctx.record(Measurement::Sensor, fields)
}
