// Power meter records.

use serde_json::Value;

use crate::mapping::SignalMapping;
use crate::model::{FieldMap, FieldValue, Measurement, NormalizedRecord};
use crate::signals::{extract_signals, signal_value};

use super::DeviceContext;

/// Fields every meter record carries, zero when not reported.
pub const METER_FIELDS: [&str; 21] = [
    "phase_a_voltage_v",
    "phase_b_voltage_v",
    "phase_c_voltage_v",
    "line_ab_voltage_v",
    "line_bc_voltage_v",
    "line_ca_voltage_v",
    "phase_a_current_a",
    "phase_b_current_a",
    "phase_c_current_a",
    "phase_a_active_power_kw",
    "phase_b_active_power_kw",
    "phase_c_active_power_kw",
    "active_power_kw",
    "reactive_power_kvar",
    "power_factor",
    "total_active_energy_kwh",
    "total_reactive_energy_kvarh",
    "total_positive_active_energy_kwh",
    "total_positive_reactive_energy_kvarh",
    "total_negative_active_energy_kwh",
    "total_negative_reactive_energy_kvarh",
];

/// Meters report power in W/var; kilo-unit fields are scaled down.
fn scale(key: &str, value: FieldValue) -> FieldValue {
    if key.ends_with("_kw") || key.ends_with("_kvar") {
        if let Some(n) = value.as_f64() {
            return FieldValue::Number(n / 1000.0);
        }
    }
    value
}

pub fn normalize_meter(raw: &Value, ctx: &DeviceContext, mapping: &SignalMapping) -> NormalizedRecord {
    let signals = extract_signals(raw);
    let mut fields = FieldMap::new();

    for (id, key) in &mapping.meter {
        if let Some(value) = signal_value(&signals, id) {
            fields.insert(key.clone(), scale(key, value));
        }
    }
    for key in METER_FIELDS {
        fields.insert_default(key, 0.0);
    }

    ctx.record(Measurement::Meter, fields)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;
    use crate::config::SiteRef;

    fn ctx() -> DeviceContext {
        DeviceContext::new(&SiteRef::default(), "Meter-1", "NE=12")
    }

    #[test]
    fn kilo_fields_are_scaled_and_defaults_filled() {
        let mut mapping = SignalMapping::default();
        mapping.meter.insert("10004".into(), "active_power_kw".into());
        mapping.meter.insert("10005".into(), "reactive_power_kvar".into());
        mapping.meter.insert("10001".into(), "phase_a_voltage_v".into());
        mapping.meter.insert("10009".into(), "total_active_energy_kwh".into());

        let raw = json!({"data": [{"signals": [
            {"id": 10004, "value": "12500"},
            {"id": 10005, "value": -300},
            {"id": 10001, "value": "230.1"},
            {"id": 10009, "value": "9876"},
        ]}]});
        let record = normalize_meter(&raw, &ctx(), &mapping);
        let get = |k: &str| record.fields.get(k).and_then(FieldValue::as_f64).unwrap();

        assert_eq!(get("active_power_kw"), 12.5);
        assert_eq!(get("reactive_power_kvar"), -0.3);
        assert_eq!(get("phase_a_voltage_v"), 230.1);
        assert_eq!(get("total_active_energy_kwh"), 9876.0);
        assert_eq!(get("phase_c_current_a"), 0.0);
        assert_eq!(record.fields.len(), METER_FIELDS.len());
        assert_eq!(record.measurement, Measurement::Meter);
    }

    #[test]
    fn text_values_are_not_scaled() {
        let mut mapping = SignalMapping::default();
        mapping.meter.insert("1".into(), "active_power_kw".into());
        let raw = json!({"data": [{"id": 1, "value": "offline"}]});
        let record = normalize_meter(&raw, &ctx(), &mapping);
        assert_eq!(
            record.fields.get("active_power_kw"),
            Some(&FieldValue::Text("offline".into()))
        );
    }
}
