// Typed portal payloads.
//
// Device and topology responses stay as `serde_json::Value` because their
// shape varies per endpoint and firmware; the station endpoints and the
// children list are stable enough to deserialize directly.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Station KPI block from `station-kpi-data`.
///
/// Most energy figures arrive as decimal strings; they are parsed leniently
/// and fall back to zero.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StationKpi {
    #[serde(deserialize_with = "lenient_f64")]
    pub daily_energy: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub cumulative_energy: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub inverter_power: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub daily_income: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub total_charge_energy: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub total_discharge_energy: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub daily_charge_energy: f64,
    #[serde(rename = "dailyOnGridEnergy", deserialize_with = "lenient_f64")]
    pub daily_on_grid_energy: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub daily_charge_capacity: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub daily_discharge_capacity: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub cumulative_charge_capacity: f64,
    #[serde(
        alias = "cumulativeDisChargeCapacity",
        deserialize_with = "lenient_f64"
    )]
    pub cumulative_discharge_capacity: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub battery_capacity: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub rechargeable_energy: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub re_dischargeable_energy: f64,
    #[serde(deserialize_with = "lenient_i64")]
    pub currency: i64,
    pub is_price_configured: bool,
}

/// Environmental contribution figures from `social-contribution`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocialContribution {
    #[serde(deserialize_with = "lenient_f64")]
    pub co2_reduction: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub co2_reduction_by_year: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub equivalent_tree_planting: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub equivalent_tree_planting_by_year: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub standard_coal_savings: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub standard_coal_savings_by_year: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SocialEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<SocialContribution>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A device attached to a gateway, as listed by `children-list`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChildDevice {
    pub dn: String,
    pub name: String,
    pub parent_name: String,
    pub moc_type_name: String,
    pub status: String,
    pub param_values: HashMap<String, Value>,
}

impl ChildDevice {
    /// Configuration parameter carrying the device model.
    pub const PARAM_MODEL: &'static str = "50009";
    /// Configuration parameter carrying the firmware version.
    pub const PARAM_VERSION: &'static str = "50010";
    /// Configuration parameter carrying the serial number.
    pub const PARAM_SERIAL: &'static str = "50012";

    fn param(&self, key: &str) -> Option<String> {
        match self.param_values.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn model(&self) -> Option<String> {
        self.param(Self::PARAM_MODEL)
    }

    pub fn version(&self) -> Option<String> {
        self.param(Self::PARAM_VERSION)
    }

    pub fn serial(&self) -> Option<String> {
        self.param(Self::PARAM_SERIAL)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChildrenEnvelope {
    #[serde(default)]
    pub data: Vec<ChildDevice>,
}

/// Accept a number, a numeric string, or anything else as zero.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn kpi_parses_string_figures() {
        let raw = serde_json::json!({
            "dailyEnergy": "123.4",
            "cumulativeEnergy": "--",
            "inverterPower": 56.7,
            "cumulativeDisChargeCapacity": "8",
            "currency": 3,
            "isPriceConfigured": true
        });
        let kpi: StationKpi = serde_json::from_value(raw).unwrap();
        assert!((kpi.daily_energy - 123.4).abs() < f64::EPSILON);
        assert!(kpi.cumulative_energy.abs() < f64::EPSILON);
        assert!((kpi.inverter_power - 56.7).abs() < f64::EPSILON);
        assert!((kpi.cumulative_discharge_capacity - 8.0).abs() < f64::EPSILON);
        assert_eq!(kpi.currency, 3);
        assert!(kpi.is_price_configured);
    }

    #[test]
    fn child_params_expose_model_and_serial() {
        let raw = serde_json::json!({
            "dn": "NE=1",
            "name": "INV-01",
            "paramValues": { "50009": "SUN2000-100KTL", "50012": "SN123", "50010": "" }
        });
        let child: ChildDevice = serde_json::from_value(raw).unwrap();
        assert_eq!(child.model().as_deref(), Some("SUN2000-100KTL"));
        assert_eq!(child.serial().as_deref(), Some("SN123"));
        assert_eq!(child.version(), None);
    }
}
