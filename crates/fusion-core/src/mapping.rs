// ── Signal field mapping tables ──
//
// Operator-supplied tables from signal id (or display name) to canonical
// field name. Loaded once at startup by the config crate.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One table: id or display name → canonical field name.
pub type FieldTable = IndexMap<String, String>;

/// Every mapping table the normalizers consult.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalMapping {
    /// Detailed inverter view.
    pub inverter: FieldTable,
    /// Realtime fields of the unified inverter record.
    pub unified_inverter: FieldTable,
    pub meter: FieldTable,
    pub sensor: FieldTable,
    #[serde(alias = "smart_logger", alias = "smartlogger")]
    pub gateway: FieldTable,
}

impl SignalMapping {
    pub fn is_empty(&self) -> bool {
        self.inverter.is_empty()
            && self.unified_inverter.is_empty()
            && self.meter.is_empty()
            && self.sensor.is_empty()
            && self.gateway.is_empty()
    }
}

/// Look a signal up by id first, then by display name.
pub fn lookup<'a>(table: &'a FieldTable, id: &str, name: Option<&str>) -> Option<&'a str> {
    table
        .get(id)
        .or_else(|| name.and_then(|n| table.get(n)))
        .map(String::as_str)
}

/// Canonical key for an unmapped display name: lowercase, every run of
/// non-alphanumeric characters collapsed to `_`, no leading or trailing `_`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn snake_case_collapses_separators() {
        assert_eq!(snake_case("Wind speed"), "wind_speed");
        assert_eq!(snake_case("Wind direction(°)"), "wind_direction");
        assert_eq!(snake_case("Relative humidity (%)"), "relative_humidity");
        assert_eq!(snake_case("  IP  Address "), "ip_address");
        assert_eq!(snake_case("PV-1/Temp"), "pv_1_temp");
        assert_eq!(snake_case("(%)"), "");
    }

    #[test]
    fn lookup_prefers_id() {
        let mut table = FieldTable::new();
        table.insert("10008".into(), "p_out_kw".into());
        table.insert("Wind speed".into(), "wind_speed_ms".into());
        assert_eq!(lookup(&table, "10008", Some("Wind speed")), Some("p_out_kw"));
        assert_eq!(lookup(&table, "1", Some("Wind speed")), Some("wind_speed_ms"));
        assert_eq!(lookup(&table, "1", None), None);
    }

    #[test]
    fn gateway_table_accepts_legacy_key() {
        let mapping: SignalMapping =
            serde_json::from_str(r#"{"smart_logger": {"IP": "ip_address"}}"#).unwrap();
        assert_eq!(mapping.gateway.get("IP").map(String::as_str), Some("ip_address"));
        assert!(mapping.meter.is_empty());
        assert!(!mapping.is_empty());
    }
}
