// ── Normalized output records ──
//
// The shape every sink receives. Field maps keep insertion order in
// memory but always serialize in presentation order: plain keys first,
// then PV string keys grouped by index.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use strum::{Display, EnumString};

/// A single canonical field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Numeric view. Numeric strings are parsed; booleans are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    pub fn is_nonzero(&self) -> bool {
        self.as_f64().is_some_and(|n| n != 0.0)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ── FieldMap ─────────────────────────────────────────────────────────

/// Canonical field map for one record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(IndexMap<String, FieldValue>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any earlier value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Set a field only if it is not already present.
    pub fn insert_default(&mut self, key: &str, value: impl Into<FieldValue>) {
        if !self.0.contains_key(key) {
            self.0.insert(key.to_owned(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys in presentation order.
    pub fn ordered_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        keys.sort_by(|a, b| compare_field_keys(a, b));
        keys
    }

    /// Entries in presentation order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.ordered_keys()
            .into_iter()
            .filter_map(|k| self.0.get_key_value(k).map(|(k, v)| (k.as_str(), v)))
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.iter_ordered() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Split `pv<digits>_<suffix>` into its index and suffix.
pub fn parse_string_key(key: &str) -> Option<(u32, &str)> {
    let rest = key.strip_prefix("pv")?;
    let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    let (digits, tail) = rest.split_at(digits_end);
    let suffix = tail.strip_prefix('_')?;
    if suffix.is_empty() {
        return None;
    }
    Some((digits.parse().ok()?, suffix))
}

fn suffix_rank(suffix: &str) -> u8 {
    match suffix {
        "status" => 0,
        "voltage" | "volt_v" => 1,
        "current" | "amp_a" => 2,
        _ => 3,
    }
}

/// Presentation order for field keys.
pub fn compare_field_keys(a: &str, b: &str) -> Ordering {
    match (parse_string_key(a), parse_string_key(b)) {
        (None, None) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some((ia, sa)), Some((ib, sb))) => ia
            .cmp(&ib)
            .then_with(|| suffix_rank(sa).cmp(&suffix_rank(sb)))
            .then_with(|| sa.cmp(sb)),
    }
}

// ── Records ──────────────────────────────────────────────────────────

/// Measurement tag carried by every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Measurement {
    Inverter,
    Meter,
    Sensor,
    Gateway,
    Plant,
}

/// Static info for one device attached to a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSummary {
    pub name: String,
    pub status: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub model: String,
    pub version: String,
    pub serial_number: String,
}

/// One normalized telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub sitename: String,
    pub siteid: String,
    pub name: String,
    pub id: String,
    pub model: String,
    pub sn: String,
    pub measurement: Measurement,
    pub fields: FieldMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildSummary>,
}

/// Records produced for one site during one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordBatch {
    pub site_id: String,
    pub site_name: String,
    pub collected_at: DateTime<Utc>,
    pub records: Vec<NormalizedRecord>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
