// ── Raw signal extraction ──
//
// Device endpoints answer in several layouts. Shape detection happens once
// per payload; everything downstream works on the flat `RawSignalSet`.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::model::FieldValue;

/// Signal id → signal object (carrying at least `value`), in payload order.
pub type RawSignalSet = IndexMap<String, Value>;

/// String values the portal uses for "no reading".
const ABSENT_SENTINELS: [&str; 3] = ["Unidentified", "", "--"];

/// Layout of a device payload's `data` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// `data: [{ signals: [...] }, ...]`
    NestedList,
    /// `data: [{ id, value }, ...]`
    FlatList,
    /// `data: { signals: { "<id>": {...} } }`
    SignalMap,
    /// `data: { signals: [{ id, value }, ...] }`
    SignalList,
    /// `data: { data: [...] }`, the inner list read as nested or flat.
    LegacyNested,
    Unknown,
}

impl PayloadShape {
    pub fn detect(raw: &Value) -> Self {
        match raw.get("data") {
            Some(Value::Array(items)) => list_shape(items),
            Some(data @ Value::Object(_)) => match (data.get("signals"), data.get("data")) {
                (Some(Value::Object(_)), _) => Self::SignalMap,
                (Some(Value::Array(_)), _) => Self::SignalList,
                (_, Some(Value::Array(_))) => Self::LegacyNested,
                _ => Self::Unknown,
            },
            _ => Self::Unknown,
        }
    }
}

fn list_shape(items: &[Value]) -> PayloadShape {
    let nested = items
        .iter()
        .any(|item| item.get("signals").is_some_and(Value::is_array));
    if nested {
        PayloadShape::NestedList
    } else {
        PayloadShape::FlatList
    }
}

/// Flatten a device payload into a [`RawSignalSet`].
pub fn extract_signals(raw: &Value) -> RawSignalSet {
    let mut signals = RawSignalSet::new();
    let data = raw.get("data");

    match PayloadShape::detect(raw) {
        PayloadShape::NestedList | PayloadShape::FlatList => {
            if let Some(Value::Array(items)) = data {
                read_list(&mut signals, items);
            }
        }
        PayloadShape::SignalMap => {
            if let Some(Value::Object(map)) = data.and_then(|d| d.get("signals")) {
                for (id, signal) in map {
                    signals.insert(id.clone(), signal.clone());
                }
            }
        }
        PayloadShape::SignalList => {
            if let Some(Value::Array(items)) = data.and_then(|d| d.get("signals")) {
                merge_signals(&mut signals, items);
            }
        }
        PayloadShape::LegacyNested => {
            if let Some(Value::Array(items)) = data.and_then(|d| d.get("data")) {
                read_list(&mut signals, items);
            }
        }
        PayloadShape::Unknown => {}
    }

    signals
}

fn read_list(target: &mut RawSignalSet, items: &[Value]) {
    match list_shape(items) {
        PayloadShape::NestedList => {
            for item in items {
                if let Some(Value::Array(list)) = item.get("signals") {
                    merge_signals(target, list);
                }
            }
        }
        _ => merge_signals(target, items),
    }
}

/// Add list-form signals to `target`, keyed by their `id`. First id wins.
pub fn merge_signals(target: &mut RawSignalSet, items: &[Value]) {
    for (index, item) in items.iter().enumerate() {
        let Some(id) = signal_id(item) else {
            debug!(index, "dropping signal without a usable id");
            continue;
        };
        target.entry(id).or_insert_with(|| item.clone());
    }
}

fn signal_id(item: &Value) -> Option<String> {
    match item.as_object()?.get("id")? {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.to_string()),
            None => n.as_f64().map(|f| format!("{f:.0}")),
        },
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Merge two signal sets. Entries from `first` win on id collisions.
pub fn merge(first: &RawSignalSet, second: &RawSignalSet) -> RawSignalSet {
    let mut merged = first.clone();
    for (id, signal) in second {
        merged.entry(id.clone()).or_insert_with(|| signal.clone());
    }
    merged
}

/// Read a signal's value. Sentinels and nulls are absent.
pub fn signal_value(signals: &RawSignalSet, id: &str) -> Option<FieldValue> {
    let value = signals.get(id)?.as_object()?.get("value")?;
    to_field_value(value)
}

/// Convert a raw JSON value to a field value, treating sentinels as absent.
pub fn to_field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::String(s) => {
            if ABSENT_SENTINELS.contains(&s.as_str()) {
                return None;
            }
            match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Some(FieldValue::Number(n)),
                _ => Some(FieldValue::Text(s.clone())),
            }
        }
        Value::Number(n) => n.as_f64().map(FieldValue::Number),
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// One present signal with its display name.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalReading<'a> {
    pub id: &'a str,
    pub name: Option<&'a str>,
    pub value: FieldValue,
}

impl SignalReading<'_> {
    /// Display name when the payload carries one, otherwise the id.
    pub fn label(&self) -> &str {
        self.name.unwrap_or(self.id)
    }
}

/// Every signal with a present value, in payload order.
pub fn readings(signals: &RawSignalSet) -> impl Iterator<Item = SignalReading<'_>> {
    signals.iter().filter_map(|(id, signal)| {
        let value = to_field_value(signal.as_object()?.get("value")?)?;
        let name = signal
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty());
        Some(SignalReading {
            id: id.as_str(),
            name,
            value,
        })
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn detects_each_shape() {
        let cases = [
            (json!({"data": [{"signals": [{"id": 1, "value": 1}]}]}), PayloadShape::NestedList),
            (json!({"data": [{"id": 1, "value": 1}]}), PayloadShape::FlatList),
            (json!({"data": {"signals": {"1": {"value": 1}}}}), PayloadShape::SignalMap),
            (json!({"data": {"signals": [{"id": 1, "value": 1}]}}), PayloadShape::SignalList),
            (json!({"data": {"data": [{"signals": []}]}}), PayloadShape::LegacyNested),
            (json!({"data": {"other": 1}}), PayloadShape::Unknown),
            (json!({"success": true}), PayloadShape::Unknown),
            (json!("text"), PayloadShape::Unknown),
        ];
        for (raw, expected) in cases {
            assert_eq!(PayloadShape::detect(&raw), expected, "{raw}");
        }
    }

    #[test]
    fn nested_list_merges_first_wins() {
        let raw = json!({
            "data": [
                {"signals": [{"id": 10008, "value": "34.5"}, {"id": "10018", "value": "1"}]},
                {"signals": [{"id": "10008", "value": "99"}, {"value": "no id"}]},
                "not an object",
            ]
        });
        let signals = extract_signals(&raw);
        assert_eq!(signals.len(), 2);
        assert_eq!(signal_value(&signals, "10008"), Some(FieldValue::Number(34.5)));
    }

    #[test]
    fn float_ids_are_rounded() {
        let raw = json!({"data": [{"id": 10025.0, "value": 7}]});
        let signals = extract_signals(&raw);
        assert!(signals.contains_key("10025"));
    }

    #[test]
    fn legacy_nested_reads_inner_list() {
        let nested = json!({"data": {"data": [{"signals": [{"id": 1, "value": 2}]}]}});
        let flat = json!({"data": {"data": [{"id": 3, "value": 4}]}});
        assert_eq!(signal_value(&extract_signals(&nested), "1"), Some(FieldValue::Number(2.0)));
        assert_eq!(signal_value(&extract_signals(&flat), "3"), Some(FieldValue::Number(4.0)));
    }

    #[test]
    fn signal_map_is_taken_as_is() {
        let raw = json!({"data": {"signals": {"11001": {"value": "600.1"}, "14001": {"value": "Normal"}}}});
        let signals = extract_signals(&raw);
        assert_eq!(signal_value(&signals, "11001"), Some(FieldValue::Number(600.1)));
        assert_eq!(signal_value(&signals, "14001"), Some(FieldValue::Text("Normal".into())));
    }

    #[test]
    fn sentinels_are_absent() {
        let raw = json!({"data": [
            {"id": 1, "value": "Unidentified"},
            {"id": 2, "value": ""},
            {"id": 3, "value": "--"},
            {"id": 4, "value": null},
            {"id": 5},
            {"id": 6, "value": true},
            {"id": 7, "value": 0},
        ]});
        let signals = extract_signals(&raw);
        for id in ["1", "2", "3", "4", "5", "missing"] {
            assert_eq!(signal_value(&signals, id), None, "id {id}");
        }
        assert_eq!(signal_value(&signals, "6"), Some(FieldValue::Bool(true)));
        assert_eq!(signal_value(&signals, "7"), Some(FieldValue::Number(0.0)));
    }

    #[test]
    fn merge_prefers_first_set() {
        let a = extract_signals(&json!({"data": [{"id": 1, "value": "a"}]}));
        let b = extract_signals(&json!({"data": [{"id": 1, "value": "b"}, {"id": 2, "value": "c"}]}));
        let merged = merge(&a, &b);
        assert_eq!(signal_value(&merged, "1"), Some(FieldValue::Text("a".into())));
        assert_eq!(signal_value(&merged, "2"), Some(FieldValue::Text("c".into())));
    }

    #[test]
    fn readings_use_names_when_present() {
        let raw = json!({"data": [
            {"id": 1, "name": "Wind speed", "value": "3.2"},
            {"id": 2, "value": "x"},
            {"id": 3, "name": "Empty", "value": "--"},
        ]});
        let signals = extract_signals(&raw);
        let labels: Vec<String> = readings(&signals).map(|r| r.label().to_owned()).collect();
        assert_eq!(labels, vec!["Wind speed", "2"]);
    }
}
