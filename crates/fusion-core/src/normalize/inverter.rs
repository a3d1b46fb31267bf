// Inverter records: unified view, detailed view, and PV string readings.

use serde_json::Value;

use crate::mapping::SignalMapping;
use crate::model::{FieldMap, FieldValue, Measurement, NormalizedRecord};
use crate::signals::{RawSignalSet, extract_signals, merge, signal_value};

use super::DeviceContext;

/// Highest string index the portal reports.
pub const MAX_STRINGS: u32 = 48;

/// Signal ids carrying one PV string's readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringIds {
    pub voltage: u32,
    pub current: u32,
    pub status: u32,
}

/// Ids for string `index` (1-based). Strings 1–24 use a stride of three
/// from 11001; strings 25–48 use a stride of two from 11070.
pub fn string_ids(index: u32) -> Option<StringIds> {
    let (voltage, current) = match index {
        1..=24 => (11001 + 3 * (index - 1), 11002 + 3 * (index - 1)),
        25..=MAX_STRINGS => (11070 + 2 * (index - 25), 11071 + 2 * (index - 25)),
        _ => return None,
    };
    Some(StringIds {
        voltage,
        current,
        status: 14000 + index,
    })
}

/// Present readings of one PV string.
#[derive(Debug, Clone, PartialEq)]
pub struct StringReading {
    pub index: u32,
    pub voltage: Option<FieldValue>,
    pub current: Option<FieldValue>,
    pub status: Option<FieldValue>,
}

impl StringReading {
    /// A string counts if it reports a status or any non-zero reading.
    pub fn is_included(&self) -> bool {
        self.status.is_some()
            || self.voltage.as_ref().is_some_and(FieldValue::is_nonzero)
            || self.current.as_ref().is_some_and(FieldValue::is_nonzero)
    }

    fn key(&self, suffix: &str) -> String {
        format!("pv{:02}_{suffix}", self.index)
    }
}

/// Every included string, in index order.
pub fn string_readings(signals: &RawSignalSet) -> Vec<StringReading> {
    (1..=MAX_STRINGS)
        .filter_map(|index| {
            let ids = string_ids(index)?;
            let reading = StringReading {
                index,
                voltage: signal_value(signals, &ids.voltage.to_string()),
                current: signal_value(signals, &ids.current.to_string()),
                status: signal_value(signals, &ids.status.to_string()),
            };
            reading.is_included().then_some(reading)
        })
        .collect()
}

fn merged_signals(realtime: &Value, strings: Option<&Value>) -> RawSignalSet {
    let realtime = extract_signals(realtime);
    match strings {
        Some(raw) => merge(&realtime, &extract_signals(raw)),
        None => realtime,
    }
}

/// Unified inverter record: mapped realtime fields, string voltage and
/// current, and the DC power those strings add up to.
pub fn normalize_inverter(
    realtime: &Value,
    strings: Option<&Value>,
    ctx: &DeviceContext,
    mapping: &SignalMapping,
) -> NormalizedRecord {
    let signals = merged_signals(realtime, strings);
    let mut fields = FieldMap::new();

    let mut dc_power_kw = 0.0;
    for reading in string_readings(&signals) {
        let volts = reading.voltage.clone().unwrap_or(FieldValue::Number(0.0));
        let amps = reading.current.clone().unwrap_or(FieldValue::Number(0.0));
        if reading.status.is_some() {
            if let (Some(v), Some(a)) = (volts.as_f64(), amps.as_f64()) {
                dc_power_kw += v * a / 1000.0;
            }
        }
        fields.insert(reading.key("volt_v"), volts);
        fields.insert(reading.key("amp_a"), amps);
    }
    fields.insert("dc_power_kw", dc_power_kw);

    for (id, key) in &mapping.unified_inverter {
        let value = signal_value(&signals, id).unwrap_or(FieldValue::Number(0.0));
        fields.insert(key.clone(), value);
    }
    fields.insert_default("p_peak_today_kw", 0.0);

    ctx.record(Measurement::Inverter, fields)
}

fn insert_detailed_strings(fields: &mut FieldMap, signals: &RawSignalSet) {
    for reading in string_readings(signals) {
        let key_status = reading.key("status");
        let key_voltage = reading.key("voltage");
        let key_current = reading.key("current");
        if let Some(status) = reading.status {
            fields.insert(key_status, status);
        }
        if let Some(voltage) = reading.voltage {
            fields.insert(key_voltage, voltage);
        }
        if let Some(current) = reading.current {
            fields.insert(key_current, current);
        }
    }
}

/// Detailed string record: only readings that are present.
pub fn normalize_strings(raw: &Value, ctx: &DeviceContext) -> NormalizedRecord {
    let mut fields = FieldMap::new();
    insert_detailed_strings(&mut fields, &extract_signals(raw));
    ctx.record(Measurement::Inverter, fields)
}

/// Detailed inverter record: present fields from the `inverter` table plus
/// detailed string readings.
pub fn normalize_inverter_detail(
    realtime: &Value,
    strings: Option<&Value>,
    ctx: &DeviceContext,
    mapping: &SignalMapping,
) -> NormalizedRecord {
    let signals = merged_signals(realtime, strings);
    let mut fields = FieldMap::new();
    for (id, key) in &mapping.inverter {
        if let Some(value) = signal_value(&signals, id) {
            fields.insert(key.clone(), value);
        }
    }
    insert_detailed_strings(&mut fields, &signals);
    ctx.record(Measurement::Inverter, fields)
}
