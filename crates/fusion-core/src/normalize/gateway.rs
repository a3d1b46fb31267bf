// Gateway (data logger) records: configuration signals plus the static
// info of every device the gateway monitors.

use serde_json::Value;

use fusion_api::ChildDevice;

use crate::mapping::{SignalMapping, lookup, snake_case};
use crate::model::{ChildSummary, FieldMap, Measurement, NormalizedRecord, unescape_html};
use crate::signals::{extract_signals, readings};

use super::DeviceContext;

pub fn child_summary(child: &ChildDevice) -> ChildSummary {
    ChildSummary {
        name: unescape_html(&child.name),
        status: child.status.clone(),
        device_type: child.moc_type_name.clone(),
        model: child.model().unwrap_or_default(),
        version: child.version().unwrap_or_default(),
        serial_number: child.serial().unwrap_or_default(),
    }
}

pub fn normalize_gateway(
    raw: &Value,
    children: &[ChildDevice],
    ctx: &DeviceContext,
    mapping: &SignalMapping,
) -> NormalizedRecord {
    let signals = extract_signals(raw);
    let mut fields = FieldMap::new();
    let mut model = None;
    let mut sn = None;

    for reading in readings(&signals) {
        match reading.id {
            ChildDevice::PARAM_MODEL => model = Some(reading.value.to_string()),
            ChildDevice::PARAM_SERIAL => sn = Some(reading.value.to_string()),
            _ => {}
        }

        let key = lookup(&mapping.gateway, reading.id, reading.name)
            .or_else(|| lookup(&mapping.sensor, reading.id, reading.name))
            .map_or_else(|| snake_case(reading.label()), str::to_owned);
        if key.is_empty() {
            continue;
        }
        fields.insert_default(&key, reading.value);
    }

    let mut record = ctx.record(Measurement::Gateway, fields);
    if record.model.is_empty() {
        record.model = model.unwrap_or_default();
    }
    if record.sn.is_empty() {
        record.sn = sn.unwrap_or_default();
    }
    record.children = children.iter().map(child_summary).collect();
    record
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::config::SiteRef;
    use crate::model::FieldValue;

    fn field_text(fields: &FieldMap, key: &str) -> String {
        fields.get(key).map(FieldValue::to_string).unwrap_or_default()
    }

    fn child(dn: &str, name: &str, model: &str, sn: &str) -> ChildDevice {
        let mut child = ChildDevice {
            dn: dn.into(),
            name: name.into(),
            status: "CONNECTED".into(),
            moc_type_name: "Inverter".into(),
            ..ChildDevice::default()
        };
        child.param_values.insert("50009".into(), model.into());
        child.param_values.insert("50010".into(), "V300R023".into());
        child.param_values.insert("50012".into(), sn.into());
        child
    }

    #[test]
    fn config_signals_and_children() {
        let mut mapping = SignalMapping::default();
        mapping.gateway.insert("10051".into(), "ip_address".into());

        let raw = json!({"data": [
            {"id": 10051, "name": "IP address", "value": "192.168.0.10"},
            {"id": 50009, "name": "Model", "value": "SmartLogger3000A"},
            {"id": 50012, "name": "SN", "value": "102XYZ"},
            {"id": 21029, "name": "Logger Temperature(°)", "value": "41"},
        ]});
        let children = vec![child("NE=11", "INV&amp;1", "SUN2000-100KTL", "SN1")];
        let ctx = DeviceContext::new(&SiteRef::default(), "Smartlogger_1", "NE=100");
        let record = normalize_gateway(&raw, &children, &ctx, &mapping);

        assert_eq!(field_text(&record.fields, "ip_address"), "192.168.0.10");
        assert_eq!(field_text(&record.fields, "model"), "SmartLogger3000A");
        assert_eq!(field_text(&record.fields, "logger_temperature"), "41");
        assert_eq!(record.model, "SmartLogger3000A");
        assert_eq!(record.sn, "102XYZ");
        assert_eq!(record.measurement, Measurement::Gateway);
        assert_eq!(
            record.children,
            vec![ChildSummary {
                name: "INV&1".into(),
                status: "CONNECTED".into(),
                device_type: "Inverter".into(),
                model: "SUN2000-100KTL".into(),
                version: "V300R023".into(),
                serial_number: "SN1".into(),
            }]
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["children"][0]["type"], "Inverter");
    }
}
