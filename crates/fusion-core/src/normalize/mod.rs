// ── Signal normalization ──
//
// Pure transforms from raw device payloads to `NormalizedRecord`s. Nothing
// here does I/O; the harvester feeds payloads in and collects records.

pub mod gateway;
pub mod inverter;
pub mod meter;
pub mod plant;
pub mod sensor;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use strum::{Display, EnumString};

use fusion_api::{ChildDevice, SocialContribution, StationKpi};

use crate::config::SiteRef;
use crate::ids::stable_id;
use crate::mapping::SignalMapping;
use crate::model::{ClassifiedDevice, FieldMap, Measurement, NormalizedRecord};

pub use inverter::{StringIds, StringReading, string_ids, string_readings};

/// Identity and static info stamped onto every record of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    pub site_name: String,
    pub site_dn: String,
    pub name: String,
    pub dn: String,
    pub model: String,
    pub sn: String,
    pub timestamp: DateTime<Utc>,
}

impl DeviceContext {
    pub fn new(site: &SiteRef, name: impl Into<String>, dn: impl Into<String>) -> Self {
        Self {
            site_name: site.name.clone(),
            site_dn: site.id.clone(),
            name: name.into(),
            dn: dn.into(),
            model: String::new(),
            sn: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn for_device(site: &SiteRef, device: &ClassifiedDevice) -> Self {
        Self::new(site, device.name(), device.dn())
    }

    /// Take model and serial number from a gateway's children list entry.
    pub fn with_static_info(mut self, info: Option<&ChildDevice>) -> Self {
        if let Some(info) = info {
            self.model = info.model().unwrap_or_default();
            self.sn = info.serial().unwrap_or_default();
        }
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub(crate) fn record(&self, measurement: Measurement, fields: FieldMap) -> NormalizedRecord {
        NormalizedRecord {
            timestamp: self.timestamp,
            sitename: self.site_name.clone(),
            siteid: stable_id(&self.site_dn),
            name: self.name.clone(),
            id: stable_id(&self.dn),
            model: self.model.clone(),
            sn: self.sn.clone(),
            measurement,
            fields,
            children: Vec::new(),
        }
    }
}

/// Payload kinds the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum PayloadKind {
    /// Realtime payload, optionally merged with string KPI data.
    Inverter,
    /// Detailed inverter view with raw string readings.
    InverterDetail,
    /// String KPI payload alone.
    Strings,
    Meter,
    Sensor,
    Gateway,
}

/// Applies a [`SignalMapping`] to raw device payloads.
#[derive(Debug, Clone, Default)]
pub struct SignalNormalizer {
    mapping: Arc<SignalMapping>,
}

impl SignalNormalizer {
    pub fn new(mapping: Arc<SignalMapping>) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &SignalMapping {
        &self.mapping
    }

    pub fn inverter(
        &self,
        realtime: &Value,
        strings: Option<&Value>,
        ctx: &DeviceContext,
    ) -> NormalizedRecord {
        inverter::normalize_inverter(realtime, strings, ctx, &self.mapping)
    }

    pub fn inverter_detail(
        &self,
        realtime: &Value,
        strings: Option<&Value>,
        ctx: &DeviceContext,
    ) -> NormalizedRecord {
        inverter::normalize_inverter_detail(realtime, strings, ctx, &self.mapping)
    }

    pub fn strings(&self, raw: &Value, ctx: &DeviceContext) -> NormalizedRecord {
        inverter::normalize_strings(raw, ctx)
    }

    pub fn meter(&self, raw: &Value, ctx: &DeviceContext) -> NormalizedRecord {
        meter::normalize_meter(raw, ctx, &self.mapping)
    }

    pub fn sensor(&self, raw: &Value, ctx: &DeviceContext) -> NormalizedRecord {
        sensor::normalize_sensor(raw, ctx, &self.mapping)
    }

    pub fn gateway(
        &self,
        raw: &Value,
        children: &[ChildDevice],
        ctx: &DeviceContext,
    ) -> NormalizedRecord {
        gateway::normalize_gateway(raw, children, ctx, &self.mapping)
    }

    pub fn plant(
        &self,
        kpi: Option<&StationKpi>,
        social: Option<&SocialContribution>,
        site: &SiteRef,
        timestamp: DateTime<Utc>,
    ) -> NormalizedRecord {
        plant::normalize_plant(kpi, social, site, timestamp)
    }

    /// Dispatch on `kind`. `extra` is the string KPI payload for inverter kinds.
    pub fn normalize(
        &self,
        kind: PayloadKind,
        raw: &Value,
        extra: Option<&Value>,
        ctx: &DeviceContext,
    ) -> NormalizedRecord {
        match kind {
            PayloadKind::Inverter => self.inverter(raw, extra, ctx),
            PayloadKind::InverterDetail => self.inverter_detail(raw, extra, ctx),
            PayloadKind::Strings => self.strings(raw, ctx),
            PayloadKind::Meter => self.meter(raw, ctx),
            PayloadKind::Sensor => self.sensor(raw, ctx),
            PayloadKind::Gateway => self.gateway(raw, &[], ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn context_stamps_stable_ids() {
        let site = SiteRef {
            id: "NE=1".into(),
            name: "Plant A".into(),
        };
        let ctx = DeviceContext::new(&site, "INV-1", "NE=11");
        let record = ctx.record(Measurement::Inverter, FieldMap::new());
        assert_eq!(record.siteid, stable_id("NE=1"));
        assert_eq!(record.id, stable_id("NE=11"));
        assert_eq!(record.sitename, "Plant A");
    }

    #[test]
    fn static_info_fills_model_and_sn() {
        let site = SiteRef::default();
        let mut child = ChildDevice::default();
        child
            .param_values
            .insert(ChildDevice::PARAM_MODEL.into(), "SUN2000-100KTL".into());
        child
            .param_values
            .insert(ChildDevice::PARAM_SERIAL.into(), "SN123".into());
        let ctx = DeviceContext::new(&site, "INV", "NE=2").with_static_info(Some(&child));
        assert_eq!(ctx.model, "SUN2000-100KTL");
        assert_eq!(ctx.sn, "SN123");
    }

    #[test]
    fn payload_kinds_parse_from_cli_names() {
        assert_eq!("inverter-detail".parse::<PayloadKind>().unwrap(), PayloadKind::InverterDetail);
        assert_eq!("Meter".parse::<PayloadKind>().unwrap(), PayloadKind::Meter);
        assert!("plant".parse::<PayloadKind>().is_err());
    }
}
