// Plant overview records built from station KPI and social contribution.

use chrono::{DateTime, Utc};

use fusion_api::{SocialContribution, StationKpi};

use crate::config::SiteRef;
use crate::ids::stable_id;
use crate::model::{FieldMap, Measurement, NormalizedRecord};

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn kpi_fields(fields: &mut FieldMap, kpi: &StationKpi) {
    fields.insert("daily_energy", kpi.daily_energy);
    fields.insert("cumulative_energy", kpi.cumulative_energy);
    fields.insert("daily_income", kpi.daily_income);
    fields.insert("daily_charge_capacity", kpi.daily_charge_capacity);
    fields.insert("daily_discharge_capacity", kpi.daily_discharge_capacity);
    fields.insert("total_charge_energy", kpi.total_charge_energy);
    fields.insert("total_discharge_energy", kpi.total_discharge_energy);
    fields.insert("cumulative_charge_capacity", kpi.cumulative_charge_capacity);
    fields.insert("cumulative_discharge_capacity", kpi.cumulative_discharge_capacity);
    fields.insert("inverter_power", kpi.inverter_power);
    fields.insert("battery_capacity", kpi.battery_capacity);
    fields.insert("currency", kpi.currency as f64);
    fields.insert("is_price_configured", kpi.is_price_configured);
    fields.insert("daily_charge_energy", kpi.daily_charge_energy);
    fields.insert("daily_ongrid_energy", kpi.daily_on_grid_energy);
    fields.insert("rechargeable_energy", kpi.rechargeable_energy);
    fields.insert("redischargeable_energy", kpi.re_dischargeable_energy);
}

fn social_fields(fields: &mut FieldMap, social: &SocialContribution) {
    fields.insert("co2_reduction", social.co2_reduction);
    fields.insert("co2_reduction_by_year", social.co2_reduction_by_year);
    fields.insert("equivalent_trees", social.equivalent_tree_planting);
    fields.insert("equivalent_trees_by_year", social.equivalent_tree_planting_by_year);
    fields.insert("standard_coal_savings", social.standard_coal_savings);
    fields.insert("standard_coal_savings_by_year", social.standard_coal_savings_by_year);
}

/// One `plant` record for a site. Either source may be missing.
pub fn normalize_plant(
    kpi: Option<&StationKpi>,
    social: Option<&SocialContribution>,
    site: &SiteRef,
    timestamp: DateTime<Utc>,
) -> NormalizedRecord {
    let mut fields = FieldMap::new();
    if let Some(kpi) = kpi {
        kpi_fields(&mut fields, kpi);
    }
    if let Some(social) = social {
        social_fields(&mut fields, social);
    }

    let siteid = stable_id(&site.id);
    NormalizedRecord {
        timestamp,
        sitename: site.name.clone(),
        siteid: siteid.clone(),
        name: site.name.clone(),
        id: siteid,
        model: String::new(),
        sn: String::new(),
        measurement: Measurement::Plant,
        fields,
        children: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::model::FieldValue;

    #[test]
    fn kpi_and_social_fields() {
        let kpi: StationKpi = serde_json::from_value(serde_json::json!({
            "dailyEnergy": "123.4",
            "cumulativeEnergy": 5000,
            "currency": "1",
            "isPriceConfigured": true,
            "dailyOnGridEnergy": "100",
        }))
        .unwrap();
        let social = SocialContribution {
            co2_reduction: 2.5,
            equivalent_tree_planting: 10.0,
            ..SocialContribution::default()
        };
        let site = SiteRef {
            id: "NE=1".into(),
            name: "Plant A".into(),
        };
        let record = normalize_plant(Some(&kpi), Some(&social), &site, Utc::now());

        assert_eq!(record.measurement, Measurement::Plant);
        assert_eq!(record.siteid, stable_id("NE=1"));
        assert_eq!(record.fields.get("daily_energy"), Some(&FieldValue::Number(123.4)));
        assert_eq!(record.fields.get("daily_ongrid_energy"), Some(&FieldValue::Number(100.0)));
        assert_eq!(record.fields.get("is_price_configured"), Some(&FieldValue::Bool(true)));
        assert_eq!(record.fields.get("equivalent_trees"), Some(&FieldValue::Number(10.0)));
        assert_eq!(record.fields.len(), 23);
    }

    #[test]
    fn missing_sources_leave_fields_out() {
        let site = SiteRef::default();
        let record = normalize_plant(None, None, &site, Utc::now());
        assert!(record.fields.is_empty());
        assert_eq!(record.siteid, "");
    }
}
