// Portal endpoint methods on `PortalClient`.
//
// Each method maps one internal portal route. Device and topology calls
// hand back raw JSON; shape interpretation belongs to `fusion-core`.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::client::PortalClient;
use crate::error::Error;
use crate::types::{
    ChildDevice, ChildrenEnvelope, SocialContribution, SocialEnvelope, StationKpi,
};

pub const ORGANIZATION_TREE: &str = "/rest/dp/pvms/organization/v1/tree";
pub const DEVICE_REALTIME: &str = "/rest/pvms/web/device/v1/device-realtime-data";
pub const DEVICE_REAL_KPI: &str = "/rest/pvms/web/device/v1/device-real-kpi";
pub const MOC_CONFIG_SIGNAL: &str =
    "/rest/neteco/web/config/device/v1/config/query-moc-config-signal";
pub const CHILDREN_LIST: &str = "/rest/neteco/web/config/device/v1/children-list";
pub const STATION_KPI: &str = "/rest/pvms/web/station/v1/overview/station-kpi-data";
pub const SOCIAL_CONTRIBUTION: &str = "/rest/pvms/web/station/v1/station/social-contribution";

/// Type ids the organization tree is filtered to (loggers and their devices).
const TREE_TYPE_INCLUDE: [u32; 2] = [23089, 23091];

/// Static configuration signals read from a gateway.
pub const GATEWAY_CONFIG_SIGNALS: [u32; 13] = [
    10051, 21029, 24001, 50001, 50009, 50010, 50012, 50018, 33_595_393, 50020, 50022, 14054,
    11248,
];

/// Managed-object types listed under a gateway.
pub const CHILD_MOC_TYPES: [u32; 13] = [
    20822, 20810, 20825, 20826, 20823, 20824, 20816, 20838, 20836, 20835, 20844, 20847, 20865,
];

/// Signal ids requested from `device-real-kpi` for inverter string data:
/// device summary, MPPT voltage/current pairs, then string status.
pub fn string_kpi_signal_ids() -> Vec<u32> {
    const SUMMARY: [u32; 28] = [
        10032, 10025, 10029, 10019, 10022, 10006, 10020, 10021, 10027, 10028, 21029, 10018,
        10008, 10009, 10010, 10012, 10013, 10011, 10014, 10015, 10016, 10113, 10114, 10115,
        10023, 10024, 10047, 10051,
    ];

    let mut ids = SUMMARY.to_vec();
    // Stride-3 voltage/current pairs up to 11068; from 11070 the block is contiguous.
    ids.extend((0..23).flat_map(|i| [11001 + 3 * i, 11002 + 3 * i]));
    ids.extend(11070..=11119);
    ids.extend(14001..=14048);
    ids
}

/// Pull the KPI block out of a station response. Older portal builds put
/// it at the top level, newer ones wrap it in `data`.
fn parse_station_kpi(raw: &Value) -> Result<StationKpi, Error> {
    let block = raw
        .get("kpiData")
        .or_else(|| raw.pointer("/data/kpiData"))
        .ok_or_else(|| Error::Rejected {
            message: "station kpi response carried no kpiData".into(),
        })?;
    StationKpi::deserialize(block).map_err(|e| Error::Deserialization {
        message: format!("station kpi: {e}"),
        body: block.to_string(),
    })
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl PortalClient {
    // ── Topology ─────────────────────────────────────────────────────

    /// Fetch the organization tree below `parent_dn`, down to device depth.
    pub async fn organization_tree(&self, parent_dn: &str) -> Result<Value, Error> {
        let url = self.url(ORGANIZATION_TREE)?;
        let body = json!({
            "parentDn": parent_dn,
            "treeDepth": "device",
            "pageParam": { "pageId": 1, "pageSize": 100, "needPage": true },
            "displayCond": { "self": true, "status": true },
            "filterCond": {
                "nameType": "device",
                "mocIdInclude": [],
                "typeIdInclude": TREE_TYPE_INCLUDE,
            }
        });
        self.post_json(url, &body).await
    }

    /// Fetch the locate tree for a target dn (site bootstrap).
    ///
    /// Successful responses are also retained as in-flight hints by the
    /// response observer.
    pub async fn locate_tree(&self, target_dn: &str) -> Result<Value, Error> {
        let settings = self
            .settings()
            .locate_tree
            .as_ref()
            .ok_or(Error::EndpointNotConfigured {
                name: "locate_tree",
            })?;
        let mut url = self.url(&settings.path)?;
        url.query_pairs_mut()
            .append_pair("targetDn", target_dn)
            .append_pair("subNodeTypeIds", &settings.sub_node_type_ids)
            .append_pair("typeIdInclude", &settings.type_id_include);
        self.get_json(url).await
    }

    // ── Device data ──────────────────────────────────────────────────

    /// Realtime signals for one device.
    pub async fn device_realtime(
        &self,
        device_dn: &str,
        display_access_model: bool,
    ) -> Result<Value, Error> {
        let mut url = self.url(DEVICE_REALTIME)?;
        url.query_pairs_mut().append_pair("deviceDn", device_dn);
        if display_access_model {
            url.query_pairs_mut()
                .append_pair("displayAccessModel", "true");
        }
        self.get_json(url).await
    }

    /// KPI signals for one device, restricted to `signal_ids`.
    pub async fn device_real_kpi(&self, device_dn: &str, signal_ids: &[u32]) -> Result<Value, Error> {
        let mut url = self.url(DEVICE_REAL_KPI)?;
        {
            let mut query = url.query_pairs_mut();
            for id in signal_ids {
                query.append_pair("signalIds", &id.to_string());
            }
            query.append_pair("deviceDn", device_dn);
        }
        self.get_json(url).await
    }

    /// Static configuration signals of a gateway.
    pub async fn moc_config_signals(&self, dn: &str) -> Result<Value, Error> {
        let mut url = self.url(MOC_CONFIG_SIGNAL)?;
        url.query_pairs_mut()
            .append_pair("dn", dn)
            .append_pair("signals", &join_ids(&GATEWAY_CONFIG_SIGNALS));
        self.get_json(url).await
    }

    /// Devices monitored by a gateway, with their static parameters.
    pub async fn children_list(&self, parent_dn: &str) -> Result<Vec<ChildDevice>, Error> {
        let mut url = self.url(CHILDREN_LIST)?;
        url.query_pairs_mut()
            .append_pair("conditionParams.curPage", "0")
            .append_pair("conditionParams.recordperpage", "500")
            .append_pair("conditionParams.parentDn", parent_dn)
            .append_pair("conditionParams.monitoringRelation", "true")
            .append_pair("conditionParams.mocTypes", &join_ids(&CHILD_MOC_TYPES));
        let raw = self.get_json(url).await?;
        let envelope: ChildrenEnvelope =
            serde_json::from_value(raw).map_err(|e| Error::Deserialization {
                message: format!("children list: {e}"),
                body: String::new(),
            })?;
        debug!(parent = parent_dn, count = envelope.data.len(), "children listed");
        Ok(envelope.data)
    }

    // ── Station ──────────────────────────────────────────────────────

    pub async fn station_kpi(&self, station_dn: &str) -> Result<StationKpi, Error> {
        let mut url = self.url(STATION_KPI)?;
        url.query_pairs_mut().append_pair("stationDn", station_dn);
        let raw = self.get_json(url).await?;
        parse_station_kpi(&raw)
    }

    pub async fn social_contribution(&self, station_dn: &str) -> Result<SocialContribution, Error> {
        let now = chrono::Utc::now().timestamp_millis().to_string();
        let offset_hours = self.settings().timezone_offset_minutes / 60;
        let mut url = self.url(SOCIAL_CONTRIBUTION)?;
        url.query_pairs_mut()
            .append_pair("dn", station_dn)
            .append_pair("clientTime", &now)
            .append_pair("timeZone", &offset_hours.to_string());
        let raw = self.get_json(url).await?;
        let envelope: SocialEnvelope =
            serde_json::from_value(raw).map_err(|e| Error::Deserialization {
                message: format!("social contribution: {e}"),
                body: String::new(),
            })?;
        if !envelope.success {
            return Err(Error::Rejected {
                message: envelope
                    .message
                    .unwrap_or_else(|| "success=false".into()),
            });
        }
        Ok(envelope.data.unwrap_or_default())
    }
}
