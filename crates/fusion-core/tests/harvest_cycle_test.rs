#![allow(clippy::unwrap_used)]
// End-to-end harvest cycles against a wiremock portal.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fusion_api::endpoints::{
    CHILDREN_LIST, DEVICE_REAL_KPI, DEVICE_REALTIME, MOC_CONFIG_SIGNAL, ORGANIZATION_TREE,
    SOCIAL_CONTRIBUTION, STATION_KPI,
};
use fusion_api::{Authenticator, Error, PortalClient, PortalSettings, SessionManager, TransportConfig};
use fusion_core::{
    CoreError, CycleState, FieldValue, Harvester, HarvestTuning, MemorySink, Measurement,
    SignalMapping, SiteRef, stable_id,
};

// ── Helpers ─────────────────────────────────────────────────────────

/// Logs in by capturing a fixed token.
struct StubLogin;

impl Authenticator for StubLogin {
    async fn login(&self, client: &PortalClient) -> Result<(), Error> {
        client.session().capture("tok-stub");
        Ok(())
    }
}

/// Login that the portal always refuses.
struct RefusedLogin;

impl Authenticator for RefusedLogin {
    async fn login(&self, _client: &PortalClient) -> Result<(), Error> {
        Err(Error::Login {
            message: "bad credentials".into(),
        })
    }
}

fn site() -> SiteRef {
    SiteRef {
        id: "NE=1".into(),
        name: "Plant A".into(),
    }
}

fn node(dn: &str, name: &str, is_parent: bool, type_id: Option<i64>, children: Value) -> Value {
    json!({
        "elementDn": dn,
        "nodeName": name,
        "isParent": is_parent,
        "status": "CONNECTED",
        "typeId": type_id,
        "childList": children,
    })
}

fn inverter_dn(i: usize) -> String {
    format!("NE={}", 200 + i)
}

fn quick_tuning() -> HarvestTuning {
    HarvestTuning {
        jitter_min: Duration::ZERO,
        jitter_max: Duration::ZERO,
        chunk_timeout: Duration::from_secs(1),
        token_wait: Duration::from_millis(200),
        station_overview: false,
        gateway_details: false,
        ..HarvestTuning::default()
    }
}

async fn setup(
    mapping: SignalMapping,
    tuning: HarvestTuning,
) -> (MockServer, Harvester<StubLogin>, Arc<MemorySink>) {
    let server = MockServer::start().await;
    let client = PortalClient::new(
        Url::parse(&server.uri()).unwrap(),
        PortalSettings::default(),
        Arc::new(SessionManager::new()),
        &TransportConfig::default(),
    )
    .unwrap();
    let sink = Arc::new(MemorySink::new());
    let harvester = Harvester::with_client(
        Arc::new(client),
        StubLogin,
        vec![site()],
        Arc::new(mapping),
        tuning,
    )
    .with_sink(sink.clone());
    (server, harvester, sink)
}

/// Session probe answers with JSON, so any captured token is valid.
async fn mount_probe(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(STATION_KPI))
        .and(query_param("stationDn", "NE=00000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .mount(server)
        .await;
}

/// One logger with `inverters` inverters, a meter and an unknown device.
async fn mount_topology(server: &MockServer, inverters: usize) {
    let logger = node("NE=100", "Smartlogger_1", true, None, json!([]));
    Mock::given(method("POST"))
        .and(path(ORGANIZATION_TREE))
        .and(body_partial_json(json!({ "parentDn": "NE=1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "childList": [logger] })))
        .mount(server)
        .await;

    let mut devices: Vec<Value> = (1..=inverters)
        .map(|i| node(&inverter_dn(i), &format!("INV-{i}"), false, Some(23022), json!([])))
        .collect();
    devices.push(node("NE=300", "Grid Meter", false, Some(47), json!([])));
    devices.push(node("NE=301", "Box 7", false, Some(99), json!([])));
    let subtree = node("NE=100", "Smartlogger_1", true, None, json!(devices));

    Mock::given(method("POST"))
        .and(path(ORGANIZATION_TREE))
        .and(body_partial_json(json!({ "parentDn": "NE=100" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "childList": [subtree] })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(CHILDREN_LIST))
        .and(query_param("conditionParams.parentDn", "NE=100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "dn": inverter_dn(1),
                "name": "INV-1",
                "mocTypeName": "Inverter",
                "status": "CONNECTED",
                "paramValues": { "50009": "SUN2000-100KTL", "50012": "SN-0001" },
            }]
        })))
        .mount(server)
        .await;
}

async fn mount_device_data(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(DEVICE_REALTIME))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "signals": [
                { "id": 10018, "name": "Active power", "value": "12.5" },
                { "id": 2101, "name": "Phase A voltage", "value": "230.1" },
            ]}]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(DEVICE_REAL_KPI))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "signals": {
                "11001": { "value": "600" },
                "11002": { "value": "8" },
                "14001": { "value": "1" },
            }}
        })))
        .mount(server)
        .await;
}

fn inverter_mapping() -> SignalMapping {
    let mut mapping = SignalMapping::default();
    mapping
        .unified_inverter
        .insert("10018".into(), "active_power_kw".into());
    mapping
}

// ── Cycles ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cycle_logs_in_and_emits_device_records() {
    let (server, harvester, sink) = setup(inverter_mapping(), quick_tuning()).await;
    mount_probe(&server).await;
    mount_topology(&server, 2).await;
    mount_device_data(&server).await;

    let report = harvester.run_cycle().await.unwrap();

    assert_eq!(harvester.client().session().get(), "tok-stub");
    assert_eq!(harvester.state(), CycleState::RecordsEmitted);
    assert_eq!(report.sites_discovered, 1);
    assert_eq!(report.devices_requested, 3);
    assert_eq!(report.devices_failed, 0);
    assert_eq!(report.unclassified.len(), 1);
    assert_eq!(report.unclassified[0].name(), "Box 7");

    let records = sink.records();
    assert_eq!(records.len(), 3);
    assert_eq!(report.records_emitted, 3);

    let inverter = records
        .iter()
        .find(|r| r.id == stable_id(&inverter_dn(1)))
        .unwrap();
    assert_eq!(inverter.measurement, Measurement::Inverter);
    assert_eq!(inverter.sitename, "Plant A");
    assert_eq!(inverter.siteid, stable_id("NE=1"));
    assert_eq!(inverter.model, "SUN2000-100KTL");
    assert_eq!(inverter.sn, "SN-0001");
    assert_eq!(
        inverter.fields.get("active_power_kw"),
        Some(&FieldValue::Number(12.5))
    );
    assert_eq!(inverter.fields.get("pv01_volt_v"), Some(&FieldValue::Number(600.0)));
    assert_eq!(inverter.fields.get("dc_power_kw"), Some(&FieldValue::Number(4.8)));

    let second = records
        .iter()
        .find(|r| r.id == stable_id(&inverter_dn(2)))
        .unwrap();
    assert_eq!(second.model, "");

    let meters: Vec<_> = records
        .iter()
        .filter(|r| r.measurement == Measurement::Meter)
        .collect();
    assert_eq!(meters.len(), 1);
    assert_eq!(meters[0].name, "Grid Meter");

    let topology = harvester.topology();
    assert_eq!(topology.len(), 1);
    assert_eq!(topology[0].gateways[0].name, "Smartlogger_1");
}

#[tokio::test]
async fn test_timed_out_chunk_is_skipped_for_the_cycle() {
    let (server, harvester, sink) = setup(inverter_mapping(), quick_tuning()).await;
    mount_probe(&server).await;
    mount_topology(&server, 17).await;

    // The second inverter chunk holds devices 16 and 17; neither answers in time.
    for i in [16, 17] {
        Mock::given(method("GET"))
            .and(path(DEVICE_REALTIME))
            .and(query_param("deviceDn", inverter_dn(i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": [] }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;
    }
    mount_device_data(&server).await;

    let report = harvester.run_cycle().await.unwrap();

    let inverters: Vec<_> = sink
        .records()
        .into_iter()
        .filter(|r| r.measurement == Measurement::Inverter)
        .collect();
    assert_eq!(inverters.len(), 15);
    assert!(
        inverters
            .iter()
            .all(|r| r.id != stable_id(&inverter_dn(16)) && r.id != stable_id(&inverter_dn(17)))
    );
    assert!(report.failed_chunks >= 1);
    assert!(report.devices_failed >= 2);
}

#[tokio::test]
async fn test_plant_and_gateway_records() {
    let tuning = HarvestTuning {
        station_overview: true,
        gateway_details: true,
        ..quick_tuning()
    };
    let (server, harvester, sink) = setup(SignalMapping::default(), tuning).await;
    mount_probe(&server).await;
    mount_topology(&server, 1).await;
    mount_device_data(&server).await;

    Mock::given(method("GET"))
        .and(path(STATION_KPI))
        .and(query_param("stationDn", "NE=1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "kpiData": { "dailyEnergy": "321.5", "inverterPower": 40 } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SOCIAL_CONTRIBUTION))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "co2Reduction": 1.5 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MOC_CONFIG_SIGNAL))
        .and(query_param("dn", "NE=100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": 50009, "name": "Model", "value": "SmartLogger3000A" },
                { "id": 50012, "name": "SN", "value": "102XYZ" },
            ]
        })))
        .mount(&server)
        .await;

    harvester.run_cycle().await.unwrap();
    let records = sink.records();

    let plant = records
        .iter()
        .find(|r| r.measurement == Measurement::Plant)
        .unwrap();
    assert_eq!(plant.name, "Plant A");
    assert_eq!(plant.id, stable_id("NE=1"));
    assert_eq!(plant.fields.get("daily_energy"), Some(&FieldValue::Number(321.5)));

    let gateway = records
        .iter()
        .find(|r| r.measurement == Measurement::Gateway)
        .unwrap();
    assert_eq!(gateway.name, "Smartlogger_1");
    assert_eq!(gateway.model, "SmartLogger3000A");
    assert_eq!(gateway.sn, "102XYZ");
    assert_eq!(gateway.children.len(), 1);
    assert_eq!(gateway.children[0].model, "SUN2000-100KTL");
}

#[tokio::test]
async fn test_failed_site_discovery_is_skipped() {
    let (server, harvester, sink) = setup(SignalMapping::default(), quick_tuning()).await;
    mount_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(ORGANIZATION_TREE))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let report = harvester.run_cycle().await.unwrap();
    assert_eq!(report.sites_discovered, 0);
    assert_eq!(report.sites_failed, vec!["NE=1".to_owned()]);
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn test_login_page_during_discovery_invalidates_session() {
    let (server, harvester, _sink) = setup(SignalMapping::default(), quick_tuning()).await;
    mount_probe(&server).await;
    Mock::given(method("POST"))
        .and(path(ORGANIZATION_TREE))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<!DOCTYPE html><html>login</html>", "text/html"),
        )
        .mount(&server)
        .await;

    let err = harvester.run_cycle().await.unwrap_err();
    assert!(matches!(err, CoreError::SessionInvalid));
    assert!(!harvester.client().session().has_token());
    assert_eq!(harvester.state(), CycleState::NoSession);
}

#[tokio::test]
async fn test_refused_login_fails_the_cycle() {
    let server = MockServer::start().await;
    let client = PortalClient::new(
        Url::parse(&server.uri()).unwrap(),
        PortalSettings::default(),
        Arc::new(SessionManager::new()),
        &TransportConfig::default(),
    )
    .unwrap();
    let harvester = Harvester::with_client(
        Arc::new(client),
        RefusedLogin,
        vec![site()],
        Arc::new(SignalMapping::default()),
        quick_tuning(),
    );

    let err = harvester.run_cycle().await.unwrap_err();
    assert!(matches!(err, CoreError::LoginFailed { .. }));
    assert!(err.needs_login());
    assert!(!harvester.ensure_session().await);
}

#[tokio::test]
async fn test_cancelled_worker_stops_promptly() {
    let (_server, harvester, sink) = setup(SignalMapping::default(), quick_tuning()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let handle = Arc::new(harvester).spawn(cancel);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(sink.records().is_empty());
}
