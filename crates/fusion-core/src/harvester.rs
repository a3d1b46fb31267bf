// ── Harvest cycle ──
//
// One worker per harvester runs: ensure session → discover every site →
// fetch devices in batches per category → normalize → emit. Failures
// below the cycle are logged and absorbed; only a lost session ends a
// cycle early.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fusion_api::{
    Authenticator, BatchFetcher, BatchOptions, BatchReport, FetchMode, PortalClient,
    SessionManager,
};

use crate::config::{HarvestConfig, HarvestTuning, SiteRef};
use crate::error::CoreError;
use crate::mapping::SignalMapping;
use crate::model::{ClassifiedDevice, DeviceCategory, NormalizedRecord, RecordBatch};
use crate::normalize::{DeviceContext, SignalNormalizer};
use crate::sink::RecordSink;
use crate::topology::{Classifier, SiteTopology, TopologyDiscoverer};

/// Where the worker is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CycleState {
    NoSession,
    SessionAcquired,
    TopologyKnown,
    RecordsEmitted,
    Sleeping,
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub sites_discovered: usize,
    /// Dns of sites whose discovery failed.
    pub sites_failed: Vec<String>,
    pub devices_requested: usize,
    pub devices_failed: usize,
    pub failed_chunks: usize,
    pub records_emitted: usize,
    pub unclassified: Vec<ClassifiedDevice>,
}

/// The cycle orchestrator.
pub struct Harvester<A> {
    client: Arc<PortalClient>,
    auth: A,
    discoverer: TopologyDiscoverer,
    normalizer: SignalNormalizer,
    inverters: BatchFetcher,
    meters: BatchFetcher,
    sensors: BatchFetcher,
    sites: Vec<SiteRef>,
    tuning: HarvestTuning,
    sinks: Vec<Arc<dyn RecordSink>>,
    state: watch::Sender<CycleState>,
    topology: ArcSwap<Vec<SiteTopology>>,
}

impl<A: Authenticator> Harvester<A> {
    /// Build a harvester with its own session and portal client.
    pub fn new(config: &HarvestConfig, auth: A) -> Result<Self, CoreError> {
        let session = Arc::new(SessionManager::new());
        let client = PortalClient::new(
            config.portal_url.clone(),
            config.portal_settings(),
            session,
            &config.transport(),
        )?;
        Ok(Self::with_client(
            Arc::new(client),
            auth,
            config.sites.clone(),
            Arc::new(config.mapping.clone()),
            config.tuning.clone(),
        ))
    }

    /// Build a harvester around an existing client.
    pub fn with_client(
        client: Arc<PortalClient>,
        auth: A,
        sites: Vec<SiteRef>,
        mapping: Arc<SignalMapping>,
        tuning: HarvestTuning,
    ) -> Self {
        let fetcher = |chunk_size: usize| {
            BatchFetcher::new(BatchOptions {
                chunk_size,
                jitter_min: tuning.jitter_min,
                jitter_max: tuning.jitter_max,
                chunk_timeout: tuning.chunk_timeout,
            })
        };
        let (state, _) = watch::channel(CycleState::NoSession);

        Self {
            discoverer: TopologyDiscoverer::new(
                Arc::clone(&client),
                Classifier::new(tuning.inverter_type_id),
            ),
            normalizer: SignalNormalizer::new(mapping),
            inverters: fetcher(tuning.inverter_batch_size),
            meters: fetcher(tuning.meter_batch_size),
            sensors: fetcher(tuning.sensor_batch_size),
            client,
            auth,
            sites,
            tuning,
            sinks: Vec::new(),
            state,
            topology: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn client(&self) -> &Arc<PortalClient> {
        &self.client
    }

    pub fn sites(&self) -> &[SiteRef] {
        &self.sites
    }

    pub fn normalizer(&self) -> &SignalNormalizer {
        &self.normalizer
    }

    /// Watch cycle state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    /// Topology from the latest discovery pass.
    pub fn topology(&self) -> Arc<Vec<SiteTopology>> {
        self.topology.load_full()
    }

    fn set_state(&self, next: CycleState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "cycle state");
        }
    }

    fn fetcher_for(&self, category: DeviceCategory) -> &BatchFetcher {
        match category {
            DeviceCategory::Inverter => &self.inverters,
            DeviceCategory::Meter => &self.meters,
            DeviceCategory::Sensor | DeviceCategory::Unclassified => &self.sensors,
        }
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Make sure a valid token is held, logging in when it is not.
    pub async fn ensure_session(&self) -> bool {
        match self.establish_session().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "no portal session");
                false
            }
        }
    }

    /// Like [`ensure_session`](Self::ensure_session), but reports why it failed.
    pub async fn establish_session(&self) -> Result<(), CoreError> {
        let session = self.client.session();
        if session.is_valid(self.client.as_ref()).await {
            self.set_state(CycleState::SessionAcquired);
            return Ok(());
        }

        session.invalidate();
        self.set_state(CycleState::NoSession);
        info!("logging in to portal");

        self.auth
            .login(&self.client)
            .await
            .map_err(|e| CoreError::LoginFailed {
                message: e.to_string(),
            })?;
        session
            .wait_for_token(self.tuning.token_wait)
            .await
            .map_err(|e| CoreError::LoginFailed {
                message: format!("no session token after login: {e}"),
            })?;

        self.set_state(CycleState::SessionAcquired);
        Ok(())
    }

    // ── Discovery ────────────────────────────────────────────────────

    pub async fn discover_topology(&self, site: &SiteRef) -> Result<SiteTopology, CoreError> {
        self.discoverer.discover(site).await
    }

    pub fn discoverer(&self) -> &TopologyDiscoverer {
        &self.discoverer
    }

    // ── Cycle ────────────────────────────────────────────────────────

    /// Run one full cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, CoreError> {
        let mut report = CycleReport {
            started_at: Utc::now(),
            ..CycleReport::default()
        };
        self.establish_session().await?;

        let mut discovered = Vec::with_capacity(self.sites.len());
        for site in &self.sites {
            match self.discover_topology(site).await {
                Ok(topology) => discovered.push(topology),
                Err(CoreError::SessionInvalid) => {
                    self.client.session().invalidate();
                    self.set_state(CycleState::NoSession);
                    return Err(CoreError::SessionInvalid);
                }
                Err(e) => {
                    warn!(site = %site.name, error = %e, "skipping site this cycle");
                    report.sites_failed.push(site.id.clone());
                }
            }
        }
        report.sites_discovered = discovered.len();
        report.unclassified = discovered
            .iter()
            .flat_map(|t| t.unclassified.iter().cloned())
            .collect();

        let sites = Arc::new(discovered);
        self.topology.store(Arc::clone(&sites));
        self.set_state(CycleState::TopologyKnown);

        let mut records: Vec<Vec<NormalizedRecord>> = vec![Vec::new(); sites.len()];
        self.collect_site_records(&sites, &mut records).await;
        self.collect_device_records(&sites, &mut records, &mut report)
            .await;

        for (topology, site_records) in sites.iter().zip(records) {
            if site_records.is_empty() {
                continue;
            }
            let batch = RecordBatch {
                site_id: topology.site.id.clone(),
                site_name: topology.site.name.clone(),
                collected_at: Utc::now(),
                records: site_records,
            };
            report.records_emitted += batch.len();
            self.emit(&batch);
        }
        self.set_state(CycleState::RecordsEmitted);

        info!(
            sites = report.sites_discovered,
            failed_sites = report.sites_failed.len(),
            devices = report.devices_requested,
            failed_devices = report.devices_failed,
            records = report.records_emitted,
            unclassified = report.unclassified.len(),
            "cycle complete"
        );
        Ok(report)
    }

    fn emit(&self, batch: &RecordBatch) {
        for sink in &self.sinks {
            if let Err(e) = sink.emit(batch) {
                warn!(sink = sink.name(), site = %batch.site_name, error = %e, "sink failed");
            }
        }
    }

    /// Plant and gateway records, one site at a time.
    async fn collect_site_records(
        &self,
        sites: &[SiteTopology],
        out: &mut [Vec<NormalizedRecord>],
    ) {
        for (topology, bucket) in sites.iter().zip(out.iter_mut()) {
            if self.tuning.station_overview {
                if let Some(record) = self.plant_record(&topology.site).await {
                    bucket.push(record);
                }
            }
            if !self.tuning.gateway_details {
                continue;
            }
            for gateway in &topology.gateways {
                match self.client.moc_config_signals(&gateway.dn).await {
                    Ok(raw) => {
                        let children = topology
                            .children_by_gateway
                            .get(&gateway.dn)
                            .map(Vec::as_slice)
                            .unwrap_or_default();
                        let ctx = DeviceContext::new(&topology.site, &gateway.name, &gateway.dn);
                        bucket.push(self.normalizer.gateway(&raw, children, &ctx));
                    }
                    Err(e) => {
                        debug!(gateway = %gateway.name, error = %e, "gateway details unavailable");
                    }
                }
            }
        }
    }

    async fn plant_record(&self, site: &SiteRef) -> Option<NormalizedRecord> {
        let kpi = match self.client.station_kpi(&site.id).await {
            Ok(kpi) => Some(kpi),
            Err(e) => {
                warn!(site = %site.name, error = %e, "station KPI unavailable");
                None
            }
        };
        let social = match self.client.social_contribution(&site.id).await {
            Ok(social) => Some(social),
            Err(e) => {
                debug!(site = %site.name, error = %e, "social contribution unavailable");
                None
            }
        };
        if kpi.is_none() && social.is_none() {
            return None;
        }
        Some(
            self.normalizer
                .plant(kpi.as_ref(), social.as_ref(), site, Utc::now()),
        )
    }

    /// Batch-fetch and normalize every harvested category across all sites.
    async fn collect_device_records(
        &self,
        sites: &[SiteTopology],
        out: &mut [Vec<NormalizedRecord>],
        report: &mut CycleReport,
    ) {
        for category in DeviceCategory::HARVESTED {
            let mut targets: IndexMap<&str, (usize, &ClassifiedDevice)> = IndexMap::new();
            for (index, topology) in sites.iter().enumerate() {
                for device in topology.devices_of(category) {
                    targets.entry(device.dn()).or_insert((index, device));
                }
            }
            if targets.is_empty() {
                continue;
            }

            let ids: Vec<String> = targets.keys().map(|dn| (*dn).to_owned()).collect();
            let fetcher = self.fetcher_for(category);
            let is_inverter = category == DeviceCategory::Inverter;

            let realtime = fetcher
                .fetch_batch(
                    &self.client,
                    &ids,
                    FetchMode::Realtime {
                        display_access_model: is_inverter,
                    },
                )
                .await;
            account(category, &realtime, report);

            let strings = if is_inverter {
                Some(
                    fetcher
                        .fetch_batch(&self.client, &ids, FetchMode::StringKpi)
                        .await,
                )
            } else {
                None
            };
            let string_data: HashMap<&str, &Value> = strings
                .as_ref()
                .map(|r| r.successes().collect())
                .unwrap_or_default();

            for (dn, data) in realtime.successes() {
                let Some(&(index, device)) = targets.get(dn) else {
                    continue;
                };
                let (Some(topology), Some(bucket)) = (sites.get(index), out.get_mut(index)) else {
                    continue;
                };
                let ctx = DeviceContext::for_device(&topology.site, device)
                    .with_static_info(topology.static_info(dn));
                let record = match category {
                    DeviceCategory::Inverter => {
                        self.normalizer
                            .inverter(data, string_data.get(dn).copied(), &ctx)
                    }
                    DeviceCategory::Meter => self.normalizer.meter(data, &ctx),
                    DeviceCategory::Sensor => self.normalizer.sensor(data, &ctx),
                    DeviceCategory::Unclassified => continue,
                };
                bucket.push(record);
            }
        }
    }
}

fn account(category: DeviceCategory, batch: &BatchReport, report: &mut CycleReport) {
    report.devices_requested += batch.requested;
    report.devices_failed += batch.failed_count();
    report.failed_chunks += batch.failed_chunks.len();

    for outcome in batch.outcomes.iter().filter(|o| !o.success) {
        let err = CoreError::DeviceFetchFailed {
            dn: outcome.dn.clone(),
            reason: outcome.error.clone().unwrap_or_default(),
        };
        debug!(%category, error = %err, "device skipped");
    }
    for chunk in &batch.failed_chunks {
        let err = CoreError::from(chunk.to_error());
        warn!(%category, error = %err, "chunk skipped");
    }
}

// ── Worker loop ──────────────────────────────────────────────────────

impl<A: Authenticator> Harvester<A> {
    /// Repeat cycles until `cancel` fires.
    ///
    /// A failed login waits out the login backoff. A session lost mid-cycle
    /// retries at once, then backs off if it happens again.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            sites = self.sites.len(),
            interval = ?self.tuning.interval,
            "harvester started"
        );
        let mut lost_sessions = 0u32;

        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                outcome = self.run_cycle() => outcome,
            };

            let pause = match outcome {
                Ok(_) => {
                    lost_sessions = 0;
                    self.set_state(CycleState::Sleeping);
                    self.tuning.interval
                }
                Err(CoreError::SessionInvalid) if lost_sessions == 0 => {
                    lost_sessions += 1;
                    warn!("session lost mid-cycle, retrying");
                    Duration::ZERO
                }
                Err(e) if e.needs_login() => {
                    lost_sessions = 0;
                    warn!(error = %e, backoff = ?self.tuning.login_backoff, "login failed, backing off");
                    self.set_state(CycleState::NoSession);
                    self.tuning.login_backoff
                }
                Err(e) => {
                    warn!(error = %e, "cycle failed");
                    self.set_state(CycleState::Sleeping);
                    self.tuning.interval
                }
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(pause) => {}
            }
        }

        info!("harvester stopped");
    }
}

impl<A: Authenticator + 'static> Harvester<A> {
    /// Run the worker loop on its own task.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
