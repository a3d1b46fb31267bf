// ── Chunked device fetching ──
//
// Devices are fetched in fixed-size chunks. Each chunk waits a random
// jitter, fans out one request per device, then fans back in until every
// request settles or the chunk deadline passes. Chunks run one after
// another, so the number of requests in flight never exceeds the chunk size.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::PortalClient;
use crate::endpoints::string_kpi_signal_ids;
use crate::error::Error;

/// Which per-device endpoint a batch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// `device-realtime-data`; inverters ask for the access-model view.
    Realtime { display_access_model: bool },
    /// `device-real-kpi` with the string signal id list.
    StringKpi,
}

/// Pacing and bounds for one batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub chunk_size: usize,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// Deadline for one chunk, measured from its fan-out.
    pub chunk_timeout: Duration,
}

impl BatchOptions {
    pub const INVERTER_CHUNK: usize = 15;
    pub const METER_CHUNK: usize = 20;

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    fn jitter(&self) -> Duration {
        let (lo, hi) = if self.jitter_min <= self.jitter_max {
            (self.jitter_min, self.jitter_max)
        } else {
            (self.jitter_max, self.jitter_min)
        };
        if hi.is_zero() {
            return Duration::ZERO;
        }
        let lo_ms = u64::try_from(lo.as_millis()).unwrap_or(u64::MAX);
        let hi_ms = u64::try_from(hi.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(lo_ms..=hi_ms))
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            chunk_size: Self::METER_CHUNK,
            jitter_min: Duration::from_millis(200),
            jitter_max: Duration::from_millis(500),
            chunk_timeout: Duration::from_secs(20),
        }
    }
}

/// Result of fetching one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceOutcome {
    pub dn: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeviceOutcome {
    fn from_result(dn: String, result: Result<Value, Error>) -> Self {
        match result {
            Ok(data) => Self {
                dn,
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                dn,
                success: false,
                data: None,
                error: Some(describe(&e)),
            },
        }
    }
}

/// Short per-device error description.
fn describe(err: &Error) -> String {
    match err {
        Error::Portal { status, .. } => format!("Http {status}"),
        Error::Deserialization { message, .. } => format!("Parse error: {message}"),
        other => other.to_string(),
    }
}

/// A chunk that produced nothing before its deadline.
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub index: usize,
    pub devices: Vec<String>,
}

impl ChunkFailure {
    pub fn to_error(&self) -> Error {
        Error::BatchTimeout {
            chunk: self.index,
            devices: self.devices.len(),
        }
    }
}

/// Everything one `fetch_batch` call produced.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub requested: usize,
    pub outcomes: Vec<DeviceOutcome>,
    pub failed_chunks: Vec<ChunkFailure>,
}

impl BatchReport {
    pub fn successes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.outcomes
            .iter()
            .filter(|o| o.success)
            .filter_map(|o| o.data.as_ref().map(|d| (o.dn.as_str(), d)))
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    /// Devices without a successful outcome, in any form.
    pub fn failed_count(&self) -> usize {
        self.requested - self.success_count()
    }
}

/// Split ids into chunks of at most `size` (a zero size is treated as one).
pub fn partition<T>(ids: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    ids.chunks(size.max(1))
}

/// Paced, chunked fan-out over per-device fetches.
#[derive(Debug, Clone, Default)]
pub struct BatchFetcher {
    options: BatchOptions,
}

impl BatchFetcher {
    pub fn new(options: BatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Fetch raw payloads for `ids` from the portal.
    pub async fn fetch_batch(
        &self,
        client: &PortalClient,
        ids: &[String],
        mode: FetchMode,
    ) -> BatchReport {
        let signal_ids = string_kpi_signal_ids();
        let signal_ids = signal_ids.as_slice();

        self.run(ids, |dn: String| async move {
            match mode {
                FetchMode::Realtime {
                    display_access_model,
                } => client.device_realtime(&dn, display_access_model).await,
                FetchMode::StringKpi => client.device_real_kpi(&dn, signal_ids).await,
            }
        })
        .await
    }

    /// Drive `fetch_one` over `ids`, chunk by chunk.
    ///
    /// Duplicate ids are fetched once. Devices still pending when a chunk
    /// deadline passes are left out of the report; a chunk with nothing to
    /// show at its deadline becomes a [`ChunkFailure`].
    pub async fn run<F, Fut>(&self, ids: &[String], fetch_one: F) -> BatchReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Value, Error>>,
    {
        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<String> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let mut report = BatchReport {
            requested: unique.len(),
            ..BatchReport::default()
        };

        for (index, chunk) in partition(&unique, self.options.chunk_size).enumerate() {
            let delay = self.options.jitter();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.run_chunk(chunk, &fetch_one).await {
                Some(outcomes) => {
                    debug!(
                        chunk = index,
                        requested = chunk.len(),
                        settled = outcomes.len(),
                        "chunk settled"
                    );
                    report.outcomes.extend(outcomes);
                }
                None => {
                    let failure = ChunkFailure {
                        index,
                        devices: chunk.to_vec(),
                    };
                    warn!(error = %failure.to_error(), "skipping chunk for this cycle");
                    report.failed_chunks.push(failure);
                }
            }
        }

        report
    }

    /// Fan out one chunk. `None` means the deadline passed with nothing settled.
    async fn run_chunk<F, Fut>(&self, chunk: &[String], fetch_one: &F) -> Option<Vec<DeviceOutcome>>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Value, Error>>,
    {
        let deadline = tokio::time::Instant::now() + self.options.chunk_timeout;
        let mut pending: FuturesUnordered<_> = chunk
            .iter()
            .map(|dn| {
                let request = fetch_one(dn.clone());
                let dn = dn.clone();
                async move { (dn, request.await) }
            })
            .collect();

        let mut outcomes = Vec::with_capacity(chunk.len());
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((dn, result))) => outcomes.push(DeviceOutcome::from_result(dn, result)),
                Ok(None) => break,
                Err(_) => {
                    debug!(unsettled = pending.len(), "chunk deadline reached");
                    break;
                }
            }
        }

        if outcomes.is_empty() && !chunk.is_empty() {
            None
        } else {
            Some(outcomes)
        }
    }
}
