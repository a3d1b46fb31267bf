// ── Runtime harvest configuration ──
//
// Everything the harvester needs to run, already resolved. The binary
// builds a `HarvestConfig` from files and environment and hands it in;
// core never reads configuration from disk.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use fusion_api::{LocateTreeSettings, PortalSettings, TlsMode, TransportConfig};

use crate::mapping::SignalMapping;

/// A site to harvest, as named by the portal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRef {
    /// Portal-assigned station dn, e.g. `NE=12345678`.
    pub id: String,
    pub name: String,
}

/// Login credentials for the portal form.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Cycle pacing and batch bounds.
#[derive(Debug, Clone)]
pub struct HarvestTuning {
    /// Sleep between completed cycles.
    pub interval: Duration,
    /// Sleep after a failed login before trying again.
    pub login_backoff: Duration,
    /// How long to wait for a token after a login reported success.
    pub token_wait: Duration,
    pub inverter_batch_size: usize,
    pub meter_batch_size: usize,
    pub sensor_batch_size: usize,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub chunk_timeout: Duration,
    /// Type code that marks a node as an inverter regardless of its name.
    pub inverter_type_id: i64,
    /// Emit one `plant` record per site per cycle.
    pub station_overview: bool,
    /// Emit one `gateway` record per logger per cycle.
    pub gateway_details: bool,
}

impl Default for HarvestTuning {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            login_backoff: Duration::from_secs(60),
            token_wait: Duration::from_secs(60),
            inverter_batch_size: 15,
            meter_batch_size: 20,
            sensor_batch_size: 20,
            jitter_min: Duration::from_millis(200),
            jitter_max: Duration::from_millis(500),
            chunk_timeout: Duration::from_secs(20),
            inverter_type_id: crate::topology::INVERTER_TYPE_ID,
            station_overview: true,
            gateway_details: true,
        }
    }
}

/// Complete configuration for one [`Harvester`](crate::Harvester).
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub portal_url: Url,
    pub tls: TlsMode,
    pub request_timeout: Duration,
    pub timezone_offset_minutes: i32,
    pub login_path: String,
    pub locate_tree: Option<LocateTreeSettings>,
    pub credentials: Option<Credentials>,
    pub sites: Vec<SiteRef>,
    pub mapping: SignalMapping,
    pub tuning: HarvestTuning,
}

impl HarvestConfig {
    /// Request-shaping settings for the portal client.
    pub fn portal_settings(&self) -> PortalSettings {
        PortalSettings {
            timezone_offset_minutes: self.timezone_offset_minutes,
            login_path: self.login_path.clone(),
            locate_tree: self.locate_tree.clone(),
            ..PortalSettings::default()
        }
    }

    /// Transport settings, with the cookie jar the login flow needs.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            timeout: self.request_timeout,
            ..TransportConfig::default()
        }
        .with_cookie_jar()
    }
}
