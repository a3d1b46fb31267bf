//! Configuration for fusion-harvester.
//!
//! Layered TOML + environment loading, credential resolution (env +
//! keyring + plaintext), signal mapping files, and translation to
//! `fusion_core::HarvestConfig`. Core never reads configuration itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fusion_api::{LocateTreeSettings, PortalSettings, TlsMode};
use fusion_core::{Credentials, HarvestConfig, HarvestTuning, SignalMapping, SiteRef};

/// Keyring service name passwords are stored under.
pub const KEYRING_SERVICE: &str = "fusion-harvester";

const ENV_PREFIX: &str = "FUSION_";
const ENV_USERNAME: &str = "FUSION_USERNAME";
const ENV_PASSWORD: &str = "FUSION_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no portal credentials configured")]
    NoCredentials,

    #[error("file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub portal: PortalSection,
    pub harvest: HarvestSection,
    pub credentials: CredentialsSection,

    /// Stations to harvest.
    pub sites: Vec<SiteRef>,

    /// Signal mapping file (TOML or JSON).
    pub signals_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortalSection {
    /// Portal base URL.
    pub url: String,
    pub login_path: String,

    /// Locate-tree route. Site bootstrap via the locate tree is off when unset.
    pub locate_tree_path: Option<String>,
    pub sub_node_type_ids: String,
    pub type_id_include: String,

    /// Minutes east of UTC, sent with every request.
    pub timezone_offset_minutes: i32,

    pub insecure: bool,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Per-request timeout, e.g. `"30s"`.
    pub timeout: String,
}

impl Default for PortalSection {
    fn default() -> Self {
        let settings = PortalSettings::default();
        Self {
            url: "https://intl.fusionsolar.huawei.com".into(),
            login_path: settings.login_path,
            locate_tree_path: None,
            sub_node_type_ids: String::new(),
            type_id_include: String::new(),
            timezone_offset_minutes: settings.timezone_offset_minutes,
            insecure: false,
            ca_cert: None,
            timeout: "30s".into(),
        }
    }
}

/// Cycle pacing. Durations use humantime syntax (`"5m"`, `"250ms"`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HarvestSection {
    pub interval: String,
    pub login_backoff: String,
    pub token_wait: String,
    pub inverter_batch_size: usize,
    pub meter_batch_size: usize,
    pub sensor_batch_size: usize,
    pub jitter_min: String,
    pub jitter_max: String,
    pub chunk_timeout: String,
    pub inverter_type_id: i64,
    pub station_overview: bool,
    pub gateway_details: bool,
}

impl Default for HarvestSection {
    fn default() -> Self {
        let tuning = HarvestTuning::default();
        Self {
            interval: format_duration(tuning.interval),
            login_backoff: format_duration(tuning.login_backoff),
            token_wait: format_duration(tuning.token_wait),
            inverter_batch_size: tuning.inverter_batch_size,
            meter_batch_size: tuning.meter_batch_size,
            sensor_batch_size: tuning.sensor_batch_size,
            jitter_min: format_duration(tuning.jitter_min),
            jitter_max: format_duration(tuning.jitter_max),
            chunk_timeout: format_duration(tuning.chunk_timeout),
            inverter_type_id: tuning.inverter_type_id,
            station_overview: tuning.station_overview,
            gateway_details: tuning.gateway_details,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsSection {
    pub username: Option<String>,

    /// Plaintext password (prefer the keyring or `FUSION_PASSWORD`).
    pub password: Option<String>,
}

fn format_duration(d: Duration) -> String {
    humantime::format_duration(d).to_string()
}

fn parse_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|e| invalid(field, format!("'{raw}': {e}")))
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "shundao", "fusion-harvester").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fusion-harvester");
    p
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load the full config: defaults, then the TOML file, then `FUSION_*` env.
///
/// An explicit `path` must exist; the default path may be absent.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::MissingFile {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load a signal mapping file. `.json` files are read as JSON, anything
/// else as TOML.
pub fn load_signal_mapping(path: &Path) -> Result<SignalMapping, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let figment = if is_json {
        Figment::from(Json::file(path))
    } else {
        Figment::from(Toml::file(path))
    };
    Ok(figment.extract()?)
}

/// Render the config as TOML with the plaintext password masked.
pub fn render_config(config: &Config) -> Result<String, ConfigError> {
    let mut shown = config.clone();
    if shown.credentials.password.is_some() {
        shown.credentials.password = Some("********".into());
    }
    Ok(toml::to_string_pretty(&shown)?)
}

// ── Credential resolution ───────────────────────────────────────────

/// Username from the config file, else `FUSION_USERNAME`.
pub fn resolve_username(config: &Config) -> Option<String> {
    config
        .credentials
        .username
        .clone()
        .filter(|u| !u.is_empty())
        .or_else(|| std::env::var(ENV_USERNAME).ok())
}

/// Resolve portal credentials: `FUSION_PASSWORD`, then the keyring, then
/// the plaintext password in the config.
pub fn resolve_credentials(config: &Config) -> Result<Credentials, ConfigError> {
    let username = resolve_username(config).ok_or(ConfigError::NoCredentials)?;
    let password = pick_password(
        std::env::var(ENV_PASSWORD).ok(),
        || keyring_password(&username),
        config.credentials.password.clone(),
    )
    .ok_or(ConfigError::NoCredentials)?;

    Ok(Credentials { username, password })
}

fn pick_password(
    from_env: Option<String>,
    from_keyring: impl FnOnce() -> Option<String>,
    plaintext: Option<String>,
) -> Option<SecretString> {
    from_env
        .filter(|p| !p.is_empty())
        .or_else(from_keyring)
        .or(plaintext)
        .filter(|p| !p.is_empty())
        .map(SecretString::from)
}

fn keyring_password(username: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, username)
        .ok()?
        .get_password()
        .ok()
}

/// Store a password in the system keyring.
pub fn store_password(username: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, username)
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Translation to core config ──────────────────────────────────────

fn tls_mode(portal: &PortalSection) -> TlsMode {
    if portal.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca) = portal.ca_cert {
        TlsMode::CustomCa(ca.clone())
    } else {
        TlsMode::System
    }
}

fn tuning(section: &HarvestSection) -> Result<HarvestTuning, ConfigError> {
    let tuning = HarvestTuning {
        interval: parse_duration("harvest.interval", &section.interval)?,
        login_backoff: parse_duration("harvest.login_backoff", &section.login_backoff)?,
        token_wait: parse_duration("harvest.token_wait", &section.token_wait)?,
        inverter_batch_size: section.inverter_batch_size,
        meter_batch_size: section.meter_batch_size,
        sensor_batch_size: section.sensor_batch_size,
        jitter_min: parse_duration("harvest.jitter_min", &section.jitter_min)?,
        jitter_max: parse_duration("harvest.jitter_max", &section.jitter_max)?,
        chunk_timeout: parse_duration("harvest.chunk_timeout", &section.chunk_timeout)?,
        inverter_type_id: section.inverter_type_id,
        station_overview: section.station_overview,
        gateway_details: section.gateway_details,
    };

    for (field, size) in [
        ("harvest.inverter_batch_size", tuning.inverter_batch_size),
        ("harvest.meter_batch_size", tuning.meter_batch_size),
        ("harvest.sensor_batch_size", tuning.sensor_batch_size),
    ] {
        if size == 0 {
            return Err(invalid(field, "must be at least 1"));
        }
    }
    if tuning.jitter_min > tuning.jitter_max {
        return Err(invalid("harvest.jitter_min", "must not exceed jitter_max"));
    }
    if tuning.chunk_timeout.is_zero() {
        return Err(invalid("harvest.chunk_timeout", "must be positive"));
    }
    Ok(tuning)
}

/// Build a `HarvestConfig`. Missing credentials leave `credentials` unset;
/// the caller decides whether that is fatal.
pub fn to_harvest_config(config: &Config) -> Result<HarvestConfig, ConfigError> {
    let portal = &config.portal;
    let portal_url: url::Url = portal
        .url
        .parse()
        .map_err(|_| invalid("portal.url", format!("invalid URL: {}", portal.url)))?;

    let locate_tree = portal
        .locate_tree_path
        .as_ref()
        .filter(|p| !p.is_empty())
        .map(|path| LocateTreeSettings {
            path: path.clone(),
            sub_node_type_ids: portal.sub_node_type_ids.clone(),
            type_id_include: portal.type_id_include.clone(),
        });

    let mapping = match config.signals_path {
        Some(ref path) => load_signal_mapping(path)?,
        None => SignalMapping::default(),
    };

    let credentials = match resolve_credentials(config) {
        Ok(credentials) => Some(credentials),
        Err(ConfigError::NoCredentials) => None,
        Err(e) => return Err(e),
    };

    Ok(HarvestConfig {
        portal_url,
        tls: tls_mode(portal),
        request_timeout: parse_duration("portal.timeout", &portal.timeout)?,
        timezone_offset_minutes: portal.timezone_offset_minutes,
        login_path: portal.login_path.clone(),
        locate_tree,
        credentials,
        sites: config.sites.clone(),
        mapping,
        tuning: tuning(&config.harvest)?,
    })
}
