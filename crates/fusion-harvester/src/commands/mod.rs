//! Command handlers.

pub mod config_cmd;
pub mod harvest;
pub mod normalize;

use std::path::PathBuf;

use fusion_api::{FormLogin, TlsMode};
use fusion_core::{HarvestConfig, Harvester};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The config file in effect: `--config`, else the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(fusion_config::config_path)
}

/// Load configuration and apply CLI overrides.
pub fn load_harvest_config(global: &GlobalOpts) -> Result<HarvestConfig, CliError> {
    let config = fusion_config::load_config(global.config.as_deref())?;
    let mut harvest = fusion_config::to_harvest_config(&config)?;
    if global.insecure {
        harvest.tls = TlsMode::DangerAcceptInvalid;
    }
    Ok(harvest)
}

/// Build a harvester that logs in with the configured credentials.
pub fn build_harvester(global: &GlobalOpts) -> Result<Harvester<FormLogin>, CliError> {
    let harvest = load_harvest_config(global)?;
    if harvest.sites.is_empty() {
        return Err(CliError::NoSites {
            path: config_file(global).display().to_string(),
        });
    }
    let credentials = harvest
        .credentials
        .clone()
        .ok_or(CliError::NoCredentials)?;

    let auth = FormLogin::new(credentials.username, credentials.password);
    Ok(Harvester::new(&harvest, auth)?)
}
