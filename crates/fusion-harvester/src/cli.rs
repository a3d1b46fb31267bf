//! Clap derive structures for the `fusion-harvester` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use fusion_core::PayloadKind;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fusion-harvester -- FusionSolar telemetry harvester
#[derive(Debug, Parser)]
#[command(
    name = "fusion-harvester",
    version,
    about = "Harvest FusionSolar portal telemetry as normalized JSON records",
    long_about = "Logs in to a FusionSolar portal, discovers the devices of each\n\
        configured site, fetches their signals in paced batches, and writes\n\
        one flat JSON record per device per cycle.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "FUSION_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Write records to this file instead of stdout
    #[arg(long, short = 'o', global = true)]
    pub output: Option<PathBuf>,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Accept any TLS certificate
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Harvest continuously until interrupted
    Run,

    /// Run a single harvest cycle and exit
    Once,

    /// Log in and print the device topology of each site
    Discover(DiscoverArgs),

    /// Normalize a saved device payload offline
    Normalize(NormalizeArgs),

    /// Inspect configuration and manage the stored password
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Print the topology as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Check each configured site against the locate tree first
    #[arg(long)]
    pub locate: bool,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Payload kind
    #[arg(long, value_parser = parse_kind)]
    pub kind: PayloadKind,

    /// Device payload (JSON)
    pub file: PathBuf,

    /// String KPI payload to merge (inverter kinds)
    #[arg(long)]
    pub strings: Option<PathBuf>,

    /// Signal mapping file (overrides `signals_path` from the config)
    #[arg(long)]
    pub signals: Option<PathBuf>,

    /// Device name stamped on the record
    #[arg(long, default_value = "")]
    pub name: String,

    /// Device dn, source of the record id
    #[arg(long, default_value = "")]
    pub dn: String,

    /// Site name stamped on the record
    #[arg(long, default_value = "")]
    pub site_name: String,

    /// Site dn, source of the site id
    #[arg(long, default_value = "")]
    pub site_dn: String,
}

fn parse_kind(raw: &str) -> Result<PayloadKind, String> {
    raw.parse().map_err(|_| {
        format!(
            "unknown kind '{raw}' (expected inverter, inverter-detail, strings, meter, sensor, gateway)"
        )
    })
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (password masked)
    Show,

    /// Print the config file path
    Path,

    /// Store the portal password in the system keyring
    SetPassword {
        /// Portal username (defaults to the configured one)
        #[arg(long, short = 'u')]
        username: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn kind_parsing_accepts_kebab_case() {
        assert_eq!(parse_kind("inverter-detail"), Ok(PayloadKind::InverterDetail));
        assert_eq!(parse_kind("Meter"), Ok(PayloadKind::Meter));
        assert!(parse_kind("battery").is_err());
    }
}
