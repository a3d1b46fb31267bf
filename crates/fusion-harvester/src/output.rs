//! Human-facing output: topology tables and cycle summaries.

use std::io::{self, IsTerminal};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use fusion_core::{CycleReport, SiteTopology};

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Site")]
    site: String,
    #[tabled(rename = "Gateway")]
    gateway: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "DN")]
    dn: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Type")]
    type_id: String,
    #[tabled(rename = "Model")]
    model: String,
}

fn rows(topologies: &[SiteTopology]) -> Vec<DeviceRow> {
    let mut rows = Vec::new();
    for topology in topologies {
        for (gateway_dn, device) in topology.devices() {
            let gateway = topology
                .gateways
                .iter()
                .find(|g| g.dn == gateway_dn)
                .map_or(gateway_dn, |g| g.name.as_str());
            rows.push(DeviceRow {
                site: topology.site.name.clone(),
                gateway: gateway.to_owned(),
                device: device.name().to_owned(),
                dn: device.dn().to_owned(),
                category: device.category.to_string(),
                type_id: device
                    .node
                    .type_id
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
                model: topology
                    .static_info(device.dn())
                    .and_then(fusion_api::ChildDevice::model)
                    .unwrap_or_default(),
            });
        }
    }
    rows
}

/// One row per device across all sites.
pub fn render_topology(topologies: &[SiteTopology]) -> String {
    Table::new(rows(topologies)).with(Style::rounded()).to_string()
}

pub fn render_topology_json(topologies: &[SiteTopology]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(topologies)
}

/// Whether stderr should get color codes.
pub fn stderr_color() -> bool {
    io::stderr().is_terminal() && std::env::var("NO_COLOR").is_err()
}

/// Short cycle summary for stderr.
pub fn render_report(report: &CycleReport, color: bool) -> String {
    let records = report.records_emitted.to_string();
    let failed = report.devices_failed.to_string();

    let mut lines = vec![format!(
        "{} {} records from {} sites ({} devices requested)",
        if color { "✓".green().to_string() } else { "✓".into() },
        if color { records.bold().to_string() } else { records },
        report.sites_discovered,
        report.devices_requested,
    )];
    if report.devices_failed > 0 || report.failed_chunks > 0 {
        lines.push(format!(
            "  {} devices failed, {} chunks timed out",
            if color { failed.yellow().to_string() } else { failed },
            report.failed_chunks,
        ));
    }
    if !report.sites_failed.is_empty() {
        lines.push(format!("  sites skipped: {}", report.sites_failed.join(", ")));
    }
    for device in &report.unclassified {
        lines.push(format!(
            "  unclassified: {} ({})",
            device.name(),
            device.dn()
        ));
    }
    lines.join("\n")
}
