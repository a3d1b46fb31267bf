//! `run`, `once` and `discover`: the commands that talk to the portal.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fusion_core::CoreError;
use fusion_core::topology::filter_sites;

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;
use crate::sink::JsonLinesSink;

use super::build_harvester;

/// Harvest until Ctrl-C.
pub async fn run(global: &GlobalOpts) -> Result<(), CliError> {
    let sink = Arc::new(JsonLinesSink::open(global.output.as_deref())?);
    let harvester = Arc::new(build_harvester(global)?.with_sink(sink));

    let cancel = CancellationToken::new();
    let worker = Arc::clone(&harvester).spawn(cancel.clone());

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, stopping");
    cancel.cancel();

    if let Err(e) = worker.await {
        warn!(error = %e, "harvest worker ended abnormally");
    }
    Ok(())
}

/// One cycle, then a summary on stderr.
pub async fn once(global: &GlobalOpts) -> Result<(), CliError> {
    let sink = Arc::new(JsonLinesSink::open(global.output.as_deref())?);
    let harvester = build_harvester(global)?.with_sink(sink);

    let report = harvester.run_cycle().await?;
    eprintln!("{}", output::render_report(&report, output::stderr_color()));
    Ok(())
}

/// Log in, discover every site, print the topology.
pub async fn discover(args: &DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let harvester = build_harvester(global)?;
    harvester.establish_session().await?;

    if args.locate {
        if harvester.client().settings().locate_tree.is_none() {
            return Err(CliError::Validation {
                field: "portal.locate_tree_path".into(),
                reason: "--locate needs a locate tree endpoint".into(),
            });
        }
        for site in harvester.sites() {
            let tree = harvester.discoverer().fetch_site_tree(&site.id).await?;
            if filter_sites(&tree, std::slice::from_ref(site)).is_empty() {
                warn!(site = %site.name, dn = %site.id, "site not found in locate tree");
            }
        }
    }

    let mut topologies = Vec::with_capacity(harvester.sites().len());
    for site in harvester.sites() {
        match harvester.discover_topology(site).await {
            Ok(topology) => topologies.push(topology),
            Err(CoreError::SessionInvalid) => return Err(CliError::SessionLost),
            Err(e) => warn!(site = %site.name, error = %e, "discovery failed"),
        }
    }

    let rendered = if args.json {
        output::render_topology_json(&topologies)?
    } else {
        output::render_topology(&topologies)
    };
    println!("{rendered}");
    Ok(())
}
