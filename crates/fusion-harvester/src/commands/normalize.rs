//! Offline normalization of saved payloads.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use fusion_core::{DeviceContext, RecordBatch, RecordSink, SignalMapping, SignalNormalizer, SiteRef};

use crate::cli::{GlobalOpts, NormalizeArgs};
use crate::error::CliError;
use crate::sink::JsonLinesSink;

fn read_json(path: &Path) -> Result<Value, CliError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// `--signals` if given, else the configured mapping file, else empty.
fn mapping(args: &NormalizeArgs, global: &GlobalOpts) -> Result<SignalMapping, CliError> {
    if let Some(ref path) = args.signals {
        return Ok(fusion_config::load_signal_mapping(path)?);
    }
    let config = fusion_config::load_config(global.config.as_deref())?;
    match config.signals_path {
        Some(ref path) => Ok(fusion_config::load_signal_mapping(path)?),
        None => Ok(SignalMapping::default()),
    }
}

pub fn handle(args: &NormalizeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let normalizer = SignalNormalizer::new(Arc::new(mapping(args, global)?));
    let raw = read_json(&args.file)?;
    let strings = args.strings.as_deref().map(read_json).transpose()?;

    let site = SiteRef {
        id: args.site_dn.clone(),
        name: args.site_name.clone(),
    };
    let ctx = DeviceContext::new(&site, &args.name, &args.dn);
    let record = normalizer.normalize(args.kind, &raw, strings.as_ref(), &ctx);

    let sink = JsonLinesSink::open(global.output.as_deref())?;
    sink.emit(&RecordBatch {
        site_id: site.id,
        site_name: site.name,
        collected_at: ctx.timestamp,
        records: vec![record],
    })?;
    Ok(())
}
