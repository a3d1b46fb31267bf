//! Harvest pipeline between `fusion-api` and the record consumers.
//!
//! - **[`TopologyDiscoverer`]** walks a site's organization tree into
//!   gateways and classified devices ([`SiteTopology`]).
//! - **[`SignalNormalizer`]** turns raw signal payloads into flat
//!   [`NormalizedRecord`]s with stable ids and presentation-ordered fields.
//! - **[`Harvester`]** runs the cycle: session check, discovery, batched
//!   fetches per device category, normalization, emission to every
//!   [`RecordSink`].

pub mod config;
pub mod error;
pub mod harvester;
pub mod ids;
pub mod mapping;
pub mod model;
pub mod normalize;
pub mod signals;
pub mod sink;
pub mod topology;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{Credentials, HarvestConfig, HarvestTuning, SiteRef};
pub use error::CoreError;
pub use harvester::{CycleReport, CycleState, Harvester};
pub use ids::stable_id;
pub use mapping::{FieldTable, SignalMapping};
pub use model::{
    ChildSummary, ClassifiedDevice, DeviceCategory, DeviceNode, FieldMap, FieldValue,
    Measurement, NormalizedRecord, RecordBatch,
};
pub use normalize::{DeviceContext, PayloadKind, SignalNormalizer};
pub use sink::{MemorySink, RecordSink};
pub use topology::{Classifier, SiteTopology, TopologyDiscoverer};
