// ── Domain model ──
//
// Topology types produced by discovery and the normalized records the
// pipeline hands to sinks.

pub mod device;
pub mod record;

pub use device::{ClassifiedDevice, DeviceCategory, DeviceNode, unescape_html};
pub use record::{
    ChildSummary, FieldMap, FieldValue, Measurement, NormalizedRecord, RecordBatch,
    compare_field_keys, parse_string_key,
};
