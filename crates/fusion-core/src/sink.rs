// ── Record sinks ──
//
// Where normalized records go after a cycle. Delivery is best effort: a
// failing sink is logged and the cycle moves on.

use std::sync::{Mutex, PoisonError};

use crate::error::CoreError;
use crate::model::{NormalizedRecord, RecordBatch};

/// Destination for record batches.
pub trait RecordSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn emit(&self, batch: &RecordBatch) -> Result<(), CoreError>;
}

/// Keeps every batch in memory. Useful for one-shot runs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<RecordBatch>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<RecordBatch> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every record received so far, flattened across batches.
    pub fn records(&self) -> Vec<NormalizedRecord> {
        self.batches()
            .into_iter()
            .flat_map(|b| b.records)
            .collect()
    }

    /// Drain and return everything received so far.
    pub fn take(&self) -> Vec<RecordBatch> {
        std::mem::take(&mut *self.batches.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl RecordSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn emit(&self, batch: &RecordBatch) -> Result<(), CoreError> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn memory_sink_collects_and_drains() {
        let sink = MemorySink::new();
        let batch = RecordBatch {
            site_id: "NE=1".into(),
            site_name: "A".into(),
            collected_at: Utc::now(),
            records: Vec::new(),
        };
        sink.emit(&batch).ok();
        sink.emit(&batch).ok();
        assert_eq!(sink.batches().len(), 2);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.batches().is_empty());
    }
}
