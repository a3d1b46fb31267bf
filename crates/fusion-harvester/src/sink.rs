//! JSON-lines record output.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use fusion_core::{CoreError, RecordBatch, RecordSink};

/// Writes one JSON object per record, one record per line.
pub struct JsonLinesSink {
    name: String,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    pub fn new(name: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.into(),
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new("stdout", Box::new(io::stdout()))
    }

    /// Append to `path`, creating it if needed.
    pub fn append(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(
            path.display().to_string(),
            Box::new(BufWriter::new(file)),
        ))
    }

    /// Stdout, or `path` when given.
    pub fn open(path: Option<&Path>) -> io::Result<Self> {
        path.map_or_else(|| Ok(Self::stdout()), Self::append)
    }

    fn failure(&self, err: &dyn std::fmt::Display) -> CoreError {
        CoreError::Sink {
            sink: self.name.clone(),
            message: err.to_string(),
        }
    }
}

impl RecordSink for JsonLinesSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn emit(&self, batch: &RecordBatch) -> Result<(), CoreError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        for record in &batch.records {
            serde_json::to_writer(&mut *writer, record).map_err(|e| self.failure(&e))?;
            writer.write_all(b"\n").map_err(|e| self.failure(&e))?;
        }
        writer.flush().map_err(|e| self.failure(&e))
    }
}
