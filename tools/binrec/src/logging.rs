use crate::errors::RecordStreamError;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Session event sink: one JSON object per line, appended to a file.
#[derive(Debug, Clone)]
pub struct JsonlLogger {
    path: PathBuf,
    max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), RecordStreamError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| RecordStreamError::Io(e.to_string()))?;
            }
        }
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: clamp_payload(&event.payload, self.max_payload_bytes),
        })
        .map_err(|e| RecordStreamError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| RecordStreamError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| RecordStreamError::Io(e.to_string()))
    }
}

/// Oversized payloads are replaced by a string preview so every line stays
/// valid JSON; `payload_bytes` keeps the original rendered size.
fn clamp_payload(payload: &Value, max_bytes: usize) -> Value {
    let rendered = payload.to_string();
    if rendered.len() <= max_bytes {
        return payload.clone();
    }
    let mut cut = max_bytes;
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    json!({
        "truncated": true,
        "payload_bytes": rendered.len(),
        "preview": &rendered[..cut],
    })
}
