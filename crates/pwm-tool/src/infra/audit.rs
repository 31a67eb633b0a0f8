//! Audit trail of script runs.
//!
//! One JSON object per line, appended to the file given with `--audit-log`.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Types of events that are logged in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Channel opened, script about to run
    RunStarted,
    /// The PWM channel could not be opened
    ChannelOpenFailed,
    /// Script ran to its end or failed
    RunFinished,
    /// A stop signal ended the script early
    RunCancelled,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Microseconds since the logger was created
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    /// Additional event-specific details
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
    started: Instant,
}

impl AuditLogger {
    /// Create a new audit logger writing to the specified path.
    /// The file is opened in append mode to preserve existing logs.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
            started: Instant::now(),
        })
    }

    pub fn log(&self, entry: &AuditEntry) -> io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::other("audit writer lock poisoned"))?;
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Stamp and log an event whose details serialize to a JSON object.
    pub fn log_event<D: Serialize>(
        &self,
        event_type: AuditEventType,
        details: &D,
    ) -> io::Result<()> {
        let details = serde_json::to_value(details)?;
        self.log(&AuditEntry {
            timestamp_us: self.started.elapsed().as_micros() as u64,
            unix_us: unix_us(),
            event_type,
            details,
        })
    }
}

fn unix_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStartedDetails {
    pub version: &'static str,
    pub chip: u32,
    pub channel: u32,
    pub script: String,
    pub default_frequency_hz: u32,
    pub default_duration_ms: u32,
    pub simulate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelOpenFailedDetails {
    pub chip: u32,
    pub channel: u32,
    pub status: u8,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunFinishedDetails {
    pub status: u8,
    pub status_text: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub commands_executed: u64,
    pub tones_played: u64,
    pub silent_holds: u64,
    pub sleeps_resumed: u64,
    pub max_overrun_us: u64,
}
