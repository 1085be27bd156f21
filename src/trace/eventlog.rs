//! CP-019: Append-only JSONL run log.
//!
//! One line per event, written as they happen. Human output stays in the
//! CLI; this log is the machine-readable record of a compile run.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lifecycle event of a compile run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CompileEvent {
    CompileStarted {
        run_id: String,
        layers: u32,
        steps: u32,
        capas_version: String,
    },
    StepStarted {
        step: String,
    },
    StepFinished {
        step: String,
        duration_seconds: f64,
    },
    StepStopped {
        step: String,
    },
    StepFailed {
        step: String,
        error: String,
    },
    OutputWritten {
        layer: String,
        path: String,
        hash: String,
    },
    CompileCompleted {
        run_id: String,
        succeeded: u32,
        stopped: u32,
        starved: u32,
        failed: u32,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: CompileEvent,
}

/// Handle on a JSONL log file. Cheap to clone; every append re-opens the
/// file in append mode so concurrent writers interleave whole lines.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event.
    pub fn append(&self, event: CompileEvent) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("cannot create log dir: {}", e))?;
        }

        let te = TimestampedEvent {
            ts: now_iso8601(),
            event,
        };
        let json =
            serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| format!("cannot open event log {}: {}", self.path.display(), e))?;

        writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))
    }
}

/// Generate an ISO 8601 timestamp. Manual implementation, no chrono
/// dependency; always UTC.
pub fn now_iso8601() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let (y, m, d) = civil_from_days((secs / 86400) as i64);
    let rem = secs % 86400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to (year, month, day), via the shifted-epoch
/// civil-calendar algorithm (era = 400 years).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Generate a run id.
pub fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("c-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cp019_now_iso8601_shape() {
        let ts = now_iso8601();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
        assert_eq!(ts.len(), 20);
    }

    #[test]
    fn test_cp019_civil_from_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(31), (1970, 2, 1));
        // leap day handling
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        assert_eq!(civil_from_days(11_017), (2000, 3, 1));
        // a century non-leap year
        assert_eq!(civil_from_days(-25_509), (1900, 2, 28));
        assert_eq!(civil_from_days(-25_508), (1900, 3, 1));
        assert_eq!(civil_from_days(19_722), (2023, 12, 31));
    }

    #[test]
    fn test_cp019_generate_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("c-"));
        assert_eq!(id.len(), 14);
    }

    #[test]
    fn test_cp019_append_event() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("out/events.jsonl"));
        log.append(CompileEvent::CompileStarted {
            run_id: "c-abc".to_string(),
            layers: 2,
            steps: 5,
            capas_version: "0.3.1".to_string(),
        })
        .unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("compile_started"));
        assert!(content.contains("c-abc"));
    }

    #[test]
    fn test_cp019_append_multiple_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"));
        for step in ["a.read", "a.zoom", "a.output"] {
            log.append(CompileEvent::StepStarted {
                step: step.to_string(),
            })
            .unwrap();
        }
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 3);
        // every line parses back
        for line in content.lines() {
            let te: TimestampedEvent = serde_json::from_str(line).unwrap();
            assert!(matches!(te.event, CompileEvent::StepStarted { .. }));
        }
    }
}
