//! Audit logger (§4.8): append JSON-lines decision events to a dated file,
//! rotating by size and keeping the last N files.
//!
//! Grounded on the render-to-text texture of the teacher's
//! `strata_common::metrics::render_prometheus` — build the record, then
//! write it out through one small helper — but the wire format here is
//! JSON-lines rather than Prometheus exposition text, and writes go to a
//! dedicated mutex-guarded file instead of an HTTP response body (§5
//! "audit writes use a dedicated mutex with an explicit sync after
//! critical events").

use crate::error::AuditError;
use crate::model::{DecisionEvent, EventKind};
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Best-effort system snapshot captured alongside action/error events. A
/// missing metric is recorded as zero, never as an error (§9).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemSnapshot {
    pub load1: f64,
    pub mem_used_kib: u64,
    pub mem_total_kib: u64,
    pub thread_count: u32,
    pub uptime_s: u64,
    pub active_connections: u32,
    pub process_count: u32,
}

impl SystemSnapshot {
    /// Capture a best-effort snapshot. CPU load, memory, and process count
    /// come from `sysinfo`, same as the agent's own hardware scan; uptime
    /// stays a direct `/proc/uptime` read since sysinfo doesn't shortcut it
    /// any cheaper. Each field falls back to zero independently.
    pub fn capture() -> Self {
        let sys = sysinfo::System::new_all();

        SystemSnapshot {
            load1: sysinfo::System::load_average().one,
            mem_used_kib: sys.used_memory() / 1024,
            mem_total_kib: sys.total_memory() / 1024,
            thread_count: read_self_threads().unwrap_or(0),
            uptime_s: read_uptime().unwrap_or(0),
            active_connections: read_tcp_connection_count().unwrap_or(0),
            process_count: sys.processes().len() as u32,
        }
    }
}

fn read_self_threads() -> Option<u32> {
    let text = fs::read_to_string("/proc/self/status").ok()?;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("Threads:") {
            return rest.trim().parse().ok();
        }
    }
    None
}

fn read_uptime() -> Option<u64> {
    let text = fs::read_to_string("/proc/uptime").ok()?;
    let secs: f64 = text.split_whitespace().next()?.parse().ok()?;
    Some(secs as u64)
}

fn read_tcp_connection_count() -> Option<u32> {
    let text = fs::read_to_string("/proc/net/tcp").ok()?;
    Some(text.lines().count().saturating_sub(1) as u32)
}

/// A fully-formed audit record, the union of a [`DecisionEvent`] and its
/// captured context.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord<'a> {
    #[serde(flatten)]
    pub event: &'a DecisionEvent,
    pub component: &'static str,
    pub system: SystemSnapshot,
}

struct OpenFile {
    file: File,
    path: PathBuf,
    bytes_written: u64,
    date: chrono::NaiveDate,
}

/// Append-only JSON-lines writer, rotated by size with a fixed retention
/// count.
pub struct AuditLogger {
    dir: PathBuf,
    rotate_bytes: u64,
    keep_files: u32,
    current: Mutex<Option<OpenFile>>,
}

impl AuditLogger {
    pub fn new(dir: impl Into<PathBuf>, rotate_mib: u64, keep_files: u32) -> Self {
        AuditLogger {
            dir: dir.into(),
            rotate_bytes: rotate_mib.saturating_mul(1024 * 1024),
            keep_files,
            current: Mutex::new(None),
        }
    }

    fn path_for(&self, date: chrono::NaiveDate) -> PathBuf {
        self.dir.join(format!("audit-{}.jsonl", date.format("%Y%m%d")))
    }

    fn open_current(&self) -> Result<OpenFile, AuditError> {
        fs::create_dir_all(&self.dir).map_err(|e| AuditError::Open {
            path: self.dir.display().to_string(),
            source: e,
        })?;
        let date = Utc::now().date_naive();
        let path = self.path_for(date);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::Open {
                path: path.display().to_string(),
                source: e,
            })?;
        let bytes_written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(OpenFile {
            file,
            path,
            bytes_written,
            date,
        })
    }

    fn rotate(&self, state: &mut OpenFile) -> Result<(), AuditError> {
        let rotated = state.path.with_extension(format!(
            "jsonl.{}",
            Utc::now().timestamp_millis()
        ));
        fs::rename(&state.path, &rotated).map_err(AuditError::Rotate)?;
        self.prune_old_files()?;
        *state = self.open_current()?;
        Ok(())
    }

    fn prune_old_files(&self) -> Result<(), AuditError> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Ok(());
        };
        let mut files: Vec<(std::time::SystemTime, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("audit-")
            })
            .filter_map(|e| {
                let modified = e.metadata().ok()?.modified().ok()?;
                Some((modified, e.path()))
            })
            .collect();
        files.sort_by_key(|(t, _)| *t);
        while files.len() > self.keep_files as usize {
            let (_, path) = files.remove(0);
            let _ = fs::remove_file(path);
        }
        Ok(())
    }

    /// Append one event. Action and error events force an fsync (§4.8).
    pub fn write(&self, event: &DecisionEvent) -> Result<(), AuditError> {
        let record = AuditRecord {
            event,
            component: "wanctl-core",
            system: SystemSnapshot::capture(),
        };
        let mut line = serde_json::to_vec(&record).expect("DecisionEvent is always serializable");
        line.push(b'\n');

        let mut guard = self.current.lock().expect("audit logger mutex poisoned");
        if guard.is_none() {
            *guard = Some(self.open_current()?);
        }
        let state = guard.as_mut().expect("just initialized");

        let today = Utc::now().date_naive();
        if state.date != today {
            *state = self.open_current()?;
        }
        if state.bytes_written + line.len() as u64 > self.rotate_bytes {
            self.rotate(state)?;
        }

        state.file.write_all(&line).map_err(AuditError::Write)?;
        state.bytes_written += line.len() as u64;

        if matches!(event.kind, EventKind::Action | EventKind::Error) {
            state.file.sync_all().map_err(AuditError::Write)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoreBreakdown;
    use tempfile_free::TempDir;

    mod tempfile_free {
        use std::path::PathBuf;

        pub struct TempDir(pub PathBuf);

        impl TempDir {
            pub fn new(label: &str) -> Self {
                let dir = std::env::temp_dir().join(format!(
                    "wanctl-audit-test-{label}-{}",
                    std::process::id()
                ));
                let _ = std::fs::remove_dir_all(&dir);
                std::fs::create_dir_all(&dir).unwrap();
                TempDir(dir)
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }

        impl AsRef<std::path::Path> for TempDir {
            fn as_ref(&self) -> &std::path::Path {
                &self.0
            }
        }
    }

    fn event(kind: EventKind) -> DecisionEvent {
        DecisionEvent {
            timestamp: Utc::now(),
            event_id: 1,
            kind,
            from: Some("wan".to_string()),
            to: Some("lte".to_string()),
            reason: "test".to_string(),
            confidence: 0.5,
            thresholds: Vec::new(),
            breakdowns: vec![("best".to_string(), ScoreBreakdown::default())],
        }
    }

    #[test]
    fn writes_jsonl_records() {
        let dir = TempDir::new("basic");
        let logger = AuditLogger::new(dir.0.clone(), 50, 10);
        logger.write(&event(EventKind::Evaluation)).unwrap();
        let path = logger.path_for(Utc::now().date_naive());
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(serde_json::from_str::<serde_json::Value>(contents.lines().next().unwrap()).is_ok());
    }

    #[test]
    fn rotates_past_size_limit() {
        let dir = TempDir::new("rotate");
        let logger = AuditLogger::new(dir.0.clone(), 0, 10);
        for _ in 0..3 {
            logger.write(&event(EventKind::Evaluation)).unwrap();
        }
        let rotated_count = fs::read_dir(&dir.0)
            .unwrap()
            .filter_map(|e| e.ok())
            .count();
        assert!(rotated_count >= 2, "expected rotation to produce extra files");
    }
}
