//! Append-only operation log.
//!
//! Every git invocation, export/import decision and dispatch outcome is
//! written here as one line:
//!
//! ```text
//! [2026-10-19T08:15:02+00:00] [git] (0) git fetch -- origin main
//! ```
//!
//! Entries are mirrored to `tracing` so they also show up on stderr.

use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Git,
    Export,
    Import,
    Distributor,
    Rest,
    Cron,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Git => "git",
            Channel::Export => "export",
            Channel::Import => "import",
            Channel::Distributor => "distributor",
            Channel::Rest => "rest",
            Channel::Cron => "cron",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for log entries. `code` is 0 for success, nonzero otherwise
/// (git entries carry the process exit code).
pub trait LogSink: Send + Sync {
    fn log(&self, channel: Channel, code: i32, message: &str);
}

pub type SharedLog = Arc<dyn LogSink>;

fn forward(channel: Channel, code: i32, message: &str) {
    if code == 0 {
        tracing::info!(channel = channel.as_str(), "{}", message);
    } else {
        tracing::warn!(channel = channel.as_str(), code, "{}", message);
    }
}

/// Writes entries to a file, creating parent directories on first use.
pub struct FileLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        f.write_all(line.as_bytes())
    }
}

pub fn format_line(channel: Channel, code: i32, message: &str) -> String {
    format!(
        "[{}] [{}] ({}) {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        channel,
        code,
        message
    )
}

impl LogSink for FileLog {
    fn log(&self, channel: Channel, code: i32, message: &str) {
        forward(channel, code, message);
        if let Err(e) = self.append(&format_line(channel, code, message)) {
            tracing::warn!("cannot write {}: {}", self.path.display(), e);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub channel: Channel,
    pub code: i32,
    pub message: String,
}

/// Keeps entries in memory. Handy for embedding and for asserting on what
/// an operation did.
#[derive(Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<Entry>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Entries on `channel` whose message starts with `prefix`.
    pub fn matching(&self, channel: Channel, prefix: &str) -> Vec<Entry> {
        self.entries()
            .into_iter()
            .filter(|e| e.channel == channel && e.message.starts_with(prefix))
            .collect()
    }
}

impl LogSink for MemoryLog {
    fn log(&self, channel: Channel, code: i32, message: &str) {
        forward(channel, code, message);
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Entry {
                channel,
                code,
                message: message.to_string(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn line_format_has_channel_and_code() {
        let line = format_line(Channel::Distributor, 1, "boom");
        assert!(line.starts_with('['));
        assert!(line.ends_with("] [distributor] (1) boom\n"));
    }

    #[test]
    fn file_log_appends() {
        let td = tempdir().unwrap();
        let path = td.path().join("nested").join("ssgs.log");
        let log = FileLog::new(&path);
        log.log(Channel::Git, 0, "git init");
        log.log(Channel::Import, 1, "Missing file for project hero");

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[git] (0) git init"));
        assert!(lines[1].contains("[import] (1) Missing file"));
    }

    #[test]
    fn memory_log_filters_by_prefix() {
        let log = MemoryLog::new();
        log.log(Channel::Git, 0, "git add .");
        log.log(Channel::Git, 0, "git status --porcelain");
        log.log(Channel::Export, 0, "git is mentioned here");
        assert_eq!(log.matching(Channel::Git, "git add").len(), 1);
        assert_eq!(log.matching(Channel::Git, "git").len(), 2);
    }
}
