use env_logger::{Logger, Target};
use log::{Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};
use tokio::sync::broadcast;

const MAX_LOG_ENTRIES: usize = 2000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    fn now(level: &str, target: &str, message: String) -> Self {
        Self {
            timestamp_ms: std::time::SystemTime::now()
                .duration_since(std::time::SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            level: level.to_string(),
            target: target.to_string(),
            message,
        }
    }
}

/// Bounded in-memory log ring with live subscribers.
struct LogHub {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
}

impl LogHub {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(512);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            tx,
        }
    }

    fn push(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push_back(entry.clone());
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
        let _ = self.tx.send(entry);
    }

    fn recent_entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }
}

static LOG_HUB: LazyLock<LogHub> = LazyLock::new(|| LogHub::new(MAX_LOG_ENTRIES));

/// Append-only log file, opened once. Logging to it is skipped when the
/// file cannot be opened.
struct LogFile {
    path: PathBuf,
    file: Option<Mutex<File>>,
}

impl LogFile {
    fn at_default_location() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taskboard")
            .join("logs")
            .join("server.log");
        let file = open_append(&path).ok().map(Mutex::new);
        Self { path, file }
    }

    fn append(&self, entry: &LogEntry) {
        let Some(file) = &self.file else { return };
        if let Ok(mut file) = file.lock() {
            let _ = writeln!(file, "{}", format_log_line(entry));
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

static LOG_FILE: LazyLock<LogFile> = LazyLock::new(LogFile::at_default_location);

/// `<ms> <LEVEL> <target> - <message>`, one line per entry.
fn format_log_line(entry: &LogEntry) -> String {
    format!(
        "{} {:<5} {} - {}",
        entry.timestamp_ms,
        entry.level.to_uppercase(),
        entry.target,
        entry.message.replace('\n', " | ")
    )
}

/// Filters through env_logger, then fans each record out to the ring, the
/// log file and live subscribers.
struct BroadcastLogger {
    inner: Logger,
}

impl Log for BroadcastLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry::now(
            &record.level().to_string().to_lowercase(),
            record.target(),
            record.args().to_string(),
        );
        LOG_HUB.push(entry.clone());
        LOG_FILE.append(&entry);
        // Keep the console output env_logger would have produced.
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

pub fn init() -> Result<(), SetLoggerError> {
    let _ = &*LOG_FILE;
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    builder.target(Target::Stderr);
    let logger = Box::leak(Box::new(BroadcastLogger {
        inner: builder.build(),
    }));
    log::set_logger(logger)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

pub fn recent_entries() -> Vec<LogEntry> {
    LOG_HUB.recent_entries()
}

pub fn subscribe() -> broadcast::Receiver<LogEntry> {
    LOG_HUB.tx.subscribe()
}

pub fn log_file_path() -> String {
    LOG_FILE.path.display().to_string()
}

pub fn write_fallback_line(message: &str) {
    let entry = LogEntry::now("error", "taskboard.log_bridge", message.to_string());
    LOG_HUB.push(entry.clone());
    LOG_FILE.append(&entry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_keeps_latest_entries() {
        let hub = LogHub::new(3);
        for n in 0..5 {
            hub.push(LogEntry::now("info", "taskboard.test", format!("line {}", n)));
        }
        let messages: Vec<String> = hub.recent_entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_subscribers_see_new_entries() {
        let hub = LogHub::new(10);
        let mut rx = hub.tx.subscribe();
        hub.push(LogEntry::now("warn", "taskboard.test", "disk low".to_string()));
        assert_eq!(rx.try_recv().unwrap().message, "disk low");
    }

    #[test]
    fn test_line_format_keeps_one_line_per_entry() {
        let entry = LogEntry {
            timestamp_ms: 42,
            level: "warn".into(),
            target: "taskboard.api".into(),
            message: "first\nsecond".into(),
        };
        assert_eq!(format_log_line(&entry), "42 WARN  taskboard.api - first | second");
    }

    #[test]
    fn test_log_file_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("server.log");
        let log_file = LogFile {
            file: open_append(&path).ok().map(Mutex::new),
            path: path.clone(),
        };
        log_file.append(&LogEntry::now("info", "taskboard.test", "one".to_string()));
        log_file.append(&LogEntry::now("error", "taskboard.test", "two".to_string()));

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO  taskboard.test - one"));
        assert!(lines[1].ends_with("ERROR taskboard.test - two"));
    }
}
