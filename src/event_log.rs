use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

// One JSONL row per observable dashboard event: probe timeouts,
// discarded results, restoration failures, confirmed kills and pushes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub ts: i64,
    pub scope: String,
    pub name: String,
    pub data: Value,
}

impl Event {
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ts: Utc::now().timestamp_millis(),
            scope: scope.into(),
            name: name.into(),
            data: Value::Object(Map::new()),
        }
    }

    pub fn warning(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(scope, "warning").with_data("message", Value::from(message.into()))
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Value::Object(data) = &mut self.data {
            data.insert(key.into(), value);
        }
        self
    }
}

pub trait EventLogger: Send {
    fn log(&self, event: Event);
}

pub struct NullEventLogger;

impl EventLogger for NullEventLogger {
    fn log(&self, _event: Event) {}
}

// Appends each event as its own line, unbuffered, so a tail -f on the
// log file sees events as they happen. Logging must never take the
// dashboard down; every failure here is swallowed.
pub struct FileEventLogger {
    file: Mutex<File>,
}

impl FileEventLogger {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventLogger for FileEventLogger {
    fn log(&self, event: Event) {
        let Ok(line) = serde_json::to_string(&event) else {
            return;
        };
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        let _ = writeln!(file, "{line}");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde_json::Value;

    use super::{Event, EventLogger, FileEventLogger};

    fn temp_log_path(label: &str) -> PathBuf {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        std::env::temp_dir().join(format!(
            "squad-event-log-{label}-{}-{timestamp}.jsonl",
            std::process::id()
        ))
    }

    #[test]
    fn file_logger_appends_one_json_line_per_event() {
        let path = temp_log_path("append");
        let logger = FileEventLogger::open(&path).expect("log file should open");

        logger.log(Event::new("probe", "timeout").with_data("session", Value::from("demo")));
        logger.log(Event::warning("restore", "pane vanished"));

        let raw = fs::read_to_string(&path).expect("log should be readable");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).expect("line should be json");
        assert_eq!(first["scope"], "probe");
        assert_eq!(first["name"], "timeout");
        assert_eq!(first["data"]["session"], "demo");
        assert!(first["ts"].as_i64().is_some_and(|ts| ts > 0));

        let second: Value = serde_json::from_str(lines[1]).expect("line should be json");
        assert_eq!(second["name"], "warning");
        assert_eq!(second["data"]["message"], "pane vanished");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn open_creates_missing_parent_directories() {
        let dir = temp_log_path("nested");
        let path = dir.join("logs").join("squad.jsonl");

        let logger = FileEventLogger::open(&path).expect("log file should open");
        logger.log(Event::new("boot", "started"));

        assert!(path.is_file());
        let _ = fs::remove_dir_all(&dir);
    }
}
