use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One finished command, as written to `~/.pilot/history.jsonl`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: String,
    pub command: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub outcome: String,
    pub duration_ms: u64,
}

impl HistoryEntry {
    pub fn new(command: &str, model: &str, outcome: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            ts: chrono::Local::now().to_rfc3339(),
            command: command.to_string(),
            model: model.to_string(),
            file: None,
            outcome: outcome.into(),
            duration_ms,
        }
    }

    pub fn with_file(mut self, file: &Path) -> Self {
        self.file = Some(file.to_string_lossy().to_string());
        self
    }
}

/// Append-only JSON-lines log. Write failures are logged and otherwise
/// ignored; history must never fail a command.
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        Self::new(pilot_core::config::pilot_dir().join("history.jsonl"))
    }

    pub fn record(&self, entry: &HistoryEntry) {
        if let Err(e) = self.append(entry) {
            tracing::warn!("failed to write history to {}: {e}", self.path.display());
        }
    }

    fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        serde_json::to_writer(&mut file, entry)?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Most recent entries last; unreadable lines are skipped.
    pub fn read_recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let entries: Vec<HistoryEntry> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let start = entries.len().saturating_sub(limit);
        entries[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("nested").join("history.jsonl"));

        log.record(
            &HistoryEntry::new("improve", "sonar", "Edit applied.", 1200)
                .with_file(Path::new("src/main.rs")),
        );
        log.record(&HistoryEntry::new("complete", "sonar-pro", "ok", 80));

        let content = std::fs::read_to_string(dir.path().join("nested/history.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
        let first: serde_json::Value =
            serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(first["command"], "improve");
        assert_eq!(first["file"], "src/main.rs");
        assert!(first["ts"].as_str().unwrap().contains('T'));

        let second: serde_json::Value =
            serde_json::from_str(content.lines().nth(1).unwrap()).unwrap();
        assert!(second.get("file").is_none());
    }

    #[test]
    fn read_recent_skips_garbage_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let log = HistoryLog::new(&path);
        for i in 0..5 {
            log.record(&HistoryEntry::new("chat", "sonar", format!("n{i}"), i));
        }
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{broken\n");
        std::fs::write(&path, raw).unwrap();

        let recent = log.read_recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].outcome, "n3");
        assert_eq!(recent[1].outcome, "n4");
    }

    #[test]
    fn missing_file_reads_empty() {
        let log = HistoryLog::new("/nonexistent/pilot/history.jsonl");
        assert!(log.read_recent(10).is_empty());
    }
}
