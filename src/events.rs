//! Append-only JSONL diagnostic event log
//!
//! Records match decisions and failures for offline audit. Appending is
//! lossy: a write failure is logged and swallowed so diagnostics can never
//! fail the pipeline itself.

use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::db::matches::CloseAlternative;
use crate::error::Result;
use crate::types::Phase;

/// One diagnostic event, tagged by kind in the serialized form
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A candidate cleared the acceptance threshold and was committed
    MatchCommitted {
        source_id: String,
        title: String,
        external_ref: String,
        score: f64,
    },
    /// No candidate reached the acceptance threshold
    MatchRejected {
        source_id: String,
        title: String,
        best_score: Option<f64>,
    },
    /// The winner had competitors within the close-alternative delta
    CloseAlternatives {
        source_id: String,
        title: String,
        chosen_ref: String,
        chosen_score: f64,
        alternatives: Vec<CloseAlternative>,
    },
    /// A unit of phase work failed after retries
    PhaseFailed {
        source_id: String,
        phase: Phase,
        error: String,
    },
    /// No lyrics were found; the phase still completes
    LyricsMissing { source_id: String, title: String },
    /// An operator replaced a committed match by hand
    MatchOverridden {
        source_id: String,
        previous_ref: Option<String>,
        new_ref: String,
    },
}

#[derive(Serialize)]
struct Envelope<'a> {
    at: String,
    #[serde(flatten)]
    event: &'a SyncEvent,
}

/// File-backed event sink; one JSON object per line
pub struct EventLog {
    file: Mutex<tokio::fs::File>,
}

impl EventLog {
    /// Open (or create) the log file in append mode
    pub fn open(path: &Path) -> Result<EventLog> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(EventLog {
            file: Mutex::new(tokio::fs::File::from_std(file)),
        })
    }

    /// Append one event. Failures are logged, never propagated.
    pub async fn append(&self, event: SyncEvent) {
        let envelope = Envelope {
            at: Utc::now().to_rfc3339(),
            event: &event,
        };
        let mut line = match serde_json::to_string(&envelope) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize diagnostic event");
                return;
            }
        };
        line.push('\n');
        let mut file = self.file.lock().await;
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!(error = %e, "Failed to append diagnostic event");
            return;
        }
        if let Err(e) = file.flush().await {
            warn!(error = %e, "Failed to flush diagnostic event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_written_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let log = EventLog::open(&path).unwrap();

        log.append(SyncEvent::MatchCommitted {
            source_id: "sp:1".to_string(),
            title: "Song A".to_string(),
            external_ref: "https://example.invalid/watch?v=abc".to_string(),
            score: 97.5,
        })
        .await;
        log.append(SyncEvent::LyricsMissing {
            source_id: "sp:1".to_string(),
            title: "Song A".to_string(),
        })
        .await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "match_committed");
        assert_eq!(first["score"], 97.5);
        assert!(first["at"].is_string());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "lyrics_missing");
    }

    #[tokio::test]
    async fn concurrent_appends_keep_lines_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let log = std::sync::Arc::new(EventLog::open(&path).unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append(SyncEvent::LyricsMissing {
                    source_id: format!("sp:{i}"),
                    title: format!("Song {i}"),
                })
                .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 16);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["event"], "lyrics_missing");
        }
    }
}
