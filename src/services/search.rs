//! Search backend via the yt-dlp executable
//!
//! Runs `yt-dlp --dump-json --flat-playlist` against a `ytsearchN:` query
//! and parses one JSON object per output line. Parsing is lenient: a line
//! that fails to parse or lacks required fields is skipped, not fatal.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::matcher::candidates::{SearchHit, SearchProvider};
use crate::services::ratelimit::RateLimiter;
use crate::services::retry::with_retries;

const TOPIC_SUFFIX: &str = " - Topic";

pub struct YtDlpSearcher {
    binary: String,
    limit: usize,
    max_attempts: u32,
    limiter: RateLimiter,
}

impl YtDlpSearcher {
    pub fn new(limit: usize, max_attempts: u32) -> Self {
        YtDlpSearcher {
            binary: "yt-dlp".to_string(),
            limit,
            max_attempts,
            limiter: RateLimiter::new(Duration::from_millis(500)),
        }
    }

    async fn run_search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.limiter.wait().await;

        let target = format!("ytsearch{}:{}", self.limit, query);
        let output = Command::new(&self.binary)
            .arg("--dump-json")
            .arg("--flat-playlist")
            .arg("--no-warnings")
            .arg("--skip-download")
            .arg(&target)
            .output()
            .await
            .map_err(|e| Error::Upstream(format!("failed to spawn {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Upstream(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut hits = Vec::new();
        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(value) => {
                    if let Some(hit) = hit_from_json(&value) {
                        hits.push(hit);
                    }
                }
                Err(e) => warn!(error = %e, "Skipping unparseable search result line"),
            }
        }
        debug!(query, hits = hits.len(), "Search completed");
        Ok(hits)
    }
}

fn hit_from_json(value: &serde_json::Value) -> Option<SearchHit> {
    let id = value.get("id")?.as_str()?.to_string();
    let title = value.get("title")?.as_str()?.to_string();

    let duration_seconds = value
        .get("duration")
        .and_then(|d| d.as_f64())
        .map(|d| d.round() as i64)
        .or_else(|| {
            value
                .get("duration_string")
                .and_then(|d| d.as_str())
                .and_then(parse_duration_text)
        })?;
    if duration_seconds <= 0 {
        return None;
    }

    let raw_uploader = value
        .get("channel")
        .or_else(|| value.get("uploader"))
        .and_then(|u| u.as_str())
        .unwrap_or("");
    // Auto-generated artist channels end in " - Topic" and carry label audio
    let official = raw_uploader.ends_with(TOPIC_SUFFIX)
        || value
            .get("channel_is_verified")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
    let uploader = raw_uploader
        .strip_suffix(TOPIC_SUFFIX)
        .unwrap_or(raw_uploader)
        .to_string();

    let url = value
        .get("url")
        .or_else(|| value.get("webpage_url"))
        .and_then(|u| u.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={id}"));

    Some(SearchHit {
        external_id: id,
        url,
        title,
        uploader,
        artists: vec![],
        duration_seconds,
        official,
    })
}

/// Parse "3:33" or "1:02:45" into seconds
fn parse_duration_text(text: &str) -> Option<i64> {
    let mut total = 0i64;
    for part in text.split(':') {
        let value: i64 = part.trim().parse().ok()?;
        total = total * 60 + value;
    }
    Some(total)
}

#[async_trait]
impl SearchProvider for YtDlpSearcher {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        with_retries("yt_search", self.max_attempts, || self.run_search(query)).await
    }
}
