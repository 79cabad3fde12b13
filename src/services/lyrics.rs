//! Lyrics lookup via the lrclib.net API

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::services::ratelimit::RateLimiter;
use crate::services::retry::with_retries;
use crate::services::LyricsFetcher;

const API_URL: &str = "https://lrclib.net/api/get";
const USER_AGENT: &str = concat!("playsync/", env!("CARGO_PKG_VERSION"));

pub struct LrclibClient {
    http: reqwest::Client,
    limiter: RateLimiter,
    max_attempts: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibResponse {
    #[serde(default)]
    instrumental: bool,
    synced_lyrics: Option<String>,
    plain_lyrics: Option<String>,
}

impl LrclibClient {
    pub fn new(max_attempts: u32) -> Result<Self> {
        Ok(LrclibClient {
            http: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(15))
                .build()
                .map_err(|e| Error::Internal(format!("HTTP client init failed: {e}")))?,
            limiter: RateLimiter::new(Duration::from_millis(250)),
            max_attempts,
        })
    }

    async fn lookup(
        &self,
        title: &str,
        artist: &str,
        duration_seconds: i64,
    ) -> Result<Option<String>> {
        self.limiter.wait().await;

        let response = self
            .http
            .get(API_URL)
            .query(&[
                ("track_name", title),
                ("artist_name", artist),
                ("duration", &duration_seconds.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("lyrics request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 404 {
            debug!(title, artist, "No lyrics found");
            return Ok(None);
        }
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(Error::Upstream(format!("lyrics lookup: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(Error::InvalidInput(format!("lyrics lookup: HTTP {status}")));
        }

        let body: LrclibResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("lyrics response parse failed: {e}")))?;

        if body.instrumental {
            return Ok(None);
        }
        // Synced lyrics preferred; players fall back to plain text anyway
        Ok(body
            .synced_lyrics
            .filter(|s| !s.trim().is_empty())
            .or(body.plain_lyrics.filter(|s| !s.trim().is_empty())))
    }
}

#[async_trait]
impl LyricsFetcher for LrclibClient {
    async fn fetch_lyrics(
        &self,
        title: &str,
        artist: &str,
        duration_seconds: i64,
    ) -> Result<Option<String>> {
        with_retries("lyrics_lookup", self.max_attempts, || {
            self.lookup(title, artist, duration_seconds)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synced_lyrics_are_preferred() {
        let body: LrclibResponse = serde_json::from_str(
            r#"{"instrumental": false,
                "syncedLyrics": "[00:01.00] line",
                "plainLyrics": "line"}"#,
        )
        .unwrap();
        assert_eq!(body.synced_lyrics.as_deref(), Some("[00:01.00] line"));

        let plain_only: LrclibResponse =
            serde_json::from_str(r#"{"plainLyrics": "just text"}"#).unwrap();
        assert!(plain_only.synced_lyrics.is_none());
        assert_eq!(plain_only.plain_lyrics.as_deref(), Some("just text"));
        assert!(!plain_only.instrumental);
    }
}
