//! Configuration for playsync
//!
//! Settings come from a TOML file with environment-variable overrides for
//! credentials (ENV wins over TOML). Every knob has a serde default so a
//! missing or partial file still yields a runnable configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};

const DEFAULT_CONFIG_PATH: &str = "playsync.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Source catalog credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotifyConfig {
    /// Client id for the client-credentials flow
    pub client_id: Option<String>,
    /// Client secret for the client-credentials flow
    pub client_secret: Option<String>,
    /// User access token; only required for fetching liked tracks
    pub user_token: Option<String>,
}

/// Knobs for the scoring model and match selector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Weight of title similarity in the base score
    #[serde(default = "default_title_weight")]
    pub title_weight: f64,
    /// Weight of artist similarity in the base score
    #[serde(default = "default_artist_weight")]
    pub artist_weight: f64,
    /// Duration window (seconds) with zero penalty
    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance_seconds: i64,
    /// Penalty per second beyond the tolerance window
    #[serde(default = "default_duration_penalty_per_second")]
    pub duration_penalty_per_second: f64,
    /// Cap on the duration penalty so a perfect text match can recover
    #[serde(default = "default_max_duration_penalty")]
    pub max_duration_penalty: f64,
    /// Penalize live-performance candidates when the source track is not live
    #[serde(default = "default_true")]
    pub penalize_live: bool,
    /// Penalize cover/instrumental candidates when the source track is not one
    #[serde(default = "default_true")]
    pub penalize_cover: bool,
    /// Fixed penalty for live/cover indicators
    #[serde(default = "default_version_penalty")]
    pub version_penalty: f64,
    /// Small bonus for "official audio/video" indicators
    #[serde(default = "default_official_bonus")]
    pub official_bonus: f64,
    /// Minimum score for a candidate to be committed (inclusive)
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
    /// Candidates within this delta of the winner are logged for audit
    #[serde(default = "default_close_alternative_delta")]
    pub close_alternative_delta: f64,
    /// Stop issuing further search strategies once the best score reaches this
    #[serde(default = "default_short_circuit_score")]
    pub short_circuit_score: f64,
    /// Maximum candidates scored per track across all strategies
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            title_weight: default_title_weight(),
            artist_weight: default_artist_weight(),
            duration_tolerance_seconds: default_duration_tolerance(),
            duration_penalty_per_second: default_duration_penalty_per_second(),
            max_duration_penalty: default_max_duration_penalty(),
            penalize_live: true,
            penalize_cover: true,
            version_penalty: default_version_penalty(),
            official_bonus: default_official_bonus(),
            acceptance_threshold: default_acceptance_threshold(),
            close_alternative_delta: default_close_alternative_delta(),
            short_circuit_score: default_short_circuit_score(),
            max_candidates: default_max_candidates(),
        }
    }
}

/// Knobs for the orchestrator and collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Worker pool size inside a single phase
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// `in_progress` rows older than this are treated as abandoned
    #[serde(default = "default_stale_after_seconds")]
    pub stale_after_seconds: i64,
    /// Maximum attempts for a transient upstream call before giving up
    #[serde(default = "default_max_upstream_attempts")]
    pub max_upstream_attempts: u32,
    /// SQLite database path
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Directory audio artifacts are downloaded into
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
    /// Append-only JSONL diagnostic event log
    #[serde(default = "default_events_log")]
    pub events_log: String,
    /// Audio container format passed to the download executor
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    /// Results requested per search query
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            stale_after_seconds: default_stale_after_seconds(),
            max_upstream_attempts: default_max_upstream_attempts(),
            database_path: default_database_path(),
            download_dir: default_download_dir(),
            events_log: default_events_log(),
            audio_format: default_audio_format(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_title_weight() -> f64 {
    0.6
}
fn default_artist_weight() -> f64 {
    0.4
}
fn default_duration_tolerance() -> i64 {
    15
}
fn default_duration_penalty_per_second() -> f64 {
    2.0
}
fn default_max_duration_penalty() -> f64 {
    30.0
}
fn default_true() -> bool {
    true
}
fn default_version_penalty() -> f64 {
    25.0
}
fn default_official_bonus() -> f64 {
    5.0
}
fn default_acceptance_threshold() -> f64 {
    70.0
}
fn default_close_alternative_delta() -> f64 {
    5.0
}
fn default_short_circuit_score() -> f64 {
    90.0
}
fn default_max_candidates() -> usize {
    50
}
fn default_concurrency() -> usize {
    4
}
fn default_stale_after_seconds() -> i64 {
    1800
}
fn default_max_upstream_attempts() -> u32 {
    5
}
fn default_database_path() -> String {
    "playsync.db".to_string()
}
fn default_download_dir() -> String {
    "downloads".to_string()
}
fn default_events_log() -> String {
    "playsync-events.jsonl".to_string()
}
fn default_audio_format() -> String {
    "m4a".to_string()
}
fn default_search_limit() -> usize {
    20
}

impl Config {
    /// Load configuration from an explicit path, or from `playsync.toml` in
    /// the working directory when it exists, falling back to defaults.
    ///
    /// Environment variables override file values for credentials:
    /// `PLAYSYNC_SPOTIFY_CLIENT_ID`, `PLAYSYNC_SPOTIFY_CLIENT_SECRET`,
    /// `PLAYSYNC_SPOTIFY_USER_TOKEN`.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Config::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {} failed: {e}", path.display())))?;
        let config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("parse {} failed: {e}", path.display())))?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PLAYSYNC_SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = Some(v);
        }
        if let Ok(v) = std::env::var("PLAYSYNC_SPOTIFY_CLIENT_SECRET") {
            self.spotify.client_secret = Some(v);
        }
        if let Ok(v) = std::env::var("PLAYSYNC_SPOTIFY_USER_TOKEN") {
            self.spotify.user_token = Some(v);
        }
    }

    fn validate(&self) -> Result<()> {
        let m = &self.matching;
        if m.title_weight + m.artist_weight <= 0.0 {
            return Err(Error::Config(
                "title_weight + artist_weight must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&m.acceptance_threshold) {
            return Err(Error::Config(
                "acceptance_threshold must be within [0, 100]".to_string(),
            ));
        }
        if m.duration_tolerance_seconds < 0 {
            return Err(Error::Config(
                "duration_tolerance_seconds must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
