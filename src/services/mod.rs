//! External collaborators
//!
//! Each phase talks to the outside world through one trait so the pipeline
//! can be tested with in-process fakes. Concrete implementations live in the
//! sibling modules.

pub mod downloader;
pub mod embedder;
pub mod lyrics;
pub mod ratelimit;
pub mod retry;
pub mod search;
pub mod spotify;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::db::tracks::Track;
use crate::error::Result;

/// A playlist as fetched from the source catalog
#[derive(Debug, Clone)]
pub struct PlaylistInfo {
    pub playlist_ref: String,
    pub name: String,
    /// Tracks in playlist order
    pub tracks: Vec<Track>,
}

/// Source catalog: playlists and liked tracks
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch_playlist_tracks(&self, playlist_ref: &str) -> Result<PlaylistInfo>;
    async fn fetch_liked_tracks(&self) -> Result<Vec<Track>>;
}

/// Audio acquisition for a resolved external ref
#[async_trait]
pub trait AudioDownloader: Send + Sync {
    /// Download into `dest_dir` using `file_stem` (no extension); returns
    /// the path of the produced file.
    async fn download(&self, external_ref: &str, dest_dir: &Path, file_stem: &str)
        -> Result<PathBuf>;
}

/// Lyrics lookup; Ok(None) means no lyrics exist for the track
#[async_trait]
pub trait LyricsFetcher: Send + Sync {
    async fn fetch_lyrics(
        &self,
        title: &str,
        artist: &str,
        duration_seconds: i64,
    ) -> Result<Option<String>>;
}

/// Tag and artwork embedding into a downloaded audio file
#[async_trait]
pub trait TagEmbedder: Send + Sync {
    async fn embed(&self, path: &Path, track: &Track, lyrics: Option<&str>) -> Result<()>;
}
