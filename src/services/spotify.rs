//! Spotify Web API client
//!
//! Implements [`MetadataFetcher`] using the client-credentials flow for
//! playlist reads and an optional user token for the liked-tracks library.
//! All requests go through the shared rate limiter and the transient-error
//! retry helper.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SpotifyConfig;
use crate::db::tracks::Track;
use crate::error::{Error, Result};
use crate::services::ratelimit::RateLimiter;
use crate::services::retry::with_retries;
use crate::services::{MetadataFetcher, PlaylistInfo};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const PLAYLIST_PAGE_SIZE: u32 = 100;
const LIKED_PAGE_SIZE: u32 = 50;

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    user_token: Option<String>,
    token: Mutex<Option<CachedToken>>,
    limiter: RateLimiter,
    max_attempts: u32,
}

impl SpotifyClient {
    pub fn new(cfg: &SpotifyConfig, max_attempts: u32) -> Result<Self> {
        let client_id = cfg
            .client_id
            .clone()
            .ok_or_else(|| Error::Config("spotify.client_id is required".to_string()))?;
        let client_secret = cfg
            .client_secret
            .clone()
            .ok_or_else(|| Error::Config("spotify.client_secret is required".to_string()))?;

        Ok(SpotifyClient {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| Error::Internal(format!("HTTP client init failed: {e}")))?,
            client_id,
            client_secret,
            user_token: cfg.user_token.clone(),
            token: Mutex::new(None),
            limiter: RateLimiter::new(Duration::from_millis(200)),
            max_attempts,
        })
    }

    /// Extract the bare playlist id from a raw id, URI, or share URL
    pub fn parse_playlist_ref(input: &str) -> Result<String> {
        let input = input.trim();
        if let Some(rest) = input.strip_prefix("spotify:playlist:") {
            return Ok(rest.to_string());
        }
        if let Some(idx) = input.find("open.spotify.com/playlist/") {
            let rest = &input[idx + "open.spotify.com/playlist/".len()..];
            let id = rest.split(['?', '/']).next().unwrap_or(rest);
            if id.is_empty() {
                return Err(Error::InvalidInput(format!("bad playlist URL: {input}")));
            }
            return Ok(id.to_string());
        }
        if input.is_empty() || input.contains(['/', ':', '?']) {
            return Err(Error::InvalidInput(format!("bad playlist ref: {input}")));
        }
        Ok(input.to_string())
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, "token request"));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("token response parse failed: {e}")))?;

        // Refresh a minute early so in-flight requests never race expiry
        let expires_at = Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(60));
        let access = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at,
        });
        debug!("Spotify access token refreshed");
        Ok(access)
    }

    async fn get_json(&self, url: &str, bearer: Option<&str>) -> Result<serde_json::Value> {
        with_retries("spotify_get", self.max_attempts, || async {
            self.limiter.wait().await;
            let token = match bearer {
                Some(t) => t.to_string(),
                None => self.access_token().await?,
            };
            let response = self
                .http
                .get(url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| Error::Upstream(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(map_status(status, url));
            }
            response
                .json()
                .await
                .map_err(|e| Error::Upstream(format!("response parse failed: {e}")))
        })
        .await
    }
}

fn map_status(status: reqwest::StatusCode, context: &str) -> Error {
    if status.as_u16() == 429 || status.is_server_error() {
        Error::Upstream(format!("{context}: HTTP {status}"))
    } else if status.as_u16() == 404 {
        Error::NotFound(format!("{context}: HTTP 404"))
    } else {
        Error::InvalidInput(format!("{context}: HTTP {status}"))
    }
}

#[derive(Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<ApiTrack>,
    #[serde(default)]
    is_local: bool,
}

#[derive(Deserialize)]
struct ApiTrack {
    id: Option<String>,
    name: String,
    artists: Vec<ApiArtist>,
    album: Option<ApiAlbum>,
    duration_ms: i64,
    track_number: Option<i64>,
    disc_number: Option<i64>,
    explicit: Option<bool>,
    external_ids: Option<ExternalIds>,
}

#[derive(Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Deserialize)]
struct ApiAlbum {
    name: String,
    release_date: Option<String>,
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Deserialize)]
struct ApiImage {
    url: String,
}

#[derive(Deserialize)]
struct ExternalIds {
    isrc: Option<String>,
}

fn track_from_api(api: ApiTrack) -> Option<Track> {
    // Local files and unavailable tracks carry no catalog id
    let id = api.id?;
    let release_year = api
        .album
        .as_ref()
        .and_then(|a| a.release_date.as_deref())
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse::<i64>().ok());

    Some(Track {
        source_id: id,
        title: api.name,
        artists: api.artists.into_iter().map(|a| a.name).collect(),
        album: api.album.as_ref().map(|a| a.name.clone()),
        duration_seconds: api.duration_ms / 1000,
        track_number: api.track_number,
        disc_number: api.disc_number,
        explicit: api.explicit,
        copyright: None,
        isrc: api.external_ids.and_then(|e| e.isrc),
        release_year,
        cover_url: api
            .album
            .and_then(|a| a.images.into_iter().next().map(|i| i.url)),
        local_path: None,
        lyrics_path: None,
    })
}

#[async_trait]
impl MetadataFetcher for SpotifyClient {
    async fn fetch_playlist_tracks(&self, playlist_ref: &str) -> Result<PlaylistInfo> {
        let id = Self::parse_playlist_ref(playlist_ref)?;

        let header = self
            .get_json(&format!("{API_BASE}/playlists/{id}?fields=name"), None)
            .await?;
        let name = header
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or(&id)
            .to_string();

        let mut tracks = Vec::new();
        let mut url = format!(
            "{API_BASE}/playlists/{id}/tracks?limit={PLAYLIST_PAGE_SIZE}&offset=0"
        );
        loop {
            let page: Page<PlaylistItem> = serde_json::from_value(self.get_json(&url, None).await?)?;
            for item in page.items {
                if item.is_local {
                    continue;
                }
                if let Some(track) = item.track.and_then(track_from_api) {
                    tracks.push(track);
                }
            }
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }

        info!(playlist = %id, name = %name, tracks = tracks.len(), "Playlist fetched");
        Ok(PlaylistInfo {
            playlist_ref: id,
            name,
            tracks,
        })
    }

    async fn fetch_liked_tracks(&self) -> Result<Vec<Track>> {
        let user_token = self.user_token.as_deref().ok_or_else(|| {
            Error::Config("spotify.user_token is required for liked tracks".to_string())
        })?;

        #[derive(Deserialize)]
        struct LikedItem {
            track: Option<ApiTrack>,
        }

        let mut tracks = Vec::new();
        let mut url = format!("{API_BASE}/me/tracks?limit={LIKED_PAGE_SIZE}&offset=0");
        loop {
            let page: Page<LikedItem> =
                serde_json::from_value(self.get_json(&url, Some(user_token)).await?)?;
            for item in page.items {
                if let Some(track) = item.track.and_then(track_from_api) {
                    tracks.push(track);
                }
            }
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }

        info!(tracks = tracks.len(), "Liked tracks fetched");
        Ok(tracks)
    }
}
