//! Track metadata persistence

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};

/// Canonical track metadata keyed by the source catalog id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub source_id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub duration_seconds: i64,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub explicit: Option<bool>,
    pub copyright: Option<String>,
    pub isrc: Option<String>,
    pub release_year: Option<i64>,
    pub cover_url: Option<String>,
    /// Set once the audio phase has produced a file
    pub local_path: Option<String>,
    /// Set once the lyrics phase has written a sidecar file
    pub lyrics_path: Option<String>,
}

impl Track {
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }
}

/// Insert or update a track's metadata.
///
/// On conflict only the catalog metadata is refreshed; `local_path` and
/// `lyrics_path` are pipeline outputs and survive a re-fetch.
pub async fn upsert_track(pool: &SqlitePool, track: &Track) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let artists = serde_json::to_string(&track.artists)?;

    sqlx::query(
        r#"
        INSERT INTO tracks (
            source_id, title, artists, album, duration_seconds,
            track_number, disc_number, explicit, copyright, isrc,
            release_year, cover_url, local_path, lyrics_path,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?)
        ON CONFLICT(source_id) DO UPDATE SET
            title = excluded.title,
            artists = excluded.artists,
            album = excluded.album,
            duration_seconds = excluded.duration_seconds,
            track_number = excluded.track_number,
            disc_number = excluded.disc_number,
            explicit = excluded.explicit,
            copyright = excluded.copyright,
            isrc = excluded.isrc,
            release_year = excluded.release_year,
            cover_url = excluded.cover_url,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&track.source_id)
    .bind(&track.title)
    .bind(&artists)
    .bind(&track.album)
    .bind(track.duration_seconds)
    .bind(track.track_number)
    .bind(track.disc_number)
    .bind(track.explicit.map(|b| b as i64))
    .bind(&track.copyright)
    .bind(&track.isrc)
    .bind(track.release_year)
    .bind(&track.cover_url)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a track by source id
pub async fn load_track(pool: &SqlitePool, source_id: &str) -> Result<Track> {
    let row = sqlx::query(
        r#"
        SELECT source_id, title, artists, album, duration_seconds,
               track_number, disc_number, explicit, copyright, isrc,
               release_year, cover_url, local_path, lyrics_path
        FROM tracks WHERE source_id = ?
        "#,
    )
    .bind(source_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("track {source_id}")))?;

    track_from_row(&row)
}

pub(crate) fn track_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Track> {
    let artists_json: String = row.get("artists");
    let artists: Vec<String> = serde_json::from_str(&artists_json)?;
    let explicit: Option<i64> = row.get("explicit");

    Ok(Track {
        source_id: row.get("source_id"),
        title: row.get("title"),
        artists,
        album: row.get("album"),
        duration_seconds: row.get("duration_seconds"),
        track_number: row.get("track_number"),
        disc_number: row.get("disc_number"),
        explicit: explicit.map(|v| v != 0),
        copyright: row.get("copyright"),
        isrc: row.get("isrc"),
        release_year: row.get("release_year"),
        cover_url: row.get("cover_url"),
        local_path: row.get("local_path"),
        lyrics_path: row.get("lyrics_path"),
    })
}

/// Record where the downloaded audio file landed
pub async fn set_local_path(pool: &SqlitePool, source_id: &str, path: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE tracks SET local_path = ?, updated_at = ? WHERE source_id = ?")
        .bind(path)
        .bind(&now)
        .bind(source_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record where the lyrics sidecar file landed
pub async fn set_lyrics_path(pool: &SqlitePool, source_id: &str, path: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE tracks SET lyrics_path = ?, updated_at = ? WHERE source_id = ?")
        .bind(path)
        .bind(&now)
        .bind(source_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn sample_track(source_id: &str) -> Track {
        Track {
            source_id: source_id.to_string(),
            title: "Song A".to_string(),
            artists: vec!["Artist X".to_string(), "Artist Y".to_string()],
            album: Some("Album Z".to_string()),
            duration_seconds: 200,
            track_number: Some(3),
            disc_number: Some(1),
            explicit: Some(false),
            copyright: None,
            isrc: Some("USRC17607839".to_string()),
            release_year: Some(2019),
            cover_url: Some("https://example.invalid/cover.jpg".to_string()),
            local_path: None,
            lyrics_path: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_load_round_trips() {
        let pool = test_pool().await;
        let track = sample_track("sp:1");

        upsert_track(&pool, &track).await.unwrap();
        let loaded = load_track(&pool, "sp:1").await.unwrap();
        assert_eq!(loaded, track);
        assert_eq!(loaded.primary_artist(), "Artist X");
    }

    #[tokio::test]
    async fn re_upsert_preserves_pipeline_outputs() {
        let pool = test_pool().await;
        let mut track = sample_track("sp:1");
        upsert_track(&pool, &track).await.unwrap();
        set_local_path(&pool, "sp:1", "downloads/a.m4a").await.unwrap();
        set_lyrics_path(&pool, "sp:1", "downloads/a.lrc").await.unwrap();

        // Metadata re-fetch with a corrected title
        track.title = "Song A (Remastered)".to_string();
        upsert_track(&pool, &track).await.unwrap();

        let loaded = load_track(&pool, "sp:1").await.unwrap();
        assert_eq!(loaded.title, "Song A (Remastered)");
        assert_eq!(loaded.local_path.as_deref(), Some("downloads/a.m4a"));
        assert_eq!(loaded.lyrics_path.as_deref(), Some("downloads/a.lrc"));
    }

    #[tokio::test]
    async fn missing_track_is_not_found() {
        let pool = test_pool().await;
        let err = load_track(&pool, "sp:missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
