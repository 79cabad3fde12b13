//! Playlist and membership persistence
//!
//! Membership is a link table so a track appearing in several playlists has
//! one canonical `tracks` row and one pipeline state.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::db::tracks::{track_from_row, Track};
use crate::error::Result;

/// Insert or refresh a playlist header row
pub async fn upsert_playlist(pool: &SqlitePool, playlist_ref: &str, name: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO playlists (playlist_ref, name, last_synced)
        VALUES (?, ?, ?)
        ON CONFLICT(playlist_ref) DO UPDATE SET
            name = excluded.name,
            last_synced = excluded.last_synced
        "#,
    )
    .bind(playlist_ref)
    .bind(name)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}

/// All playlist refs known to the database
pub async fn list_playlist_refs(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT playlist_ref FROM playlists ORDER BY playlist_ref")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|r| r.get("playlist_ref")).collect())
}

/// Replace the ordered membership of a playlist atomically
pub async fn replace_memberships(
    pool: &SqlitePool,
    playlist_ref: &str,
    source_ids: &[String],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM playlist_tracks WHERE playlist_ref = ?")
        .bind(playlist_ref)
        .execute(&mut *tx)
        .await?;

    for (position, source_id) in source_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO playlist_tracks (playlist_ref, source_id, position) VALUES (?, ?, ?)",
        )
        .bind(playlist_ref)
        .bind(source_id)
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Tracks of a playlist in playlist order
pub async fn playlist_members(pool: &SqlitePool, playlist_ref: &str) -> Result<Vec<Track>> {
    let rows = sqlx::query(
        r#"
        SELECT t.source_id, t.title, t.artists, t.album, t.duration_seconds,
               t.track_number, t.disc_number, t.explicit, t.copyright, t.isrc,
               t.release_year, t.cover_url, t.local_path, t.lyrics_path
        FROM playlist_tracks pt
        JOIN tracks t ON t.source_id = pt.source_id
        WHERE pt.playlist_ref = ?
        ORDER BY pt.position
        "#,
    )
    .bind(playlist_ref)
    .fetch_all(pool)
    .await?;

    rows.iter().map(track_from_row).collect()
}
