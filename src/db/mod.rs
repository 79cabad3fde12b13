//! Database layer for playsync
//!
//! SQLite via sqlx. All pipeline state lives here so any phase can resume
//! after a crash. Timestamps are stored as RFC3339 TEXT.

pub mod matches;
pub mod phases;
pub mod playlists;
pub mod tracks;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

use crate::error::Result;

/// Open (creating if needed) the SQLite database at `path`
pub async fn init_database_pool(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    info!(path = %path.display(), "Database pool initialized");
    Ok(pool)
}

/// Create all tables if they do not exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    // Canonical track metadata, one row per source catalog id. A track that
    // appears in several playlists still has exactly one row here.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            source_id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            artists TEXT NOT NULL,
            album TEXT,
            duration_seconds INTEGER NOT NULL,
            track_number INTEGER,
            disc_number INTEGER,
            explicit INTEGER,
            copyright TEXT,
            isrc TEXT,
            release_year INTEGER,
            cover_url TEXT,
            local_path TEXT,
            lyrics_path TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlists (
            playlist_ref TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            last_synced TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlist_tracks (
            playlist_ref TEXT NOT NULL,
            source_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (playlist_ref, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per (track, phase). Absence of a row means pending.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS phase_status (
            source_id TEXT NOT NULL,
            phase TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_attempt_at TEXT,
            last_error TEXT,
            PRIMARY KEY (source_id, phase)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // external_ref NULL means the matcher ran and found nothing acceptable.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS match_results (
            source_id TEXT PRIMARY KEY NOT NULL,
            external_ref TEXT,
            score REAL NOT NULL,
            close_alternatives TEXT NOT NULL DEFAULT '[]',
            decided_at TEXT NOT NULL,
            overridden INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_phase_status_phase_state
         ON phase_status(phase, state)",
    )
    .execute(pool)
    .await?;

    info!("Database tables initialized");
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // Each connection to sqlite::memory: gets its own database, so tests
    // must pin the pool to a single connection.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_tables(&pool).await.unwrap();
    pool
}
