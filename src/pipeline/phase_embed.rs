//! Tag embedding phase
//!
//! Writes catalog metadata, lyrics, and cover art into the downloaded file.

use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::tracks::Track;
use crate::error::Result;
use crate::services::TagEmbedder;

pub async fn process(
    _pool: &SqlitePool,
    embedder: &Arc<dyn TagEmbedder>,
    track: &Track,
) -> Result<()> {
    let Some(local_path) = track.local_path.as_deref() else {
        debug!(source_id = %track.source_id, "No audio file, skipping embed");
        return Ok(());
    };

    let lyrics = match track.lyrics_path.as_deref() {
        Some(path) => Some(tokio::fs::read_to_string(path).await?),
        None => None,
    };

    embedder
        .embed(Path::new(local_path), track, lyrics.as_deref())
        .await?;

    info!(source_id = %track.source_id, path = %local_path, "Tags embedded");
    Ok(())
}
