//! Lyrics fetch phase
//!
//! Fetches lyrics for downloaded tracks and writes them as a sidecar file
//! next to the audio. Missing lyrics complete the phase; only lookup errors
//! fail it.

use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::tracks::{self, Track};
use crate::error::Result;
use crate::events::{EventLog, SyncEvent};
use crate::services::LyricsFetcher;

pub async fn process(
    pool: &SqlitePool,
    events: &EventLog,
    lyrics: &Arc<dyn LyricsFetcher>,
    track: &Track,
) -> Result<()> {
    let Some(local_path) = track.local_path.as_deref() else {
        // Nothing was downloaded (no acceptable match); nothing to annotate
        debug!(source_id = %track.source_id, "No audio file, skipping lyrics");
        return Ok(());
    };

    let found = lyrics
        .fetch_lyrics(&track.title, track.primary_artist(), track.duration_seconds)
        .await?;

    match found {
        Some(text) => {
            let sidecar = Path::new(local_path).with_extension("lrc");
            tokio::fs::write(&sidecar, &text).await?;
            tracks::set_lyrics_path(pool, &track.source_id, &sidecar.to_string_lossy()).await?;
            info!(source_id = %track.source_id, path = %sidecar.display(), "Lyrics saved");
        }
        None => {
            events
                .append(SyncEvent::LyricsMissing {
                    source_id: track.source_id.clone(),
                    title: track.title.clone(),
                })
                .await;
            debug!(source_id = %track.source_id, "No lyrics available");
        }
    }
    Ok(())
}
