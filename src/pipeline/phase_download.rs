//! Audio download phase
//!
//! Downloads the matched external asset and records the local path. Tracks
//! whose match resolved to nothing complete immediately with no file.

use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::tracks::{self, Track};
use crate::db::matches;
use crate::error::{Error, Result};
use crate::services::downloader::sanitize_file_stem;
use crate::services::AudioDownloader;

pub async fn process(
    pool: &SqlitePool,
    downloader: &Arc<dyn AudioDownloader>,
    download_dir: &Path,
    track: &Track,
) -> Result<()> {
    let record = matches::load_match(pool, &track.source_id)
        .await?
        .ok_or_else(|| {
            Error::Integrity(format!(
                "track {} is matched but has no match result",
                track.source_id
            ))
        })?;

    let Some(external_ref) = record.external_ref else {
        debug!(source_id = %track.source_id, "No match to download");
        return Ok(());
    };

    let stem = sanitize_file_stem(track);
    let path = downloader.download(&external_ref, download_dir, &stem).await?;
    tracks::set_local_path(pool, &track.source_id, &path.to_string_lossy()).await?;

    info!(source_id = %track.source_id, path = %path.display(), "Audio downloaded");
    Ok(())
}
