//! Metadata fetch phase
//!
//! Pulls playlist contents from the source catalog, upserts track rows and
//! memberships, and marks `metadata_fetched` done per track. Playlist-level
//! failures are isolated: one unreachable playlist does not stop the rest.

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::{phases, playlists, tracks};
use crate::error::Result;
use crate::pipeline::summary::PhaseSummary;
use crate::pipeline::{Scope, LIKED_SONGS_KEY};
use crate::services::{MetadataFetcher, PlaylistInfo};
use crate::types::Phase;

pub async fn run(
    pool: &SqlitePool,
    fetcher: &Arc<dyn MetadataFetcher>,
    scope: &Scope,
) -> Result<PhaseSummary> {
    let mut summary = PhaseSummary::new(Phase::MetadataFetched);

    let targets: Vec<FetchTarget> = match scope {
        Scope::All => {
            let refs = playlists::list_playlist_refs(pool).await?;
            if refs.is_empty() {
                warn!("No playlists known yet; sync a playlist or liked tracks first");
            }
            refs.into_iter().map(FetchTarget::Playlist).collect()
        }
        Scope::Playlist(playlist_ref) => vec![FetchTarget::Playlist(playlist_ref.clone())],
        Scope::Liked => vec![FetchTarget::Liked],
    };

    for target in targets {
        let fetched = match &target {
            FetchTarget::Playlist(playlist_ref) => {
                if playlist_ref == LIKED_SONGS_KEY {
                    fetch_liked(fetcher).await
                } else {
                    fetcher.fetch_playlist_tracks(playlist_ref).await
                }
            }
            FetchTarget::Liked => fetch_liked(fetcher).await,
        };

        let info = match fetched {
            Ok(info) => info,
            Err(e) => {
                error!(fetch_target = ?target, error = %e, "Playlist fetch failed");
                summary.failed += 1;
                continue;
            }
        };

        if let Err(e) = store_playlist(pool, &info, &mut summary).await {
            error!(playlist = %info.playlist_ref, error = %e, "Playlist store failed");
            summary.failed += 1;
        }
    }

    info!(%summary, "Metadata fetch completed");
    Ok(summary)
}

#[derive(Debug)]
enum FetchTarget {
    Playlist(String),
    Liked,
}

async fn fetch_liked(fetcher: &Arc<dyn MetadataFetcher>) -> Result<PlaylistInfo> {
    let tracks = fetcher.fetch_liked_tracks().await?;
    Ok(PlaylistInfo {
        playlist_ref: LIKED_SONGS_KEY.to_string(),
        name: "Liked Songs".to_string(),
        tracks,
    })
}

async fn store_playlist(
    pool: &SqlitePool,
    info: &PlaylistInfo,
    summary: &mut PhaseSummary,
) -> Result<()> {
    playlists::upsert_playlist(pool, &info.playlist_ref, &info.name).await?;

    let mut member_ids = Vec::with_capacity(info.tracks.len());
    for track in &info.tracks {
        summary.processed += 1;
        tracks::upsert_track(pool, track).await?;
        phases::mark_done(pool, &track.source_id, Phase::MetadataFetched).await?;
        summary.succeeded += 1;
        member_ids.push(track.source_id.clone());
    }

    playlists::replace_memberships(pool, &info.playlist_ref, &member_ids).await?;
    Ok(())
}
