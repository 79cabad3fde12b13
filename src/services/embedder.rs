//! Tag and artwork embedding via lofty

use async_trait::async_trait;
use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::db::tracks::Track;
use crate::error::{Error, Result};
use crate::services::TagEmbedder;

pub struct LoftyEmbedder {
    http: reqwest::Client,
}

impl LoftyEmbedder {
    pub fn new() -> Result<Self> {
        Ok(LoftyEmbedder {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .map_err(|e| Error::Internal(format!("HTTP client init failed: {e}")))?,
        })
    }

    /// Cover art fetch is best effort; tags are still written without it
    async fn fetch_cover(&self, url: &str) -> Option<Vec<u8>> {
        match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                response.bytes().await.ok().map(|b| b.to_vec())
            }
            Ok(response) => {
                warn!(url, status = %response.status(), "Cover art fetch failed");
                None
            }
            Err(e) => {
                warn!(url, error = %e, "Cover art fetch failed");
                None
            }
        }
    }
}

fn write_tags(
    path: &Path,
    track: &Track,
    lyrics: Option<&str>,
    cover: Option<Vec<u8>>,
) -> Result<()> {
    let mut tagged = Probe::open(path)
        .map_err(|e| Error::Internal(format!("open {} failed: {e}", path.display())))?
        .read()
        .map_err(|e| Error::Internal(format!("read {} failed: {e}", path.display())))?;

    let tag_type = tagged.primary_tag_type();
    if tagged.primary_tag_mut().is_none() {
        tagged.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged
        .primary_tag_mut()
        .ok_or_else(|| Error::Internal("no writable tag".to_string()))?;

    tag.set_title(track.title.clone());
    tag.set_artist(track.artists.join(", "));
    if let Some(album) = &track.album {
        tag.set_album(album.clone());
    }
    if let Some(number) = track.track_number {
        tag.set_track(number as u32);
    }
    if let Some(disc) = track.disc_number {
        tag.set_disk(disc as u32);
    }
    if let Some(year) = track.release_year {
        tag.set_year(year as u32);
    }
    if let Some(copyright) = &track.copyright {
        tag.insert_text(ItemKey::CopyrightMessage, copyright.clone());
    }
    if let Some(isrc) = &track.isrc {
        tag.insert_text(ItemKey::Isrc, isrc.clone());
    }
    if let Some(lyrics) = lyrics {
        tag.insert_text(ItemKey::Lyrics, lyrics.to_string());
    }
    if let Some(bytes) = cover {
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Jpeg),
            None,
            bytes,
        ));
    }

    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| Error::Internal(format!("save tags to {} failed: {e}", path.display())))?;
    Ok(())
}

#[async_trait]
impl TagEmbedder for LoftyEmbedder {
    async fn embed(&self, path: &Path, track: &Track, lyrics: Option<&str>) -> Result<()> {
        let cover = match &track.cover_url {
            Some(url) => self.fetch_cover(url).await,
            None => None,
        };

        let source_id = track.source_id.clone();
        let owned_path = path.to_path_buf();
        let owned_track = track.clone();
        let owned_lyrics = lyrics.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            write_tags(&owned_path, &owned_track, owned_lyrics.as_deref(), cover)
        })
        .await
        .map_err(|e| Error::Internal(format!("embed task panicked: {e}")))??;

        debug!(source_id = %source_id, path = %path.display(), "Tags embedded");
        Ok(())
    }
}
