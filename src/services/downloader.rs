//! Audio acquisition via the yt-dlp executable

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::db::tracks::Track;
use crate::error::{Error, Result};
use crate::services::AudioDownloader;

const MAX_STEM_CHARS: usize = 120;

pub struct YtDlpDownloader {
    binary: String,
    audio_format: String,
}

impl YtDlpDownloader {
    pub fn new(audio_format: &str) -> Self {
        YtDlpDownloader {
            binary: "yt-dlp".to_string(),
            audio_format: audio_format.to_string(),
        }
    }
}

/// Build a filesystem-safe "{artist} - {title}" stem for a track
pub fn sanitize_file_stem(track: &Track) -> String {
    let raw = format!("{} - {}", track.primary_artist(), track.title);
    let mut stem = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() {
            stem.push('_');
        } else {
            stem.push(c);
        }
        if stem.chars().count() >= MAX_STEM_CHARS {
            break;
        }
    }
    stem.trim_matches([' ', '.']).to_string()
}

#[async_trait]
impl AudioDownloader for YtDlpDownloader {
    async fn download(
        &self,
        external_ref: &str,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(dest_dir)?;

        let url = if external_ref.starts_with("http") {
            external_ref.to_string()
        } else {
            format!("https://www.youtube.com/watch?v={external_ref}")
        };
        let template = dest_dir.join(format!("{file_stem}.%(ext)s"));
        debug!(url = %url, dest = %template.display(), "Starting audio download");

        let output = Command::new(&self.binary)
            .arg("-x")
            .arg("--audio-format")
            .arg(&self.audio_format)
            .arg("--audio-quality")
            .arg("0")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("-o")
            .arg(&template)
            .arg(&url)
            .output()
            .await
            .map_err(|e| Error::Upstream(format!("failed to spawn {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Upstream(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let path = dest_dir.join(format!("{file_stem}.{}", self.audio_format));
        if !path.exists() {
            return Err(Error::Internal(format!(
                "download reported success but {} is missing",
                path.display()
            )));
        }
        info!(path = %path.display(), "Audio downloaded");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(artist: &str, title: &str) -> Track {
        Track {
            source_id: "sp:1".to_string(),
            title: title.to_string(),
            artists: vec![artist.to_string()],
            album: None,
            duration_seconds: 180,
            track_number: None,
            disc_number: None,
            explicit: None,
            copyright: None,
            isrc: None,
            release_year: None,
            cover_url: None,
            local_path: None,
            lyrics_path: None,
        }
    }

    #[test]
    fn forbidden_characters_are_replaced() {
        let stem = sanitize_file_stem(&track("AC/DC", "What? \"No\": Yes"));
        assert_eq!(stem, "AC_DC - What_ _No__ Yes");
    }

    #[test]
    fn long_stems_are_truncated() {
        let stem = sanitize_file_stem(&track("Artist", &"x".repeat(500)));
        assert!(stem.chars().count() <= MAX_STEM_CHARS);
    }

    #[test]
    fn trailing_dots_and_spaces_are_trimmed() {
        let stem = sanitize_file_stem(&track("Artist", "Song... "));
        assert_eq!(stem, "Artist - Song");
    }
}
