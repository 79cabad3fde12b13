//! playsync - playlist sync pipeline CLI
//!
//! Resolves tracks from a source playlist catalog to external audio assets
//! and drives the five-phase pipeline: fetch metadata, resolve matches,
//! download audio, fetch lyrics, embed tags.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use playsync::config::Config;
use playsync::db;
use playsync::events::EventLog;
use playsync::pipeline::{Pipeline, Scope};
use playsync::services::downloader::YtDlpDownloader;
use playsync::services::embedder::LoftyEmbedder;
use playsync::services::lyrics::LrclibClient;
use playsync::services::search::YtDlpSearcher;
use playsync::services::spotify::SpotifyClient;
use playsync::types::Phase;

#[derive(Parser)]
#[command(name = "playsync", version, about = "Sync playlists to local audio files")]
struct Cli {
    /// Configuration file (defaults to playsync.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides configuration)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all phases for a playlist, the liked library, or everything known
    Sync {
        /// Playlist id, URI, or share URL
        playlist: Option<String>,
        /// Sync the liked-tracks library instead of a playlist
        #[arg(long, conflicts_with = "playlist")]
        liked: bool,
    },
    /// Run a single phase
    RunPhase {
        /// One of: metadata_fetched, matched, audio_downloaded,
        /// lyrics_fetched, embedded
        phase: String,
        /// Restrict to one playlist
        #[arg(long)]
        playlist: Option<String>,
    },
    /// Replace a committed match by hand; downstream phases rerun
    ReplaceMatch {
        /// Source catalog track id
        source_id: String,
        /// New external ref (URL or id)
        external_ref: String,
    },
    /// Reset failed units of a phase back to pending
    Retry {
        phase: String,
        #[arg(long)]
        playlist: Option<String>,
    },
    /// Show per-phase state for a track or a playlist
    Status {
        /// Source catalog track id
        #[arg(long, conflicts_with = "playlist")]
        track: Option<String>,
        /// Playlist id, URI, or share URL
        #[arg(long)]
        playlist: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let db_path = cli
        .database
        .unwrap_or_else(|| PathBuf::from(&config.pipeline.database_path));
    let pool = db::init_database_pool(&db_path).await?;
    db::init_tables(&pool).await?;

    match cli.command {
        Command::Sync { playlist, liked } => {
            let scope = match (playlist, liked) {
                (Some(playlist), _) => {
                    Scope::Playlist(SpotifyClient::parse_playlist_ref(&playlist)?)
                }
                (None, true) => Scope::Liked,
                (None, false) => Scope::All,
            };
            let pipeline = build_pipeline(pool, &config)?;
            let summary = pipeline.run_all(&scope).await?;
            print!("{summary}");
            if summary.failed_total() > 0 {
                std::process::exit(1);
            }
        }
        Command::RunPhase { phase, playlist } => {
            let phase = Phase::from_str(&phase)?;
            let scope = scope_for(playlist)?;
            let pipeline = build_pipeline(pool, &config)?;
            let summary = pipeline.run_phase(phase, &scope).await?;
            println!("{summary}");
            if summary.failed > 0 {
                std::process::exit(1);
            }
        }
        Command::ReplaceMatch {
            source_id,
            external_ref,
        } => {
            let events = Arc::new(EventLog::open(Path::new(&config.pipeline.events_log))?);
            let previous =
                playsync::db::matches::replace_match(&pool, &source_id, &external_ref).await?;
            events
                .append(playsync::events::SyncEvent::MatchOverridden {
                    source_id: source_id.clone(),
                    previous_ref: previous.clone(),
                    new_ref: external_ref.clone(),
                })
                .await;
            info!(source_id, previous = ?previous, new_ref = external_ref, "Match replaced");
            println!("Match replaced; downstream phases reset to pending");
        }
        Command::Retry { phase, playlist } => {
            let phase = Phase::from_str(&phase)?;
            let scope = scope_for(playlist)?;
            let flipped = playsync::db::phases::retry_failed(
                &pool,
                phase,
                match &scope {
                    Scope::Playlist(p) => Some(p.as_str()),
                    _ => None,
                },
            )
            .await?;
            println!("{flipped} failed unit(s) reset to pending");
        }
        Command::Status { track, playlist } => match (track, playlist) {
            (Some(source_id), None) => print_track_status(&pool, &source_id).await?,
            (None, Some(playlist)) => {
                let playlist_ref = SpotifyClient::parse_playlist_ref(&playlist)?;
                let members = playsync::db::playlists::playlist_members(&pool, &playlist_ref).await?;
                if members.is_empty() {
                    println!("No tracks known for playlist {playlist_ref}");
                }
                for member in members {
                    let statuses =
                        playsync::db::phases::list_statuses(&pool, &member.source_id).await?;
                    let progress: Vec<String> = statuses
                        .iter()
                        .map(|s| format!("{}={}", s.phase, s.state))
                        .collect();
                    println!(
                        "{}  {} - {}  [{}]",
                        member.source_id,
                        member.artists.join(", "),
                        member.title,
                        if progress.is_empty() {
                            "pending".to_string()
                        } else {
                            progress.join(" ")
                        }
                    );
                }
            }
            _ => anyhow::bail!("provide exactly one of --track or --playlist"),
        },
    }

    Ok(())
}

async fn print_track_status(pool: &sqlx::SqlitePool, source_id: &str) -> Result<()> {
    let track = playsync::db::tracks::load_track(pool, source_id).await?;
    println!("{} - {}", track.artists.join(", "), track.title);
    if let Some(record) = playsync::db::matches::load_match(pool, source_id).await? {
        match record.external_ref {
            Some(external_ref) => println!(
                "match: {external_ref} (score {:.1}{})",
                record.score,
                if record.overridden { ", manual" } else { "" }
            ),
            None => println!("match: none (best score {:.1})", record.score),
        }
    }
    let statuses = playsync::db::phases::list_statuses(pool, source_id).await?;
    for phase in Phase::ALL {
        let state = statuses
            .iter()
            .find(|s| s.phase == phase)
            .map(|s| s.state.to_string())
            .unwrap_or_else(|| "pending".to_string());
        println!("  {phase}: {state}");
    }
    Ok(())
}

fn scope_for(playlist: Option<String>) -> Result<Scope> {
    Ok(match playlist {
        Some(playlist) => Scope::Playlist(SpotifyClient::parse_playlist_ref(&playlist)?),
        None => Scope::All,
    })
}

fn build_pipeline(pool: sqlx::SqlitePool, config: &Config) -> Result<Pipeline> {
    let max_attempts = config.pipeline.max_upstream_attempts;
    let fetcher = Arc::new(SpotifyClient::new(&config.spotify, max_attempts)?);
    let search = Arc::new(YtDlpSearcher::new(config.pipeline.search_limit, max_attempts));
    let downloader = Arc::new(YtDlpDownloader::new(&config.pipeline.audio_format));
    let lyrics = Arc::new(LrclibClient::new(max_attempts)?);
    let embedder = Arc::new(LoftyEmbedder::new()?);
    let events = Arc::new(EventLog::open(Path::new(&config.pipeline.events_log))?);

    Ok(Pipeline::new(
        pool,
        config.matching.clone(),
        config.pipeline.clone(),
        fetcher,
        search,
        downloader,
        lyrics,
        embedder,
        events,
    ))
}
