//! Pipeline orchestrator
//!
//! Phases run strictly in order; within a phase, work units run through a
//! bounded worker pool. Every unit claims its row (`in_progress`), runs, and
//! lands on `done` or `failed`, so a crash at any point resumes cleanly.

pub mod phase_download;
pub mod phase_embed;
pub mod phase_fetch;
pub mod phase_lyrics;
pub mod phase_match;
pub mod summary;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use sqlx::SqlitePool;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{MatchingConfig, PipelineConfig};
use crate::db::{matches, phases, tracks};
use crate::db::tracks::Track;
use crate::error::{Error, Result};
use crate::events::{EventLog, SyncEvent};
use crate::matcher::{CandidateGenerator, MatchSelector, SearchProvider};
use crate::services::{AudioDownloader, LyricsFetcher, MetadataFetcher, TagEmbedder};
use crate::types::{Phase, PhaseState};

use summary::{PhaseSummary, RunSummary};

/// Pseudo playlist ref for the user's liked-tracks library
pub const LIKED_SONGS_KEY: &str = "__liked__";

/// Which tracks a run covers
#[derive(Debug, Clone)]
pub enum Scope {
    /// Every playlist already known to the database
    All,
    /// One playlist by ref
    Playlist(String),
    /// The liked-tracks library
    Liked,
}

impl Scope {
    fn playlist_filter(&self) -> Option<&str> {
        match self {
            Scope::All => None,
            Scope::Playlist(playlist_ref) => Some(playlist_ref),
            Scope::Liked => Some(LIKED_SONGS_KEY),
        }
    }
}

enum UnitOutcome {
    Succeeded,
    Failed,
    Skipped,
}

pub struct Pipeline {
    db: SqlitePool,
    matching: MatchingConfig,
    cfg: PipelineConfig,
    fetcher: Arc<dyn MetadataFetcher>,
    search: Arc<dyn SearchProvider>,
    downloader: Arc<dyn AudioDownloader>,
    lyrics: Arc<dyn LyricsFetcher>,
    embedder: Arc<dyn TagEmbedder>,
    events: Arc<EventLog>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: SqlitePool,
        matching: MatchingConfig,
        cfg: PipelineConfig,
        fetcher: Arc<dyn MetadataFetcher>,
        search: Arc<dyn SearchProvider>,
        downloader: Arc<dyn AudioDownloader>,
        lyrics: Arc<dyn LyricsFetcher>,
        embedder: Arc<dyn TagEmbedder>,
        events: Arc<EventLog>,
    ) -> Self {
        Pipeline {
            db,
            matching,
            cfg,
            fetcher,
            search,
            downloader,
            lyrics,
            embedder,
            events,
        }
    }

    /// Run every phase in order for the scope
    pub async fn run_all(&self, scope: &Scope) -> Result<RunSummary> {
        self.verify_integrity().await?;

        let mut run = RunSummary::default();
        run.push(self.run_phase_unchecked(Phase::MetadataFetched, scope).await?);
        for phase in [
            Phase::Matched,
            Phase::AudioDownloaded,
            Phase::LyricsFetched,
            Phase::Embedded,
        ] {
            run.push(self.run_phase_unchecked(phase, scope).await?);
        }
        Ok(run)
    }

    /// Run a single phase for the scope
    pub async fn run_phase(&self, phase: Phase, scope: &Scope) -> Result<PhaseSummary> {
        self.verify_integrity().await?;
        self.run_phase_unchecked(phase, scope).await
    }

    async fn run_phase_unchecked(&self, phase: Phase, scope: &Scope) -> Result<PhaseSummary> {
        match phase {
            Phase::MetadataFetched => phase_fetch::run(&self.db, &self.fetcher, scope).await,
            Phase::Matched => {
                let generator =
                    CandidateGenerator::new(self.search.clone(), self.matching.max_candidates);
                let selector = MatchSelector::new(generator, self.matching.clone());
                let selector = &selector;
                self.drive_phase(phase, scope, |track| async move {
                    phase_match::process(&self.db, &self.events, selector, &track).await
                })
                .await
            }
            Phase::AudioDownloaded => {
                let dir = PathBuf::from(&self.cfg.download_dir);
                let dir = &dir;
                self.drive_phase(phase, scope, |track| async move {
                    phase_download::process(&self.db, &self.downloader, dir, &track).await
                })
                .await
            }
            Phase::LyricsFetched => {
                self.drive_phase(phase, scope, |track| async move {
                    phase_lyrics::process(&self.db, &self.events, &self.lyrics, &track).await
                })
                .await
            }
            Phase::Embedded => {
                self.drive_phase(phase, scope, |track| async move {
                    phase_embed::process(&self.db, &self.embedder, &track).await
                })
                .await
            }
        }
    }

    /// Replace a committed match by hand; downstream phases reset to pending
    pub async fn replace_match(&self, source_id: &str, new_ref: &str) -> Result<()> {
        let previous = matches::replace_match(&self.db, source_id, new_ref).await?;
        self.events
            .append(SyncEvent::MatchOverridden {
                source_id: source_id.to_string(),
                previous_ref: previous.clone(),
                new_ref: new_ref.to_string(),
            })
            .await;
        info!(source_id, previous = ?previous, new_ref, "Match replaced");
        Ok(())
    }

    /// Flip failed units of a phase back to pending
    pub async fn retry_failed(&self, phase: Phase, scope: &Scope) -> Result<u64> {
        let flipped = phases::retry_failed(&self.db, phase, scope.playlist_filter()).await?;
        info!(phase = %phase, flipped, "Failed units reset to pending");
        Ok(flipped)
    }

    /// Fail fast when persisted state violates phase ordering
    async fn verify_integrity(&self) -> Result<()> {
        let violations = phases::find_integrity_violations(&self.db).await?;
        if violations.is_empty() {
            return Ok(());
        }
        let detail: Vec<String> = violations
            .iter()
            .map(|(source_id, phase)| format!("{source_id}/{phase}"))
            .collect();
        Err(Error::Integrity(format!(
            "phase done without predecessor done: {}",
            detail.join(", ")
        )))
    }

    async fn drive_phase<F, Fut>(
        &self,
        phase: Phase,
        scope: &Scope,
        handler: F,
    ) -> Result<PhaseSummary>
    where
        F: Fn(Track) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let cutoff = (Utc::now() - Duration::seconds(self.cfg.stale_after_seconds)).to_rfc3339();
        let source_ids =
            phases::pending_tracks(&self.db, phase, scope.playlist_filter(), &cutoff).await?;

        let mut summary = PhaseSummary::new(phase);
        summary.processed = source_ids.len();
        info!(phase = %phase, units = source_ids.len(), "Phase started");

        let handler = &handler;
        let outcomes: Vec<Result<UnitOutcome>> = stream::iter(source_ids)
            .map(|source_id| async move { self.process_unit(phase, source_id, handler).await })
            .buffer_unordered(self.cfg.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome? {
                UnitOutcome::Succeeded => summary.succeeded += 1,
                UnitOutcome::Failed => summary.failed += 1,
                UnitOutcome::Skipped => summary.skipped += 1,
            }
        }

        info!(%summary, "Phase completed");
        Ok(summary)
    }

    async fn process_unit<F, Fut>(
        &self,
        phase: Phase,
        source_id: String,
        handler: &F,
    ) -> Result<UnitOutcome>
    where
        F: Fn(Track) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        // Re-check under claim: another run may have finished this unit
        // between enumeration and now
        match phases::get_status(&self.db, &source_id, phase).await {
            Ok(Some(status)) if status.state == PhaseState::Done => {
                return Ok(UnitOutcome::Skipped)
            }
            Ok(_) => {}
            Err(e) => {
                error!(source_id, phase = %phase, error = %e, "Status read failed");
                return Ok(UnitOutcome::Failed);
            }
        }

        if let Err(e) = phases::mark_in_progress(&self.db, &source_id, phase).await {
            error!(source_id, phase = %phase, error = %e, "Claim failed");
            return Ok(UnitOutcome::Failed);
        }

        let track = match tracks::load_track(&self.db, &source_id).await {
            Ok(track) => track,
            Err(e) => {
                return Ok(self.fail_unit(&source_id, phase, &e).await);
            }
        };

        match handler(track).await {
            Ok(()) => {
                if let Err(e) = phases::mark_done(&self.db, &source_id, phase).await {
                    error!(source_id, phase = %phase, error = %e, "Completion write failed");
                    return Ok(UnitOutcome::Failed);
                }
                Ok(UnitOutcome::Succeeded)
            }
            // Broken invariants are never a per-track condition: stop the
            // whole phase before anything builds on corrupt state
            Err(e @ Error::Integrity(_)) => {
                error!(source_id, phase = %phase, error = %e, "Integrity violation");
                Err(e)
            }
            Err(e) => Ok(self.fail_unit(&source_id, phase, &e).await),
        }
    }

    async fn fail_unit(&self, source_id: &str, phase: Phase, cause: &Error) -> UnitOutcome {
        warn!(source_id, phase = %phase, error = %cause, "Unit failed");
        if let Err(e) = phases::mark_failed(&self.db, source_id, phase, &cause.to_string()).await {
            error!(source_id, phase = %phase, error = %e, "Failure write failed");
        }
        self.events
            .append(SyncEvent::PhaseFailed {
                source_id: source_id.to_string(),
                phase,
                error: cause.to_string(),
            })
            .await;
        UnitOutcome::Failed
    }
}
