//! Match resolution phase
//!
//! Resolves one track to its best external candidate and commits the
//! decision atomically with the phase flip. A rejected match (no candidate
//! above threshold) is still a completed phase; the track simply carries no
//! external ref downstream.

use sqlx::SqlitePool;
use tracing::info;

use crate::db::matches;
use crate::db::tracks::Track;
use crate::error::Result;
use crate::events::{EventLog, SyncEvent};
use crate::matcher::MatchSelector;

pub async fn process(
    pool: &SqlitePool,
    events: &EventLog,
    selector: &MatchSelector,
    track: &Track,
) -> Result<()> {
    let decision = selector.resolve(track).await?;

    match &decision.best {
        Some(winner) => {
            if !decision.close_alternatives.is_empty() {
                events
                    .append(SyncEvent::CloseAlternatives {
                        source_id: track.source_id.clone(),
                        title: track.title.clone(),
                        chosen_ref: winner.candidate.url.clone(),
                        chosen_score: winner.breakdown.score,
                        alternatives: decision
                            .close_alternatives
                            .iter()
                            .map(|sc| matches::CloseAlternative {
                                external_ref: sc.candidate.url.clone(),
                                title: sc.candidate.title.clone(),
                                score: sc.breakdown.score,
                            })
                            .collect(),
                    })
                    .await;
            }
            events
                .append(SyncEvent::MatchCommitted {
                    source_id: track.source_id.clone(),
                    title: track.title.clone(),
                    external_ref: winner.candidate.url.clone(),
                    score: winner.breakdown.score,
                })
                .await;
            info!(
                source_id = %track.source_id,
                title = %track.title,
                score = winner.breakdown.score,
                "Match committed"
            );
        }
        None => {
            events
                .append(SyncEvent::MatchRejected {
                    source_id: track.source_id.clone(),
                    title: track.title.clone(),
                    best_score: decision.top_score,
                })
                .await;
            info!(
                source_id = %track.source_id,
                title = %track.title,
                best_score = ?decision.top_score,
                "No acceptable match"
            );
        }
    }

    matches::commit_match(pool, &decision.into_record(&track.source_id)).await
}
