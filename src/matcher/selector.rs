//! Match selection
//!
//! Drives the strategy loop against a candidate generator, scores each
//! batch, and applies the acceptance threshold with deterministic
//! tie-breaking. Selection itself is a pure function so it can be tested
//! with hand-built scores.

use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::config::MatchingConfig;
use crate::db::matches::{CloseAlternative, MatchRecord};
use crate::db::tracks::Track;
use crate::error::{Error, Result};
use crate::matcher::candidates::{CandidateGenerator, QueryStrategy};
use crate::matcher::scoring::{score_candidate, ScoreBreakdown};
use crate::matcher::MatchCandidate;

/// A candidate together with its score breakdown
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: MatchCandidate,
    pub breakdown: ScoreBreakdown,
}

/// Outcome of selection over all scored candidates
#[derive(Debug, Clone)]
pub struct MatchDecision {
    /// Winner, if any candidate cleared the acceptance threshold
    pub best: Option<ScoredCandidate>,
    /// Other above-threshold candidates within the close-alternative delta
    pub close_alternatives: Vec<ScoredCandidate>,
    /// Highest score seen, accepted or not
    pub top_score: Option<f64>,
    pub candidates_seen: usize,
}

impl MatchDecision {
    /// Convert to the persisted form. A rejected decision is still a valid
    /// terminal outcome: it records the best score with no external ref.
    pub fn into_record(self, source_id: &str) -> MatchRecord {
        match self.best {
            Some(winner) => MatchRecord {
                source_id: source_id.to_string(),
                external_ref: Some(winner.candidate.url),
                score: winner.breakdown.score,
                close_alternatives: self
                    .close_alternatives
                    .into_iter()
                    .map(|sc| CloseAlternative {
                        external_ref: sc.candidate.url,
                        title: sc.candidate.title,
                        score: sc.breakdown.score,
                    })
                    .collect(),
                decided_at: Utc::now(),
                overridden: false,
            },
            None => MatchRecord {
                source_id: source_id.to_string(),
                external_ref: None,
                score: self.top_score.unwrap_or(0.0),
                close_alternatives: Vec::new(),
                decided_at: Utc::now(),
                overridden: false,
            },
        }
    }
}

/// Resolves one track to its best external candidate
pub struct MatchSelector {
    generator: CandidateGenerator,
    cfg: MatchingConfig,
}

impl MatchSelector {
    pub fn new(generator: CandidateGenerator, cfg: MatchingConfig) -> Self {
        MatchSelector { generator, cfg }
    }

    /// Run the strategy loop for one track and select the winner.
    ///
    /// Per-strategy failures are logged and skipped; resolution only fails
    /// when every attempted strategy failed and no candidate was seen.
    pub async fn resolve(&self, track: &Track) -> Result<MatchDecision> {
        let mut scored: Vec<ScoredCandidate> = Vec::new();
        let mut seen = HashSet::new();
        let mut last_error: Option<Error> = None;

        for (strategy, query) in self.generator.queries(track) {
            let budget = self.generator.max_candidates().saturating_sub(scored.len());
            if budget == 0 {
                break;
            }
            let best_so_far = scored
                .iter()
                .map(|sc| sc.breakdown.score)
                .fold(f64::NEG_INFINITY, f64::max);
            if best_so_far >= self.cfg.short_circuit_score {
                break;
            }
            // Title alone is too noisy to run when narrower strategies
            // already produced candidates
            if strategy == QueryStrategy::TitleOnly && !scored.is_empty() {
                continue;
            }

            match self
                .generator
                .search_strategy(strategy, &query, &mut seen, budget)
                .await
            {
                Ok(batch) => {
                    for candidate in batch {
                        let breakdown = score_candidate(track, &candidate, &self.cfg);
                        scored.push(ScoredCandidate {
                            candidate,
                            breakdown,
                        });
                    }
                }
                Err(e) => {
                    warn!(
                        source_id = %track.source_id,
                        strategy = strategy.as_str(),
                        error = %e,
                        "Search strategy failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        // An empty candidate set is only a legitimate "no match" when every
        // strategy actually ran; if any failed, the absence of candidates is
        // inconclusive and must stay retryable
        if scored.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let decision = Self::decide(&self.cfg, scored);
        debug!(
            source_id = %track.source_id,
            candidates = decision.candidates_seen,
            accepted = decision.best.is_some(),
            top_score = ?decision.top_score,
            "Match resolution completed"
        );
        Ok(decision)
    }

    /// Pure selection over already-scored candidates.
    ///
    /// Order: score descending, then narrower strategy first, then smaller
    /// duration delta. The acceptance threshold is inclusive.
    pub fn decide(cfg: &MatchingConfig, mut scored: Vec<ScoredCandidate>) -> MatchDecision {
        scored.sort_by(|a, b| {
            b.breakdown
                .score
                .total_cmp(&a.breakdown.score)
                .then_with(|| {
                    a.candidate
                        .strategy
                        .priority()
                        .cmp(&b.candidate.strategy.priority())
                })
                .then_with(|| {
                    a.breakdown
                        .duration_delta_seconds
                        .abs()
                        .cmp(&b.breakdown.duration_delta_seconds.abs())
                })
        });

        let candidates_seen = scored.len();
        let top_score = scored.first().map(|sc| sc.breakdown.score);

        let mut iter = scored.into_iter();
        let winner = match iter.next() {
            Some(top) if top.breakdown.score >= cfg.acceptance_threshold => top,
            _ => {
                return MatchDecision {
                    best: None,
                    close_alternatives: Vec::new(),
                    top_score,
                    candidates_seen,
                }
            }
        };
        let close_alternatives = iter
            .filter(|sc| {
                sc.breakdown.score >= cfg.acceptance_threshold
                    && winner.breakdown.score - sc.breakdown.score <= cfg.close_alternative_delta
            })
            .collect();

        MatchDecision {
            best: Some(winner),
            close_alternatives,
            top_score,
            candidates_seen,
        }
    }
}
