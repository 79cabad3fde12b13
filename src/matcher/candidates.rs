//! Candidate generation via search strategies
//!
//! Strategies run in priority order (ISRC first, broadest last) and each
//! produces a batch of candidates; the selector stops issuing strategies
//! once the best score is good enough or the candidate budget is spent.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::db::tracks::Track;
use crate::error::Result;

/// How a query was constructed; lower priority value runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStrategy {
    /// Exact recording identity via ISRC
    Isrc,
    /// "artist title"
    ArtistTitle,
    /// "artist title audio" to bias toward audio-only uploads
    ArtistTitleAudio,
    /// Title alone; last resort when nothing else returned candidates
    TitleOnly,
}

impl QueryStrategy {
    pub fn priority(self) -> u8 {
        match self {
            QueryStrategy::Isrc => 0,
            QueryStrategy::ArtistTitle => 1,
            QueryStrategy::ArtistTitleAudio => 2,
            QueryStrategy::TitleOnly => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryStrategy::Isrc => "isrc",
            QueryStrategy::ArtistTitle => "artist_title",
            QueryStrategy::ArtistTitleAudio => "artist_title_audio",
            QueryStrategy::TitleOnly => "title_only",
        }
    }
}

/// One raw search result from the external catalog
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub uploader: String,
    /// Structured artist list when the catalog provides one
    pub artists: Vec<String>,
    pub duration_seconds: i64,
    /// Catalog-level signal that this is an official upload
    pub official: bool,
}

/// A search hit tagged with the strategy that found it
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub uploader: String,
    pub artists: Vec<String>,
    pub duration_seconds: i64,
    pub official: bool,
    pub strategy: QueryStrategy,
}

impl MatchCandidate {
    fn from_hit(hit: SearchHit, strategy: QueryStrategy) -> Self {
        MatchCandidate {
            external_id: hit.external_id,
            url: hit.url,
            title: hit.title,
            uploader: hit.uploader,
            artists: hit.artists,
            duration_seconds: hit.duration_seconds,
            official: hit.official,
            strategy,
        }
    }
}

/// External search backend seam
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Builds queries for a track and runs them through a provider
pub struct CandidateGenerator {
    provider: Arc<dyn SearchProvider>,
    max_candidates: usize,
}

impl CandidateGenerator {
    pub fn new(provider: Arc<dyn SearchProvider>, max_candidates: usize) -> Self {
        CandidateGenerator {
            provider,
            max_candidates,
        }
    }

    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    /// Queries for a track in strategy priority order
    pub fn queries(&self, track: &Track) -> Vec<(QueryStrategy, String)> {
        let mut queries = Vec::new();
        if let Some(isrc) = track.isrc.as_deref() {
            if !isrc.is_empty() {
                queries.push((QueryStrategy::Isrc, format!("\"{isrc}\"")));
            }
        }
        let artist = track.primary_artist();
        if !artist.is_empty() {
            queries.push((
                QueryStrategy::ArtistTitle,
                format!("{artist} {}", track.title),
            ));
            queries.push((
                QueryStrategy::ArtistTitleAudio,
                format!("{artist} {} audio", track.title),
            ));
        }
        queries.push((QueryStrategy::TitleOnly, track.title.clone()));
        queries
    }

    /// Run one strategy's query, deduplicating against hits already seen
    /// and respecting the remaining candidate budget.
    pub async fn search_strategy(
        &self,
        strategy: QueryStrategy,
        query: &str,
        seen: &mut HashSet<String>,
        budget: usize,
    ) -> Result<Vec<MatchCandidate>> {
        let hits = self.provider.search(query).await?;
        let mut batch = Vec::new();
        for hit in hits {
            if batch.len() >= budget {
                break;
            }
            if !seen.insert(hit.external_id.clone()) {
                continue;
            }
            batch.push(MatchCandidate::from_hit(hit, strategy));
        }
        debug!(
            strategy = strategy.as_str(),
            query, candidates = batch.len(), "Search strategy completed"
        );
        Ok(batch)
    }
}
