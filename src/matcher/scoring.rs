//! Candidate scoring
//!
//! Pure function of (track, candidate, config). Deterministic: the same
//! inputs always produce the same breakdown, which makes replace-or-retry
//! decisions reproducible.

use serde::Serialize;

use crate::config::MatchingConfig;
use crate::db::tracks::Track;
use crate::matcher::candidates::MatchCandidate;
use crate::matcher::normalize;

/// Reasons a candidate lost points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyFlag {
    Live,
    Cover,
    DurationOutOfWindow,
}

/// Full accounting of one candidate's score
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub title_similarity: f64,
    pub artist_similarity: f64,
    /// Candidate duration minus track duration, in seconds
    pub duration_delta_seconds: i64,
    pub penalty_flags: Vec<PenaltyFlag>,
    /// Final score, clamped to [0, 100]
    pub score: f64,
}

/// Score one candidate against the source track.
///
/// Base score is a weighted blend of title and artist similarity. Duration
/// mismatch beyond the tolerance window costs a capped linear penalty so a
/// radio edit is not disqualified outright. Live and cover indicators cost a
/// fixed penalty unless the source track itself carries the same marker.
pub fn score_candidate(
    track: &Track,
    candidate: &MatchCandidate,
    cfg: &MatchingConfig,
) -> ScoreBreakdown {
    let title_similarity = normalize::similarity(&track.title, &candidate.title);

    // Candidate artist is whichever comparison is kinder: uploader/first
    // artist against the track's primary artist, or the joined lists.
    let candidate_artist = candidate
        .artists
        .first()
        .map(String::as_str)
        .unwrap_or(&candidate.uploader);
    let primary = normalize::similarity(track.primary_artist(), candidate_artist);
    let joined = normalize::similarity(
        &track.artists.join(" "),
        &if candidate.artists.is_empty() {
            candidate.uploader.clone()
        } else {
            candidate.artists.join(" ")
        },
    );
    let artist_similarity = primary.max(joined);

    let weight_sum = cfg.title_weight + cfg.artist_weight;
    let mut score =
        (cfg.title_weight * title_similarity + cfg.artist_weight * artist_similarity) / weight_sum;

    let mut penalty_flags = Vec::new();

    let duration_delta_seconds = candidate.duration_seconds - track.duration_seconds;
    let excess = duration_delta_seconds.abs() - cfg.duration_tolerance_seconds;
    if excess > 0 {
        let penalty = (excess as f64 * cfg.duration_penalty_per_second).min(cfg.max_duration_penalty);
        score -= penalty;
        penalty_flags.push(PenaltyFlag::DurationOutOfWindow);
    }

    // Markers appearing in the candidate title or uploader are only penalized
    // when the source track does not carry the same marker itself.
    let candidate_text = format!("{} {}", candidate.title, candidate.uploader);
    if cfg.penalize_live
        && normalize::has_live_marker(&candidate_text)
        && !normalize::has_live_marker(&track.title)
    {
        score -= cfg.version_penalty;
        penalty_flags.push(PenaltyFlag::Live);
    }
    if cfg.penalize_cover
        && normalize::has_cover_marker(&candidate_text)
        && !normalize::has_cover_marker(&track.title)
    {
        score -= cfg.version_penalty;
        penalty_flags.push(PenaltyFlag::Cover);
    }

    if candidate.official || normalize::has_official_marker(&candidate.title) {
        score += cfg.official_bonus;
    }

    ScoreBreakdown {
        title_similarity,
        artist_similarity,
        duration_delta_seconds,
        penalty_flags,
        score: score.clamp(0.0, 100.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::candidates::QueryStrategy;

    fn track(title: &str, duration: i64) -> Track {
        Track {
            source_id: "sp:1".to_string(),
            title: title.to_string(),
            artists: vec!["Artist X".to_string()],
            album: None,
            duration_seconds: duration,
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

    fn candidate(title: &str, uploader: &str, duration: i64, official: bool) -> MatchCandidate {
        MatchCandidate {
            external_id: "abc".to_string(),
            url: "https://example.invalid/watch?v=abc".to_string(),
            title: title.to_string(),
            uploader: uploader.to_string(),
            artists: vec![],
            duration_seconds: duration,
            official,
            strategy: QueryStrategy::ArtistTitle,
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let t = track("Song A", 202);
        let c = candidate("Song A (Official Audio)", "Artist X", 202, false);
        let cfg = MatchingConfig::default();
        let first = score_candidate(&t, &c, &cfg);
        let second = score_candidate(&t, &c, &cfg);
        assert_eq!(first.score, second.score);
    }

    #[test]
    fn exact_official_match_saturates() {
        let t = track("Song A", 202);
        let c = candidate("Song A (Official Audio)", "Artist X", 202, false);
        let breakdown = score_candidate(&t, &c, &MatchingConfig::default());
        assert_eq!(breakdown.title_similarity, 100.0);
        assert_eq!(breakdown.artist_similarity, 100.0);
        assert!(breakdown.penalty_flags.is_empty());
        assert_eq!(breakdown.score, 100.0);
    }

    #[test]
    fn live_candidate_with_capped_duration_penalty_scores_low() {
        let t = track("Song A", 202);
        let c = candidate("Song A - Live", "Artist X", 245, false);
        let cfg = MatchingConfig::default();
        let breakdown = score_candidate(&t, &c, &cfg);

        // title "song a" vs "song a live": 1 - 5/11 of 100
        assert!((breakdown.title_similarity - 54.5454).abs() < 0.01);
        assert_eq!(breakdown.duration_delta_seconds, 43);
        assert!(breakdown.penalty_flags.contains(&PenaltyFlag::Live));
        assert!(breakdown
            .penalty_flags
            .contains(&PenaltyFlag::DurationOutOfWindow));
        // 0.6*54.5454 + 0.4*100 = 72.73, minus 25 live, minus capped 30
        assert!((breakdown.score - 17.7272).abs() < 0.01);
    }

    #[test]
    fn duration_tolerance_boundary() {
        let t = track("Song A", 200);
        let cfg = MatchingConfig::default();

        let at_edge = score_candidate(&t, &candidate("Song A", "Artist X", 215, false), &cfg);
        assert!(at_edge.penalty_flags.is_empty());
        assert_eq!(at_edge.score, 100.0);

        let past_edge = score_candidate(&t, &candidate("Song A", "Artist X", 216, false), &cfg);
        assert!(past_edge
            .penalty_flags
            .contains(&PenaltyFlag::DurationOutOfWindow));
        assert!((past_edge.score - 98.0).abs() < 1e-9);
    }

    #[test]
    fn live_source_track_is_not_penalized_for_live_candidates() {
        let t = track("Song A - Live at Wembley", 300);
        let c = candidate("Song A (Live)", "Artist X", 300, false);
        let breakdown = score_candidate(&t, &c, &MatchingConfig::default());
        assert!(!breakdown.penalty_flags.contains(&PenaltyFlag::Live));
    }

    #[test]
    fn penalty_toggles_disable_markers() {
        let t = track("Song A", 200);
        let c = candidate("Song A (Piano Cover)", "Someone", 200, false);
        let mut cfg = MatchingConfig::default();
        let with_penalty = score_candidate(&t, &c, &cfg);
        assert!(with_penalty.penalty_flags.contains(&PenaltyFlag::Cover));

        cfg.penalize_cover = false;
        let without = score_candidate(&t, &c, &cfg);
        assert!(!without.penalty_flags.contains(&PenaltyFlag::Cover));
        assert!(without.score > with_penalty.score);
    }

    #[test]
    fn official_flag_from_search_metadata_earns_bonus() {
        let t = track("Song A", 200);
        let plain = candidate("Song A", "Artist X", 200, false);
        let official = candidate("Song A", "Artist X", 200, true);
        let cfg = MatchingConfig::default();
        let plain_score = score_candidate(&t, &plain, &cfg).score;
        let official_score = score_candidate(&t, &official, &cfg).score;
        // Both clamp at 100 for a perfect match, so compare on a weaker title
        assert_eq!(plain_score, 100.0);
        assert_eq!(official_score, 100.0);

        let weaker = track("Song A B C", 200);
        let plain_score = score_candidate(&weaker, &plain, &cfg).score;
        let official_score = score_candidate(&weaker, &official, &cfg).score;
        assert!((official_score - plain_score - 5.0).abs() < 1e-9);
    }
}
