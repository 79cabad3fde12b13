//! Match result persistence
//!
//! Committing a match and flipping the `matched` phase to done happen in one
//! transaction, so a crash can never leave a done phase without its result
//! row (or vice versa).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::types::Phase;

/// Outcome of match resolution for one track
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub source_id: String,
    /// None when no candidate cleared the acceptance threshold
    pub external_ref: Option<String>,
    pub score: f64,
    pub close_alternatives: Vec<CloseAlternative>,
    pub decided_at: DateTime<Utc>,
    pub overridden: bool,
}

/// A runner-up logged for audit when it scored close to the winner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseAlternative {
    pub external_ref: String,
    pub title: String,
    pub score: f64,
}

/// Persist a match decision and mark the `matched` phase done, atomically
pub async fn commit_match(pool: &SqlitePool, record: &MatchRecord) -> Result<()> {
    let alternatives = serde_json::to_string(&record.close_alternatives)?;
    let decided_at = record.decided_at.to_rfc3339();
    let now = Utc::now().to_rfc3339();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO match_results
            (source_id, external_ref, score, close_alternatives, decided_at, overridden)
        VALUES (?, ?, ?, ?, ?, 0)
        ON CONFLICT(source_id) DO UPDATE SET
            external_ref = excluded.external_ref,
            score = excluded.score,
            close_alternatives = excluded.close_alternatives,
            decided_at = excluded.decided_at,
            overridden = 0
        "#,
    )
    .bind(&record.source_id)
    .bind(&record.external_ref)
    .bind(record.score)
    .bind(&alternatives)
    .bind(&decided_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO phase_status (source_id, phase, state, attempt_count, last_attempt_at)
        VALUES (?, 'matched', 'done', 1, ?)
        ON CONFLICT(source_id, phase) DO UPDATE SET
            state = 'done',
            last_attempt_at = excluded.last_attempt_at,
            last_error = NULL
        "#,
    )
    .bind(&record.source_id)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Load the committed match for a track, if any
pub async fn load_match(pool: &SqlitePool, source_id: &str) -> Result<Option<MatchRecord>> {
    let row = sqlx::query(
        "SELECT source_id, external_ref, score, close_alternatives, decided_at, overridden
         FROM match_results WHERE source_id = ?",
    )
    .bind(source_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let alternatives_json: String = row.get("close_alternatives");
    let decided_at: String = row.get("decided_at");
    let overridden: i64 = row.get("overridden");

    Ok(Some(MatchRecord {
        source_id: row.get("source_id"),
        external_ref: row.get("external_ref"),
        score: row.get("score"),
        close_alternatives: serde_json::from_str(&alternatives_json)?,
        decided_at: DateTime::parse_from_rfc3339(&decided_at)
            .map_err(|e| Error::Integrity(format!("bad decided_at timestamp: {e}")))?
            .with_timezone(&Utc),
        overridden: overridden != 0,
    }))
}

/// Replace a committed match by hand and reset downstream phases to pending.
///
/// Returns the previous external ref (if a match row existed). The override
/// carries score 100 so it always clears the threshold on inspection, and
/// the `overridden` flag marks it as a human decision.
pub async fn replace_match(
    pool: &SqlitePool,
    source_id: &str,
    new_ref: &str,
) -> Result<Option<String>> {
    // Verify the track exists first so a typo fails loudly
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM tracks WHERE source_id = ?")
        .bind(source_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(Error::NotFound(format!("track {source_id}")));
    }

    let previous = load_match(pool, source_id)
        .await?
        .and_then(|m| m.external_ref);
    let now = Utc::now().to_rfc3339();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO match_results
            (source_id, external_ref, score, close_alternatives, decided_at, overridden)
        VALUES (?, ?, 100.0, '[]', ?, 1)
        ON CONFLICT(source_id) DO UPDATE SET
            external_ref = excluded.external_ref,
            score = 100.0,
            close_alternatives = '[]',
            decided_at = excluded.decided_at,
            overridden = 1
        "#,
    )
    .bind(source_id)
    .bind(new_ref)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO phase_status (source_id, phase, state, attempt_count, last_attempt_at)
        VALUES (?, 'matched', 'done', 1, ?)
        ON CONFLICT(source_id, phase) DO UPDATE SET
            state = 'done',
            last_attempt_at = excluded.last_attempt_at,
            last_error = NULL
        "#,
    )
    .bind(source_id)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for phase in Phase::DOWNSTREAM_OF_MATCH {
        sqlx::query(
            "UPDATE phase_status SET state = 'pending', last_error = NULL
             WHERE source_id = ? AND phase = ?",
        )
        .bind(source_id)
        .bind(phase.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{phases, test_pool};
    use crate::db::tracks::{upsert_track, Track};
    use crate::types::PhaseState;

    async fn seed_track(pool: &SqlitePool, id: &str) {
        let track = Track {
            source_id: id.to_string(),
            title: "Song".to_string(),
            artists: vec!["Artist".to_string()],
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
        };
        upsert_track(pool, &track).await.unwrap();
    }

    fn record(source_id: &str, external_ref: Option<&str>, score: f64) -> MatchRecord {
        MatchRecord {
            source_id: source_id.to_string(),
            external_ref: external_ref.map(str::to_string),
            score,
            close_alternatives: vec![CloseAlternative {
                external_ref: "https://example.invalid/watch?v=alt".to_string(),
                title: "Song (Alt)".to_string(),
                score: score - 2.0,
            }],
            decided_at: Utc::now(),
            overridden: false,
        }
    }

    #[tokio::test]
    async fn commit_persists_result_and_phase_atomically() {
        let pool = test_pool().await;
        seed_track(&pool, "sp:1").await;

        commit_match(&pool, &record("sp:1", Some("https://example.invalid/watch?v=abc"), 92.0))
            .await
            .unwrap();

        let loaded = load_match(&pool, "sp:1").await.unwrap().unwrap();
        assert_eq!(
            loaded.external_ref.as_deref(),
            Some("https://example.invalid/watch?v=abc")
        );
        assert_eq!(loaded.close_alternatives.len(), 1);
        assert!(!loaded.overridden);

        let status = phases::get_status(&pool, "sp:1", Phase::Matched)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.state, PhaseState::Done);
    }

    #[tokio::test]
    async fn no_match_is_a_valid_terminal_outcome() {
        let pool = test_pool().await;
        seed_track(&pool, "sp:1").await;

        commit_match(&pool, &record("sp:1", None, 54.0)).await.unwrap();

        let loaded = load_match(&pool, "sp:1").await.unwrap().unwrap();
        assert!(loaded.external_ref.is_none());
        let status = phases::get_status(&pool, "sp:1", Phase::Matched)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.state, PhaseState::Done);
    }

    #[tokio::test]
    async fn replace_match_resets_downstream_phases() {
        let pool = test_pool().await;
        seed_track(&pool, "sp:1").await;
        commit_match(&pool, &record("sp:1", Some("https://example.invalid/watch?v=old"), 80.0))
            .await
            .unwrap();
        for phase in Phase::DOWNSTREAM_OF_MATCH {
            phases::mark_done(&pool, "sp:1", phase).await.unwrap();
        }

        let previous = replace_match(&pool, "sp:1", "https://example.invalid/watch?v=new")
            .await
            .unwrap();
        assert_eq!(previous.as_deref(), Some("https://example.invalid/watch?v=old"));

        let loaded = load_match(&pool, "sp:1").await.unwrap().unwrap();
        assert_eq!(
            loaded.external_ref.as_deref(),
            Some("https://example.invalid/watch?v=new")
        );
        assert!(loaded.overridden);
        assert_eq!(loaded.score, 100.0);

        for phase in Phase::DOWNSTREAM_OF_MATCH {
            let status = phases::get_status(&pool, "sp:1", phase).await.unwrap().unwrap();
            assert_eq!(status.state, PhaseState::Pending);
        }
        let matched = phases::get_status(&pool, "sp:1", Phase::Matched)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched.state, PhaseState::Done);
    }

    #[tokio::test]
    async fn replace_match_for_unknown_track_fails() {
        let pool = test_pool().await;
        let err = replace_match(&pool, "sp:missing", "https://example.invalid/x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn recommit_clears_overridden_flag() {
        let pool = test_pool().await;
        seed_track(&pool, "sp:1").await;
        replace_match(&pool, "sp:1", "https://example.invalid/watch?v=manual")
            .await
            .unwrap();

        commit_match(&pool, &record("sp:1", Some("https://example.invalid/watch?v=auto"), 88.0))
            .await
            .unwrap();
        let loaded = load_match(&pool, "sp:1").await.unwrap().unwrap();
        assert!(!loaded.overridden);
    }
}
