//! Per-track phase state persistence
//!
//! Each (track, phase) pair has at most one row; a missing row means
//! pending. State transitions always stamp `last_attempt_at` so abandoned
//! `in_progress` rows can be reclaimed by age.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::{Phase, PhaseState};

/// One persisted (track, phase) work unit
#[derive(Debug, Clone)]
pub struct PhaseStatus {
    pub source_id: String,
    pub phase: Phase,
    pub state: PhaseState,
    pub attempt_count: i64,
    pub last_attempt_at: Option<String>,
    pub last_error: Option<String>,
}

/// Claim a work unit: state becomes `in_progress`, attempt count increments
pub async fn mark_in_progress(pool: &SqlitePool, source_id: &str, phase: Phase) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO phase_status (source_id, phase, state, attempt_count, last_attempt_at)
        VALUES (?, ?, 'in_progress', 1, ?)
        ON CONFLICT(source_id, phase) DO UPDATE SET
            state = 'in_progress',
            attempt_count = attempt_count + 1,
            last_attempt_at = excluded.last_attempt_at
        "#,
    )
    .bind(source_id)
    .bind(phase.as_str())
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a work unit complete and clear any stored error
pub async fn mark_done(pool: &SqlitePool, source_id: &str, phase: Phase) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO phase_status (source_id, phase, state, attempt_count, last_attempt_at)
        VALUES (?, ?, 'done', 1, ?)
        ON CONFLICT(source_id, phase) DO UPDATE SET
            state = 'done',
            last_attempt_at = excluded.last_attempt_at,
            last_error = NULL
        "#,
    )
    .bind(source_id)
    .bind(phase.as_str())
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a work unit failed with the error that stopped it
pub async fn mark_failed(
    pool: &SqlitePool,
    source_id: &str,
    phase: Phase,
    error: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO phase_status (source_id, phase, state, attempt_count, last_attempt_at, last_error)
        VALUES (?, ?, 'failed', 1, ?, ?)
        ON CONFLICT(source_id, phase) DO UPDATE SET
            state = 'failed',
            last_attempt_at = excluded.last_attempt_at,
            last_error = excluded.last_error
        "#,
    )
    .bind(source_id)
    .bind(phase.as_str())
    .bind(&now)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Current state of one (track, phase), or None if no row exists yet
pub async fn get_status(
    pool: &SqlitePool,
    source_id: &str,
    phase: Phase,
) -> Result<Option<PhaseStatus>> {
    let row = sqlx::query(
        "SELECT source_id, phase, state, attempt_count, last_attempt_at, last_error
         FROM phase_status WHERE source_id = ? AND phase = ?",
    )
    .bind(source_id)
    .bind(phase.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(|r| status_from_row(&r)).transpose()
}

/// All phase rows for one track, in pipeline order
pub async fn list_statuses(pool: &SqlitePool, source_id: &str) -> Result<Vec<PhaseStatus>> {
    let rows = sqlx::query(
        "SELECT source_id, phase, state, attempt_count, last_attempt_at, last_error
         FROM phase_status WHERE source_id = ?",
    )
    .bind(source_id)
    .fetch_all(pool)
    .await?;

    let mut statuses = rows
        .iter()
        .map(status_from_row)
        .collect::<Result<Vec<_>>>()?;
    statuses.sort_by_key(|s| Phase::ALL.iter().position(|p| *p == s.phase));
    Ok(statuses)
}

fn status_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PhaseStatus> {
    let phase: String = row.get("phase");
    let state: String = row.get("state");
    Ok(PhaseStatus {
        source_id: row.get("source_id"),
        phase: Phase::from_str(&phase)
            .map_err(|_| Error::Integrity(format!("unknown phase in database: {phase}")))?,
        state: PhaseState::from_str(&state)?,
        attempt_count: row.get("attempt_count"),
        last_attempt_at: row.get("last_attempt_at"),
        last_error: row.get("last_error"),
    })
}

/// Tracks eligible for `phase`: predecessor done, and this phase either has
/// no row, is pending, or is an `in_progress` row older than `stale_cutoff`
/// (an RFC3339 timestamp). Failed rows are excluded; they require an
/// explicit retry.
pub async fn pending_tracks(
    pool: &SqlitePool,
    phase: Phase,
    playlist_ref: Option<&str>,
    stale_cutoff: &str,
) -> Result<Vec<String>> {
    let mut sql = String::from(
        "SELECT t.source_id FROM tracks t
         LEFT JOIN phase_status ps
             ON ps.source_id = t.source_id AND ps.phase = ?",
    );
    if phase.predecessor().is_some() {
        sql.push_str(
            " JOIN phase_status pred
                  ON pred.source_id = t.source_id
                 AND pred.phase = ? AND pred.state = 'done'",
        );
    }
    if playlist_ref.is_some() {
        sql.push_str(
            " JOIN playlist_tracks pt
                  ON pt.source_id = t.source_id AND pt.playlist_ref = ?",
        );
    }
    sql.push_str(
        " WHERE ps.state IS NULL
             OR ps.state = 'pending'
             OR (ps.state = 'in_progress' AND ps.last_attempt_at < ?)",
    );
    if playlist_ref.is_some() {
        sql.push_str(" ORDER BY pt.position");
    } else {
        sql.push_str(" ORDER BY t.source_id");
    }

    let mut query = sqlx::query(&sql).bind(phase.as_str());
    if let Some(pred) = phase.predecessor() {
        query = query.bind(pred.as_str());
    }
    if let Some(playlist) = playlist_ref {
        query = query.bind(playlist);
    }
    query = query.bind(stale_cutoff);

    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(|r| r.get("source_id")).collect())
}

/// Flip failed rows of a phase back to pending; returns how many flipped
pub async fn retry_failed(
    pool: &SqlitePool,
    phase: Phase,
    playlist_ref: Option<&str>,
) -> Result<u64> {
    let result = match playlist_ref {
        Some(playlist) => {
            sqlx::query(
                "UPDATE phase_status SET state = 'pending', last_error = NULL
                 WHERE phase = ? AND state = 'failed'
                   AND source_id IN (
                       SELECT source_id FROM playlist_tracks WHERE playlist_ref = ?
                   )",
            )
            .bind(phase.as_str())
            .bind(playlist)
            .execute(pool)
            .await?
        }
        None => {
            sqlx::query(
                "UPDATE phase_status SET state = 'pending', last_error = NULL
                 WHERE phase = ? AND state = 'failed'",
            )
            .bind(phase.as_str())
            .execute(pool)
            .await?
        }
    };
    Ok(result.rows_affected())
}

/// Tracks whose persisted state violates phase ordering: a phase marked
/// `done` while its predecessor is not. Returns (source_id, phase) pairs.
pub async fn find_integrity_violations(pool: &SqlitePool) -> Result<Vec<(String, Phase)>> {
    let mut violations = Vec::new();
    for phase in Phase::ALL {
        let Some(pred) = phase.predecessor() else {
            continue;
        };
        let rows = sqlx::query(
            "SELECT ps.source_id FROM phase_status ps
             LEFT JOIN phase_status pred
                 ON pred.source_id = ps.source_id AND pred.phase = ?
             WHERE ps.phase = ? AND ps.state = 'done'
               AND (pred.state IS NULL OR pred.state != 'done')",
        )
        .bind(pred.as_str())
        .bind(phase.as_str())
        .fetch_all(pool)
        .await?;
        for row in rows {
            violations.push((row.get("source_id"), phase));
        }
    }
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::db::tracks::{upsert_track, Track};
    use chrono::Duration;

    async fn seed_track(pool: &SqlitePool, id: &str) {
        let track = Track {
            source_id: id.to_string(),
            title: format!("Track {id}"),
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

    fn far_future() -> String {
        (Utc::now() + Duration::hours(1)).to_rfc3339()
    }

    fn now() -> String {
        Utc::now().to_rfc3339()
    }

    #[tokio::test]
    async fn attempts_accumulate_across_transitions() {
        let pool = test_pool().await;
        seed_track(&pool, "sp:1").await;

        mark_in_progress(&pool, "sp:1", Phase::Matched).await.unwrap();
        mark_failed(&pool, "sp:1", Phase::Matched, "boom").await.unwrap();
        mark_in_progress(&pool, "sp:1", Phase::Matched).await.unwrap();
        mark_done(&pool, "sp:1", Phase::Matched).await.unwrap();

        let status = get_status(&pool, "sp:1", Phase::Matched).await.unwrap().unwrap();
        assert_eq!(status.state, PhaseState::Done);
        assert_eq!(status.attempt_count, 2);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn pending_requires_predecessor_done() {
        let pool = test_pool().await;
        seed_track(&pool, "sp:1").await;
        seed_track(&pool, "sp:2").await;
        mark_done(&pool, "sp:1", Phase::MetadataFetched).await.unwrap();

        // sp:2 never finished metadata fetch, so it is not matchable
        let pending = pending_tracks(&pool, Phase::Matched, None, &now()).await.unwrap();
        assert_eq!(pending, vec!["sp:1"]);
    }

    #[tokio::test]
    async fn failed_rows_are_excluded_until_retried() {
        let pool = test_pool().await;
        seed_track(&pool, "sp:1").await;
        mark_done(&pool, "sp:1", Phase::MetadataFetched).await.unwrap();
        mark_failed(&pool, "sp:1", Phase::Matched, "boom").await.unwrap();

        let pending = pending_tracks(&pool, Phase::Matched, None, &now()).await.unwrap();
        assert!(pending.is_empty());

        let flipped = retry_failed(&pool, Phase::Matched, None).await.unwrap();
        assert_eq!(flipped, 1);
        let pending = pending_tracks(&pool, Phase::Matched, None, &now()).await.unwrap();
        assert_eq!(pending, vec!["sp:1"]);
    }

    #[tokio::test]
    async fn stale_in_progress_is_reclaimed() {
        let pool = test_pool().await;
        seed_track(&pool, "sp:1").await;
        mark_done(&pool, "sp:1", Phase::MetadataFetched).await.unwrap();
        mark_in_progress(&pool, "sp:1", Phase::Matched).await.unwrap();

        // Cutoff in the past: the fresh claim is still live
        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        let pending = pending_tracks(&pool, Phase::Matched, None, &past).await.unwrap();
        assert!(pending.is_empty());

        // Cutoff in the future: the claim counts as abandoned
        let pending = pending_tracks(&pool, Phase::Matched, None, &far_future())
            .await
            .unwrap();
        assert_eq!(pending, vec!["sp:1"]);
    }

    #[tokio::test]
    async fn integrity_violation_is_detected() {
        let pool = test_pool().await;
        seed_track(&pool, "sp:1").await;
        // audio done without a matched row
        mark_done(&pool, "sp:1", Phase::AudioDownloaded).await.unwrap();

        let violations = find_integrity_violations(&pool).await.unwrap();
        assert_eq!(violations, vec![("sp:1".to_string(), Phase::AudioDownloaded)]);
    }
}
