//! [`SqliteStore`], the SQLite implementation of [`CandidateStore`].

use std::{collections::HashSet, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use quill_core::{
  candidate::{
    Candidate, CandidateSummary, NewCandidate, PublicationRecord, Stamp, Status,
  },
  store::CandidateStore,
};

use crate::{
  Error, Result,
  encode::{
    CANDIDATE_COLUMNS, RawCandidate, RawPublication, decode_status, decode_uuid,
    encode_dt, encode_status, encode_uuid,
  },
  schema::{MIGRATIONS, SCHEMA},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A candidate store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Separate
/// processes opening the same file coordinate only through the guarded
/// `UPDATE`s in [`CandidateStore::try_transition`].
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > 0 {
          for (_, step) in MIGRATIONS.iter().filter(|(from, _)| *from >= version) {
            conn.execute_batch(step)?;
          }
        }
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_summaries(
    &self,
    sql: &'static str,
    status: Status,
    limit: usize,
  ) -> Result<Vec<CandidateSummary>> {
    let status_str = encode_status(status);
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawCandidate> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
          .query_map(rusqlite::params![status_str, limit_val], RawCandidate::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCandidate::into_summary).collect()
  }

  async fn target_set(&self, sql: &'static str) -> Result<HashSet<String>> {
    let targets = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
          .query_map([], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(targets)
  }
}

// ─── SQL ─────────────────────────────────────────────────────────────────────

const LIST_BY_STATUS: &str = "
  SELECT candidate_id, target_id, post_type, thread_json,
         status, created_at, selected_at, posted_at
  FROM candidates
  WHERE status = ?1
  ORDER BY created_at ASC, rowid ASC
  LIMIT ?2";

const LIST_PENDING_UNPUBLISHED: &str = "
  SELECT candidate_id, target_id, post_type, thread_json,
         status, created_at, selected_at, posted_at
  FROM candidates
  WHERE status = ?1
    AND target_id NOT IN (SELECT target_id FROM publications)
  ORDER BY created_at ASC, rowid ASC
  LIMIT ?2";

/// Extra predicate for `pending -> selected`: the target must not already be
/// claimed by another selected/posted candidate, nor be published.
const SELECTION_GUARD: &str = "
  AND NOT EXISTS (
    SELECT 1 FROM candidates other
    WHERE other.target_id = candidates.target_id
      AND other.candidate_id != candidates.candidate_id
      AND other.status IN ('selected', 'posted'))
  AND NOT EXISTS (
    SELECT 1 FROM publications p
    WHERE p.target_id = candidates.target_id)";

const DUPLICATE_PREDICATE: &str = "
  status = 'pending'
  AND target_id IN (SELECT target_id FROM publications)";

// ─── CandidateStore impl ─────────────────────────────────────────────────────

impl CandidateStore for SqliteStore {
  type Error = Error;

  // ── Candidates ────────────────────────────────────────────────────────────

  async fn insert(&self, input: NewCandidate) -> Result<Candidate> {
    let candidate = Candidate {
      id:          Uuid::new_v4(),
      target_id:   input.target_id,
      post_type:   input.post_type,
      thread:      input.thread,
      status:      Status::Pending,
      created_at:  Utc::now(),
      selected_at: None,
      posted_at:   None,
    };

    let id_str      = encode_uuid(candidate.id);
    let target_id   = candidate.target_id.clone();
    let post_type   = candidate.post_type.clone();
    let thread_json = candidate.thread.to_json()?;
    let status_str  = encode_status(candidate.status);
    let at_str      = encode_dt(candidate.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO candidates ({CANDIDATE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL)"
          ),
          rusqlite::params![id_str, target_id, post_type, thread_json, status_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(candidate)
  }

  async fn list_by_status(
    &self,
    status: Status,
    limit: usize,
  ) -> Result<Vec<CandidateSummary>> {
    self.query_summaries(LIST_BY_STATUS, status, limit).await
  }

  async fn list_pending_unpublished(
    &self,
    limit: usize,
  ) -> Result<Vec<CandidateSummary>> {
    self
      .query_summaries(LIST_PENDING_UNPUBLISHED, Status::Pending, limit)
      .await
  }

  async fn try_transition(
    &self,
    id:    Uuid,
    from:  Status,
    to:    Status,
    stamp: Option<Stamp>,
  ) -> Result<bool> {
    if !from.can_become(to) {
      return Err(quill_core::Error::IllegalTransition { from, to }.into());
    }

    let stamp_clause = match stamp {
      Some(Stamp::SelectedAt) => ", selected_at = COALESCE(selected_at, ?4)",
      Some(Stamp::PostedAt) => ", posted_at = COALESCE(posted_at, ?4)",
      None => "",
    };
    let guard = if to == Status::Selected { SELECTION_GUARD } else { "" };
    let sql = format!(
      "UPDATE candidates SET status = ?1{stamp_clause}
       WHERE candidate_id = ?2 AND status = ?3{guard}"
    );

    let id_str   = encode_uuid(id);
    let to_str   = encode_status(to);
    let from_str = encode_status(from);
    let now_str  = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        let n = if stamp.is_some() {
          conn.execute(&sql, rusqlite::params![to_str, id_str, from_str, now_str])?
        } else {
          conn.execute(&sql, rusqlite::params![to_str, id_str, from_str])?
        };
        Ok(n)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn claim_for_publish(&self, id: Uuid) -> Result<bool> {
    let id_str  = encode_uuid(id);
    let now_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE candidates SET claimed_at = ?1
           WHERE candidate_id = ?2
             AND status = 'selected'
             AND claimed_at IS NULL",
          rusqlite::params![now_str, id_str],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn stale_publish_claims(&self, claimed_before: DateTime<Utc>) -> Result<Vec<Uuid>> {
    let cutoff = encode_dt(claimed_before);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT candidate_id FROM candidates
           WHERE status = 'selected'
             AND claimed_at IS NOT NULL
             AND claimed_at <= ?1
           ORDER BY claimed_at ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![cutoff], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn fetch_thread(&self, id: Uuid) -> Result<Candidate> {
    let id_str = encode_uuid(id);

    let raw: Option<RawCandidate> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE candidate_id = ?1"),
            rusqlite::params![id_str],
            RawCandidate::from_row,
          )
          .optional()?)
      })
      .await?;

    let raw = raw.ok_or(quill_core::Error::CandidateNotFound(id))?;
    raw.into_candidate().map_err(|e| {
      quill_core::Error::MalformedThread { id, reason: e.to_string() }.into()
    })
  }

  async fn status_counts(&self) -> Result<Vec<(Status, usize)>> {
    let raws: Vec<(String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT status, COUNT(*) FROM candidates GROUP BY status ORDER BY status",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(s, n)| -> Result<(Status, usize)> {
        Ok((decode_status(&s)?, n as usize))
      })
      .collect()
  }

  // ── Deduplication ─────────────────────────────────────────────────────────

  async fn live_targets(&self) -> Result<HashSet<String>> {
    self
      .target_set(
        "SELECT DISTINCT target_id FROM candidates
         WHERE status IN ('pending', 'selected')",
      )
      .await
  }

  async fn published_targets(&self) -> Result<HashSet<String>> {
    self.target_set("SELECT target_id FROM publications").await
  }

  async fn count_published_duplicates(&self) -> Result<usize> {
    let n: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          &format!("SELECT COUNT(*) FROM candidates WHERE {DUPLICATE_PREDICATE}"),
          [],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(n as usize)
  }

  async fn reject_published_duplicates(&self) -> Result<usize> {
    let n = self
      .conn
      .call(|conn| {
        Ok(conn.execute(
          &format!("UPDATE candidates SET status = 'rejected' WHERE {DUPLICATE_PREDICATE}"),
          [],
        )?)
      })
      .await?;
    Ok(n)
  }

  // ── Publications ──────────────────────────────────────────────────────────

  async fn record_publication(&self, record: &PublicationRecord) -> Result<bool> {
    let target_id    = record.target_id.clone();
    let first_text   = record.first_text.clone();
    let post_type    = record.post_type.clone();
    let at_str       = encode_dt(record.published_at);
    let candidate_id = record.candidate_id.map(encode_uuid);

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO publications
             (target_id, first_text, post_type, published_at, candidate_id)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![target_id, first_text, post_type, at_str, candidate_id],
        )?)
      })
      .await?;

    Ok(n == 1)
  }

  async fn recent_publications(&self, n: usize) -> Result<Vec<PublicationRecord>> {
    let limit_val = i64::try_from(n).unwrap_or(i64::MAX);

    let raws: Vec<RawPublication> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT target_id, first_text, post_type, published_at, candidate_id
           FROM publications
           ORDER BY published_at DESC, publication_id DESC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], |row| {
            Ok(RawPublication {
              target_id:    row.get(0)?,
              first_text:   row.get(1)?,
              post_type:    row.get(2)?,
              published_at: row.get(3)?,
              candidate_id: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPublication::into_record).collect()
  }
}
