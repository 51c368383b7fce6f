//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that lexical order matches chronological order. UUIDs are stored as
//! hyphenated lowercase strings; threads as compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use quill_core::candidate::{
  Candidate, CandidateSummary, PublicationRecord, Status, Thread,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Status ───────────────────────────────────────────────────────────────────

pub fn encode_status(s: Status) -> &'static str {
  match s {
    Status::Pending => "pending",
    Status::Selected => "selected",
    Status::Posted => "posted",
    Status::Rejected => "rejected",
    Status::Error => "error",
  }
}

pub fn decode_status(s: &str) -> Result<Status> {
  s.parse()
    .map_err(|_| quill_core::Error::UnknownStatus(s.to_owned()).into())
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// The column list matching [`RawCandidate`]'s field order.
pub const CANDIDATE_COLUMNS: &str = "candidate_id, target_id, post_type, thread_json, \
                                     status, created_at, selected_at, posted_at";

/// Raw strings read directly from a `candidates` row.
pub struct RawCandidate {
  pub candidate_id: String,
  pub target_id:    String,
  pub post_type:    String,
  pub thread_json:  String,
  pub status:       String,
  pub created_at:   String,
  pub selected_at:  Option<String>,
  pub posted_at:    Option<String>,
}

impl RawCandidate {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      candidate_id: row.get(0)?,
      target_id:    row.get(1)?,
      post_type:    row.get(2)?,
      thread_json:  row.get(3)?,
      status:       row.get(4)?,
      created_at:   row.get(5)?,
      selected_at:  row.get(6)?,
      posted_at:    row.get(7)?,
    })
  }

  /// Full decode. Any failure means the row is unusable as a candidate.
  pub fn into_candidate(self) -> Result<Candidate> {
    let thread = Thread::from_json(&self.thread_json)?;
    Ok(Candidate {
      id: decode_uuid(&self.candidate_id)?,
      target_id: self.target_id,
      post_type: self.post_type,
      thread,
      status: decode_status(&self.status)?,
      created_at: decode_dt(&self.created_at)?,
      selected_at: decode_opt_dt(self.selected_at.as_deref())?,
      posted_at: decode_opt_dt(self.posted_at.as_deref())?,
    })
  }

  /// Lenient decode for listings: an unreadable thread yields
  /// `first_text: None` instead of an error.
  pub fn into_summary(self) -> Result<CandidateSummary> {
    let first_text = Thread::from_json(&self.thread_json)
      .ok()
      .map(|t| t.first().text.clone());
    Ok(CandidateSummary {
      id: decode_uuid(&self.candidate_id)?,
      target_id: self.target_id,
      post_type: self.post_type,
      status: decode_status(&self.status)?,
      created_at: decode_dt(&self.created_at)?,
      first_text,
    })
  }
}

/// Raw strings read directly from a `publications` row.
pub struct RawPublication {
  pub target_id:    String,
  pub first_text:   String,
  pub post_type:    String,
  pub published_at: String,
  pub candidate_id: Option<String>,
}

impl RawPublication {
  pub fn into_record(self) -> Result<PublicationRecord> {
    Ok(PublicationRecord {
      target_id:    self.target_id,
      first_text:   self.first_text,
      post_type:    self.post_type,
      published_at: decode_dt(&self.published_at)?,
      candidate_id: self.candidate_id.as_deref().map(decode_uuid).transpose()?,
    })
  }
}
