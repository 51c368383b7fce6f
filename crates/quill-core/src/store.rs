//! The `CandidateStore` trait.
//!
//! Implemented by storage backends (e.g. `quill-store-sqlite`). The jobs in
//! `quill-jobs` depend on this abstraction, not on any concrete backend.

use std::{collections::HashSet, future::Future};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Classify,
  candidate::{
    Candidate, CandidateSummary, NewCandidate, PublicationRecord, Stamp, Status,
  },
};

/// Abstraction over the persisted candidate table and the append-only
/// publication log.
///
/// Status changes only ever happen through [`CandidateStore::try_transition`],
/// a single conditional update guarded by the expected prior status. Two jobs
/// racing for the same row therefore cannot both win; the loser sees `false`.
pub trait CandidateStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Candidates ────────────────────────────────────────────────────────

  /// Persist a new candidate with status [`Status::Pending`].
  fn insert(
    &self,
    candidate: NewCandidate,
  ) -> impl Future<Output = Result<Candidate, Self::Error>> + Send + '_;

  /// Up to `limit` candidates in `status`, oldest first.
  fn list_by_status(
    &self,
    status: Status,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<CandidateSummary>, Self::Error>> + Send + '_;

  /// Up to `limit` pending candidates whose target has no publication
  /// record, oldest first. This is the arbitration batch.
  fn list_pending_unpublished(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<CandidateSummary>, Self::Error>> + Send + '_;

  /// Compare-and-swap on `status`: move `id` from `from` to `to` and set the
  /// optional write-once timestamp.
  ///
  /// Returns `Ok(false)` when no row matched (missing id, or the row is no
  /// longer in `from`). Moving to [`Status::Selected`] additionally requires
  /// that no other candidate for the same target is `selected` or `posted`
  /// and that the target has no publication record; all of this is a single
  /// statement. An edge that is not part of the state machine is an error.
  fn try_transition(
    &self,
    id: Uuid,
    from: Status,
    to: Status,
    stamp: Option<Stamp>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Claim a [`Status::Selected`] candidate for one publish run.
  ///
  /// Succeeds for exactly one caller per candidate: the row must be
  /// `selected` and not yet claimed. The claim never expires by itself; see
  /// [`CandidateStore::stale_publish_claims`].
  fn claim_for_publish(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Candidates still `selected` whose publish claim was taken at or before
  /// `claimed_before`, oldest first.
  fn stale_publish_claims(
    &self,
    claimed_before: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Load a candidate with its full thread. Fails with a
  /// [`NotFound`](crate::ErrorKind::NotFound)-kind error if the row is
  /// missing or its thread cannot be decoded.
  fn fetch_thread(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Candidate, Self::Error>> + Send + '_;

  /// Number of candidates per status. Statuses with no rows are omitted.
  fn status_counts(
    &self,
  ) -> impl Future<Output = Result<Vec<(Status, usize)>, Self::Error>> + Send + '_;

  // ── Deduplication ─────────────────────────────────────────────────────

  /// Targets with a live (`pending` or `selected`) candidate.
  fn live_targets(
    &self,
  ) -> impl Future<Output = Result<HashSet<String>, Self::Error>> + Send + '_;

  /// Targets with a publication record.
  fn published_targets(
    &self,
  ) -> impl Future<Output = Result<HashSet<String>, Self::Error>> + Send + '_;

  /// How many pending candidates target an already published id.
  fn count_published_duplicates(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Move every pending candidate whose target already has a publication
  /// record to `rejected`, in one statement. Returns the number of rows
  /// changed; a second call on the same state returns 0.
  fn reject_published_duplicates(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Publications ──────────────────────────────────────────────────────

  /// Append a publication record. Returns `false` (and writes nothing) when
  /// the target already has one.
  fn record_publication<'a>(
    &'a self,
    record: &'a PublicationRecord,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// The `n` most recent publication records, newest first.
  fn recent_publications(
    &self,
    n: usize,
  ) -> impl Future<Output = Result<Vec<PublicationRecord>, Self::Error>> + Send + '_;
}
