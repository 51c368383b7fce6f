//! Selection Arbiter: picks exactly one pending candidate to publish.

use quill_core::{
  candidate::{Stamp, Status},
  ports::{RankEntry, Ranker},
  store::CandidateStore,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{JobError, JobOutcome, Result};

#[derive(Debug, Clone)]
pub struct ArbiterSettings {
  /// Most candidates shown to the ranker at once.
  pub batch_limit:  usize,
  /// Recent publications passed along so the ranker can avoid repeats.
  pub context_size: usize,
}

impl Default for ArbiterSettings {
  fn default() -> Self { Self { batch_limit: 20, context_size: 10 } }
}

/// What an arbitration run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arbitration {
  /// No pending candidate for an unpublished target.
  Empty,
  /// A candidate is already selected and waiting to be published.
  InFlight(Uuid),
  /// The pick was valid but another process claimed the row or its target
  /// first. Nothing was changed.
  Lost(Uuid),
  Selected {
    id:        Uuid,
    target_id: String,
    /// Losers moved to `rejected`.
    rejected:  usize,
    /// Losers left `pending` because their transition did not apply; the
    /// next sweep picks them up.
    skipped:   usize,
  },
}

impl Arbitration {
  pub fn outcome(&self) -> JobOutcome {
    match self {
      Self::Selected { .. } => JobOutcome::Done,
      _ => JobOutcome::NothingToDo,
    }
  }
}

pub struct Arbiter<'a, S, R> {
  store:    &'a S,
  ranker:   &'a R,
  settings: ArbiterSettings,
}

impl<'a, S, R> Arbiter<'a, S, R>
where
  S: CandidateStore,
  R: Ranker,
{
  pub fn new(store: &'a S, ranker: &'a R, settings: ArbiterSettings) -> Self {
    Self { store, ranker, settings }
  }

  /// Ask the ranker to choose among the oldest pending candidates, then
  /// select the winner and reject the rest.
  ///
  /// Fails closed: if the ranker errors or its answer does not name a
  /// member of the batch, no candidate changes status. Rows whose thread
  /// cannot be read are never ranked; they are rejected together with the
  /// losers, or on their own when nothing readable is pending.
  pub async fn arbitrate(&self) -> Result<Arbitration> {
    let in_flight = self
      .store
      .list_by_status(Status::Selected, 1)
      .await
      .map_err(JobError::store)?;
    if let Some(selected) = in_flight.first() {
      info!(candidate_id = %selected.id, "a selected candidate is still waiting to be published");
      return Ok(Arbitration::InFlight(selected.id));
    }

    let batch = self
      .store
      .list_pending_unpublished(self.settings.batch_limit)
      .await
      .map_err(JobError::store)?;

    let mut entries = Vec::with_capacity(batch.len());
    let mut targets = Vec::with_capacity(batch.len());
    let mut unreadable = Vec::new();
    for summary in batch {
      match summary.first_text {
        Some(text) => {
          targets.push(summary.target_id);
          entries.push(RankEntry {
            id: summary.id,
            post_type: summary.post_type,
            text,
          });
        }
        None => {
          warn!(candidate_id = %summary.id, "unreadable thread, left out of the batch");
          unreadable.push(summary.id);
        }
      }
    }
    if entries.is_empty() {
      self.reject_all(&unreadable).await?;
      return Ok(Arbitration::Empty);
    }

    let context: Vec<String> = self
      .store
      .recent_publications(self.settings.context_size)
      .await
      .map_err(JobError::store)?
      .into_iter()
      .map(|p| p.first_text)
      .collect();

    let reply = self
      .ranker
      .rank(&entries, &context)
      .await
      .map_err(|e| JobError::Ranker(Box::new(e)))?;

    let Some(pick) = extract_id(&reply).and_then(|id| entries.iter().position(|e| e.id == id))
    else {
      return Err(JobError::Arbitration(format!(
        "reply does not name a candidate in the batch of {}: {reply:?}",
        entries.len()
      )));
    };

    let winner = &entries[pick];
    let target_id = targets.swap_remove(pick);

    let claimed = self
      .store
      .try_transition(winner.id, Status::Pending, Status::Selected, Some(Stamp::SelectedAt))
      .await
      .map_err(JobError::store)?;
    if !claimed {
      warn!(candidate_id = %winner.id, "pick was claimed elsewhere, leaving the batch alone");
      return Ok(Arbitration::Lost(winner.id));
    }

    info!(candidate_id = %winner.id, %target_id, batch = entries.len(), "candidate selected");

    let losers: Vec<Uuid> = entries
      .iter()
      .map(|e| e.id)
      .filter(|id| *id != winner.id)
      .chain(unreadable)
      .collect();
    let (rejected, skipped) = self.reject_all(&losers).await?;

    Ok(Arbitration::Selected { id: winner.id, target_id, rejected, skipped })
  }

  /// Reject each of `ids`, counting how many moved and how many did not.
  async fn reject_all(&self, ids: &[Uuid]) -> Result<(usize, usize)> {
    let mut rejected = 0;
    let mut skipped = 0;
    for id in ids {
      if self.reject(*id).await? {
        rejected += 1;
      } else {
        skipped += 1;
      }
    }
    Ok((rejected, skipped))
  }

  /// Best-effort `pending -> rejected`. Only a store failure is an error.
  async fn reject(&self, id: Uuid) -> Result<bool> {
    let moved = self
      .store
      .try_transition(id, Status::Pending, Status::Rejected, None)
      .await;
    match moved {
      Ok(true) => Ok(true),
      Ok(false) => {
        warn!(candidate_id = %id, "candidate no longer pending, not rejected");
        Ok(false)
      }
      Err(e) => {
        warn!(candidate_id = %id, error = %e, "failed to reject candidate");
        Ok(false)
      }
    }
  }
}

/// The first hyphenated UUID anywhere in `reply`.
pub fn extract_id(reply: &str) -> Option<Uuid> {
  reply
    .split(|c: char| !(c.is_ascii_hexdigit() || c == '-'))
    .filter(|token| token.len() == 36)
    .find_map(|token| Uuid::parse_str(token).ok())
}

#[cfg(test)]
mod tests {
  use quill_core::candidate::PublicationRecord;

  use super::*;
  use crate::testing::{CountingRanker, FileStore, insert, store};

  #[test]
  fn extracts_first_uuid_from_prose() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    assert_eq!(extract_id(&format!("Best: **{a}**, then {b}.")), Some(a));
    assert_eq!(extract_id(&a.to_string()), Some(a));
    assert_eq!(extract_id("no id here"), None);
    assert_eq!(extract_id("12345678-1234-1234-1234-1234567890zz"), None);
  }

  #[tokio::test]
  async fn empty_batch_does_not_call_ranker() {
    let s = store().await;
    let ranker = CountingRanker::picking("A");

    let result = Arbiter::new(&s, &ranker, ArbiterSettings::default()).arbitrate().await.unwrap();
    assert_eq!(result, Arbitration::Empty);
    assert_eq!(result.outcome(), JobOutcome::NothingToDo);
    assert_eq!(ranker.calls(), 0);
  }

  #[tokio::test]
  async fn winner_selected_losers_rejected() {
    let s = store().await;
    let a = insert(&s, "P1", "A").await;
    let b = insert(&s, "P1", "B").await;
    let c = insert(&s, "P2", "C").await;
    let ranker = CountingRanker::picking("B");

    let result = Arbiter::new(&s, &ranker, ArbiterSettings::default()).arbitrate().await.unwrap();
    assert_eq!(result, Arbitration::Selected {
      id:        b.id,
      target_id: "P1".into(),
      rejected:  2,
      skipped:   0,
    });

    let winner = s.fetch_thread(b.id).await.unwrap();
    assert_eq!(winner.status, Status::Selected);
    assert!(winner.selected_at.is_some());
    for loser in [a.id, c.id] {
      assert_eq!(s.fetch_thread(loser).await.unwrap().status, Status::Rejected);
    }
  }

  #[tokio::test]
  async fn pick_outside_batch_changes_nothing() {
    let s = store().await;
    insert(&s, "P1", "A").await;
    insert(&s, "P1", "B").await;
    let ranker = CountingRanker::replying(&Uuid::new_v4().to_string());

    let err = Arbiter::new(&s, &ranker, ArbiterSettings::default()).arbitrate().await.unwrap_err();
    assert!(matches!(err, JobError::Arbitration(_)));
    assert_eq!(s.list_by_status(Status::Pending, 10).await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn unparseable_reply_changes_nothing() {
    let s = store().await;
    insert(&s, "P1", "A").await;
    let ranker = CountingRanker::replying("the second one, obviously");

    let err = Arbiter::new(&s, &ranker, ArbiterSettings::default()).arbitrate().await.unwrap_err();
    assert!(matches!(err, JobError::Arbitration(_)));
    assert_eq!(s.list_by_status(Status::Pending, 10).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn ranker_failure_changes_nothing() {
    let s = store().await;
    insert(&s, "P1", "A").await;
    let ranker = CountingRanker { down: true, ..CountingRanker::picking("A") };

    let err = Arbiter::new(&s, &ranker, ArbiterSettings::default()).arbitrate().await.unwrap_err();
    assert!(matches!(err, JobError::Ranker(_)));
    assert_eq!(s.list_by_status(Status::Pending, 10).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn unreadable_rows_survive_a_failed_arbitration() {
    let fs = FileStore::new().await;
    let broken = insert(&fs.store, "P1", "A").await;
    insert(&fs.store, "P2", "B").await;
    fs.corrupt(broken.id);
    let ranker = CountingRanker { down: true, ..CountingRanker::picking("B") };

    let err = Arbiter::new(&fs.store, &ranker, ArbiterSettings::default())
      .arbitrate()
      .await
      .unwrap_err();
    assert!(matches!(err, JobError::Ranker(_)));
    assert_eq!(fs.store.list_by_status(Status::Pending, 10).await.unwrap().len(), 2);
    assert!(fs.store.list_by_status(Status::Rejected, 10).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn unreadable_rows_are_rejected_with_the_losers() {
    let fs = FileStore::new().await;
    let broken = insert(&fs.store, "P1", "A").await;
    let b = insert(&fs.store, "P2", "B").await;
    fs.corrupt(broken.id);
    let ranker = CountingRanker::picking("B");

    let result = Arbiter::new(&fs.store, &ranker, ArbiterSettings::default())
      .arbitrate()
      .await
      .unwrap();
    assert_eq!(result, Arbitration::Selected {
      id:        b.id,
      target_id: "P2".into(),
      rejected:  1,
      skipped:   0,
    });
    let rejected = fs.store.list_by_status(Status::Rejected, 10).await.unwrap();
    assert_eq!(rejected.iter().map(|r| r.id).collect::<Vec<_>>(), vec![broken.id]);
  }

  #[tokio::test]
  async fn only_unreadable_rows_are_cleared_without_ranking() {
    let fs = FileStore::new().await;
    let broken = insert(&fs.store, "P1", "A").await;
    fs.corrupt(broken.id);
    let ranker = CountingRanker::picking("A");

    let result = Arbiter::new(&fs.store, &ranker, ArbiterSettings::default())
      .arbitrate()
      .await
      .unwrap();
    assert_eq!(result, Arbitration::Empty);
    assert_eq!(ranker.calls(), 0);
    assert_eq!(fs.store.list_by_status(Status::Rejected, 10).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn waits_while_a_selection_is_in_flight() {
    let s = store().await;
    let a = insert(&s, "P1", "A").await;
    insert(&s, "P2", "B").await;
    s.try_transition(a.id, Status::Pending, Status::Selected, Some(Stamp::SelectedAt))
      .await
      .unwrap();
    let ranker = CountingRanker::picking("B");

    let result = Arbiter::new(&s, &ranker, ArbiterSettings::default()).arbitrate().await.unwrap();
    assert_eq!(result, Arbitration::InFlight(a.id));
    assert_eq!(ranker.calls(), 0);
  }

  #[tokio::test]
  async fn published_targets_are_left_out_and_used_as_context() {
    let s = store().await;
    let old = insert(&s, "P0", "old news").await;
    s.record_publication(&PublicationRecord::for_candidate(&old, chrono::Utc::now()))
      .await
      .unwrap();
    insert(&s, "P1", "fresh").await;
    let ranker = CountingRanker::picking("fresh");

    let result = Arbiter::new(&s, &ranker, ArbiterSettings::default()).arbitrate().await.unwrap();
    assert_eq!(result.outcome(), JobOutcome::Done);
    assert_eq!(*ranker.contexts.lock().unwrap(), vec![vec!["old news".to_string()]]);
    assert_eq!(s.fetch_thread(old.id).await.unwrap().status, Status::Pending);
  }

  #[tokio::test]
  async fn batch_respects_limit() {
    let s = store().await;
    for text in ["A", "B", "C"] {
      insert(&s, "P1", text).await;
    }
    let ranker = CountingRanker::picking("C");
    let settings = ArbiterSettings { batch_limit: 2, ..Default::default() };

    let err = Arbiter::new(&s, &ranker, settings).arbitrate().await.unwrap_err();
    assert!(matches!(err, JobError::Arbitration(_)));
  }
}
