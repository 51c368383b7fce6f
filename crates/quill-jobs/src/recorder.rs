//! Outcome Recorder: turns the result of a publishing attempt into durable
//! state and, on success, a notification.

use chrono::Utc;
use quill_core::{
  candidate::{Candidate, PublicationRecord, Stamp, Status},
  ports::{Category, Notification, Notifier},
  store::CandidateStore,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{JobError, Result};

pub struct Recorder<'a, S, N> {
  store:    &'a S,
  notifier: &'a N,
}

impl<'a, S, N> Recorder<'a, S, N>
where
  S: CandidateStore,
  N: Notifier,
{
  pub fn new(store: &'a S, notifier: &'a N) -> Self { Self { store, notifier } }

  /// Record that `candidate` went out.
  ///
  /// The publication record is written even if the status transition does
  /// not apply: the thread is live on the platform either way. A failed
  /// notification is logged and otherwise ignored.
  pub async fn published(&self, candidate: &Candidate) -> Result<PublicationRecord> {
    let moved = self
      .store
      .try_transition(candidate.id, Status::Selected, Status::Posted, Some(Stamp::PostedAt))
      .await
      .map_err(JobError::store)?;
    if !moved {
      warn!(
        candidate_id = %candidate.id,
        "published candidate was no longer selected; recording the publication anyway"
      );
    }

    let record = PublicationRecord::for_candidate(candidate, Utc::now());
    let written = self
      .store
      .record_publication(&record)
      .await
      .map_err(JobError::store)?;
    if !written {
      error!(
        candidate_id = %candidate.id,
        target_id = %candidate.target_id,
        "target already had a publication record"
      );
    }
    info!(candidate_id = %candidate.id, target_id = %candidate.target_id, "publication recorded");

    let notification = Notification {
      category: Category::Published,
      subject:  format!("New post for {}", candidate.target_id),
      body:     candidate.first_text().to_owned(),
    };
    if let Err(e) = self.notifier.notify(&notification).await {
      warn!(candidate_id = %candidate.id, error = %e, "notification failed");
    }

    Ok(record)
  }

  /// Record that the attempt on `id` failed for good. Returns whether the
  /// candidate moved to `error`.
  pub async fn failed(&self, id: Uuid, reason: &str) -> Result<bool> {
    let moved = self
      .store
      .try_transition(id, Status::Selected, Status::Error, None)
      .await
      .map_err(JobError::store)?;
    if moved {
      warn!(candidate_id = %id, reason, "candidate marked as error");
    } else {
      warn!(candidate_id = %id, reason, "candidate was no longer selected; status unchanged");
    }
    Ok(moved)
  }
}
