//! The publish job: takes the selected candidate through the posting
//! protocol and records the outcome.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use quill_core::{
  Classify, ErrorKind,
  candidate::Status,
  ports::{ImageResolver, Notifier},
  store::CandidateStore,
};
use quill_poster::{ComposedThread, PostingDriver, ProtocolError, SessionFactory};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{JobError, JobOutcome, Result, recorder::Recorder};

#[derive(Debug, Clone)]
pub struct PublishSettings {
  /// Re-walk the composed thread before pressing "publish all".
  pub verify:      bool,
  /// Pause before the single retry.
  pub retry_delay: Duration,
  /// A publish claim older than this belongs to a run that died.
  pub stale_claim: Duration,
}

impl Default for PublishSettings {
  fn default() -> Self {
    Self {
      verify:      true,
      retry_delay: Duration::from_secs(30),
      stale_claim: Duration::from_secs(60 * 60),
    }
  }
}

pub struct Publisher<'a, S, F, I, N> {
  pub store:    &'a S,
  pub sessions: &'a F,
  pub images:   &'a I,
  pub notifier: &'a N,
  pub driver:   PostingDriver,
  pub settings: PublishSettings,
}

impl<S, F, I, N> Publisher<'_, S, F, I, N>
where
  S: CandidateStore,
  F: SessionFactory,
  I: ImageResolver,
  N: Notifier,
{
  /// Publish the oldest `selected` candidate, if any.
  ///
  /// The candidate is claimed before a browser is opened, so of two
  /// overlapping runs only one drives it. Any failure after the claim moves
  /// it to `error`, and the same id is never attempted by a later run.
  pub async fn publish_next(&self) -> Result<JobOutcome> {
    self.abandon_stale_claims().await?;

    let next = self
      .store
      .list_by_status(Status::Selected, 1)
      .await
      .map_err(JobError::store)?;
    let Some(next) = next.into_iter().next() else {
      info!("no selected candidate");
      return Ok(JobOutcome::NothingToDo);
    };
    let id = next.id;
    let claimed = self.store.claim_for_publish(id).await.map_err(JobError::store)?;
    if !claimed {
      info!(candidate_id = %id, "selected candidate is already being published");
      return Ok(JobOutcome::NothingToDo);
    }
    let recorder = Recorder::new(self.store, self.notifier);

    let candidate = match self.store.fetch_thread(id).await {
      Ok(candidate) => candidate,
      Err(e) if e.kind() == ErrorKind::NotFound => {
        recorder.failed(id, &e.to_string()).await?;
        return Err(JobError::Unreadable(id));
      }
      Err(e) => return Err(JobError::store(e)),
    };

    let thread = match ComposedThread::resolve(&candidate.thread, &candidate.target_id, self.images)
    {
      Ok(thread) => thread,
      Err(e) => {
        recorder.failed(id, &e.to_string()).await?;
        return Err(JobError::Image { id, source: e });
      }
    };

    info!(
      candidate_id = %id,
      target_id = %candidate.target_id,
      posts = thread.len(),
      "publishing candidate"
    );
    match self.attempt(&thread).await {
      Ok(()) => {
        recorder.published(&candidate).await?;
        Ok(JobOutcome::Done)
      }
      Err(e) => {
        recorder.failed(id, &e.to_string()).await?;
        Err(JobError::Publish { id, source: e })
      }
    }
  }

  /// Move candidates whose publish run never finished to `error`. Whether
  /// their thread went out is unknown, so they are never retried.
  async fn abandon_stale_claims(&self) -> Result<()> {
    let Some(cutoff) = TimeDelta::from_std(self.settings.stale_claim)
      .ok()
      .and_then(|age| Utc::now().checked_sub_signed(age))
    else {
      return Ok(());
    };

    let stale = self
      .store
      .stale_publish_claims(cutoff)
      .await
      .map_err(JobError::store)?;
    let recorder = Recorder::new(self.store, self.notifier);
    for id in stale {
      error!(candidate_id = %id, "publish run never finished; the thread may be live");
      recorder.failed(id, "publish claim abandoned").await?;
    }
    Ok(())
  }

  /// One attempt plus, if it failed before anything was submitted, one
  /// more in a fresh session.
  async fn attempt(&self, thread: &ComposedThread) -> Result<(), ProtocolError> {
    match self.attempt_once(thread).await {
      Err(e) if !e.reached_submission() => {
        warn!(error = %e, delay = ?self.settings.retry_delay, "publishing failed, retrying once");
        sleep(self.settings.retry_delay).await;
        self.attempt_once(thread).await
      }
      other => other,
    }
  }

  async fn attempt_once(&self, thread: &ComposedThread) -> Result<(), ProtocolError> {
    let page = self.sessions.open().await?;
    self.driver.publish(page, thread, self.settings.verify).await
  }
}
