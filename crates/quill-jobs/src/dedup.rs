//! Deduplication: keep at most one live set of candidates per target, and
//! none at all for a target that has already been published.

use std::collections::HashSet;

use quill_core::store::CandidateStore;
use tracing::info;

use crate::{JobError, JobOutcome, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
  /// Rows rejected, or that would be rejected on a dry run.
  pub rejected: usize,
  pub dry_run:  bool,
}

impl SweepReport {
  pub fn outcome(&self) -> JobOutcome {
    if self.rejected == 0 || self.dry_run {
      JobOutcome::NothingToDo
    } else {
      JobOutcome::Done
    }
  }
}

/// Reject every `pending` candidate whose target already has a publication
/// record. A second run on the same state rejects nothing.
pub async fn sweep<S: CandidateStore>(store: &S, dry_run: bool) -> Result<SweepReport> {
  let rejected = if dry_run {
    store.count_published_duplicates().await
  } else {
    store.reject_published_duplicates().await
  }
  .map_err(JobError::store)?;

  info!(rejected, dry_run, "duplicate sweep finished");
  Ok(SweepReport { rejected, dry_run })
}

/// Drop targets that are published or already have a live candidate.
/// Order is kept; repeated ids are collapsed.
pub async fn fresh_targets<S, I>(store: &S, targets: I) -> Result<Vec<String>>
where
  S: CandidateStore,
  I: IntoIterator<Item = String>,
{
  let mut blocked = store.published_targets().await.map_err(JobError::store)?;
  blocked.extend(store.live_targets().await.map_err(JobError::store)?);

  let mut seen = HashSet::new();
  Ok(
    targets
      .into_iter()
      .filter(|t| !blocked.contains(t) && seen.insert(t.clone()))
      .collect(),
  )
}

/// Fail with [`JobError::DuplicateTarget`] unless `target_id` is fresh.
pub async fn ensure_fresh<S: CandidateStore>(store: &S, target_id: &str) -> Result<()> {
  let fresh = fresh_targets(store, [target_id.to_owned()]).await?;
  if fresh.is_empty() {
    return Err(JobError::DuplicateTarget(target_id.to_owned()));
  }
  Ok(())
}
