//! A read-only snapshot of the pipeline for operators.

use std::fmt;

use quill_core::{
  candidate::{PublicationRecord, Status},
  store::CandidateStore,
};
use strum::IntoEnumIterator as _;

use crate::{JobError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
  /// Every status, in lifecycle order, including empty ones.
  pub counts: Vec<(Status, usize)>,
  /// Newest first.
  pub recent: Vec<PublicationRecord>,
}

pub async fn report<S: CandidateStore>(store: &S, recent: usize) -> Result<StatusReport> {
  let stored = store.status_counts().await.map_err(JobError::store)?;
  let counts = Status::iter()
    .map(|status| {
      let n = stored.iter().find(|(s, _)| *s == status).map_or(0, |(_, n)| *n);
      (status, n)
    })
    .collect();
  let recent = store.recent_publications(recent).await.map_err(JobError::store)?;
  Ok(StatusReport { counts, recent })
}

impl fmt::Display for StatusReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "candidates:")?;
    for (status, n) in &self.counts {
      writeln!(f, "  {:<9} {n}", status.as_ref())?;
    }
    if self.recent.is_empty() {
      return writeln!(f, "no publications yet");
    }
    writeln!(f, "recent publications:")?;
    for record in &self.recent {
      let first_line = record.first_text.lines().next().unwrap_or_default();
      writeln!(
        f,
        "  {}  {:<16} {:<12} {}",
        record.published_at.format("%Y-%m-%d %H:%M"),
        record.target_id,
        record.post_type,
        first_line,
      )?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{insert, store};

  #[tokio::test]
  async fn report_lists_every_status() {
    let s = store().await;
    let a = insert(&s, "P1", "first line\nsecond line").await;
    insert(&s, "P2", "B").await;
    s.record_publication(&PublicationRecord::for_candidate(&a, chrono::Utc::now()))
      .await
      .unwrap();

    let r = report(&s, 5).await.unwrap();
    assert_eq!(r.counts.len(), 5);
    assert_eq!(r.counts[0], (Status::Pending, 2));
    assert!(r.counts[1..].iter().all(|(_, n)| *n == 0));
    assert_eq!(r.recent.len(), 1);

    let text = r.to_string();
    assert!(text.contains("pending   2"));
    assert!(text.contains("first line"));
    assert!(!text.contains("second line"));
  }

  #[tokio::test]
  async fn empty_store_reports_no_publications() {
    let s = store().await;
    let text = report(&s, 5).await.unwrap().to_string();
    assert!(text.contains("no publications yet"));
  }
}
