//! Collaborator traits: the narrow interfaces through which the pipeline
//! reaches content generation, ranking, image lookup and notification.
//!
//! Concrete implementations live in `quill-cli`; tests use hand-written
//! doubles.

use std::{future::Future, path::PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::candidate::{ImageKind, Thread};

// ─── Ranking ─────────────────────────────────────────────────────────────────

/// One candidate as presented to the ranker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
  pub id:        Uuid,
  pub post_type: String,
  /// Text of the lead sub-post.
  pub text:      String,
}

/// Picks one candidate out of a batch.
pub trait Ranker: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Return the ranker's raw answer. The caller extracts and validates the
  /// id; anything that is not one of `batch`'s ids counts as no selection.
  ///
  /// `context` holds recently published lead texts, newest first.
  fn rank<'a>(
    &'a self,
    batch: &'a [RankEntry],
    context: &'a [String],
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;
}

// ─── Generation ──────────────────────────────────────────────────────────────

/// Produces a thread about `target_id` in the style named by `post_type`.
pub trait ContentGenerator: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn generate<'a>(
    &'a self,
    target_id: &'a str,
    post_type: &'a str,
  ) -> impl Future<Output = Result<Thread, Self::Error>> + Send + 'a;
}

// ─── Images ──────────────────────────────────────────────────────────────────

/// Maps a logical image reference to a file on disk.
pub trait ImageResolver: Send + Sync {
  /// `None` when no such image exists.
  fn resolve(
    &self,
    target_id: &str,
    kind: ImageKind,
    name: Option<&str>,
  ) -> Option<PathBuf>;
}

// ─── Notification ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
  /// A thread went out.
  Published,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub category: Category,
  pub subject:  String,
  pub body:     String,
}

/// Tells a human what happened. Fire-and-forget from the pipeline's point
/// of view: errors are logged by the caller and never change an outcome.
pub trait Notifier: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn notify<'a>(
    &'a self,
    notification: &'a Notification,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
