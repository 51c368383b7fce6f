//! Job error type.

use quill_core::ValidationError;
use quill_poster::{ProtocolError, ResolveError};
use thiserror::Error;
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error that ends a job invocation.
#[derive(Debug, Error)]
pub enum JobError {
  /// The store is unreachable or misbehaving. Nothing about the state of
  /// the current item can be assumed.
  #[error("store error: {0}")]
  Store(#[source] BoxError),

  /// No valid pick came back from the ranker. No candidate was touched.
  #[error("arbitration failed: {0}")]
  Arbitration(String),

  #[error("ranker error: {0}")]
  Ranker(#[source] BoxError),

  /// The candidate's row or thread is unreadable; it has been marked
  /// `error`.
  #[error("candidate {0} is unreadable")]
  Unreadable(Uuid),

  #[error("candidate {id}: {source}")]
  Image {
    id:     Uuid,
    #[source]
    source: ResolveError,
  },

  #[error("publishing candidate {id} failed: {source}")]
  Publish {
    id:     Uuid,
    #[source]
    source: ProtocolError,
  },

  #[error("generator error for {target_id}/{post_type}: {source}")]
  Generation {
    target_id: String,
    post_type: String,
    #[source]
    source:    BoxError,
  },

  #[error("target {0} already has a live or published candidate")]
  DuplicateTarget(String),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("invalid configuration: {0}")]
  Config(String),
}

impl JobError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = JobError> = std::result::Result<T, E>;
