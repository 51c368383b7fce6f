//! Error types for `quill-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::candidate::Status;

/// A candidate that violates the data-model invariants. Raised at
/// construction time; such a candidate is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("a thread needs at least one sub-post")]
  EmptyThread,

  #[error("duplicate sub-post position {0}")]
  DuplicatePosition(u32),

  #[error("sub-post positions must be contiguous: expected {expected}, found {found}")]
  PositionGap { expected: u32, found: u32 },

  #[error("target id must not be blank")]
  BlankTargetId,

  #[error("post type must not be blank")]
  BlankPostType,

  #[error("figure images need a file name")]
  FigureWithoutName,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid candidate: {0}")]
  Validation(#[from] ValidationError),

  #[error("candidate not found: {0}")]
  CandidateNotFound(Uuid),

  #[error("candidate {id} has an unreadable thread: {reason}")]
  MalformedThread { id: Uuid, reason: String },

  #[error("illegal status transition {from} -> {to}")]
  IllegalTransition { from: Status, to: Status },

  #[error("unknown status: {0:?}")]
  UnknownStatus(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse error classes that job code branches on without knowing which
/// backend produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// The row is missing or cannot be decoded. Fatal for that id only.
  NotFound,
  /// The request contradicts the state machine (e.g. an illegal transition).
  Conflict,
  /// The backing store failed. Fatal for the whole job invocation.
  Persistence,
}

/// Implemented by every store error so generic callers can classify it.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::CandidateNotFound(_) | Self::MalformedThread { .. } => {
        ErrorKind::NotFound
      }
      Self::IllegalTransition { .. } | Self::Validation(_) => ErrorKind::Conflict,
      Self::UnknownStatus(_) | Self::Serialization(_) => ErrorKind::Persistence,
    }
  }
}
