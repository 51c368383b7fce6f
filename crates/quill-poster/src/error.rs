//! Error types for `quill-poster`.

use std::{fmt, time::Duration};

use quill_core::candidate::ImageRef;
use thiserror::Error;

/// The protocol step an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  Launch,
  OpenComposer,
  AddPost,
  TextSurface,
  Upload,
  ImageIndicator,
  Verify,
  PublishAll,
  Confirmation,
}

impl fmt::Display for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Launch => "launch",
      Self::OpenComposer => "open composer",
      Self::AddPost => "add post",
      Self::TextSurface => "text surface",
      Self::Upload => "upload",
      Self::ImageIndicator => "image indicator",
      Self::Verify => "verify",
      Self::PublishAll => "publish all",
      Self::Confirmation => "confirmation",
    };
    f.write_str(name)
  }
}

/// A fatal failure of one publishing attempt.
#[derive(Debug, Error)]
pub enum ProtocolError {
  #[error("{step}: element not found (position {position:?})")]
  ElementNotFound { step: Step, position: Option<usize> },

  #[error("{step}: timed out after {waited:?} (position {position:?})")]
  Timeout {
    step:     Step,
    position: Option<usize>,
    waited:   Duration,
  },

  #[error("verification failed at position {position}: {reason}")]
  Verification { position: usize, reason: String },

  #[error("{step}: browser error: {message}")]
  Browser { step: Step, message: String },
}

impl ProtocolError {
  pub fn browser(step: Step, message: impl fmt::Display) -> Self {
    Self::Browser { step, message: message.to_string() }
  }

  pub fn step(&self) -> Step {
    match self {
      Self::ElementNotFound { step, .. }
      | Self::Timeout { step, .. }
      | Self::Browser { step, .. } => *step,
      Self::Verification { .. } => Step::Verify,
    }
  }

  /// Whether the attempt got as far as pressing "publish all". After that
  /// point the thread may already be live, so the attempt must not be
  /// repeated blindly.
  pub fn reached_submission(&self) -> bool {
    matches!(self.step(), Step::PublishAll | Step::Confirmation)
  }
}

/// An image reference that could not be turned into a readable file.
#[derive(Debug, Error)]
#[error("image {image:?} for position {position} cannot be resolved")]
pub struct ResolveError {
  pub position: usize,
  pub image:    ImageRef,
}
