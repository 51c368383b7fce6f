//! Concrete collaborators and configuration for the `quill` binary.

pub mod config;
pub mod generator;
pub mod images;
pub mod notify;
pub mod ranker;

use std::path::{Path, PathBuf};

use quill_jobs::JobOutcome;

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

/// Process exit status for a finished job: 0 when it did work, 3 when there
/// was nothing to do, 1 on failure.
pub fn exit_status<E>(result: &Result<JobOutcome, E>) -> u8 {
  match result {
    Ok(JobOutcome::Done) => 0,
    Ok(JobOutcome::NothingToDo) => 3,
    Err(_) => 1,
  }
}

/// Outcome of `run`: done if the publish step did work, otherwise whatever
/// arbitration reported.
pub fn run_outcome(arbitrated: JobOutcome, published: JobOutcome) -> JobOutcome {
  if published == JobOutcome::Done { published } else { arbitrated }
}
