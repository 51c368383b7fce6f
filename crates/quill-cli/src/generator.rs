//! [`CommandGenerator`]: runs an external program to write a thread.
//!
//! The program is invoked as `<command> <target_id> <post_type>` and must
//! print a JSON thread (`{"posts": [...]}`) on stdout. Anything on stderr is
//! passed through to the log.

use std::{path::PathBuf, process::Stdio, time::Duration};

use quill_core::{candidate::Thread, ports::ContentGenerator};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GeneratorError {
  #[error("failed to run {command:?}: {source}")]
  Spawn {
    command: PathBuf,
    #[source]
    source:  std::io::Error,
  },

  #[error("generator timed out after {0:?}")]
  Timeout(Duration),

  #[error("generator exited with {0}")]
  Failed(std::process::ExitStatus),

  #[error("generator output is not a valid thread: {0}")]
  Output(#[from] quill_core::Error),
}

#[derive(Debug, Clone)]
pub struct CommandGenerator {
  command: PathBuf,
  timeout: Duration,
}

impl CommandGenerator {
  pub fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
    Self { command: command.into(), timeout }
  }
}

impl ContentGenerator for CommandGenerator {
  type Error = GeneratorError;

  async fn generate<'a>(
    &'a self,
    target_id: &'a str,
    post_type: &'a str,
  ) -> Result<Thread, GeneratorError> {
    debug!(command = ?self.command, target_id, post_type, "running generator");
    let child = Command::new(&self.command)
      .arg(target_id)
      .arg(post_type)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .output();

    let output = tokio::time::timeout(self.timeout, child)
      .await
      .map_err(|_| GeneratorError::Timeout(self.timeout))?
      .map_err(|source| GeneratorError::Spawn { command: self.command.clone(), source })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
      warn!(target_id, post_type, stderr = %stderr.trim(), "generator stderr");
    }
    if !output.status.success() {
      return Err(GeneratorError::Failed(output.status));
    }
    Ok(Thread::from_json(&String::from_utf8_lossy(&output.stdout))?)
  }
}
