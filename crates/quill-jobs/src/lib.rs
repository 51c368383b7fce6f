//! The batch jobs of the posting pipeline, generic over any
//! [`quill_core::store::CandidateStore`].
//!
//! | Job | Entry point |
//! |-----|-------------|
//! | generate  | [`generate::generate`] |
//! | enqueue   | [`generate::enqueue`] |
//! | arbitrate | [`arbiter::Arbiter::arbitrate`] |
//! | publish   | [`publish::Publisher::publish_next`] |
//! | sweep     | [`dedup::sweep`] |
//!
//! Every job is safe to re-run: state only moves through guarded
//! transitions, so a second invocation finds nothing left to do.

#![allow(async_fn_in_trait)]

pub mod arbiter;
pub mod dedup;
pub mod error;
pub mod generate;
pub mod publish;
pub mod recorder;
pub mod status;

#[cfg(test)]
mod testing;

pub use error::{JobError, Result};

/// How a job invocation ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
  /// The job changed something.
  Done,
  /// There was no work; state is unchanged.
  NothingToDo,
}
