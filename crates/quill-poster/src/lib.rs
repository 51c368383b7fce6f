//! The posting protocol: publishes a candidate's thread through a browser,
//! one sub-post at a time, with bounded waits at every step.
//!
//! [`PostingDriver`] owns the protocol. It talks to the page only through the
//! [`Composer`] trait, so the browser backend (see the `chromium` feature)
//! and the selectors it uses can change without touching the protocol.

#![allow(async_fn_in_trait)]

mod wait;

pub mod composer;
pub mod driver;
pub mod error;

#[cfg(feature = "chromium")]
pub mod chromium;

pub use composer::{ComposedPost, ComposedThread, Composer, SessionFactory};
pub use driver::{DriverConfig, PostingDriver};
pub use error::{ProtocolError, ResolveError, Step};
