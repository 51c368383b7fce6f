//! Bounded polling. No wait in the protocol is open-ended: each probe is
//! itself cut off at the deadline, so a hung page cannot stall the driver.

use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};

use crate::{Composer, ProtocolError};

/// A condition on the page worth waiting for.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Probe {
  TextSurface(usize),
  /// At least `count` attachments under `position`.
  Attached { position: usize, count: usize },
  Confirmed,
}

impl Probe {
  async fn check<C: Composer>(self, page: &mut C) -> Result<bool, ProtocolError> {
    match self {
      Self::TextSurface(position) => page.has_text_surface(position).await,
      Self::Attached { position, count } => {
        Ok(page.attached_images(position).await? >= count)
      }
      Self::Confirmed => page.is_confirmed().await,
    }
  }
}

/// Poll `probe` every `interval` until it holds or `limit` elapses.
/// Returns `Ok(false)` on timeout.
pub(crate) async fn wait_for<C: Composer>(
  page: &mut C,
  probe: Probe,
  limit: Duration,
  interval: Duration,
) -> Result<bool, ProtocolError> {
  let deadline = Instant::now() + limit;
  loop {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match timeout(remaining, probe.check(page)).await {
      Ok(Ok(true)) => return Ok(true),
      Ok(Ok(false)) => {}
      Ok(Err(e)) => return Err(e),
      Err(_) => return Ok(false),
    }
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
      return Ok(false);
    }
    sleep(interval.min(remaining)).await;
  }
}

/// Delay before retry number `attempt` (0-based): `base * 2^attempt`.
pub(crate) fn backoff(base: Duration, attempt: u32) -> Duration {
  base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backoff_doubles() {
    let base = Duration::from_millis(100);
    assert_eq!(backoff(base, 0), Duration::from_millis(100));
    assert_eq!(backoff(base, 1), Duration::from_millis(200));
    assert_eq!(backoff(base, 3), Duration::from_millis(800));
  }

  #[test]
  fn backoff_saturates() {
    assert_eq!(backoff(Duration::from_secs(1), 64), Duration::from_secs(u64::from(u32::MAX)));
  }
}
