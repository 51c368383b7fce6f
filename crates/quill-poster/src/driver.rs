//! [`PostingDriver`] publishes a [`ComposedThread`] through a [`Composer`].

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
  ComposedThread, Composer, ProtocolError, Step,
  wait::{Probe, backoff, wait_for},
};

// ─── Config ──────────────────────────────────────────────────────────────────

/// Timing knobs for one publishing attempt.
#[derive(Debug, Clone)]
pub struct DriverConfig {
  /// How long a text surface may take to appear after opening the composer
  /// or adding a post.
  pub surface_timeout:  Duration,
  /// How long each upload may take to show its attachment indicator.
  pub image_timeout:    Duration,
  /// How long the platform may take to acknowledge "publish all".
  pub confirm_timeout:  Duration,
  pub poll_interval:    Duration,
  /// Total verification passes before giving up.
  pub verify_attempts:  u32,
  /// Delay before the first verification retry; doubled each time.
  pub verify_backoff:   Duration,
}

impl Default for DriverConfig {
  fn default() -> Self {
    Self {
      surface_timeout: Duration::from_secs(15),
      image_timeout:   Duration::from_secs(30),
      confirm_timeout: Duration::from_secs(30),
      poll_interval:   Duration::from_millis(500),
      verify_attempts: 3,
      verify_backoff:  Duration::from_secs(1),
    }
  }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PostingDriver {
  config: DriverConfig,
}

impl PostingDriver {
  pub fn new(config: DriverConfig) -> Self { Self { config } }

  pub fn config(&self) -> &DriverConfig { &self.config }

  /// Publish `thread` on `page`, verifying the composed thread first when
  /// `verify` is set. `page` is closed before returning, whatever happened.
  ///
  /// Either every sub-post went out as one thread and the platform confirmed
  /// it, or the attempt failed. Sub-posts rendered before a failure are left
  /// as they are.
  pub async fn publish<C: Composer>(
    &self,
    mut page: C,
    thread: &ComposedThread,
    verify: bool,
  ) -> Result<(), ProtocolError> {
    let outcome = self.drive(&mut page, thread, verify).await;
    if let Err(e) = page.close().await {
      warn!(error = %e, "failed to close browser session");
    }
    outcome
  }

  async fn drive<C: Composer>(
    &self,
    page: &mut C,
    thread: &ComposedThread,
    verify: bool,
  ) -> Result<(), ProtocolError> {
    page.open_composer().await?;
    info!(posts = thread.len(), images = thread.image_count(), "composer opened");

    for (position, post) in thread.posts().iter().enumerate() {
      if position > 0 && !page.add_post().await? {
        return Err(not_found(Step::AddPost, position));
      }
      self.await_text_surface(page, position).await?;
      if !page.fill_text(position, &post.text).await? {
        return Err(not_found(Step::TextSurface, position));
      }
      debug!(position, chars = post.text.chars().count(), "text entered");

      for (n, image) in post.images.iter().enumerate() {
        if !page.upload_image(position, image).await? {
          return Err(not_found(Step::Upload, position));
        }
        let probe = Probe::Attached { position, count: n + 1 };
        if !self.wait(page, probe, self.config.image_timeout).await? {
          return Err(ProtocolError::Timeout {
            step:     Step::ImageIndicator,
            position: Some(position),
            waited:   self.config.image_timeout,
          });
        }
        debug!(position, image = %image.display(), "image attached");
      }
    }

    if verify {
      self.verify_with_retry(page, thread).await?;
    }

    if !page.publish_all().await? {
      return Err(ProtocolError::ElementNotFound { step: Step::PublishAll, position: None });
    }
    if !self.wait(page, Probe::Confirmed, self.config.confirm_timeout).await? {
      return Err(ProtocolError::Timeout {
        step:     Step::Confirmation,
        position: None,
        waited:   self.config.confirm_timeout,
      });
    }

    info!(posts = thread.len(), "thread published");
    Ok(())
  }

  async fn await_text_surface<C: Composer>(
    &self,
    page: &mut C,
    position: usize,
  ) -> Result<(), ProtocolError> {
    let probe = Probe::TextSurface(position);
    if self.wait(page, probe, self.config.surface_timeout).await? {
      Ok(())
    } else {
      Err(not_found(Step::TextSurface, position))
    }
  }

  async fn wait<C: Composer>(
    &self,
    page: &mut C,
    probe: Probe,
    limit: Duration,
  ) -> Result<bool, ProtocolError> {
    wait_for(page, probe, limit, self.config.poll_interval).await
  }

  // ── Verification ──────────────────────────────────────────────────────────

  async fn verify_with_retry<C: Composer>(
    &self,
    page: &mut C,
    thread: &ComposedThread,
  ) -> Result<(), ProtocolError> {
    let attempts = self.config.verify_attempts.max(1);
    let mut attempt = 0;
    loop {
      match verify_once(page, thread).await {
        Ok(()) => return Ok(()),
        Err(e @ ProtocolError::Verification { .. }) if attempt + 1 < attempts => {
          let delay = backoff(self.config.verify_backoff, attempt);
          warn!(attempt, error = %e, ?delay, "verification failed, retrying");
          sleep(delay).await;
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }
}

/// One pass over the composed thread. Checks that each position has its
/// text surface, exactly the expected number of attachments and (after the
/// first) the marker linking it to the previous post.
async fn verify_once<C: Composer>(
  page: &mut C,
  thread: &ComposedThread,
) -> Result<(), ProtocolError> {
  for (position, post) in thread.posts().iter().enumerate() {
    if !page.has_text_surface(position).await? {
      return Err(mismatch(position, "text surface missing".into()));
    }
    let attached = page.attached_images(position).await?;
    if attached != post.images.len() {
      return Err(mismatch(
        position,
        format!("{attached} images attached, expected {}", post.images.len()),
      ));
    }
    if position > 0 && !page.has_thread_marker(position).await? {
      return Err(mismatch(position, "not linked to the previous post".into()));
    }
  }
  Ok(())
}

fn not_found(step: Step, position: usize) -> ProtocolError {
  ProtocolError::ElementNotFound { step, position: Some(position) }
}

fn mismatch(position: usize, reason: String) -> ProtocolError {
  ProtocolError::Verification { position, reason }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
  };

  use super::*;
  use crate::ComposedPost;

  /// What the double has been asked to do, in order.
  #[derive(Debug, Clone, PartialEq, Eq)]
  enum Call {
    Open,
    AddPost,
    Fill(usize),
    Upload(usize),
    PublishAll,
    Close,
  }

  #[derive(Default)]
  struct Script {
    /// Uploads never show up as attached.
    stall_images:       bool,
    /// Thread markers are missing for this many verification passes.
    missing_markers:    u32,
    /// No add-post control.
    no_add_button:      bool,
    /// The platform never acknowledges the submission.
    never_confirm:      bool,
  }

  struct RecordingComposer {
    calls:     Arc<Mutex<Vec<Call>>>,
    script:    Script,
    surfaces:  usize,
    attached:  Vec<usize>,
    published: bool,
    marker_checks_failed: u32,
  }

  impl RecordingComposer {
    fn new(script: Script) -> (Self, Arc<Mutex<Vec<Call>>>) {
      let calls = Arc::new(Mutex::new(Vec::new()));
      let page = Self {
        calls: calls.clone(),
        script,
        surfaces: 0,
        attached: Vec::new(),
        published: false,
        marker_checks_failed: 0,
      };
      (page, calls)
    }

    fn record(&self, call: Call) { self.calls.lock().unwrap().push(call); }
  }

  impl Composer for RecordingComposer {
    async fn open_composer(&mut self) -> Result<(), ProtocolError> {
      self.record(Call::Open);
      self.surfaces = 1;
      self.attached = vec![0];
      Ok(())
    }

    async fn add_post(&mut self) -> Result<bool, ProtocolError> {
      self.record(Call::AddPost);
      if self.script.no_add_button {
        return Ok(false);
      }
      self.surfaces += 1;
      self.attached.push(0);
      Ok(true)
    }

    async fn fill_text(&mut self, position: usize, _text: &str) -> Result<bool, ProtocolError> {
      self.record(Call::Fill(position));
      Ok(position < self.surfaces)
    }

    async fn upload_image(&mut self, position: usize, _path: &Path) -> Result<bool, ProtocolError> {
      self.record(Call::Upload(position));
      if !self.script.stall_images {
        self.attached[position] += 1;
      }
      Ok(true)
    }

    async fn attached_images(&mut self, position: usize) -> Result<usize, ProtocolError> {
      Ok(self.attached.get(position).copied().unwrap_or(0))
    }

    async fn has_text_surface(&mut self, position: usize) -> Result<bool, ProtocolError> {
      Ok(position < self.surfaces)
    }

    async fn has_thread_marker(&mut self, _position: usize) -> Result<bool, ProtocolError> {
      if self.marker_checks_failed < self.script.missing_markers {
        self.marker_checks_failed += 1;
        return Ok(false);
      }
      Ok(true)
    }

    async fn publish_all(&mut self) -> Result<bool, ProtocolError> {
      self.record(Call::PublishAll);
      self.published = true;
      Ok(true)
    }

    async fn is_confirmed(&mut self) -> Result<bool, ProtocolError> {
      Ok(self.published && !self.script.never_confirm)
    }

    async fn close(self) -> Result<(), ProtocolError> {
      self.record(Call::Close);
      Ok(())
    }
  }

  fn fast() -> PostingDriver {
    PostingDriver::new(DriverConfig {
      surface_timeout: Duration::from_millis(50),
      image_timeout:   Duration::from_millis(50),
      confirm_timeout: Duration::from_millis(50),
      poll_interval:   Duration::from_millis(5),
      verify_attempts: 3,
      verify_backoff:  Duration::from_millis(1),
    })
  }

  fn thread(images: &[usize]) -> ComposedThread {
    images
      .iter()
      .enumerate()
      .map(|(i, &n)| ComposedPost {
        text:   format!("part {i}"),
        images: (0..n).map(|k| PathBuf::from(format!("/img/{i}-{k}.png"))).collect(),
      })
      .collect::<Vec<_>>()
      .into()
  }

  fn fills(calls: &[Call]) -> Vec<usize> {
    calls
      .iter()
      .filter_map(|c| match c {
        Call::Fill(i) => Some(*i),
        _ => None,
      })
      .collect()
  }

  #[tokio::test]
  async fn enters_text_in_position_order() {
    let (page, calls) = RecordingComposer::new(Script::default());
    fast().publish(page, &thread(&[0, 0, 0]), false).await.unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(fills(&calls), vec![0, 1, 2]);
    assert_eq!(calls.first(), Some(&Call::Open));
    assert_eq!(calls.last(), Some(&Call::Close));
  }

  #[tokio::test]
  async fn adds_a_post_before_each_later_position() {
    let (page, calls) = RecordingComposer::new(Script::default());
    fast().publish(page, &thread(&[1, 0]), false).await.unwrap();

    assert_eq!(*calls.lock().unwrap(), vec![
      Call::Open,
      Call::Fill(0),
      Call::Upload(0),
      Call::AddPost,
      Call::Fill(1),
      Call::PublishAll,
      Call::Close,
    ]);
  }

  #[tokio::test]
  async fn image_timeout_is_fatal_and_nothing_is_submitted() {
    let (page, calls) = RecordingComposer::new(Script { stall_images: true, ..Default::default() });
    let err = fast().publish(page, &thread(&[0, 2, 0]), false).await.unwrap_err();

    assert!(matches!(err, ProtocolError::Timeout {
      step: Step::ImageIndicator,
      position: Some(1),
      ..
    }));
    assert!(!err.reached_submission());

    let calls = calls.lock().unwrap();
    assert!(!calls.contains(&Call::PublishAll));
    assert!(!calls.contains(&Call::Fill(2)));
    assert_eq!(calls.iter().filter(|c| **c == Call::Upload(1)).count(), 1);
    assert_eq!(calls.last(), Some(&Call::Close));
  }

  #[tokio::test]
  async fn missing_add_button_aborts() {
    let (page, calls) = RecordingComposer::new(Script { no_add_button: true, ..Default::default() });
    let err = fast().publish(page, &thread(&[0, 0]), false).await.unwrap_err();

    assert!(matches!(err, ProtocolError::ElementNotFound { step: Step::AddPost, .. }));
    let calls = calls.lock().unwrap();
    assert!(!calls.contains(&Call::PublishAll));
    assert_eq!(calls.last(), Some(&Call::Close));
  }

  #[tokio::test]
  async fn verification_retries_until_markers_appear() {
    let (page, calls) =
      RecordingComposer::new(Script { missing_markers: 2, ..Default::default() });
    fast().publish(page, &thread(&[0, 1]), true).await.unwrap();

    assert!(calls.lock().unwrap().contains(&Call::PublishAll));
  }

  #[tokio::test]
  async fn verification_gives_up_after_the_last_attempt() {
    let (page, calls) =
      RecordingComposer::new(Script { missing_markers: 3, ..Default::default() });
    let err = fast().publish(page, &thread(&[0, 1]), true).await.unwrap_err();

    assert!(matches!(err, ProtocolError::Verification { position: 1, .. }));
    let calls = calls.lock().unwrap();
    assert!(!calls.contains(&Call::PublishAll));
    assert_eq!(calls.last(), Some(&Call::Close));
  }

  #[tokio::test]
  async fn verification_is_skipped_when_disabled() {
    let (page, _) = RecordingComposer::new(Script { missing_markers: 10, ..Default::default() });
    fast().publish(page, &thread(&[0, 0]), false).await.unwrap();
  }

  #[tokio::test]
  async fn unconfirmed_submission_fails_after_publish_all() {
    let (page, calls) = RecordingComposer::new(Script { never_confirm: true, ..Default::default() });
    let err = fast().publish(page, &thread(&[0]), false).await.unwrap_err();

    assert!(matches!(err, ProtocolError::Timeout { step: Step::Confirmation, .. }));
    assert!(err.reached_submission());
    assert_eq!(calls.lock().unwrap().last(), Some(&Call::Close));
  }
}
