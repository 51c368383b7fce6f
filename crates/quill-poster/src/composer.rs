//! The page-object seam between the posting protocol and a concrete browser.

use std::path::{Path, PathBuf};

use quill_core::{
  candidate::{ImageRef, Thread},
  ports::ImageResolver,
};

use crate::{ProtocolError, ResolveError};

// ─── Composer ────────────────────────────────────────────────────────────────

/// One browser page showing the platform's thread composer.
///
/// Every method performs a single interaction or a single probe and returns
/// promptly; waiting and retrying belong to [`PostingDriver`]. Methods that
/// look for an element return `Ok(false)` when none of their selectors
/// matched, and reserve `Err` for the browser itself failing.
///
/// Positions are 0-based and follow the thread order.
///
/// [`PostingDriver`]: crate::PostingDriver
pub trait Composer {
  /// Navigate to the composer. The first text surface may appear later.
  async fn open_composer(&mut self) -> Result<(), ProtocolError>;

  /// Press "add another post to the thread".
  async fn add_post(&mut self) -> Result<bool, ProtocolError>;

  /// Focus the text surface for `position` and type `text` into it.
  async fn fill_text(&mut self, position: usize, text: &str) -> Result<bool, ProtocolError>;

  /// Hand `path` to the upload control for `position`.
  async fn upload_image(&mut self, position: usize, path: &Path) -> Result<bool, ProtocolError>;

  /// Attachments currently shown under `position`.
  async fn attached_images(&mut self, position: usize) -> Result<usize, ProtocolError>;

  async fn has_text_surface(&mut self, position: usize) -> Result<bool, ProtocolError>;

  /// Whether `position` is visibly linked to the post before it.
  async fn has_thread_marker(&mut self, position: usize) -> Result<bool, ProtocolError>;

  /// Press "publish all".
  async fn publish_all(&mut self) -> Result<bool, ProtocolError>;

  /// Whether the platform has acknowledged the submission.
  async fn is_confirmed(&mut self) -> Result<bool, ProtocolError>;

  /// Release the page and anything it owns.
  async fn close(self) -> Result<(), ProtocolError>
  where
    Self: Sized;
}

/// Opens a fresh [`Composer`] session. Each publishing attempt gets its own.
pub trait SessionFactory {
  type Session: Composer;

  async fn open(&self) -> Result<Self::Session, ProtocolError>;
}

// ─── Composed thread ─────────────────────────────────────────────────────────

/// A sub-post ready for the browser: every image is a concrete file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPost {
  pub text:   String,
  pub images: Vec<PathBuf>,
}

/// A thread whose images have all been resolved, in publish order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedThread {
  posts: Vec<ComposedPost>,
}

impl ComposedThread {
  /// Resolve every image of `thread`. A single unresolvable image fails the
  /// whole thread; nothing is posted with a missing attachment.
  pub fn resolve<R>(
    thread: &Thread,
    target_id: &str,
    resolver: &R,
  ) -> Result<Self, ResolveError>
  where
    R: ImageResolver + ?Sized,
  {
    let mut posts = Vec::with_capacity(thread.len());
    for (position, sub) in thread.posts().iter().enumerate() {
      let mut images = Vec::with_capacity(sub.images.len());
      for image in &sub.images {
        let path = match image {
          ImageRef::Local(path) => path.is_file().then(|| path.clone()),
          ImageRef::Asset { kind, name } => {
            resolver.resolve(target_id, *kind, name.as_deref())
          }
        };
        let path = path.ok_or_else(|| ResolveError {
          position,
          image: image.clone(),
        })?;
        images.push(path);
      }
      posts.push(ComposedPost { text: sub.text.clone(), images });
    }
    Ok(Self { posts })
  }

  pub fn posts(&self) -> &[ComposedPost] { &self.posts }

  pub fn len(&self) -> usize { self.posts.len() }

  pub fn is_empty(&self) -> bool { self.posts.is_empty() }

  pub fn image_count(&self) -> usize {
    self.posts.iter().map(|p| p.images.len()).sum()
  }
}

impl From<Vec<ComposedPost>> for ComposedThread {
  fn from(posts: Vec<ComposedPost>) -> Self { Self { posts } }
}

#[cfg(test)]
mod tests {
  use quill_core::candidate::{ImageKind, SubPost};

  use super::*;

  struct OnlyArt;

  impl ImageResolver for OnlyArt {
    fn resolve(&self, target_id: &str, kind: ImageKind, _: Option<&str>) -> Option<PathBuf> {
      (kind == ImageKind::Art).then(|| PathBuf::from(format!("/assets/art/{target_id}.png")))
    }
  }

  fn sub(position: u32, images: Vec<ImageRef>) -> SubPost {
    SubPost { position, text: format!("post {position}"), images }
  }

  #[test]
  fn resolves_assets_through_the_resolver() {
    let thread = Thread::new(vec![
      sub(0, vec![ImageRef::Asset { kind: ImageKind::Art, name: None }]),
      sub(1, vec![]),
    ])
    .unwrap();

    let composed = ComposedThread::resolve(&thread, "2401.00001", &OnlyArt).unwrap();
    assert_eq!(composed.len(), 2);
    assert_eq!(composed.posts()[0].images, vec![PathBuf::from(
      "/assets/art/2401.00001.png"
    )]);
    assert_eq!(composed.posts()[1].text, "post 1");
    assert_eq!(composed.image_count(), 1);
  }

  #[test]
  fn unresolvable_asset_fails_the_thread() {
    let thread = Thread::new(vec![
      sub(0, vec![]),
      sub(1, vec![ImageRef::Asset { kind: ImageKind::FirstPage, name: None }]),
    ])
    .unwrap();

    let err = ComposedThread::resolve(&thread, "t", &OnlyArt).unwrap_err();
    assert_eq!(err.position, 1);
  }

  #[test]
  fn missing_local_file_fails_the_thread() {
    let thread = Thread::new(vec![sub(0, vec![ImageRef::Local(PathBuf::from(
      "/definitely/not/here.png",
    ))])])
    .unwrap();

    assert!(ComposedThread::resolve(&thread, "t", &OnlyArt).is_err());
  }
}
