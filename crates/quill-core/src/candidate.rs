//! Candidate types: the unit the posting pipeline arbitrates over.
//!
//! A candidate is one generated attempt at a post about a target (usually a
//! paper). Many candidates may compete for the same target; at most one of
//! them is ever published. Candidates are never deleted, only moved through
//! the [`Status`] state machine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::ValidationError;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Where a candidate is in its lifecycle.
///
/// ```text
/// pending ──> selected ──> posted
///    │            └──────> error
///    └──────> rejected
/// ```
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Status {
  Pending,
  Selected,
  Posted,
  Rejected,
  Error,
}

impl Status {
  /// Whether `self -> next` is an edge of the state machine.
  pub fn can_become(self, next: Status) -> bool {
    matches!(
      (self, next),
      (Self::Pending, Self::Selected)
        | (Self::Pending, Self::Rejected)
        | (Self::Selected, Self::Posted)
        | (Self::Selected, Self::Error)
    )
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Posted | Self::Rejected | Self::Error)
  }

  /// Live candidates still hold a claim on their target.
  pub fn is_live(self) -> bool { matches!(self, Self::Pending | Self::Selected) }
}

/// The write-once timestamp column a transition may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
  SelectedAt,
  PostedAt,
}

// ─── Images ──────────────────────────────────────────────────────────────────

/// Logical image families the image resolver knows how to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
  /// Generated artwork for the target.
  Art,
  /// A rendering of the paper's first page.
  FirstPage,
  /// A figure extracted from the paper; needs a file name.
  Figure,
}

/// One image attached to a sub-post: either a path on disk or a logical
/// reference materialised by an
/// [`ImageResolver`](crate::ports::ImageResolver) before posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
  Asset {
    kind: ImageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
  },
  Local(PathBuf),
}

// ─── Thread ──────────────────────────────────────────────────────────────────

/// One element of a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPost {
  /// 0-based publish order.
  pub position: u32,
  /// May be empty for image-only posts.
  #[serde(default)]
  pub text:     String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub images:   Vec<ImageRef>,
}

#[derive(Deserialize)]
struct ThreadRepr {
  posts: Vec<SubPost>,
}

/// A non-empty, position-ordered sequence of sub-posts.
///
/// The only way to build one is through [`Thread::new`] (or deserialisation,
/// which goes through the same checks), so every `Thread` in the program has
/// positions `0..len` with no gaps or duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
  posts: Vec<SubPost>,
}

impl Thread {
  /// Validate and order `posts`. Input order does not matter; positions do.
  pub fn new(mut posts: Vec<SubPost>) -> Result<Self, ValidationError> {
    if posts.is_empty() {
      return Err(ValidationError::EmptyThread);
    }
    posts.sort_by_key(|p| p.position);

    for (i, post) in posts.iter().enumerate() {
      if i > 0 && posts[i - 1].position == post.position {
        return Err(ValidationError::DuplicatePosition(post.position));
      }
      let expected = i as u32;
      if post.position != expected {
        return Err(ValidationError::PositionGap {
          expected,
          found: post.position,
        });
      }
      let bad_figure = post.images.iter().any(|img| {
        matches!(img, ImageRef::Asset { kind: ImageKind::Figure, name: None })
      });
      if bad_figure {
        return Err(ValidationError::FigureWithoutName);
      }
    }

    Ok(Self { posts })
  }

  /// Build a thread from `(text, images)` pairs, numbering them in order.
  pub fn compose<I>(parts: I) -> Result<Self, ValidationError>
  where
    I: IntoIterator<Item = (String, Vec<ImageRef>)>,
  {
    let posts = parts
      .into_iter()
      .enumerate()
      .map(|(i, (text, images))| SubPost { position: i as u32, text, images })
      .collect();
    Self::new(posts)
  }

  pub fn posts(&self) -> &[SubPost] { &self.posts }

  /// The lead post; always present.
  pub fn first(&self) -> &SubPost { &self.posts[0] }

  pub fn len(&self) -> usize { self.posts.len() }

  pub fn is_empty(&self) -> bool { self.posts.is_empty() }

  pub fn image_count(&self) -> usize {
    self.posts.iter().map(|p| p.images.len()).sum()
  }

  pub fn to_json(&self) -> crate::Result<String> {
    Ok(serde_json::to_string(self)?)
  }

  pub fn from_json(s: &str) -> crate::Result<Self> {
    Ok(serde_json::from_str(s)?)
  }
}

impl<'de> Deserialize<'de> for Thread {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    let repr = ThreadRepr::deserialize(d)?;
    Self::new(repr.posts).map_err(serde::de::Error::custom)
  }
}

// ─── Candidate ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::CandidateStore::insert`]. The id, status and
/// timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewCandidate {
  pub target_id: String,
  pub post_type: String,
  pub thread:    Thread,
}

impl NewCandidate {
  pub fn new(
    target_id: impl Into<String>,
    post_type: impl Into<String>,
    thread: Thread,
  ) -> Result<Self, ValidationError> {
    let target_id = target_id.into();
    let post_type = post_type.into();
    if target_id.trim().is_empty() {
      return Err(ValidationError::BlankTargetId);
    }
    if post_type.trim().is_empty() {
      return Err(ValidationError::BlankPostType);
    }
    Ok(Self { target_id, post_type, thread })
  }
}

/// A persisted candidate with its full thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
  pub id:          Uuid,
  pub target_id:   String,
  /// Name of the generation template; informational only.
  pub post_type:   String,
  pub thread:      Thread,
  pub status:      Status,
  pub created_at:  DateTime<Utc>,
  pub selected_at: Option<DateTime<Utc>>,
  pub posted_at:   Option<DateTime<Utc>>,
}

impl Candidate {
  pub fn first_text(&self) -> &str { &self.thread.first().text }
}

/// The slice of a candidate listing needs. `first_text` is `None` when the
/// stored thread cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSummary {
  pub id:         Uuid,
  pub target_id:  String,
  pub post_type:  String,
  pub status:     Status,
  pub created_at: DateTime<Utc>,
  pub first_text: Option<String>,
}

// ─── Publication ─────────────────────────────────────────────────────────────

/// Append-only proof that a target was published. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
  pub target_id:    String,
  pub first_text:   String,
  pub post_type:    String,
  pub published_at: DateTime<Utc>,
  /// The candidate that produced the post, when known.
  pub candidate_id: Option<Uuid>,
}

impl PublicationRecord {
  pub fn for_candidate(candidate: &Candidate, published_at: DateTime<Utc>) -> Self {
    Self {
      target_id: candidate.target_id.clone(),
      first_text: candidate.first_text().to_owned(),
      post_type: candidate.post_type.clone(),
      published_at,
      candidate_id: Some(candidate.id),
    }
  }
}
