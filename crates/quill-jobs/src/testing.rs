//! Hand-written collaborator doubles shared by the job tests.

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use quill_core::{
  candidate::{Candidate, ImageKind, NewCandidate, Thread},
  ports::{ImageResolver, Notification, Notifier, RankEntry, Ranker},
  store::CandidateStore,
};
use quill_poster::{Composer, DriverConfig, PostingDriver, ProtocolError, SessionFactory};
use quill_store_sqlite::SqliteStore;
use uuid::Uuid;

// ─── Store ───────────────────────────────────────────────────────────────────

pub async fn store() -> SqliteStore { SqliteStore::open_in_memory().await.unwrap() }

pub fn thread(text: &str) -> Thread {
  Thread::compose([(text.to_string(), vec![])]).unwrap()
}

pub async fn insert(s: &SqliteStore, target: &str, text: &str) -> Candidate {
  s.insert(NewCandidate::new(target, "summary", thread(text)).unwrap())
    .await
    .unwrap()
}

/// A store in a temporary file, so a test can damage rows behind its back.
pub struct FileStore {
  pub store: SqliteStore,
  path:      PathBuf,
}

impl FileStore {
  pub async fn new() -> Self {
    let path = std::env::temp_dir().join(format!("quill-jobs-{}.db", Uuid::new_v4()));
    let store = SqliteStore::open(&path).await.unwrap();
    Self { store, path }
  }

  /// Replace the stored thread of `id` with one that fails validation.
  pub fn corrupt(&self, id: Uuid) {
    let conn = rusqlite::Connection::open(&self.path).unwrap();
    conn.busy_timeout(Duration::from_secs(5)).unwrap();
    let changed = conn
      .execute(
        "UPDATE candidates SET thread_json = ?1 WHERE candidate_id = ?2",
        rusqlite::params![r#"{"posts":[{"position":1,"text":"gap"}]}"#, id.to_string()],
      )
      .unwrap();
    assert_eq!(changed, 1);
  }
}

impl Drop for FileStore {
  fn drop(&mut self) {
    for suffix in ["", "-wal", "-shm"] {
      let mut p = self.path.clone().into_os_string();
      p.push(suffix);
      let _ = std::fs::remove_file(p);
    }
  }
}

// ─── Ranker ──────────────────────────────────────────────────────────────────

/// Answers with a fixed reply, or with the id of the entry whose text
/// matches.
pub enum ScriptedRanker {
  Reply(String),
  PickText(String),
}

#[derive(Debug, thiserror::Error)]
#[error("ranker unavailable")]
pub struct RankerDown;

pub struct CountingRanker {
  pub script:   ScriptedRanker,
  pub calls:    AtomicUsize,
  pub contexts: Mutex<Vec<Vec<String>>>,
  pub down:     bool,
}

impl CountingRanker {
  pub fn new(script: ScriptedRanker) -> Self {
    Self {
      script,
      calls: AtomicUsize::new(0),
      contexts: Mutex::new(Vec::new()),
      down: false,
    }
  }

  pub fn picking(text: &str) -> Self { Self::new(ScriptedRanker::PickText(text.into())) }

  pub fn replying(reply: &str) -> Self { Self::new(ScriptedRanker::Reply(reply.into())) }

  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

impl Ranker for CountingRanker {
  type Error = RankerDown;

  async fn rank<'a>(
    &'a self,
    batch: &'a [RankEntry],
    context: &'a [String],
  ) -> Result<String, RankerDown> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.contexts.lock().unwrap().push(context.to_vec());
    if self.down {
      return Err(RankerDown);
    }
    Ok(match &self.script {
      ScriptedRanker::Reply(reply) => reply.clone(),
      ScriptedRanker::PickText(text) => batch
        .iter()
        .find(|e| &e.text == text)
        .map(|e| format!("I would pick {}.", e.id))
        .unwrap_or_default(),
    })
  }
}

// ─── Notifier ────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("mail server refused")]
pub struct MailDown;

#[derive(Default)]
pub struct RecordingNotifier {
  pub sent: Mutex<Vec<Notification>>,
  pub down: bool,
}

impl RecordingNotifier {
  pub fn failing() -> Self { Self { down: true, ..Default::default() } }

  pub fn sent(&self) -> Vec<Notification> { self.sent.lock().unwrap().clone() }
}

impl Notifier for RecordingNotifier {
  type Error = MailDown;

  async fn notify<'a>(&'a self, notification: &'a Notification) -> Result<(), MailDown> {
    if self.down {
      return Err(MailDown);
    }
    self.sent.lock().unwrap().push(notification.clone());
    Ok(())
  }
}

// ─── Images ──────────────────────────────────────────────────────────────────

/// Resolves everything except figures.
pub struct NoFigures;

impl ImageResolver for NoFigures {
  fn resolve(&self, target_id: &str, kind: ImageKind, _: Option<&str>) -> Option<PathBuf> {
    (kind != ImageKind::Figure).then(|| PathBuf::from(format!("/img/{target_id}.png")))
  }
}

// ─── Browser ─────────────────────────────────────────────────────────────────

/// How a fake page behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageScript {
  Succeed,
  /// The composer never shows a text surface.
  NoComposer,
  /// "Publish all" is pressed but never acknowledged.
  NeverConfirm,
}

pub struct FakePage {
  script:    PageScript,
  surfaces:  usize,
  attached:  Vec<usize>,
  published: bool,
  closed:    Arc<AtomicUsize>,
}

impl Composer for FakePage {
  async fn open_composer(&mut self) -> Result<(), ProtocolError> {
    if self.script != PageScript::NoComposer {
      self.surfaces = 1;
      self.attached = vec![0];
    }
    Ok(())
  }

  async fn add_post(&mut self) -> Result<bool, ProtocolError> {
    self.surfaces += 1;
    self.attached.push(0);
    Ok(true)
  }

  async fn fill_text(&mut self, position: usize, _: &str) -> Result<bool, ProtocolError> {
    Ok(position < self.surfaces)
  }

  async fn upload_image(&mut self, position: usize, _: &Path) -> Result<bool, ProtocolError> {
    self.attached[position] += 1;
    Ok(true)
  }

  async fn attached_images(&mut self, position: usize) -> Result<usize, ProtocolError> {
    Ok(self.attached.get(position).copied().unwrap_or(0))
  }

  async fn has_text_surface(&mut self, position: usize) -> Result<bool, ProtocolError> {
    Ok(position < self.surfaces)
  }

  async fn has_thread_marker(&mut self, _: usize) -> Result<bool, ProtocolError> { Ok(true) }

  async fn publish_all(&mut self) -> Result<bool, ProtocolError> {
    self.published = true;
    Ok(true)
  }

  async fn is_confirmed(&mut self) -> Result<bool, ProtocolError> {
    Ok(self.published && self.script != PageScript::NeverConfirm)
  }

  async fn close(self) -> Result<(), ProtocolError> {
    self.closed.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

/// Hands out one page per scripted attempt, in order. Once the script runs
/// out every page succeeds.
#[derive(Default)]
pub struct FakeSessions {
  scripts: Mutex<VecDeque<PageScript>>,
  pub opened: AtomicUsize,
  pub closed: Arc<AtomicUsize>,
}

impl FakeSessions {
  pub fn scripted(scripts: impl IntoIterator<Item = PageScript>) -> Self {
    Self { scripts: Mutex::new(scripts.into_iter().collect()), ..Default::default() }
  }

  pub fn opened(&self) -> usize { self.opened.load(Ordering::SeqCst) }

  pub fn closed(&self) -> usize { self.closed.load(Ordering::SeqCst) }
}

impl SessionFactory for FakeSessions {
  type Session = FakePage;

  async fn open(&self) -> Result<FakePage, ProtocolError> {
    self.opened.fetch_add(1, Ordering::SeqCst);
    let script = self.scripts.lock().unwrap().pop_front().unwrap_or(PageScript::Succeed);
    Ok(FakePage {
      script,
      surfaces: 0,
      attached: Vec::new(),
      published: false,
      closed: self.closed.clone(),
    })
  }
}

pub fn fast_driver() -> PostingDriver {
  PostingDriver::new(DriverConfig {
    surface_timeout: Duration::from_millis(30),
    image_timeout:   Duration::from_millis(30),
    confirm_timeout: Duration::from_millis(30),
    poll_interval:   Duration::from_millis(5),
    verify_attempts: 2,
    verify_backoff:  Duration::from_millis(1),
  })
}

// ─── Generator ───────────────────────────────────────────────────────────────

/// Produces a one-post thread naming the target and post type; fails for
/// targets listed in `broken`.
#[derive(Default)]
pub struct EchoGenerator {
  pub broken: Vec<String>,
  pub calls:  Mutex<Vec<(String, String)>>,
}

#[derive(Debug, thiserror::Error)]
#[error("generator crashed")]
pub struct GeneratorCrashed;

impl quill_core::ports::ContentGenerator for EchoGenerator {
  type Error = GeneratorCrashed;

  async fn generate<'a>(
    &'a self,
    target_id: &'a str,
    post_type: &'a str,
  ) -> Result<Thread, GeneratorCrashed> {
    self.calls.lock().unwrap().push((target_id.into(), post_type.into()));
    if self.broken.iter().any(|b| b == target_id) {
      return Err(GeneratorCrashed);
    }
    Ok(thread(&format!("{post_type} about {target_id}")))
  }
}

