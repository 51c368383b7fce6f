//! Runtime configuration, deserialised from `quill.toml` and `QUILL_*`
//! environment variables (`QUILL_RANKING__API_KEY`, ...).
//!
//! Every section has defaults, so an empty file (or none) is a valid
//! configuration for the jobs that need no credentials.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use anyhow::Context as _;
use quill_jobs::{
  arbiter::ArbiterSettings,
  generate::{GenerateSettings, PostTypeWeights},
  publish::PublishSettings,
};
use quill_poster::{
  DriverConfig,
  chromium::{ChromiumSettings, Selectors},
};
use serde::Deserialize;

use crate::expand_tilde;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path: PathBuf,
  pub ranking:    RankingConfig,
  pub browser:    BrowserConfig,
  pub publish:    PublishConfig,
  pub images:     ImagesConfig,
  pub notify:     NotifyConfig,
  pub generation: GenerationConfig,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path: "~/.local/share/quill/quill.db".into(),
      ranking:    RankingConfig::default(),
      browser:    BrowserConfig::default(),
      publish:    PublishConfig::default(),
      images:     ImagesConfig::default(),
      notify:     NotifyConfig::default(),
      generation: GenerationConfig::default(),
    }
  }
}

impl Settings {
  /// Layer `path` (optional) under `QUILL_SECTION__KEY` variables.
  pub fn load(path: PathBuf) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("QUILL")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
  pub api_key:      Option<String>,
  pub api_version:  String,
  pub model:        String,
  pub base_url:     String,
  pub max_tokens:   u32,
  /// Most candidates per arbitration batch.
  pub batch_limit:  usize,
  /// Recent publications shown to the ranker.
  pub context_size: usize,
}

impl Default for RankingConfig {
  fn default() -> Self {
    Self {
      api_key:      None,
      api_version:  "2023-06-01".into(),
      model:        "claude-sonnet-4-20250514".into(),
      base_url:     "https://api.anthropic.com/v1/messages".into(),
      max_tokens:   256,
      batch_limit:  20,
      context_size: 10,
    }
  }
}

impl RankingConfig {
  pub fn arbiter(&self) -> ArbiterSettings {
    ArbiterSettings { batch_limit: self.batch_limit, context_size: self.context_size }
  }
}

// ─── Browser ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
  pub headless:             bool,
  pub user_data_dir:        Option<PathBuf>,
  pub executable:           Option<PathBuf>,
  pub compose_url:          String,
  pub selectors:            Selectors,
  pub surface_timeout_secs: u64,
  pub image_timeout_secs:   u64,
  pub confirm_timeout_secs: u64,
  pub poll_interval_ms:     u64,
  pub verify_attempts:      u32,
  pub verify_backoff_ms:    u64,
}

impl Default for BrowserConfig {
  fn default() -> Self {
    let chromium = ChromiumSettings::default();
    let driver = DriverConfig::default();
    Self {
      headless:             chromium.headless,
      user_data_dir:        Some("~/.local/share/quill/chrome".into()),
      executable:           None,
      compose_url:          chromium.compose_url,
      selectors:            chromium.selectors,
      surface_timeout_secs: driver.surface_timeout.as_secs(),
      image_timeout_secs:   driver.image_timeout.as_secs(),
      confirm_timeout_secs: driver.confirm_timeout.as_secs(),
      poll_interval_ms:     millis(driver.poll_interval),
      verify_attempts:      driver.verify_attempts,
      verify_backoff_ms:    millis(driver.verify_backoff),
    }
  }
}

impl BrowserConfig {
  pub fn driver(&self) -> DriverConfig {
    DriverConfig {
      surface_timeout: Duration::from_secs(self.surface_timeout_secs),
      image_timeout:   Duration::from_secs(self.image_timeout_secs),
      confirm_timeout: Duration::from_secs(self.confirm_timeout_secs),
      poll_interval:   Duration::from_millis(self.poll_interval_ms),
      verify_attempts: self.verify_attempts,
      verify_backoff:  Duration::from_millis(self.verify_backoff_ms),
    }
  }

  pub fn chromium(&self) -> ChromiumSettings {
    ChromiumSettings {
      headless:      self.headless,
      user_data_dir: self.user_data_dir.as_deref().map(expand_tilde),
      executable:    self.executable.as_deref().map(expand_tilde),
      compose_url:   self.compose_url.clone(),
      selectors:     self.selectors.clone(),
    }
  }
}

fn millis(d: Duration) -> u64 { u64::try_from(d.as_millis()).unwrap_or(u64::MAX) }

// ─── Publish ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
  pub verify:           bool,
  pub retry_delay_secs: u64,
  /// After this long an unfinished publish run is presumed dead.
  pub stale_claim_secs: u64,
}

impl Default for PublishConfig {
  fn default() -> Self {
    let defaults = PublishSettings::default();
    Self {
      verify:           defaults.verify,
      retry_delay_secs: defaults.retry_delay.as_secs(),
      stale_claim_secs: defaults.stale_claim.as_secs(),
    }
  }
}

impl PublishConfig {
  pub fn settings(&self) -> PublishSettings {
    PublishSettings {
      verify:      self.verify,
      retry_delay: Duration::from_secs(self.retry_delay_secs),
      stale_claim: Duration::from_secs(self.stale_claim_secs),
    }
  }
}

// ─── Images ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
  pub root: PathBuf,
}

impl Default for ImagesConfig {
  fn default() -> Self { Self { root: "~/.local/share/quill/images".into() } }
}

// ─── Notify ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
  /// Without SMTP settings notifications are only logged.
  pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
  pub host:     String,
  #[serde(default = "default_smtp_port")]
  pub port:     u16,
  pub username: String,
  pub password: String,
  pub from:     String,
  pub to:       String,
}

fn default_smtp_port() -> u16 { 587 }

// ─── Generation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
  /// Program run as `<command> <target_id> <post_type>`; prints a JSON
  /// thread on stdout.
  pub command:             Option<PathBuf>,
  pub timeout_secs:        u64,
  pub post_types:          BTreeMap<String, f64>,
  pub variants_per_target: usize,
  pub max_targets:         usize,
}

impl Default for GenerationConfig {
  fn default() -> Self {
    let defaults = GenerateSettings::default();
    Self {
      command:             None,
      timeout_secs:        600,
      post_types:          [("insight", 0.7), ("punchline", 0.2), ("fable", 0.1)]
        .into_iter()
        .map(|(k, w)| (k.to_string(), w))
        .collect(),
      variants_per_target: defaults.variants_per_target,
      max_targets:         defaults.max_targets,
    }
  }
}

impl GenerationConfig {
  pub fn settings(&self) -> GenerateSettings {
    GenerateSettings {
      variants_per_target: self.variants_per_target,
      max_targets:         self.max_targets,
    }
  }

  pub fn weights(&self) -> quill_jobs::Result<PostTypeWeights> {
    PostTypeWeights::new(self.post_types.iter().map(|(k, w)| (k.as_str(), *w)))
  }
}
