//! quill: generate, arbitrate, publish and sweep post candidates.
//!
//! Reads `quill.toml` (or the path given with `--config`) and `QUILL_*`
//! environment variables. Every subcommand is a single batch job meant to be
//! run by a scheduler, which reads the exit code:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0    | the job did work |
//! | 3    | nothing to do |
//! | 1    | failure |

use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use quill_cli::{
  config::Settings, generator::CommandGenerator, images::DirImageResolver,
  notify::MailNotifier, ranker::AnthropicRanker,
};
use quill_core::candidate::Thread;
use quill_jobs::{
  JobOutcome,
  arbiter::{Arbiter, Arbitration},
  dedup, generate, publish::Publisher, status,
};
use quill_poster::{PostingDriver, chromium::ChromiumLauncher};
use quill_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Post candidate pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "quill.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Generate candidates for targets without live or published ones.
  Generate {
    /// Target ids.
    targets: Vec<String>,
    /// File with one target id per line (`#` starts a comment).
    #[arg(short, long)]
    file:    Option<PathBuf>,
  },
  /// Store a hand-written thread as a pending candidate.
  Enqueue {
    target_id: String,
    post_type: String,
    /// JSON thread: `{"posts": [{"position": 0, "text": "..."}]}`.
    thread:    PathBuf,
  },
  /// Choose the next candidate to publish.
  Arbitrate,
  /// Publish the selected candidate.
  Publish,
  /// Arbitrate, then publish.
  Run,
  /// Reject pending candidates whose target is already published.
  Sweep {
    /// Only report how many would be rejected.
    #[arg(long)]
    dry_run: bool,
  },
  /// Show candidate counts and recent publications.
  Status {
    #[arg(long, default_value_t = 10)]
    recent: usize,
  },
}

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let result = run(cli).await;
  if let Err(e) = &result {
    error!("{e:#}");
  }
  ExitCode::from(quill_cli::exit_status(&result))
}

async fn run(cli: Cli) -> anyhow::Result<JobOutcome> {
  let settings = Settings::load(cli.config)?;

  let store_path = settings.store_path();
  if let Some(dir) = store_path.parent() {
    tokio::fs::create_dir_all(dir)
      .await
      .with_context(|| format!("failed to create {dir:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Generate { targets, file } => generate_cmd(&settings, &store, targets, file).await,
    Command::Enqueue { target_id, post_type, thread } => {
      let json = tokio::fs::read_to_string(&thread)
        .await
        .with_context(|| format!("failed to read {thread:?}"))?;
      let thread = Thread::from_json(&json).context("invalid thread")?;
      let candidate = generate::enqueue(&store, &target_id, &post_type, thread).await?;
      println!("{}", candidate.id);
      Ok(JobOutcome::Done)
    }
    Command::Arbitrate => arbitrate_cmd(&settings, &store).await,
    Command::Publish => publish_cmd(&settings, &store).await,
    Command::Run => {
      let arbitrated = arbitrate_cmd(&settings, &store).await?;
      let published = publish_cmd(&settings, &store).await?;
      Ok(quill_cli::run_outcome(arbitrated, published))
    }
    Command::Sweep { dry_run } => {
      let report = dedup::sweep(&store, dry_run).await?;
      if dry_run {
        println!("{} pending candidate(s) would be rejected", report.rejected);
      }
      Ok(report.outcome())
    }
    Command::Status { recent } => {
      print!("{}", status::report(&store, recent).await?);
      Ok(JobOutcome::Done)
    }
  }
}

async fn generate_cmd(
  settings: &Settings,
  store: &SqliteStore,
  mut targets: Vec<String>,
  file: Option<PathBuf>,
) -> anyhow::Result<JobOutcome> {
  if let Some(file) = file {
    let text = tokio::fs::read_to_string(&file)
      .await
      .with_context(|| format!("failed to read {file:?}"))?;
    targets.extend(
      text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from),
    );
  }

  let command = settings
    .generation
    .command
    .as_deref()
    .context("generation.command is not set")?;
  let generator = CommandGenerator::new(
    quill_cli::expand_tilde(command),
    Duration::from_secs(settings.generation.timeout_secs),
  );
  let weights = settings.generation.weights()?;

  let report = generate::generate(
    store,
    &generator,
    &weights,
    &settings.generation.settings(),
    targets,
    &mut OsRng,
  )
  .await?;
  info!(
    targets = report.targets.len(),
    inserted = report.inserted,
    failed = report.failed,
    "generation finished"
  );
  Ok(report.outcome())
}

async fn arbitrate_cmd(settings: &Settings, store: &SqliteStore) -> anyhow::Result<JobOutcome> {
  let ranker = AnthropicRanker::new(&settings.ranking)?;
  let result = Arbiter::new(store, &ranker, settings.ranking.arbiter()).arbitrate().await?;
  match &result {
    Arbitration::Selected { id, target_id, rejected, skipped } => {
      info!(candidate_id = %id, %target_id, rejected, skipped, "arbitration finished");
    }
    other => info!(result = ?other, "nothing selected"),
  }
  Ok(result.outcome())
}

async fn publish_cmd(settings: &Settings, store: &SqliteStore) -> anyhow::Result<JobOutcome> {
  let notifier = MailNotifier::from_config(settings.notify.smtp.as_ref())
    .context("invalid notification settings")?;
  let images = DirImageResolver::new(quill_cli::expand_tilde(&settings.images.root));
  let sessions = ChromiumLauncher::new(settings.browser.chromium());

  let publisher = Publisher {
    store,
    sessions: &sessions,
    images: &images,
    notifier: &notifier,
    driver: PostingDriver::new(settings.browser.driver()),
    settings: settings.publish.settings(),
  };
  Ok(publisher.publish_next().await?)
}
