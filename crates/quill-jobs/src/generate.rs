//! Candidate generation: fan out a content generator over fresh targets,
//! and manual enqueueing of pre-built threads.

use quill_core::{
  candidate::{Candidate, NewCandidate, Thread},
  ports::ContentGenerator,
  store::CandidateStore,
};
use rand_core::RngCore;
use tracing::{info, warn};

use crate::{JobError, JobOutcome, Result, dedup};

// ─── Post-type weights ───────────────────────────────────────────────────────

/// A weighted choice over post types.
#[derive(Debug, Clone)]
pub struct PostTypeWeights {
  entries: Vec<(String, f64)>,
  total:   f64,
}

impl PostTypeWeights {
  /// Non-positive and non-finite weights are dropped. Entries are sorted by
  /// name so a given roll always picks the same type.
  pub fn new<I, K>(weights: I) -> Result<Self>
  where
    I: IntoIterator<Item = (K, f64)>,
    K: Into<String>,
  {
    let mut entries: Vec<(String, f64)> = weights
      .into_iter()
      .map(|(k, w)| (k.into(), w))
      .filter(|(k, w)| w.is_finite() && *w > 0.0 && !k.trim().is_empty())
      .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let total: f64 = entries.iter().map(|(_, w)| w).sum();
    if entries.is_empty() || total <= 0.0 {
      return Err(JobError::Config("no post type has a positive weight".into()));
    }
    Ok(Self { entries, total })
  }

  /// The type covering `roll`, a number in `[0, 1)`.
  pub fn pick(&self, roll: f64) -> &str {
    let mut point = roll.clamp(0.0, 1.0) * self.total;
    for (name, weight) in &self.entries {
      if point < *weight {
        return name;
      }
      point -= weight;
    }
    // Rounding can leave `point` a hair past the last bucket.
    &self.entries[self.entries.len() - 1].0
  }

  pub fn draw(&self, rng: &mut impl RngCore) -> &str {
    let roll = (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
    self.pick(roll)
  }

  pub fn types(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(name, _)| name.as_str())
  }
}

// ─── Generate ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GenerateSettings {
  pub variants_per_target: usize,
  /// Most targets handled in one run.
  pub max_targets:         usize,
}

impl Default for GenerateSettings {
  fn default() -> Self { Self { variants_per_target: 3, max_targets: 5 } }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateReport {
  /// Targets that were generated for.
  pub targets:  Vec<String>,
  pub inserted: usize,
  /// Variants whose generation failed and were skipped.
  pub failed:   usize,
}

impl GenerateReport {
  pub fn outcome(&self) -> JobOutcome {
    if self.inserted > 0 { JobOutcome::Done } else { JobOutcome::NothingToDo }
  }
}

/// Generate candidates for up to `max_targets` of `targets`, skipping any
/// that are published or already have live candidates.
pub async fn generate<S, G, R>(
  store: &S,
  generator: &G,
  weights: &PostTypeWeights,
  settings: &GenerateSettings,
  targets: Vec<String>,
  rng: &mut R,
) -> Result<GenerateReport>
where
  S: CandidateStore,
  G: ContentGenerator,
  R: RngCore,
{
  let requested = targets.len();
  let mut fresh = dedup::fresh_targets(store, targets).await?;
  fresh.truncate(settings.max_targets);
  info!(requested, fresh = fresh.len(), "generating candidates");

  let mut report = GenerateReport::default();
  for target_id in fresh {
    for variant in 0..settings.variants_per_target {
      let post_type = weights.draw(rng);
      let thread = match generator.generate(&target_id, post_type).await {
        Ok(thread) => thread,
        Err(e) => {
          warn!(%target_id, post_type, variant, error = %e, "generation failed, skipping");
          report.failed += 1;
          continue;
        }
      };
      let candidate = NewCandidate::new(target_id.as_str(), post_type, thread)?;
      let inserted = store.insert(candidate).await.map_err(JobError::store)?;
      info!(candidate_id = %inserted.id, %target_id, post_type, "candidate stored");
      report.inserted += 1;
    }
    report.targets.push(target_id);
  }
  Ok(report)
}

// ─── Enqueue ─────────────────────────────────────────────────────────────────

/// Store a pre-built thread as a pending candidate.
pub async fn enqueue<S: CandidateStore>(
  store: &S,
  target_id: &str,
  post_type: &str,
  thread: Thread,
) -> Result<Candidate> {
  let input = NewCandidate::new(target_id, post_type, thread)?;
  dedup::ensure_fresh(store, &input.target_id).await?;
  let candidate = store.insert(input).await.map_err(JobError::store)?;
  info!(candidate_id = %candidate.id, target_id, post_type, "candidate enqueued");
  Ok(candidate)
}
