//! [`AnthropicRanker`]: asks a Claude model, through the Messages API, which
//! candidate to publish.

use std::{fmt::Write as _, time::Duration};

use quill_core::ports::{RankEntry, Ranker};
use reqwest::{
  StatusCode,
  header::{HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RankingConfig;

const SYSTEM_PROMPT: &str = "You curate a feed of posts about research papers. \
  Given candidate posts, choose the single one most worth publishing: accurate, \
  engaging, and different from what was posted recently. \
  Answer with the chosen candidate's id and nothing else.";

#[derive(Debug, Error)]
pub enum RankerError {
  #[error("ranker configuration: {0}")]
  Config(String),

  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("API returned {status}: {message}")]
  Api { status: StatusCode, message: String },

  #[error("response has no text content")]
  Empty,
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
  model:      &'a str,
  max_tokens: u32,
  system:     &'a str,
  messages:   [ApiMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
  role:    &'a str,
  content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
  content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
  Text { text: String },
  #[serde(other)]
  Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
  error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
  #[serde(rename = "type")]
  type_:   String,
  message: String,
}

// ─── Client ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AnthropicRanker {
  client:      reqwest::Client,
  model:       String,
  max_tokens:  u32,
  url:         String,
  max_retries: u32,
  retry_delay: Duration,
}

impl AnthropicRanker {
  pub fn new(config: &RankingConfig) -> Result<Self, RankerError> {
    let api_key = config
      .api_key
      .as_deref()
      .ok_or_else(|| RankerError::Config("ranking.api_key is not set".into()))?;

    let mut headers = HeaderMap::new();
    headers.insert(
      "x-api-key",
      HeaderValue::from_str(api_key)
        .map_err(|e| RankerError::Config(format!("invalid API key header value: {e}")))?,
    );
    headers.insert(
      "anthropic-version",
      HeaderValue::from_str(&config.api_version)
        .map_err(|e| RankerError::Config(format!("invalid API version header value: {e}")))?,
    );

    let client = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(Duration::from_secs(120))
      .build()?;

    Ok(Self {
      client,
      model: config.model.clone(),
      max_tokens: config.max_tokens,
      url: config.base_url.clone(),
      max_retries: 1,
      retry_delay: Duration::from_secs(1),
    })
  }

  #[cfg(test)]
  fn with_retry_delay(mut self, delay: Duration) -> Self {
    self.retry_delay = delay;
    self
  }

  async fn complete(&self, prompt: &str) -> Result<String, RankerError> {
    let request = MessageRequest {
      model:      &self.model,
      max_tokens: self.max_tokens,
      system:     SYSTEM_PROMPT,
      messages:   [ApiMessage { role: "user", content: prompt }],
    };

    let mut attempt = 0;
    loop {
      if attempt > 0 {
        warn!(attempt, "retrying ranking request after transient error");
        tokio::time::sleep(self.retry_delay).await;
      }

      let response = self.client.post(&self.url).json(&request).send().await?;
      let status = response.status();
      debug!(status = %status, attempt, "ranking response received");

      if status.is_success() {
        let body: MessageResponse = response.json().await?;
        let text: String = body
          .content
          .into_iter()
          .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
          })
          .collect();
        if text.trim().is_empty() {
          return Err(RankerError::Empty);
        }
        return Ok(text);
      }

      let body = response.text().await.unwrap_or_default();
      if is_transient(status) && attempt < self.max_retries {
        warn!(status = %status, body = %body, "transient error, will retry");
        attempt += 1;
        continue;
      }

      let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(api) => format!("{}: {}", api.error.type_, api.error.message),
        Err(_) => body,
      };
      return Err(RankerError::Api { status, message });
    }
  }
}

impl Ranker for AnthropicRanker {
  type Error = RankerError;

  async fn rank<'a>(
    &'a self,
    batch: &'a [RankEntry],
    context: &'a [String],
  ) -> Result<String, RankerError> {
    let prompt = prompt(batch, context);
    self.complete(&prompt).await
  }
}

/// The user turn: recent posts, then the candidates.
fn prompt(batch: &[RankEntry], context: &[String]) -> String {
  let mut out = String::new();
  if !context.is_empty() {
    out.push_str("<recent_posts>\n");
    for text in context {
      let _ = writeln!(out, "<post>{text}</post>");
    }
    out.push_str("</recent_posts>\n\n");
  }
  out.push_str("<candidates>\n");
  for entry in batch {
    let _ = writeln!(
      out,
      "<candidate id=\"{}\" type=\"{}\">\n{}\n</candidate>",
      entry.id, entry.post_type, entry.text
    );
  }
  out.push_str("</candidates>\n\nReply with the id of the best candidate.");
  out
}

fn is_transient(status: StatusCode) -> bool { matches!(status.as_u16(), 429 | 500 | 503 | 529) }
