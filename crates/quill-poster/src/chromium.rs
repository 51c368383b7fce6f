//! A [`Composer`] over headless Chrome, driven through `chromiumoxide`.
//!
//! Element addressing on the platform is not stable, so every element is
//! located by trying a list of selectors in order. The lists live in
//! [`Selectors`] and can be replaced from configuration. A `{i}` in a
//! selector is replaced by the 0-based thread position.

use std::path::{Path, PathBuf};

use chromiumoxide::{
  Browser, BrowserConfig, Page, cdp::browser_protocol::dom::SetFileInputFilesParams,
  element::Element,
};
use futures::StreamExt as _;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{Composer, ProtocolError, SessionFactory, Step};

// ─── Settings ────────────────────────────────────────────────────────────────

/// Fallback selector lists for each element the protocol needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Selectors {
  pub text_surface:  Vec<String>,
  pub add_post:      Vec<String>,
  pub file_input:    Vec<String>,
  pub publish_all:   Vec<String>,
  pub confirmation:  Vec<String>,
  /// One element per sub-post in the composer, in thread order.
  pub thread_cell:   String,
  /// Matches one attachment inside a thread cell.
  pub attachment:    String,
  /// Present inside a thread cell when it is linked to the previous one.
  pub thread_marker: String,
}

impl Default for Selectors {
  fn default() -> Self {
    let list = |s: &[&str]| s.iter().map(|s| s.to_string()).collect();
    Self {
      text_surface:  list(&[
        r#"div[data-testid="tweetTextarea_{i}"][role="textbox"]"#,
        r#"[data-testid="tweetTextarea_{i}"]"#,
        r#"[data-testid="tweetTextarea_{i}RichTextInputContainer"] [contenteditable="true"]"#,
      ]),
      add_post:      list(&[
        r#"[data-testid="addButton"]"#,
        r#"button[aria-label="Add post"]"#,
      ]),
      file_input:    list(&[
        r#"input[data-testid="fileInput"]"#,
        r#"input[type="file"][accept*="image"]"#,
      ]),
      publish_all:   list(&[
        r#"[data-testid="tweetButton"]"#,
        r#"button[data-testid="tweetButtonInline"]"#,
      ]),
      confirmation:  list(&[r#"[data-testid="toast"]"#, r#"[role="alert"]"#]),
      thread_cell:   r#"[data-testid="cellInnerDiv"]"#.into(),
      attachment:    r#"[data-testid="attachments"] [data-testid="tweetPhoto"]"#.into(),
      thread_marker: r#"[data-testid="threadLine"]"#.into(),
    }
  }
}

impl Selectors {
  /// Instantiate a selector list for `position`.
  pub fn at(list: &[String], position: usize) -> Vec<String> {
    let i = position.to_string();
    list.iter().map(|s| s.replace("{i}", &i)).collect()
  }
}

#[derive(Debug, Clone)]
pub struct ChromiumSettings {
  pub headless:      bool,
  /// Profile directory; holds the logged-in session.
  pub user_data_dir: Option<PathBuf>,
  pub executable:    Option<PathBuf>,
  pub compose_url:   String,
  pub selectors:     Selectors,
}

impl Default for ChromiumSettings {
  fn default() -> Self {
    Self {
      headless:      true,
      user_data_dir: None,
      executable:    None,
      compose_url:   "https://x.com/compose/post".into(),
      selectors:     Selectors::default(),
    }
  }
}

// ─── Launcher ────────────────────────────────────────────────────────────────

/// Starts a new browser for every session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
  settings: ChromiumSettings,
}

impl ChromiumLauncher {
  pub fn new(settings: ChromiumSettings) -> Self { Self { settings } }
}

impl SessionFactory for ChromiumLauncher {
  type Session = ChromiumComposer;

  async fn open(&self) -> Result<ChromiumComposer, ProtocolError> {
    let launch = |e: String| ProtocolError::browser(Step::Launch, e);

    let mut builder = BrowserConfig::builder().window_size(1280, 1024);
    if !self.settings.headless {
      builder = builder.with_head();
    }
    if let Some(dir) = &self.settings.user_data_dir {
      builder = builder.user_data_dir(dir);
    }
    if let Some(exe) = &self.settings.executable {
      builder = builder.chrome_executable(exe);
    }
    let config = builder.build().map_err(launch)?;

    let (browser, mut handler) =
      Browser::launch(config).await.map_err(|e| launch(e.to_string()))?;
    let events = tokio::spawn(async move {
      while let Some(event) = handler.next().await {
        if let Err(e) = event {
          debug!(error = %e, "browser event stream ended");
          break;
        }
      }
    });

    let page = match browser.new_page("about:blank").await {
      Ok(page) => page,
      Err(e) => {
        events.abort();
        return Err(launch(e.to_string()));
      }
    };

    Ok(ChromiumComposer {
      browser,
      events,
      page,
      compose_url: self.settings.compose_url.clone(),
      selectors: self.settings.selectors.clone(),
    })
  }
}

// ─── Composer ────────────────────────────────────────────────────────────────

pub struct ChromiumComposer {
  browser:     Browser,
  events:      JoinHandle<()>,
  page:        Page,
  compose_url: String,
  selectors:   Selectors,
}

impl ChromiumComposer {
  /// The first element matched by any of `candidates`, tried in order.
  async fn find_first(&self, candidates: &[String]) -> Option<Element> {
    for selector in candidates {
      if let Ok(element) = self.page.find_element(selector.as_str()).await {
        return Some(element);
      }
    }
    None
  }

  async fn text_surface(&self, position: usize) -> Option<Element> {
    self.find_first(&Selectors::at(&self.selectors.text_surface, position)).await
  }

  async fn eval<T: serde::de::DeserializeOwned>(
    &self,
    step: Step,
    script: String,
  ) -> Result<T, ProtocolError> {
    self
      .page
      .evaluate(script)
      .await
      .map_err(|e| ProtocolError::browser(step, e))?
      .into_value()
      .map_err(|e| ProtocolError::browser(step, e))
  }

  /// Script counting elements matching `inner` in the thread cell at
  /// `position`.
  fn count_in_cell(&self, position: usize, inner: &str) -> String {
    format!(
      "(() => {{ const cell = document.querySelectorAll({cell})[{position}]; \
       return cell ? cell.querySelectorAll({inner}).length : 0; }})()",
      cell = js_string(&self.selectors.thread_cell),
      inner = js_string(inner),
    )
  }
}

impl Composer for ChromiumComposer {
  async fn open_composer(&mut self) -> Result<(), ProtocolError> {
    let step = Step::OpenComposer;
    self
      .page
      .goto(self.compose_url.as_str())
      .await
      .map_err(|e| ProtocolError::browser(step, e))?;
    Ok(())
  }

  async fn add_post(&mut self) -> Result<bool, ProtocolError> {
    let Some(button) = self.find_first(&self.selectors.add_post).await else {
      return Ok(false);
    };
    button.click().await.map_err(|e| ProtocolError::browser(Step::AddPost, e))?;
    Ok(true)
  }

  async fn fill_text(&mut self, position: usize, text: &str) -> Result<bool, ProtocolError> {
    let Some(surface) = self.text_surface(position).await else {
      return Ok(false);
    };
    let err = |e| ProtocolError::browser(Step::TextSurface, e);
    surface.click().await.map_err(err)?;
    if !text.is_empty() {
      surface.type_str(text).await.map_err(err)?;
    }
    Ok(true)
  }

  async fn upload_image(&mut self, position: usize, path: &Path) -> Result<bool, ProtocolError> {
    let err = |e| ProtocolError::browser(Step::Upload, e);

    // The file input belongs to whichever post has focus.
    let Some(surface) = self.text_surface(position).await else {
      return Ok(false);
    };
    surface.click().await.map_err(err)?;

    let Some(input) = self.find_first(&self.selectors.file_input).await else {
      return Ok(false);
    };
    let mut params = SetFileInputFilesParams::new(vec![path.display().to_string()]);
    params.backend_node_id = Some(input.backend_node_id);
    self.page.execute(params).await.map_err(err)?;
    Ok(true)
  }

  async fn attached_images(&mut self, position: usize) -> Result<usize, ProtocolError> {
    let script = self.count_in_cell(position, &self.selectors.attachment);
    let n: u64 = self.eval(Step::ImageIndicator, script).await?;
    Ok(usize::try_from(n).unwrap_or(usize::MAX))
  }

  async fn has_text_surface(&mut self, position: usize) -> Result<bool, ProtocolError> {
    Ok(self.text_surface(position).await.is_some())
  }

  async fn has_thread_marker(&mut self, position: usize) -> Result<bool, ProtocolError> {
    let script = self.count_in_cell(position, &self.selectors.thread_marker);
    let n: u64 = self.eval(Step::Verify, script).await?;
    Ok(n > 0)
  }

  async fn publish_all(&mut self) -> Result<bool, ProtocolError> {
    let Some(button) = self.find_first(&self.selectors.publish_all).await else {
      return Ok(false);
    };
    button.click().await.map_err(|e| ProtocolError::browser(Step::PublishAll, e))?;
    Ok(true)
  }

  async fn is_confirmed(&mut self) -> Result<bool, ProtocolError> {
    Ok(self.find_first(&self.selectors.confirmation).await.is_some())
  }

  async fn close(self) -> Result<(), ProtocolError> {
    let Self { mut browser, events, .. } = self;
    let closed = browser.close().await;
    if let Err(e) = browser.wait().await {
      warn!(error = %e, "browser process did not exit cleanly");
    }
    events.abort();
    closed.map(drop).map_err(|e| ProtocolError::browser(Step::Launch, e))
  }
}

/// Quote `s` as a JavaScript string literal.
fn js_string(s: &str) -> String {
  serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn positions_are_substituted_into_every_fallback() {
    let list = Selectors::default().text_surface;
    let at_two = Selectors::at(&list, 2);
    assert_eq!(at_two.len(), list.len());
    assert!(at_two.iter().all(|s| !s.contains("{i}")));
    assert_eq!(at_two[1], r#"[data-testid="tweetTextarea_2"]"#);
  }

  #[test]
  fn selectors_without_placeholder_are_unchanged() {
    let list = vec!["button.post".to_string()];
    assert_eq!(Selectors::at(&list, 7), list);
  }

  #[test]
  fn partial_selector_config_keeps_defaults() {
    let s: Selectors = serde_json::from_str(r##"{"add_post": ["#add"]}"##).unwrap();
    assert_eq!(s.add_post, vec!["#add".to_string()]);
    assert_eq!(s.publish_all, Selectors::default().publish_all);
  }

  #[test]
  fn js_strings_are_escaped() {
    assert_eq!(js_string(r#"a[b="c"]"#), r#""a[b=\"c\"]""#);
  }
}
