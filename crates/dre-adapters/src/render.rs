//! Page rendering abstraction: turn a detail-page URL into the final DOM text.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use dre_storage::BackoffPolicy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("browser unavailable: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("{what} for {url} timed out after {after_ms}ms")]
    Timeout {
        url: String,
        what: &'static str,
        after_ms: u128,
    },
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("no replay page recorded for {url}")]
    NoPage { url: String },
}

/// How long to wait after the body exists before the DOM is read.
#[derive(Debug, Clone)]
pub enum SettleStrategy {
    /// Unconditional delay.
    Fixed(Duration),
    /// Poll the body text for any section marker, bounded by `budget`.
    PollForMarker {
        budget: Duration,
        backoff: BackoffPolicy,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleMode {
    Fixed,
    Poll,
}

impl SettleMode {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(SettleMode::Fixed),
            "poll" => Some(SettleMode::Poll),
            _ => None,
        }
    }
}

/// Timeouts for one page render, as configured.
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub ready_timeout: Duration,
    pub settle_budget: Duration,
    pub settle_mode: SettleMode,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(30),
            settle_budget: Duration::from_secs(5),
            settle_mode: SettleMode::Poll,
        }
    }
}

/// Everything a renderer needs to decide when a page is ready.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub ready_timeout: Duration,
    pub settle: SettleStrategy,
    pub markers: Vec<Regex>,
}

impl RenderPlan {
    pub fn new(settings: RenderSettings, markers: Vec<Regex>) -> Self {
        let settle = match settings.settle_mode {
            SettleMode::Fixed => SettleStrategy::Fixed(settings.settle_budget),
            SettleMode::Poll => SettleStrategy::PollForMarker {
                budget: settings.settle_budget,
                backoff: BackoffPolicy {
                    max_retries: usize::MAX,
                    base_delay: Duration::from_millis(100),
                    max_delay: Duration::from_secs(1),
                },
            },
        };
        Self {
            ready_timeout: settings.ready_timeout,
            settle,
            markers,
        }
    }

    pub fn text_has_marker(&self, text: &str) -> bool {
        self.markers.iter().any(|m| m.is_match(text))
    }
}

/// Produces the fully rendered document for a URL. Implementations acquire any
/// browser resource per call and release it before returning.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, plan: &RenderPlan) -> Result<String, RenderError>;
}

/// Repeatedly runs `probe` with backoff until it reports `true` or `budget`
/// elapses. Returns whether the probe succeeded.
pub async fn poll_until<F, Fut>(budget: Duration, backoff: BackoffPolicy, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + budget;
    let mut attempt = 0usize;
    loop {
        if probe().await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline || attempt >= backoff.max_retries {
            return false;
        }
        let delay = backoff.delay_for_attempt(attempt).min(deadline - now);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Serves pre-recorded pages by URL, for offline replay and tests.
#[derive(Debug, Clone, Default)]
pub struct FixtureRenderer {
    pages: HashMap<String, String>,
}

impl FixtureRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    /// Loads a JSON object mapping URLs to HTML files relative to the index.
    pub fn from_index(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let index: HashMap<String, String> =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut renderer = Self::new();
        for (url, rel) in index {
            let page_path = base.join(&rel);
            let html = std::fs::read_to_string(&page_path)
                .with_context(|| format!("reading replay page {}", page_path.display()))?;
            renderer.pages.insert(url, html);
        }
        Ok(renderer)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[async_trait]
impl PageRenderer for FixtureRenderer {
    async fn render(&self, url: &str, _plan: &RenderPlan) -> Result<String, RenderError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| RenderError::NoPage {
                url: url.to_string(),
            })
    }
}
