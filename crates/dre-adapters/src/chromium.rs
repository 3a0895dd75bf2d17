//! Headless Chromium renderer using chromiumoxide.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::render::{poll_until, PageRenderer, RenderError, RenderPlan, SettleStrategy};

/// Find the browser binary: explicit path, `DRE_CHROMIUM_PATH`, then `PATH`.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    if let Ok(p) = std::env::var("DRE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    ["google-chrome", "chromium", "chromium-browser"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}

/// Launches one headless browser per rendered page and closes it afterwards,
/// whether or not the render succeeded.
#[derive(Debug, Clone, Default)]
pub struct ChromiumRenderer {
    executable: Option<PathBuf>,
}

impl ChromiumRenderer {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }

    async fn launch(&self) -> Result<Browser, RenderError> {
        let chrome_path = find_chromium(self.executable.as_deref())
            .ok_or_else(|| RenderError::Launch("Chromium not found; set DRE_CHROMIUM_PATH".into()))?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--window-size=1920,1080")
            .build()
            .map_err(|e| RenderError::Launch(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(format!("failed to launch Chromium: {e}")))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(browser)
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str, plan: &RenderPlan) -> Result<String, RenderError> {
        let mut browser = self.launch().await?;
        let result = render_page(&browser, url, plan).await;
        if let Err(err) = browser.close().await {
            warn!(url, error = %err, "closing browser failed");
        }
        result
    }
}

async fn render_page(browser: &Browser, url: &str, plan: &RenderPlan) -> Result<String, RenderError> {
    let start = Instant::now();
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| RenderError::Launch(format!("failed to create page: {e}")))?;

    let result = render_in_page(&page, url, plan).await;
    let _ = page.close().await;
    debug!(url, elapsed_ms = start.elapsed().as_millis() as u64, ok = result.is_ok(), "render finished");
    result
}

/// One readiness bound shared by navigation and the body poll.
#[derive(Debug, Clone, Copy)]
struct ReadyDeadline {
    at: Instant,
    total: Duration,
}

impl ReadyDeadline {
    fn start(total: Duration) -> Self {
        Self {
            at: Instant::now() + total,
            total,
        }
    }

    fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

async fn render_in_page(page: &Page, url: &str, plan: &RenderPlan) -> Result<String, RenderError> {
    let ready = ReadyDeadline::start(plan.ready_timeout);
    match tokio::time::timeout(ready.remaining(), page.goto(url)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            return Err(RenderError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })
        }
        Err(_) => {
            return Err(RenderError::Timeout {
                url: url.to_string(),
                what: "navigation",
                after_ms: ready.total.as_millis(),
            })
        }
    }

    let body_ready = poll_until(
        ready.remaining(),
        dre_storage::BackoffPolicy {
            max_retries: usize::MAX,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        },
        || async { evaluate::<bool>(page, "document.body !== null").await.unwrap_or(false) },
    )
    .await;
    if !body_ready {
        return Err(RenderError::Timeout {
            url: url.to_string(),
            what: "body readiness",
            after_ms: ready.total.as_millis(),
        });
    }

    match &plan.settle {
        SettleStrategy::Fixed(delay) => tokio::time::sleep(*delay).await,
        SettleStrategy::PollForMarker { budget, backoff } => {
            let found = poll_until(*budget, *backoff, || async {
                evaluate::<String>(page, "document.body ? document.body.innerText : ''")
                    .await
                    .map(|text| plan.text_has_marker(&text))
                    .unwrap_or(false)
            })
            .await;
            if !found {
                debug!(url, "no section marker appeared within the settle budget");
            }
        }
    }

    evaluate::<String>(page, "document.documentElement.outerHTML").await
}

async fn evaluate<T: serde::de::DeserializeOwned>(page: &Page, script: &str) -> Result<T, RenderError> {
    let result = page
        .evaluate(script)
        .await
        .map_err(|e| RenderError::Script(e.to_string()))?;
    result
        .into_value()
        .map_err(|e| RenderError::Script(format!("failed to convert result: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderSettings;
    use regex::Regex;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn renders_data_url_and_waits_for_marker() {
        let renderer = ChromiumRenderer::default();
        let plan = RenderPlan::new(
            RenderSettings::default(),
            vec![Regex::new("(?i)IDENTIFICAÇÃO").unwrap()],
        );
        let html = renderer
            .render(
                "data:text/html,<div><p>1 - IDENTIFICAÇÃO E CONTACTOS</p><p>NIPC: 500000000</p></div>",
                &plan,
            )
            .await
            .expect("render");
        assert!(html.contains("NIPC: 500000000"));
    }

    #[test]
    fn readiness_budget_is_shared_not_renewed() {
        let ready = ReadyDeadline::start(Duration::from_secs(60));
        assert!(ready.remaining() <= Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(20));
        assert!(ready.remaining() <= Duration::from_millis(59_980));

        let spent = ReadyDeadline::start(Duration::ZERO);
        assert_eq!(spent.remaining(), Duration::ZERO);
        assert_eq!(spent.total, Duration::ZERO);
    }

    #[test]
    fn explicit_missing_binary_is_not_selected() {
        let bogus = Path::new("/definitely/not/a/browser");
        assert_ne!(find_chromium(Some(bogus)).as_deref(), Some(bogus));
    }
}
