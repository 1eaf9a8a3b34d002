// SPDX-License-Identifier: MIT
//! Render driver — drives one headless Chromium page over the DevTools
//! protocol and extracts the fully rendered document for each route.
//!
//! All routes share a single browser instance and a single page, so rendering
//! is strictly sequential: one route fully completes (or times out) before
//! the next navigation begins. Concurrent renders on the shared page would
//! corrupt both routes' DOM state.
//!
//! Per-route algorithm:
//!   1. Navigate and let the network settle. Navigation failure is fatal to
//!      the whole run — it means the serving infrastructure is broken.
//!   2. Wait (bounded) for the root content container to appear.
//!   3. Poll (bounded) the readiness probe.
//!   4. Extract the serialized document, `<head>` included.
//!
//! Steps 2 and 3 degrade on timeout: the route is captured with whatever
//! markup is present and the batch continues.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Tuning knobs for the per-route waits. Defaults match the production run;
/// tests shrink them to keep the suite fast.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Selector of the root content container the client app mounts into.
    pub container_selector: String,
    /// Budget for the container wait, and again for the readiness poll.
    pub wait_budget: Duration,
    /// Interval between readiness probe evaluations.
    pub poll_interval: Duration,
    /// Settle window after the load event before the first probe.
    pub settle_delay: Duration,
    /// Loading-state phrases that mark a page as not yet ready. Fallback for
    /// bundles that predate the `data-prerender-ready` marker.
    pub sentinel_phrases: Vec<String>,
    /// Explicit Chromium binary. None lets the driver probe well-known paths.
    pub browser_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            container_selector: "#app".to_string(),
            wait_budget: Duration::from_secs(50),
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(500),
            sentinel_phrases: vec![
                "Loading your schedule".to_string(),
                "Just a moment".to_string(),
            ],
            browser_path: None,
        }
    }
}

/// The two fatal kinds are deliberately distinct from the timeout kind:
/// infrastructure failures abort the run, content-timing failures degrade it.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch headless browser: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("route {route} not ready within {budget_secs}s")]
    ReadyTimeout { route: String, budget_secs: u64 },
}

/// One route's render result. `degraded` is set when a wait timed out and the
/// captured markup may still be a loading-state page.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub html: String,
    pub degraded: bool,
}

/// Renders one route at a time against the content server. The orchestrator
/// depends on this seam so fault-injection tests can run without a browser.
#[async_trait]
pub trait RouteRenderer: Send {
    async fn render(&mut self, route: &str, base_url: &str) -> Result<Rendered, RenderError>;

    /// Release the browser process. Must be safe on every exit path.
    async fn shutdown(&mut self);
}

/// Launches the renderer once the content server is up.
#[async_trait]
pub trait RendererLauncher: Send + Sync {
    type Renderer: RouteRenderer;

    async fn launch(&self) -> Result<Self::Renderer, RenderError>;
}

// ─── Chromium implementation ──────────────────────────────────────────────────

pub struct ChromiumLauncher {
    config: RenderConfig,
}

impl ChromiumLauncher {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RendererLauncher for ChromiumLauncher {
    type Renderer = ChromiumRenderer;

    async fn launch(&self) -> Result<ChromiumRenderer, RenderError> {
        ChromiumRenderer::launch(self.config.clone()).await
    }
}

/// Owns the browser process, its CDP event loop, and the single shared page.
pub struct ChromiumRenderer {
    browser: Browser,
    page: Page,
    event_loop: JoinHandle<()>,
    config: RenderConfig,
}

impl ChromiumRenderer {
    /// Launch headless Chromium and open the shared page.
    ///
    /// Sandboxing is disabled (`--no-sandbox`, `--disable-dev-shm-usage`) so
    /// the driver runs on CI hosts and containers without extra privileges.
    pub async fn launch(config: RenderConfig) -> Result<Self, RenderError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .args(vec!["--disable-gpu", "--disable-dev-shm-usage"]);
        if let Some(path) = &config.browser_path {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        // Drain CDP events for the browser's lifetime; the stream ends when
        // the browser process exits.
        let event_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        info!("headless browser launched");
        Ok(Self {
            browser,
            page,
            event_loop,
            config,
        })
    }

    async fn wait_for_container(&self, route: &str) -> Result<(), RenderError> {
        let deadline = Instant::now() + self.config.wait_budget;
        loop {
            if self
                .page
                .find_element(self.config.container_selector.as_str())
                .await
                .is_ok()
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RenderError::ReadyTimeout {
                    route: route.to_string(),
                    budget_secs: self.config.wait_budget.as_secs(),
                });
            }
            sleep(self.config.poll_interval).await;
        }
    }

    async fn wait_for_ready(&self, route: &str) -> Result<(), RenderError> {
        let probe = self.ready_probe();
        let deadline = Instant::now() + self.config.wait_budget;
        loop {
            match self.page.evaluate(probe.clone()).await {
                Ok(result) => {
                    if result.into_value::<bool>().unwrap_or(false) {
                        return Ok(());
                    }
                }
                // Transient — mid-navigation evaluations can fail; retry.
                Err(e) => debug!(route, err = %e, "readiness probe evaluation failed"),
            }
            if Instant::now() >= deadline {
                return Err(RenderError::ReadyTimeout {
                    route: route.to_string(),
                    budget_secs: self.config.wait_budget.as_secs(),
                });
            }
            sleep(self.config.poll_interval).await;
        }
    }

    fn ready_probe(&self) -> String {
        ready_probe(&self.config.container_selector, &self.config.sentinel_phrases)
    }
}

/// JavaScript readiness probe, evaluated in one round-trip per tick.
///
/// The app sets `data-prerender-ready="true"` on the document element once
/// its initial data fetch resolves — that marker wins outright. The
/// sentinel-phrase scan is a best-effort fallback for bundles that do not
/// emit the marker yet, not a guarantee.
fn ready_probe(container_selector: &str, sentinel_phrases: &[String]) -> String {
    let selector = serde_json::to_string(container_selector)
        .unwrap_or_else(|_| "\"#app\"".to_string());
    let sentinels =
        serde_json::to_string(sentinel_phrases).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
            if (document.documentElement.dataset.prerenderReady === "true") return true;
            const container = document.querySelector({selector});
            if (!container) return false;
            const markup = container.innerHTML;
            if (markup.trim().length === 0) return false;
            return !{sentinels}.some((phrase) => markup.includes(phrase));
        }})()"#
    )
}

#[async_trait]
impl RouteRenderer for ChromiumRenderer {
    async fn render(&mut self, route: &str, base_url: &str) -> Result<Rendered, RenderError> {
        let url = format!("{base_url}{route}");

        self.page
            .goto(url.as_str())
            .await
            .map_err(|e| RenderError::Navigation {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| RenderError::Navigation {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        sleep(self.config.settle_delay).await;

        let mut degraded = false;
        if let Err(e) = self.wait_for_container(route).await {
            warn!(route, err = %e, "content container never appeared — capturing current markup");
            degraded = true;
        }
        if let Err(e) = self.wait_for_ready(route).await {
            warn!(route, err = %e, "readiness probe never passed — capturing partial markup");
            degraded = true;
        }

        let html = self
            .page
            .content()
            .await
            .map_err(|e| RenderError::Navigation {
                url,
                reason: e.to_string(),
            })?;

        debug!(route, bytes = html.len(), degraded, "route rendered");
        Ok(Rendered { html, degraded })
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.browser.close().await {
            debug!(err = %e, "browser close reported an error");
        }
        let _ = self.browser.wait().await;
        self.event_loop.abort();
        info!("headless browser released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_probe_checks_marker_before_sentinels() {
        let probe = ready_probe("#app", &["Just a moment".to_string()]);
        assert!(probe.contains("dataset.prerenderReady"));
        assert!(probe.contains(r##"document.querySelector("#app")"##));
        assert!(probe.contains("Just a moment"));
    }

    #[test]
    fn ready_probe_escapes_quotes_in_sentinel_phrases() {
        let probe = ready_probe("#app", &[r#"Loading "everything""#.to_string()]);
        assert!(probe.contains(r#"Loading \"everything\""#));
    }

    #[test]
    fn render_error_kinds_stay_distinct() {
        let nav = RenderError::Navigation {
            url: "http://127.0.0.1:4173/".into(),
            reason: "connection refused".into(),
        };
        let timeout = RenderError::ReadyTimeout {
            route: "/pricing".into(),
            budget_secs: 50,
        };
        assert!(matches!(nav, RenderError::Navigation { .. }));
        assert!(matches!(timeout, RenderError::ReadyTimeout { .. }));
    }
}
