//! Layered configuration for the prerender pipeline.
//!
//! Priority: CLI / env var  >  TOML (`prerender.toml`)  >  built-in default.
//!
//! Catalog credentials are validated here, once, before any component is
//! constructed — the core modules receive the validated values and never
//! re-read ambient process state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::error;

use crate::catalog::STATIC_ROUTES;
use crate::render::RenderConfig;

const DEFAULT_PORT: u16 = 4173;
const DEFAULT_APP_DIR: &str = "dist";
const DEFAULT_CONTAINER_SELECTOR: &str = "#app";
const DEFAULT_WAIT_BUDGET_SECS: u64 = 50;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

pub const CATALOG_URL_VAR: &str = "PRERENDER_CATALOG_URL";
pub const CATALOG_KEY_VAR: &str = "PRERENDER_CATALOG_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("catalog credentials missing: set {0} (or the matching prerender.toml key)")]
    MissingCredential(&'static str),
}

/// `prerender.toml` — all fields are optional overrides.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Content server port (default: 4173).
    port: Option<u16>,
    /// Built bundle directory the content server serves (default: "dist").
    app_dir: Option<PathBuf>,
    /// Where rendered HTML is written (default: the bundle directory, so the
    /// prerendered pages land inside the served tree).
    out_dir: Option<PathBuf>,
    /// Log level filter string, e.g. "debug", "info,prerender=trace".
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    /// Static routes rendered before any dynamic routes, in order.
    static_routes: Option<Vec<String>>,
    /// Root content container selector (default: "#app").
    container_selector: Option<String>,
    /// Per-wait timeout budget in seconds (default: 50).
    wait_budget_secs: Option<u64>,
    /// Readiness poll interval in milliseconds (default: 100).
    poll_interval_ms: Option<u64>,
    /// Network settle window after the load event, in milliseconds (default: 500).
    settle_delay_ms: Option<u64>,
    /// Loading-state phrases for the readiness fallback check.
    sentinel_phrases: Option<Vec<String>>,
    /// Explicit Chromium binary path. Omit to auto-detect.
    browser_path: Option<PathBuf>,
    /// Catalog API base URL. Required here or via PRERENDER_CATALOG_URL.
    catalog_url: Option<String>,
    /// Catalog API key. Required here or via PRERENDER_CATALOG_KEY.
    catalog_key: Option<String>,
}

fn load_toml(path: &Path) -> Option<TomlConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse prerender.toml — using defaults");
            None
        }
    }
}

/// Validated pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub app_dir: PathBuf,
    pub out_dir: PathBuf,
    pub log: String,
    pub log_format: String,
    pub static_routes: Vec<String>,
    pub container_selector: String,
    pub wait_budget: Duration,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub sentinel_phrases: Vec<String>,
    pub browser_path: Option<PathBuf>,
    /// Catalog API base URL (PRERENDER_CATALOG_URL).
    pub catalog_url: String,
    /// Catalog API key (PRERENDER_CATALOG_KEY).
    pub catalog_key: String,
}

impl Config {
    /// Build config from CLI args + env + optional TOML file.
    ///
    /// Fails only on missing catalog credentials — that is a startup-fatal
    /// configuration error and is checked before any resource is acquired.
    pub fn load(
        port: Option<u16>,
        app_dir: Option<PathBuf>,
        out_dir: Option<PathBuf>,
        log: Option<String>,
        config_path: &Path,
    ) -> Result<Self, ConfigError> {
        let toml = load_toml(config_path).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let app_dir = app_dir
            .or(toml.app_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_APP_DIR));
        // Rendered HTML lands inside the served tree unless redirected.
        let out_dir = out_dir.or(toml.out_dir).unwrap_or_else(|| app_dir.clone());
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("PRERENDER_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let static_routes = toml
            .static_routes
            .unwrap_or_else(|| STATIC_ROUTES.iter().map(|r| r.to_string()).collect());

        let container_selector = toml
            .container_selector
            .unwrap_or_else(|| DEFAULT_CONTAINER_SELECTOR.to_string());
        let wait_budget =
            Duration::from_secs(toml.wait_budget_secs.unwrap_or(DEFAULT_WAIT_BUDGET_SECS));
        let poll_interval =
            Duration::from_millis(toml.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS));
        let settle_delay =
            Duration::from_millis(toml.settle_delay_ms.unwrap_or(DEFAULT_SETTLE_DELAY_MS));
        let sentinel_phrases = toml.sentinel_phrases.unwrap_or_else(|| {
            vec![
                "Loading your schedule".to_string(),
                "Just a moment".to_string(),
            ]
        });

        let browser_path = std::env::var("PRERENDER_BROWSER")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or(toml.browser_path);

        let catalog_url = std::env::var(CATALOG_URL_VAR)
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.catalog_url)
            .ok_or(ConfigError::MissingCredential(CATALOG_URL_VAR))?;

        let catalog_key = std::env::var(CATALOG_KEY_VAR)
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.catalog_key)
            .ok_or(ConfigError::MissingCredential(CATALOG_KEY_VAR))?;

        Ok(Self {
            port,
            app_dir,
            out_dir,
            log,
            log_format,
            static_routes,
            container_selector,
            wait_budget,
            poll_interval,
            settle_delay,
            sentinel_phrases,
            browser_path,
            catalog_url,
            catalog_key,
        })
    }

    /// Project the render-driver subset of the configuration.
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            container_selector: self.container_selector.clone(),
            wait_budget: self.wait_budget,
            poll_interval: self.poll_interval,
            settle_delay: self.settle_delay,
            sentinel_phrases: self.sentinel_phrases.clone(),
            browser_path: self.browser_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Config::load reads process env; serialize tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        std::env::remove_var(CATALOG_URL_VAR);
        std::env::remove_var(CATALOG_KEY_VAR);
        std::env::remove_var("PRERENDER_BROWSER");
        std::env::remove_var("PRERENDER_LOG_FORMAT");
    }

    fn write_toml(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("prerender.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_credentials_fail_before_anything_else() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_toml(&dir, "port = 5000\n");

        let err = Config::load(None, None, None, None, &path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(v) if v == CATALOG_URL_VAR));
    }

    #[test]
    fn toml_overrides_defaults_and_cli_overrides_toml() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_toml(
            &dir,
            concat!(
                "port = 5000\n",
                "wait_budget_secs = 5\n",
                "catalog_url = \"https://data.bookline.io\"\n",
                "catalog_key = \"svc-key\"\n",
            ),
        );

        let config = Config::load(Some(6000), None, None, None, &path).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.wait_budget, Duration::from_secs(5));
        assert_eq!(config.catalog_url, "https://data.bookline.io");
        // Defaults fill the rest.
        assert_eq!(config.container_selector, "#app");
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.out_dir, config.app_dir);
    }

    #[test]
    fn env_credentials_beat_toml_credentials() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var(CATALOG_URL_VAR, "https://env.bookline.io");
        std::env::set_var(CATALOG_KEY_VAR, "env-key");
        let dir = tempfile::tempdir().unwrap();
        let path = write_toml(
            &dir,
            "catalog_url = \"https://toml.bookline.io\"\ncatalog_key = \"toml-key\"\n",
        );

        let config = Config::load(None, None, None, None, &path).unwrap();
        assert_eq!(config.catalog_url, "https://env.bookline.io");
        assert_eq!(config.catalog_key, "env-key");
        clear_env();
    }

    #[test]
    fn static_routes_default_to_the_built_in_list() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_toml(&dir, "catalog_url = \"u\"\ncatalog_key = \"k\"\n");

        let config = Config::load(None, None, None, None, &path).unwrap();
        assert_eq!(config.static_routes.first().map(String::as_str), Some("/"));
        assert!(config
            .static_routes
            .contains(&"/onboarding?plan=pro".to_string()));
    }
}
