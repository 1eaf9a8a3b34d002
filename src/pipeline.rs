//! Run orchestrator — sequences the batch: build catalog → start server →
//! render each route → write output → tear everything down.
//!
//! `Init → CatalogBuilt → ServerUp → Rendering → Done`, with `Error` reachable
//! from the server-start and browser-launch transitions and from a navigation
//! failure mid-render. Teardown is unconditional: the server socket and the
//! browser process are released on every exit path before an error
//! propagates, so a failed run never leaks a bound port or an orphaned
//! browser.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{self, CatalogSource};
use crate::config::Config;
use crate::output;
use crate::render::{RenderError, RendererLauncher, RouteRenderer};
use crate::server::{ContentServer, ServerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    CatalogBuilt,
    ServerUp,
    Rendering,
    Done,
    Error,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::CatalogBuilt => "catalog_built",
            RunState::ServerUp => "server_up",
            RunState::Rendering => "rendering",
            RunState::Done => "done",
            RunState::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to write artifact for {route}: {source}")]
    Write {
        route: String,
        #[source]
        source: std::io::Error,
    },
}

/// What a completed run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub routes_total: usize,
    /// Routes captured after a wait timed out — the artifact exists but may
    /// hold loading-state markup.
    pub routes_degraded: usize,
    pub artifacts: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub elapsed: std::time::Duration,
}

/// Execute one full prerender pass.
///
/// The catalog source and renderer launcher are injected so fault-injection
/// tests can drive every transition without a network or a browser.
pub async fn run<C, L>(
    config: &Config,
    catalog: &C,
    launcher: &L,
) -> Result<RunSummary, PipelineError>
where
    C: CatalogSource + ?Sized,
    L: RendererLauncher,
{
    let started = Instant::now();
    let started_at = Utc::now();
    let mut state = RunState::Init;

    // Init → CatalogBuilt: never fails — discovery errors already degraded
    // to the static-only list inside build_routes.
    let routes = catalog::build_routes(&config.static_routes, catalog).await;
    advance(&mut state, RunState::CatalogBuilt);
    info!(routes = routes.len(), "route catalog built");

    // CatalogBuilt → ServerUp: fatal if the port is bound or the bundle
    // directory is missing. Nothing to release yet.
    let mut server = match ContentServer::start(config.port, &config.app_dir).await {
        Ok(server) => server,
        Err(e) => {
            advance(&mut state, RunState::Error);
            return Err(e.into());
        }
    };
    advance(&mut state, RunState::ServerUp);

    // ServerUp → Rendering: browser launch failure is fatal, but the bound
    // socket must be released before the error propagates.
    let mut renderer = match launcher.launch().await {
        Ok(renderer) => renderer,
        Err(e) => {
            warn!(err = %e, "browser launch failed — releasing content server");
            server.stop().await;
            advance(&mut state, RunState::Error);
            return Err(e.into());
        }
    };
    advance(&mut state, RunState::Rendering);

    let base_url = server.base_url();
    let result = render_all(&routes, &base_url, &mut renderer, config).await;

    // Rendering → Done | Error: teardown happens on both, before the result
    // is inspected.
    renderer.shutdown().await;
    server.stop().await;

    match result {
        Ok((artifacts, routes_degraded)) => {
            advance(&mut state, RunState::Done);
            let summary = RunSummary {
                routes_total: routes.len(),
                routes_degraded,
                artifacts,
                started_at,
                elapsed: started.elapsed(),
            };
            info!(
                state = %state,
                routes = summary.routes_total,
                degraded = summary.routes_degraded,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "prerender pass complete"
            );
            Ok(summary)
        }
        Err(e) => {
            advance(&mut state, RunState::Error);
            Err(e)
        }
    }
}

/// Render every route in catalog order, one at a time, writing each artifact
/// before the next navigation begins. A navigation failure aborts the batch;
/// a degraded render is written as-is and the batch continues.
async fn render_all<R: RouteRenderer>(
    routes: &[String],
    base_url: &str,
    renderer: &mut R,
    config: &Config,
) -> Result<(Vec<PathBuf>, usize), PipelineError> {
    let mut artifacts = Vec::with_capacity(routes.len());
    let mut degraded = 0usize;

    for route in routes {
        let rendered = renderer.render(route, base_url).await?;
        if rendered.degraded {
            degraded += 1;
        }
        let path = output::write_artifact(route, &rendered.html, &config.out_dir)
            .await
            .map_err(|source| PipelineError::Write {
                route: route.clone(),
                source,
            })?;
        info!(route = %route, path = %path.display(), degraded = rendered.degraded, "route persisted");
        artifacts.push(path);
    }

    Ok((artifacts, degraded))
}

fn advance(state: &mut RunState, to: RunState) {
    debug!(from = %state, to = %to, "pipeline state transition");
    *state = to;
}
