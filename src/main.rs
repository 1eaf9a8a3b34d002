use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use prerender::catalog::{self, HttpCatalog};
use prerender::config::Config;
use prerender::doctor;
use prerender::pipeline;
use prerender::render::ChromiumLauncher;

#[derive(Parser)]
#[command(
    name = "prerender",
    about = "Bookline prerender — render the built web bundle to static HTML",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Content server port the render driver navigates against
    #[arg(long, env = "PRERENDER_PORT")]
    port: Option<u16>,

    /// Built bundle directory to serve and render (default: dist)
    #[arg(long, env = "PRERENDER_APP_DIR")]
    app_dir: Option<PathBuf>,

    /// Output root for rendered HTML (default: the bundle directory)
    #[arg(long, env = "PRERENDER_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Path to the TOML config file
    #[arg(long, env = "PRERENDER_CONFIG", default_value = "prerender.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PRERENDER_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "PRERENDER_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Suppress progress and informational output.
    ///
    /// Errors are still printed to stderr. Use this flag when piping output
    /// to other tools.
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full prerender pass (default when no subcommand given).
    ///
    /// Builds the route catalog, serves the bundle locally, renders every
    /// route in a headless browser, and writes one index.html per route.
    /// Exits non-zero on any fatal error after releasing the server and the
    /// browser.
    ///
    /// Examples:
    ///   prerender run
    ///   prerender
    ///   prerender run --app-dir build --port 5000
    Run,
    /// Print the computed route catalog without rendering.
    ///
    /// Queries the catalog API for dynamic routes; on query failure the
    /// static list is printed alone (same degradation as a real run).
    ///
    /// Examples:
    ///   prerender routes
    ///   prerender routes --json
    Routes {
        /// Output as a JSON array (for piping)
        #[arg(long)]
        json: bool,
    },
    /// Run diagnostic checks on prerender prerequisites.
    ///
    /// Checks port availability, browser installation, bundle presence,
    /// output-root writability, and catalog API reachability.
    ///
    /// Exit code 0 if all checks pass, 1 if any check fails.
    ///
    /// Examples:
    ///   prerender doctor
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging setup ────────────────────────────────────────────────────────
    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format = std::env::var("PRERENDER_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    // Configuration validation runs before any resource is acquired: missing
    // catalog credentials abort here.
    let config = Config::load(
        args.port,
        args.app_dir,
        args.out_dir,
        args.log,
        &args.config,
    )
    .context("invalid configuration")?;

    match args.command {
        Some(Command::Routes { json }) => run_routes(&config, json).await?,
        Some(Command::Doctor) => {
            let results = doctor::run_doctor(&config).await;
            doctor::print_doctor_results(&results);
            let failed = results.iter().filter(|r| !r.passed).count();
            std::process::exit(if failed == 0 { 0 } else { 1 });
        }
        None | Some(Command::Run) => run_pipeline(&config, args.quiet).await?,
    }

    Ok(())
}

async fn run_pipeline(config: &Config, quiet: bool) -> Result<()> {
    let catalog = HttpCatalog::new(&config.catalog_url, &config.catalog_key)
        .context("failed to build catalog client")?;
    let launcher = ChromiumLauncher::new(config.render_config());

    let summary = pipeline::run(config, &catalog, &launcher)
        .await
        .context("prerender pass failed")?;

    if !quiet {
        println!(
            "Prerendered {} route(s) ({} degraded) in {:.1}s → {}",
            summary.routes_total,
            summary.routes_degraded,
            summary.elapsed.as_secs_f64(),
            config.out_dir.display()
        );
    }
    Ok(())
}

async fn run_routes(config: &Config, json: bool) -> Result<()> {
    let catalog = HttpCatalog::new(&config.catalog_url, &config.catalog_key)
        .context("failed to build catalog client")?;
    let routes = catalog::build_routes(&config.static_routes, &catalog).await;

    if json {
        println!("{}", serde_json::to_string(&routes)?);
    } else {
        for route in &routes {
            println!("{route}");
        }
    }
    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("prerender.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
