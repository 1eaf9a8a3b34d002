// SPDX-License-Identifier: MIT
//! doctor.rs — pre-flight diagnostic checks for `prerender doctor`.
//!
//! Runs before a prerender pass so configuration problems surface as a
//! readable checklist instead of a confusing mid-run failure.

use std::path::Path;

use crate::config::Config;

/// Browser binaries to probe, in preference order.
const CANDIDATE_BROWSERS: &[&str] = &["chromium", "chrome", "google-chrome", "chromium-browser"];

/// The result of a single diagnostic check.
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Run all diagnostic checks and return a list of results.
pub async fn run_doctor(config: &Config) -> Vec<CheckResult> {
    vec![
        check_port_available(config.port),
        check_browser_installed(config),
        check_bundle_dir(&config.app_dir),
        check_output_writable(&config.out_dir),
        check_catalog_reachable(config).await,
    ]
}

// ─── Individual checks ────────────────────────────────────────────────────────

/// Check 1: the content server port is free.
fn check_port_available(port: u16) -> CheckResult {
    let passed = std::net::TcpListener::bind(("127.0.0.1", port)).is_ok();
    CheckResult {
        name: "Content server port available",
        passed,
        detail: if passed {
            format!("port {port} is free")
        } else {
            format!("port {port} is in use by another process")
        },
    }
}

/// Check 2: a headless-capable Chromium binary is reachable.
fn check_browser_installed(config: &Config) -> CheckResult {
    if let Some(path) = &config.browser_path {
        let passed = path.is_file();
        return CheckResult {
            name: "Headless browser installed",
            passed,
            detail: if passed {
                format!("using {}", path.display())
            } else {
                format!("configured browser not found: {}", path.display())
            },
        };
    }
    match detect_browser() {
        Some(binary) => CheckResult {
            name: "Headless browser installed",
            passed: true,
            detail: format!("{binary} found on PATH"),
        },
        None => CheckResult {
            name: "Headless browser installed",
            passed: false,
            detail: "no chromium/chrome binary found in PATH".to_string(),
        },
    }
}

/// Check 3: the built bundle exists and has an entry document.
fn check_bundle_dir(app_dir: &Path) -> CheckResult {
    if !app_dir.is_dir() {
        return CheckResult {
            name: "App bundle present",
            passed: false,
            detail: format!("bundle directory not found: {}", app_dir.display()),
        };
    }
    let index = app_dir.join("index.html");
    let passed = index.is_file();
    CheckResult {
        name: "App bundle present",
        passed,
        detail: if passed {
            format!("{} looks like a built bundle", app_dir.display())
        } else {
            format!(
                "{} exists but has no index.html — run the app build first",
                app_dir.display()
            )
        },
    }
}

/// Check 4: the output root can be created and written.
fn check_output_writable(out_dir: &Path) -> CheckResult {
    let probe = out_dir.join(".prerender-write-probe");
    let result = std::fs::create_dir_all(out_dir)
        .and_then(|_| std::fs::write(&probe, b"probe"))
        .and_then(|_| std::fs::remove_file(&probe));
    match result {
        Ok(()) => CheckResult {
            name: "Output root writable",
            passed: true,
            detail: format!("{} is writable", out_dir.display()),
        },
        Err(e) => CheckResult {
            name: "Output root writable",
            passed: false,
            detail: format!("cannot write to {}: {e}", out_dir.display()),
        },
    }
}

/// Check 5: the catalog API answers an authenticated probe query.
async fn check_catalog_reachable(config: &Config) -> CheckResult {
    let url = format!(
        "{}/rest/v1/services?select=id&limit=1",
        config.catalog_url.trim_end_matches('/')
    );
    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            return CheckResult {
                name: "Catalog API reachable",
                passed: false,
                detail: format!("cannot build HTTP client: {e}"),
            }
        }
    };

    match client
        .get(&url)
        .header("apikey", &config.catalog_key)
        .bearer_auth(&config.catalog_key)
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => CheckResult {
            name: "Catalog API reachable",
            passed: true,
            detail: format!("{} answered {}", config.catalog_url, resp.status()),
        },
        Ok(resp) => CheckResult {
            name: "Catalog API reachable",
            passed: false,
            detail: format!(
                "{} answered {} — check the API key",
                config.catalog_url,
                resp.status()
            ),
        },
        Err(e) => CheckResult {
            name: "Catalog API reachable",
            passed: false,
            detail: format!("request failed: {e}"),
        },
    }
}

/// Detect the first headless-capable browser binary on PATH.
pub fn detect_browser() -> Option<String> {
    for candidate in CANDIDATE_BROWSERS {
        if which_browser(candidate) {
            return Some((*candidate).to_string());
        }
    }
    None
}

/// Check if a browser binary is available on PATH using `which` semantics.
fn which_browser(binary: &str) -> bool {
    if let Ok(path_var) = std::env::var("PATH") {
        for dir in path_var.split(':') {
            let candidate = Path::new(dir).join(binary);
            if candidate.is_file() {
                return true;
            }
        }
    }
    false
}

// ─── Output ───────────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

pub fn print_doctor_results(results: &[CheckResult]) {
    println!();
    println!("{BOLD}prerender doctor — pre-flight checks{RESET}");
    println!("{}", "─".repeat(60));

    for r in results {
        let (symbol, color) = if r.passed { ("✓", GREEN) } else { ("✗", RED) };
        println!("  {color}{symbol}{RESET}  {:<30}  {}", r.name, r.detail);
    }

    println!("{}", "─".repeat(60));

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed == 0 {
        println!("{GREEN}All checks passed.{RESET}");
    } else {
        println!("{RED}{failed} check(s) failed. See above for details.{RESET}");
    }
    println!();
}
