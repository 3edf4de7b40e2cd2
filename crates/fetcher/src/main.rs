// torfetch binary: fetch one page through the Tor SOCKS proxy, retrying
// with a fresh identity and randomized fingerprint until the response
// validates or the attempt budget runs out.
//
// Configured via environment variables; the target URL may also be passed
// as the first argument.

use anyhow::{bail, Context, Result};
use torfetch_common::{FetchConfig, ProxyEndpoint, Viewport};
use torfetch_fetcher::{run_fetch, RunOutcome};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config_from_env()?;
    info!("--- Starting torfetch ---");
    info!("Target URL: {}", config.target_url);
    info!("Max attempts: {}", config.max_attempts);
    info!("SOCKS proxy: {}", config.proxy);
    info!("Control port: {}", config.control_addr);

    match run_fetch(config).await? {
        RunOutcome::Success { .. } => {
            info!("--- Process Completed Successfully ---");
            Ok(())
        }
        RunOutcome::Failure { attempts } => {
            bail!(
                "failed to fetch complete data after {} attempt(s)",
                attempts.len()
            )
        }
    }
}

fn load_config_from_env() -> Result<FetchConfig> {
    use std::env;
    use std::path::PathBuf;
    use std::time::Duration;

    let defaults = FetchConfig::default();

    let target_url = env::args()
        .nth(1)
        .or_else(|| env::var("FETCH_TARGET_URL").ok())
        .context("pass the target URL as the first argument or set FETCH_TARGET_URL")?;

    let max_attempts = env::var("FETCH_MAX_ATTEMPTS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(defaults.max_attempts);

    let navigation_timeout = env::var("FETCH_NAV_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(defaults.navigation_timeout);

    let proxy: ProxyEndpoint = match env::var("FETCH_SOCKS_PROXY") {
        Ok(raw) => raw.parse()?,
        Err(_) => defaults.proxy.clone(),
    };

    let control_addr =
        env::var("FETCH_CONTROL_ADDR").unwrap_or_else(|_| defaults.control_addr.clone());
    let control_password = env::var("FETCH_CONTROL_PASSWORD").ok().filter(|p| !p.is_empty());

    let check_url = env::var("FETCH_CHECK_URL").unwrap_or_else(|_| defaults.check_url.clone());

    let settle = env::var("FETCH_SETTLE_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(defaults.settle);

    let viewport: Viewport = match env::var("FETCH_VIEWPORT") {
        Ok(raw) => raw.parse()?,
        Err(_) => defaults.viewport,
    };

    let headless = env::var("FETCH_HEADLESS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(true);

    let browser_path: Option<PathBuf> = env::var("FETCH_BROWSER_PATH").ok().map(PathBuf::from);

    let output_dir = env::var("FETCH_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| defaults.output_dir.clone());

    Ok(FetchConfig {
        target_url,
        max_attempts,
        navigation_timeout,
        proxy,
        control_addr,
        control_password,
        check_url,
        settle,
        viewport,
        headless,
        browser_path,
        output_dir,
        ..defaults
    })
}
