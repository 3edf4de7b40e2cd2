use crate::proxy::ProxyEndpoint;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Fixed viewport attached to every browsing context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl FromStr for Viewport {
    type Err = anyhow::Error;

    /// Parses "WIDTHxHEIGHT", e.g. "1280x720".
    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| anyhow!("viewport must be WIDTHxHEIGHT, got: {}", s))?;
        Ok(Self {
            width: w.trim().parse()?,
            height: h.trim().parse()?,
        })
    }
}

/// Full configuration of one fetch run.
///
/// Built programmatically or from environment variables in the binary; this
/// struct is the single input the orchestrator needs.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// The one document to fetch.
    pub target_url: String,
    /// Retry budget; the run never performs more attempts than this.
    pub max_attempts: u32,
    /// Per-navigation bound. Navigation waits for network quiescence but
    /// never longer than this.
    pub navigation_timeout: Duration,
    /// Safety margin added on top of `navigation_timeout` for the outer hard
    /// timeout that catches stuck CDP calls.
    pub hard_timeout_margin: Duration,
    /// SOCKS endpoint the rendering process is bound to.
    pub proxy: ProxyEndpoint,
    /// Anonymity-network control channel, "host:port".
    pub control_addr: String,
    /// Optional control-channel password (HashedControlPassword setups).
    pub control_password: Option<String>,
    /// Identity-check endpoint used for the advisory routing pre-check.
    pub check_url: String,
    /// Bound on the advisory routing check.
    pub check_timeout: Duration,
    /// Settling wait after a successful identity renewal; circuit
    /// establishment is asynchronous to the NEWNYM signal.
    pub settle: Duration,
    /// Viewport for every browsing context.
    pub viewport: Viewport,
    /// Client identities, one drawn at random per attempt.
    pub fingerprints: Vec<String>,
    /// Headless rendering (true) or headful (false).
    pub headless: bool,
    /// Custom browser binary; None uses auto-detection.
    pub browser_path: Option<PathBuf>,
    /// Directory the fetched document is written into on success.
    pub output_dir: PathBuf,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            max_attempts: 30,
            navigation_timeout: Duration::from_secs(60),
            hard_timeout_margin: Duration::from_secs(10),
            proxy: ProxyEndpoint::default(),
            control_addr: "127.0.0.1:9051".to_string(),
            control_password: None,
            check_url: "https://check.torproject.org/api/ip".to_string(),
            check_timeout: Duration::from_secs(20),
            settle: Duration::from_secs(10),
            viewport: Viewport::default(),
            fingerprints: Vec::new(),
            headless: true,
            browser_path: None,
            output_dir: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_parse() {
        let viewport: Viewport = "1920x1080".parse().unwrap();
        assert_eq!(
            viewport,
            Viewport {
                width: 1920,
                height: 1080
            }
        );
        assert!("1920".parse::<Viewport>().is_err());
        assert!("wxh".parse::<Viewport>().is_err());
    }

    #[test]
    fn test_defaults_match_design_values() {
        let config = FetchConfig::default();
        assert_eq!(config.max_attempts, 30);
        assert_eq!(config.navigation_timeout, Duration::from_secs(60));
        assert_eq!(config.settle, Duration::from_secs(10));
        assert_eq!(config.viewport, Viewport::default());
    }
}
