//! Chrome-backed implementation of the rendering-engine contracts.
//!
//! One `ChromeSession` owns one Chrome process bound to the SOCKS proxy at
//! launch time. Each attempt gets a fresh isolated CDP browser context
//! (incognito-like cookie/cache namespace) with its own tab, user agent and
//! viewport. The main document's status and headers are captured from the
//! CDP response stream while the page loads.

use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use torfetch_common::{
    ProxyEndpoint, RenderContext, RenderEngine, RenderError, RenderErrorKind, RenderSession,
    RenderedDocument, Viewport,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ChromeEngine {
    headless: bool,
    browser_path: Option<PathBuf>,
}

impl ChromeEngine {
    pub fn new(headless: bool, browser_path: Option<PathBuf>) -> Self {
        Self {
            headless,
            browser_path,
        }
    }
}

impl RenderEngine for ChromeEngine {
    fn launch(&self, proxy: &ProxyEndpoint) -> Result<Arc<dyn RenderSession>, RenderError> {
        let server = proxy.server_string();
        info!("Launching browser process with proxy {}", server);

        let mut builder = LaunchOptions::default_builder();
        builder
            .headless(self.headless)
            .proxy_server(Some(server.as_str()))
            // The default 30s idle timeout kills the CDP websocket between
            // attempts; an hour outlives any plausible retry budget.
            .idle_browser_timeout(Duration::from_secs(3600));
        if let Some(path) = &self.browser_path {
            debug!("Using custom browser binary: {}", path.display());
            builder.path(Some(path.clone()));
        }
        let options = builder
            .build()
            .map_err(|e| RenderError::launch(format!("failed to build launch options: {}", e)))?;

        let browser = Browser::new(options).map_err(|e| {
            RenderError::launch(format!(
                "browser failed to launch with proxy {}: {}",
                server, e
            ))
        })?;

        let session = ChromeSession {
            id: Uuid::new_v4(),
            browser,
            dead: AtomicBool::new(false),
        };
        info!(session = %session.id, "Browser process launched");
        Ok(Arc::new(session))
    }
}

pub struct ChromeSession {
    id: Uuid,
    browser: Browser,
    dead: AtomicBool,
}

impl RenderSession for ChromeSession {
    fn instance_id(&self) -> Uuid {
        self.id
    }

    fn is_live(&self) -> bool {
        !self.dead.load(Ordering::SeqCst)
    }

    fn open_context(
        &self,
        fingerprint: &str,
        viewport: Viewport,
    ) -> Result<Arc<dyn RenderContext>, RenderError> {
        if !self.is_live() {
            return Err(RenderError::new(
                RenderErrorKind::SessionClosed,
                "cannot open a context on a dead session",
            ));
        }

        // Isolated CDP context: separate cookies/storage per attempt. Chrome
        // cleans the context up once its only tab is closed.
        let cdp_context = self.browser.new_context().map_err(classify)?;
        let context_id = cdp_context.get_id().to_string();
        let tab = cdp_context.new_tab().map_err(classify)?;

        tab.set_user_agent(fingerprint, None, None)
            .map_err(classify)?;
        tab.set_bounds(Bounds::Normal {
            left: None,
            top: None,
            width: Some(viewport.width as f64),
            height: Some(viewport.height as f64),
        })
        .map_err(classify)?;

        let captured: Arc<Mutex<Option<PrimaryResponse>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&captured);
        tab.register_response_handling(
            "primary-document",
            Box::new(move |params, _fetch_body| {
                let mut slot = match slot.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if slot.is_some() {
                    return;
                }
                let status = params.response.status;
                // Redirect hops are not the terminal document response.
                if (300..400).contains(&status) {
                    return;
                }
                *slot = Some(PrimaryResponse {
                    status,
                    headers: header_map(&params.response.headers),
                });
            }),
        )
        .map_err(classify)?;

        debug!(
            session = %self.id,
            context = %context_id,
            "Opened isolated context ({}x{}, ua: {})",
            viewport.width,
            viewport.height,
            fingerprint
        );

        Ok(Arc::new(ChromeContext {
            context_id,
            tab,
            captured,
            closed: AtomicBool::new(false),
        }))
    }

    fn close(&self) {
        if self.dead.swap(true, Ordering::SeqCst) {
            return;
        }
        // The Chrome child process is reaped when the last handle to this
        // session drops; from here on the session only reports dead.
        debug!(session = %self.id, "Rendering session closed");
    }
}

/// Status and headers of the main document response, captured from the CDP
/// response stream during navigation.
#[derive(Clone, Debug)]
struct PrimaryResponse {
    status: u32,
    headers: HashMap<String, String>,
}

pub struct ChromeContext {
    context_id: String,
    tab: Arc<Tab>,
    captured: Arc<Mutex<Option<PrimaryResponse>>>,
    closed: AtomicBool,
}

impl ChromeContext {
    fn lock_captured(&self) -> MutexGuard<'_, Option<PrimaryResponse>> {
        match self.captured.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Fallback when no CDP response was captured: ask the page itself.
    /// Returns 0 when the status cannot be determined (chrome error pages).
    fn status_from_performance(&self) -> u32 {
        self.tab
            .evaluate(
                "performance.getEntriesByType('navigation')[0]?.responseStatus || 0",
                false,
            )
            .ok()
            .and_then(|result| result.value.and_then(|v| v.as_u64()))
            .unwrap_or(0) as u32
    }
}

impl RenderContext for ChromeContext {
    fn navigate(&self, url: &str, timeout: Duration) -> Result<RenderedDocument, RenderError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RenderError::new(
                RenderErrorKind::SessionClosed,
                "context already closed",
            ));
        }

        self.tab.set_default_timeout(timeout);
        self.tab.navigate_to(url).map_err(classify)?;
        // Network-idle quiescence: returns once no network activity has been
        // observed for a short window, bounded by the default timeout above.
        self.tab.wait_until_navigated().map_err(classify)?;

        let content = self.tab.get_content().map_err(classify)?;
        let final_url = self.tab.get_url();

        let primary = self.lock_captured().clone();
        let (status, headers) = match primary {
            Some(p) => (p.status, p.headers),
            None => (self.status_from_performance(), HashMap::new()),
        };
        let status_ok = (200..300).contains(&status);

        Ok(RenderedDocument {
            status,
            status_ok,
            final_url,
            content,
            headers,
        })
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Closing the tab tears down the isolated CDP context with it. Also
        // used to abort a stuck CDP call from another thread, so failures
        // here are expected and only logged.
        if let Err(e) = self.tab.close(false) {
            warn!(context = %self.context_id, "Context close reported: {}", e);
        } else {
            debug!(context = %self.context_id, "Context closed");
        }
    }
}

/// Flatten the CDP header object into a case-preserving string map.
fn header_map<T: serde::Serialize>(headers: &T) -> HashMap<String, String> {
    let value = serde_json::to_value(headers).unwrap_or(serde_json::Value::Null);
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect(),
        _ => HashMap::new(),
    }
}

/// Map a CDP/browser error onto the structured taxonomy. The signature
/// matching is confined to this adapter; everything above it only sees
/// `RenderErrorKind`.
fn classify<E: std::fmt::Display>(err: E) -> RenderError {
    let message = err.to_string();
    RenderError::new(kind_for(&message), message)
}

fn kind_for(message: &str) -> RenderErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("err_proxy_connection_failed")
        || lower.contains("err_socks_connection_failed")
        || lower.contains("err_tunnel_connection_failed")
    {
        RenderErrorKind::ProxyConnection
    } else if lower.contains("connection is closed")
        || lower.contains("no such process")
        || lower.contains("browser closed")
        || lower.contains("target page, context or browser has been closed")
        || lower.contains("no session with given id")
    {
        RenderErrorKind::SessionClosed
    } else if lower.contains("timed out") || lower.contains("timeout") {
        RenderErrorKind::Timeout
    } else {
        RenderErrorKind::Transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_signatures_are_session_fatal() {
        for msg in [
            "net::ERR_PROXY_CONNECTION_FAILED at https://example.com",
            "net::ERR_SOCKS_CONNECTION_FAILED",
        ] {
            assert_eq!(kind_for(msg), RenderErrorKind::ProxyConnection);
            assert!(classify(msg).is_session_fatal());
        }
    }

    #[test]
    fn test_dead_browser_signatures_are_session_fatal() {
        for msg in [
            "the connection is closed",
            "No such process",
            "Browser closed before response",
            "Target page, context or browser has been closed",
            "No session with given id",
        ] {
            assert!(classify(msg).is_session_fatal(), "not fatal: {}", msg);
        }
    }

    #[test]
    fn test_timeouts_keep_the_session() {
        let err = classify("navigation timed out after 60s");
        assert_eq!(err.kind(), RenderErrorKind::Timeout);
        assert!(!err.is_session_fatal());
    }

    #[test]
    fn test_unknown_errors_keep_the_session() {
        let err = classify("some renderer hiccup");
        assert_eq!(err.kind(), RenderErrorKind::Transport);
        assert!(!err.is_session_fatal());
    }

    #[test]
    fn test_header_map_flattens_json_object() {
        let raw = serde_json::json!({
            "Content-Type": "text/html",
            "X-Count": 3,
        });
        let map = header_map(&raw);
        assert_eq!(map.get("Content-Type").unwrap(), "text/html");
        assert_eq!(map.get("X-Count").unwrap(), "3");
    }

    #[test]
    fn test_header_map_tolerates_non_objects() {
        assert!(header_map(&serde_json::Value::Null).is_empty());
        assert!(header_map(&serde_json::json!([1, 2])).is_empty());
    }
}
