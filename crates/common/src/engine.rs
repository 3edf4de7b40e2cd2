//! Capability contracts for the headless rendering engine.
//!
//! The orchestrator only ever talks to these traits. The production
//! implementation drives a real browser over CDP; tests inject scripted
//! fakes, which is what makes the retry state machine testable without a
//! network or a browser process.

use crate::config::Viewport;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// What a finished navigation hands back for validation: the rendered
/// document plus the response metadata of the main document request.
#[derive(Clone, Debug, Default)]
pub struct RenderedDocument {
    /// HTTP status of the main document response; 0 when it could not be
    /// determined (e.g. a browser-level error page).
    pub status: u32,
    /// True only for a 2xx main document response.
    pub status_ok: bool,
    /// URL after redirects.
    pub final_url: String,
    /// Fully rendered document markup.
    pub content: String,
    /// Response headers of the main document, case-preserving keys.
    pub headers: HashMap<String, String>,
}

/// Coarse classification of rendering-engine failures.
///
/// The two-tier retry policy hangs off this: `ProxyConnection` and
/// `SessionClosed` poison the whole session (it must be relaunched), while
/// `Timeout` and `Transport` only fail the attempt and the session is kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderErrorKind {
    /// The rendering process could not be started.
    Launch,
    /// Navigation exceeded its bound.
    Timeout,
    /// The proxy connection failed at the browser level.
    ProxyConnection,
    /// The process, context or CDP connection is gone.
    SessionClosed,
    /// Any other navigation-level failure.
    Transport,
}

#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct RenderError {
    kind: RenderErrorKind,
    message: String,
}

impl RenderError {
    pub fn new(kind: RenderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn launch(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::Launch, message)
    }

    pub fn kind(&self) -> RenderErrorKind {
        self.kind
    }

    /// True when the owning session must be discarded and relaunched rather
    /// than reused by the next attempt.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self.kind,
            RenderErrorKind::ProxyConnection | RenderErrorKind::SessionClosed
        )
    }
}

/// Launches rendering sessions bound to a proxy endpoint.
pub trait RenderEngine: Send + Sync {
    fn launch(
        &self,
        proxy: &crate::proxy::ProxyEndpoint,
    ) -> Result<Arc<dyn RenderSession>, RenderError>;
}

/// A running rendering process. Either live or dead; a dead session is never
/// resurrected, only replaced through the engine.
pub trait RenderSession: Send + Sync {
    /// Stable id of this process instance, for logs and relaunch tracking.
    fn instance_id(&self) -> Uuid;

    fn is_live(&self) -> bool;

    /// Open a fresh isolated browsing context (own cookie/cache namespace)
    /// carrying one fingerprint and one viewport. Fails when the session is
    /// not live.
    fn open_context(
        &self,
        fingerprint: &str,
        viewport: Viewport,
    ) -> Result<Arc<dyn RenderContext>, RenderError>;

    /// Terminate the session. Safe to call on an already-dead session.
    fn close(&self);
}

/// An isolated browsing context, one per in-flight attempt.
pub trait RenderContext: Send + Sync {
    /// Navigate and wait for network quiescence, bounded by `timeout`.
    fn navigate(&self, url: &str, timeout: Duration) -> Result<RenderedDocument, RenderError>;

    /// Close the context. Must be safe to call repeatedly and after the
    /// owning session died mid-use.
    fn close(&self);
}
