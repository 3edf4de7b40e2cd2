//! The resilient fetch orchestrator.
//!
//! Drives the attempt loop: draw a fingerprint, get a live rendering
//! session, open an isolated context, navigate with a bounded wait for
//! network quiescence, validate the response, and on failure rotate the
//! egress identity before trying again. Sessions are recycled only on
//! session-fatal transport errors - relaunching the rendering process on
//! every attempt would cost far more than reusing it when only the content
//! failed validation.

use crate::identity::IdentityControl;
use crate::session::SessionManager;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use torfetch_common::{
    validate, FetchConfig, FingerprintPool, RenderContext, RenderEngine, RenderError,
    RenderErrorKind, RenderedDocument, Verdict,
};
use tracing::{error, info, warn};

/// Outcome of a single attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted,
    RejectedContent,
    RejectedHeaders,
    RejectedBoth,
    TransportError,
    Timeout,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accepted => "accepted",
            Self::RejectedContent => "rejected: content incomplete",
            Self::RejectedHeaders => "rejected: headers missing",
            Self::RejectedBoth => "rejected: content incomplete and headers missing",
            Self::TransportError => "transport error",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// One loop iteration, immutable once the outcome is recorded. Kept for the
/// run's diagnostics only - nothing persists across runs.
#[derive(Clone, Debug)]
pub struct Attempt {
    /// 1-based ordinal.
    pub index: u32,
    pub fingerprint: String,
    pub started: Instant,
    pub finished: Instant,
    pub outcome: AttemptOutcome,
}

/// The terminal artifact of an accepted attempt.
#[derive(Clone, Debug)]
pub struct CapturedResult {
    pub content: String,
    pub headers: HashMap<String, String>,
}

/// Terminal result of one orchestrator invocation. The attempt history rides
/// on both arms so callers can report per-attempt outcomes either way.
#[derive(Debug)]
pub enum RunOutcome {
    Success {
        result: CapturedResult,
        attempts: Vec<Attempt>,
    },
    Failure {
        attempts: Vec<Attempt>,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::Success { attempts, .. } | Self::Failure { attempts } => attempts,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    Idle,
    Attempting,
    Succeeded,
    Exhausted,
}

pub struct FetchOrchestrator {
    config: FetchConfig,
    fingerprints: FingerprintPool,
    sessions: SessionManager,
    identity: Box<dyn IdentityControl>,
    cancel: CancellationToken,
    state: RunState,
}

impl FetchOrchestrator {
    pub fn new(
        config: FetchConfig,
        fingerprints: FingerprintPool,
        engine: Arc<dyn RenderEngine>,
        identity: Box<dyn IdentityControl>,
        cancel: CancellationToken,
    ) -> Self {
        let sessions = SessionManager::new(engine, config.proxy.clone());
        Self {
            config,
            fingerprints,
            sessions,
            identity,
            cancel,
            state: RunState::Idle,
        }
    }

    /// Expose how many times the rendering session had to be relaunched.
    pub fn session_relaunches(&self) -> u64 {
        self.sessions.relaunch_count()
    }

    /// Run the attempt loop to completion. Consumes the orchestrator: a run
    /// is produced exactly once.
    pub async fn run(mut self) -> RunOutcome {
        debug_assert_eq!(self.state, RunState::Idle);
        self.state = RunState::Attempting;

        // Advisory pre-check; a negative result is logged and the run
        // proceeds - the per-attempt validation is what actually gates.
        if !self
            .identity
            .verify_routing(self.config.check_timeout)
            .await
        {
            warn!("Initial routing check failed or egress is not anonymized - proceeding anyway");
        }

        let mut attempts: Vec<Attempt> = Vec::new();
        let mut captured: Option<CapturedResult> = None;

        for index in 1..=self.config.max_attempts {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested - stopping before attempt {}", index);
                break;
            }

            let fingerprint = self.fingerprints.select().to_string();
            info!(
                "--- Attempt {}/{} to fetch {} (ua: {}) ---",
                index, self.config.max_attempts, self.config.target_url, fingerprint
            );

            let started = Instant::now();
            let (outcome, result) = self.run_attempt(&fingerprint).await;
            let finished = Instant::now();

            info!(
                "Attempt {}/{}: {} ({:?})",
                index,
                self.config.max_attempts,
                outcome,
                finished.duration_since(started)
            );
            attempts.push(Attempt {
                index,
                fingerprint,
                started,
                finished,
                outcome,
            });

            if let Some(result) = result {
                captured = Some(result);
                break;
            }

            // Rotate only between failed attempts - never after the final
            // one, and never mid-attempt, so each attempt's identity/content
            // pair stays consistent for diagnosis.
            if index < self.config.max_attempts && !self.cancel.is_cancelled() {
                self.rotate_identity().await;
            }
        }

        self.sessions.close();

        match captured {
            Some(result) => {
                self.state = RunState::Succeeded;
                info!(
                    "Run finished in state {:?}: fetched and validated {} after {} attempt(s)",
                    self.state,
                    self.config.target_url,
                    attempts.len()
                );
                RunOutcome::Success { result, attempts }
            }
            None => {
                self.state = RunState::Exhausted;
                error!(
                    "Run finished in state {:?}: failed to fetch complete data for {} after {} attempt(s): {}",
                    self.state,
                    self.config.target_url,
                    attempts.len(),
                    summarize_failure(&attempts)
                );
                RunOutcome::Failure { attempts }
            }
        }
    }

    /// One attempt: session, context, navigation, validation. The context is
    /// closed exactly once on every exit path.
    async fn run_attempt(&mut self, fingerprint: &str) -> (AttemptOutcome, Option<CapturedResult>) {
        let session = match self.sessions.ensure_live().await {
            Ok(session) => session,
            Err(e) => {
                error!("Could not get a live rendering session: {}", e);
                self.sessions.discard();
                return (AttemptOutcome::TransportError, None);
            }
        };

        let context = {
            let session = Arc::clone(&session);
            let fingerprint = fingerprint.to_string();
            let viewport = self.config.viewport;
            let opened =
                tokio::task::spawn_blocking(move || session.open_context(&fingerprint, viewport))
                    .await
                    .map_err(|e| {
                        RenderError::new(
                            RenderErrorKind::Transport,
                            format!("open-context task failed: {}", e),
                        )
                    })
                    .and_then(|r| r);
            match opened {
                Ok(context) => context,
                Err(e) => {
                    error!("Could not open a browsing context: {}", e);
                    if e.is_session_fatal() {
                        self.sessions.discard();
                    }
                    return (AttemptOutcome::TransportError, None);
                }
            }
        };

        let navigated = self.navigate(Arc::clone(&context)).await;

        // Mandatory scoped release - the one close per attempt. When the
        // navigation is stuck in a blocking CDP call, this is also what
        // aborts it.
        self.close_context(context).await;

        match navigated {
            Ok(doc) => self.judge(doc),
            Err(e) => {
                if e.is_session_fatal() {
                    warn!(
                        "Session-fatal transport error - discarding the rendering session: {}",
                        e
                    );
                    self.sessions.discard();
                } else {
                    error!("Navigation failed (session kept): {}", e);
                }
                let outcome = if e.kind() == RenderErrorKind::Timeout {
                    AttemptOutcome::Timeout
                } else {
                    AttemptOutcome::TransportError
                };
                (outcome, None)
            }
        }
    }

    /// Validate a returned document and map the verdict to an outcome.
    fn judge(&self, doc: RenderedDocument) -> (AttemptOutcome, Option<CapturedResult>) {
        match validate(doc.status_ok, Some(&doc.content), Some(&doc.headers)) {
            Verdict::Accepted => {
                info!(
                    "Validated page content from {} (status: {})",
                    doc.final_url, doc.status
                );
                (
                    AttemptOutcome::Accepted,
                    Some(CapturedResult {
                        content: doc.content,
                        headers: doc.headers,
                    }),
                )
            }
            Verdict::RejectedTransport => {
                warn!(
                    "Navigation returned a failing status for {} (status: {})",
                    doc.final_url, doc.status
                );
                (AttemptOutcome::TransportError, None)
            }
            Verdict::RejectedContent => {
                warn!(
                    "Headers captured for {} but content validation failed",
                    doc.final_url
                );
                (AttemptOutcome::RejectedContent, None)
            }
            Verdict::RejectedHeaders => {
                warn!(
                    "Content OK from {} but headers were not captured",
                    doc.final_url
                );
                (AttemptOutcome::RejectedHeaders, None)
            }
            Verdict::RejectedBoth => {
                warn!(
                    "Content validation failed AND headers missing for {}",
                    doc.final_url
                );
                (AttemptOutcome::RejectedBoth, None)
            }
        }
    }

    /// Navigate in a blocking task, raced against cancellation and a hard
    /// timeout that catches stuck CDP calls beyond the navigation's own
    /// bound.
    async fn navigate(&self, context: Arc<dyn RenderContext>) -> Result<RenderedDocument, RenderError> {
        let url = self.config.target_url.clone();
        let timeout = self.config.navigation_timeout;
        let hard_timeout = timeout + self.config.hard_timeout_margin;

        let handle = tokio::task::spawn_blocking(move || context.navigate(&url, timeout));

        tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(RenderError::new(
                    RenderErrorKind::Transport,
                    "navigation cancelled by shutdown",
                ))
            }
            _ = tokio::time::sleep(hard_timeout) => {
                warn!(
                    "Navigation stuck - hard timeout after {:?} (internal bound was {:?})",
                    hard_timeout, timeout
                );
                Err(RenderError::new(
                    RenderErrorKind::Timeout,
                    format!("navigation stuck - hard timeout after {:?}", hard_timeout),
                ))
            }
            joined = handle => match joined {
                Ok(result) => result,
                Err(e) => Err(RenderError::new(
                    RenderErrorKind::Transport,
                    format!("navigation task failed: {}", e),
                )),
            }
        }
    }

    async fn close_context(&self, context: Arc<dyn RenderContext>) {
        if tokio::task::spawn_blocking(move || context.close())
            .await
            .is_err()
        {
            warn!("Context close task failed");
        }
    }

    /// Request a fresh egress identity, then wait out circuit establishment.
    /// A failed rotation never aborts the run.
    async fn rotate_identity(&self) {
        info!("Requesting a fresh egress identity before the next attempt");
        if !self.identity.renew_identity().await {
            warn!("Identity rotation failed - continuing with the current identity");
            return;
        }
        if self.config.settle.is_zero() {
            return;
        }
        info!(
            "Waiting {:?} for the new circuit to establish",
            self.config.settle
        );
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.settle) => {}
        }
    }
}

fn summarize_failure(attempts: &[Attempt]) -> String {
    let mut content = 0usize;
    let mut headers = 0usize;
    let mut transport = 0usize;
    let mut timeouts = 0usize;
    for attempt in attempts {
        match attempt.outcome {
            AttemptOutcome::RejectedContent | AttemptOutcome::RejectedBoth => content += 1,
            AttemptOutcome::RejectedHeaders => headers += 1,
            AttemptOutcome::TransportError => transport += 1,
            AttemptOutcome::Timeout => timeouts += 1,
            AttemptOutcome::Accepted => {}
        }
    }
    format!(
        "{} content-invalid, {} headers-missing, {} transport errors, {} timeouts - retries exhausted",
        content, headers, transport, timeouts
    )
}
