//! Render-session lifecycle: `Unlaunched -> Live -> Dead`.
//!
//! The manager owns at most one session at a time, bound to one proxy
//! endpoint for its whole lifetime. A dead session is never reused; the only
//! way back to `Live` is a fresh launch, which is a new process and a new
//! instance id.

use std::sync::Arc;
use torfetch_common::{ProxyEndpoint, RenderEngine, RenderError, RenderErrorKind, RenderSession};
use tracing::{debug, info};

pub struct SessionManager {
    engine: Arc<dyn RenderEngine>,
    proxy: ProxyEndpoint,
    current: Option<Arc<dyn RenderSession>>,
    launches: u64,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn RenderEngine>, proxy: ProxyEndpoint) -> Self {
        Self {
            engine,
            proxy,
            current: None,
            launches: 0,
        }
    }

    /// Return the current session when it is live; otherwise discard the
    /// stale handle and launch a new process bound to the proxy endpoint.
    /// Launch failure propagates - the caller records the attempt as failed.
    pub async fn ensure_live(&mut self) -> Result<Arc<dyn RenderSession>, RenderError> {
        if let Some(session) = &self.current {
            if session.is_live() {
                return Ok(Arc::clone(session));
            }
            debug!(session = %session.instance_id(), "Current rendering session is dead - replacing it");
            self.discard();
        }

        let engine = Arc::clone(&self.engine);
        let proxy = self.proxy.clone();
        let session = tokio::task::spawn_blocking(move || engine.launch(&proxy))
            .await
            .map_err(|e| {
                RenderError::new(RenderErrorKind::Launch, format!("launch task failed: {}", e))
            })??;

        info!(session = %session.instance_id(), "Rendering session is live");
        self.launches += 1;
        self.current = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Close and drop the current session, if any. Dead is terminal: the
    /// next `ensure_live` produces a brand-new process.
    pub fn discard(&mut self) {
        if let Some(session) = self.current.take() {
            session.close();
        }
    }

    /// Terminal shutdown at the end of a run.
    pub fn close(&mut self) {
        self.discard();
    }

    /// Number of launches beyond the first - i.e. how many times a session
    /// had to be replaced after a session-fatal error.
    pub fn relaunch_count(&self) -> u64 {
        self.launches.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use torfetch_common::{RenderContext, Viewport};
    use uuid::Uuid;

    struct FakeSession {
        id: Uuid,
        live: AtomicBool,
    }

    impl RenderSession for FakeSession {
        fn instance_id(&self) -> Uuid {
            self.id
        }

        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }

        fn open_context(
            &self,
            _fingerprint: &str,
            _viewport: Viewport,
        ) -> Result<Arc<dyn RenderContext>, RenderError> {
            unimplemented!("not exercised by these tests")
        }

        fn close(&self) {
            self.live.store(false, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeEngine {
        launched: Mutex<Vec<Uuid>>,
        fail_next: AtomicBool,
    }

    impl RenderEngine for FakeEngine {
        fn launch(&self, _proxy: &ProxyEndpoint) -> Result<Arc<dyn RenderSession>, RenderError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(RenderError::launch("no browser binary"));
            }
            let session = Arc::new(FakeSession {
                id: Uuid::new_v4(),
                live: AtomicBool::new(true),
            });
            self.launched.lock().unwrap().push(session.id);
            Ok(session)
        }
    }

    fn manager(engine: Arc<FakeEngine>) -> SessionManager {
        SessionManager::new(engine, ProxyEndpoint::default())
    }

    #[tokio::test]
    async fn test_live_session_is_reused() {
        let engine = Arc::new(FakeEngine::default());
        let mut manager = manager(Arc::clone(&engine));

        let first = manager.ensure_live().await.unwrap();
        let second = manager.ensure_live().await.unwrap();

        assert_eq!(first.instance_id(), second.instance_id());
        assert_eq!(engine.launched.lock().unwrap().len(), 1);
        assert_eq!(manager.relaunch_count(), 0);
    }

    #[tokio::test]
    async fn test_discarded_session_is_replaced_by_new_instance() {
        let engine = Arc::new(FakeEngine::default());
        let mut manager = manager(Arc::clone(&engine));

        let first = manager.ensure_live().await.unwrap();
        manager.discard();
        let second = manager.ensure_live().await.unwrap();

        assert_ne!(first.instance_id(), second.instance_id());
        assert!(!first.is_live());
        assert_eq!(manager.relaunch_count(), 1);
    }

    #[tokio::test]
    async fn test_dead_session_detected_on_ensure() {
        let engine = Arc::new(FakeEngine::default());
        let mut manager = manager(Arc::clone(&engine));

        let first = manager.ensure_live().await.unwrap();
        // Session dies out from under the manager (process crash).
        first.close();
        let second = manager.ensure_live().await.unwrap();

        assert_ne!(first.instance_id(), second.instance_id());
        assert_eq!(manager.relaunch_count(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_propagates_and_next_attempt_recovers() {
        let engine = Arc::new(FakeEngine::default());
        engine.fail_next.store(true, Ordering::SeqCst);
        let mut manager = manager(Arc::clone(&engine));

        let err = manager.ensure_live().await.err().unwrap();
        assert_eq!(err.kind(), RenderErrorKind::Launch);

        // The failed launch does not wedge the manager.
        assert!(manager.ensure_live().await.is_ok());
        assert_eq!(engine.launched.lock().unwrap().len(), 1);
    }
}
