//! Per-request rendering session lifecycle.

use std::{num::NonZeroUsize, sync::Arc, time::Instant};

use metrics::counter;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::engine::{RenderContext, RenderEngine, RenderEngineError, RenderSession};

/// Opens one session per request, bounded by a process-wide ceiling.
#[derive(Clone)]
pub struct BrowserSessionManager {
    engine: Arc<dyn RenderEngine>,
    slots: Arc<Semaphore>,
}

impl BrowserSessionManager {
    pub fn new(engine: Arc<dyn RenderEngine>, max_sessions: NonZeroUsize) -> Self {
        Self {
            engine,
            slots: Arc::new(Semaphore::new(max_sessions.get())),
        }
    }

    pub async fn acquire(&self) -> Result<SessionLease, RenderEngineError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| RenderEngineError::Launch("session slots closed".to_string()))?;

        let started_at = Instant::now();
        let session = self.engine.open_session().await?;
        let id = Uuid::new_v4();
        counter!("presswork_sessions_opened_total").increment(1);
        info!(
            target = "presswork::render::session",
            op = "session::acquire",
            session_id = %id,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "rendering session opened"
        );

        Ok(SessionLease {
            id,
            shared: Arc::new(SharedSession {
                inner: session,
                context_gate: Mutex::new(()),
            }),
            permit: Some(permit),
            released: false,
        })
    }
}

/// Session handle given to render tasks. Context creation is serialised.
pub struct SharedSession {
    inner: Arc<dyn RenderSession>,
    context_gate: Mutex<()>,
}

impl SharedSession {
    pub async fn new_context(&self) -> Result<Box<dyn RenderContext>, RenderEngineError> {
        let _gate = self.context_gate.lock().await;
        self.inner.new_context().await
    }
}

/// Owns one open session. Closed exactly once: through [`SessionLease::release`],
/// or in the background if the lease is dropped first.
pub struct SessionLease {
    id: Uuid,
    shared: Arc<SharedSession>,
    permit: Option<OwnedSemaphorePermit>,
    released: bool,
}

impl SessionLease {
    pub fn session(&self) -> Arc<SharedSession> {
        Arc::clone(&self.shared)
    }

    pub async fn release(mut self) -> Result<(), RenderEngineError> {
        self.released = true;
        let result = self.shared.inner.close().await;
        counter!("presswork_sessions_closed_total").increment(1);
        self.permit.take();

        match &result {
            Ok(()) => info!(
                target = "presswork::render::session",
                op = "session::release",
                session_id = %self.id,
                "rendering session closed"
            ),
            Err(err) => warn!(
                target = "presswork::render::session",
                op = "session::release",
                session_id = %self.id,
                error = %err,
                "rendering session close failed"
            ),
        }
        result
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        self.released = true;
        counter!("presswork_sessions_closed_total").increment(1);
        error!(
            target = "presswork::render::session",
            op = "session::drop",
            session_id = %self.id,
            "session lease dropped without release; closing in background"
        );

        let session = Arc::clone(&self.shared.inner);
        let permit = self.permit.take();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = session.close().await {
                        warn!(
                            target = "presswork::render::session",
                            session_id = %id,
                            error = %err,
                            "background session close failed"
                        );
                    }
                    drop(permit);
                });
            }
            Err(_) => {
                warn!(
                    target = "presswork::render::session",
                    session_id = %id,
                    "no runtime available; session handle dropped without close"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::application::render::engine::RenderTarget;
    use crate::domain::request::PdfOptions;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    struct CountingEngine {
        counters: Arc<Counters>,
    }

    struct CountingSession {
        counters: Arc<Counters>,
    }

    struct NullContext;

    #[async_trait]
    impl RenderEngine for CountingEngine {
        async fn open_session(&self) -> Result<Arc<dyn RenderSession>, RenderEngineError> {
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingSession {
                counters: Arc::clone(&self.counters),
            }))
        }
    }

    #[async_trait]
    impl RenderSession for CountingSession {
        async fn new_context(&self) -> Result<Box<dyn RenderContext>, RenderEngineError> {
            Ok(Box::new(NullContext))
        }

        async fn close(&self) -> Result<(), RenderEngineError> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl RenderContext for NullContext {
        async fn load_content(&mut self, _html: &str) -> Result<(), RenderEngineError> {
            Ok(())
        }

        async fn render(
            &mut self,
            _options: &PdfOptions,
            _target: RenderTarget,
        ) -> Result<(), RenderEngineError> {
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<(), RenderEngineError> {
            Ok(())
        }
    }

    fn manager(max_sessions: usize) -> (BrowserSessionManager, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let engine = Arc::new(CountingEngine {
            counters: Arc::clone(&counters),
        });
        let manager =
            BrowserSessionManager::new(engine, NonZeroUsize::new(max_sessions).expect("non-zero"));
        (manager, counters)
    }

    #[tokio::test]
    async fn release_closes_once() {
        let (manager, counters) = manager(1);
        let lease = manager.acquire().await.expect("lease");
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);

        lease.release().await.expect("release");
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_lease_closes_in_background() {
        let (manager, counters) = manager(1);
        let lease = manager.acquire().await.expect("lease");
        drop(lease);

        for _ in 0..50 {
            if counters.closed.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn session_ceiling_waits_for_release() {
        let (manager, counters) = manager(1);
        let first = manager.acquire().await.expect("lease");

        let blocked = tokio::time::timeout(Duration::from_millis(50), manager.acquire()).await;
        assert!(blocked.is_err(), "second session opened past the ceiling");

        first.release().await.expect("release");
        let second = manager.acquire().await.expect("lease after release");
        second.release().await.expect("release");
        assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
    }
}
