//! Fans a request's fragments out over one shared session and joins them.
//!
//! The session and every artifact are released on every exit path: success,
//! task failure, merge failure and timeout. Sibling artifacts are released even
//! when another task fails.

use std::{
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::histogram;
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};
use tracing::{error, info, warn};

use crate::domain::{error::RequestError, request::RenderRequest};

use super::{
    artifacts::{Artifact, TempResourceManager},
    error::RenderError,
    merge::merge_artifacts,
    session::{BrowserSessionManager, SessionLease},
    task::PageRenderTask,
};

#[derive(Debug, Clone, Copy)]
pub struct RenderLimits {
    /// Fragments of one request rendered at the same time.
    pub max_concurrent_pages: NonZeroUsize,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assembly {
    /// Return the only artifact as-is.
    Single,
    /// Merge every artifact in index order.
    Merge,
}

type TaskSet = JoinSet<Result<usize, RenderError>>;

pub struct RenderCoordinator {
    sessions: BrowserSessionManager,
    artifacts: TempResourceManager,
    limits: RenderLimits,
}

impl RenderCoordinator {
    pub fn new(
        sessions: BrowserSessionManager,
        artifacts: TempResourceManager,
        limits: RenderLimits,
    ) -> Self {
        Self {
            sessions,
            artifacts,
            limits,
        }
    }

    pub fn artifacts(&self) -> &TempResourceManager {
        &self.artifacts
    }

    /// Render every fragment concurrently and merge them in submission order.
    pub async fn run(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        self.execute(request, Assembly::Merge).await
    }

    /// Render a one-fragment request without a merge step.
    pub async fn run_single(&self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        if request.fragments().len() != 1 {
            return Err(RequestError::body(format!(
                "single-document render received {} fragments",
                request.fragments().len()
            ))
            .into());
        }
        self.execute(request, Assembly::Single).await
    }

    async fn execute(
        &self,
        request: &RenderRequest,
        assembly: Assembly,
    ) -> Result<Vec<u8>, RenderError> {
        let started_at = Instant::now();
        let mut lease: Option<SessionLease> = None;
        let mut artifacts: Vec<Artifact> = Vec::with_capacity(request.fragments().len());
        let mut tasks = TaskSet::new();

        let outcome = match tokio::time::timeout(
            self.limits.request_timeout,
            self.render(request, assembly, &mut lease, &mut artifacts, &mut tasks),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(RenderError::Timeout(self.limits.request_timeout)),
        };

        tasks.shutdown().await;
        let cleanup = self.cleanup(lease, artifacts).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!("presswork_request_ms").record(elapsed_ms as f64);

        match (outcome, cleanup) {
            (Ok(document), Ok(())) => {
                info!(
                    target = "presswork::render::coordinator",
                    op = "coordinator::run",
                    fragments = request.fragments().len(),
                    bytes = document.len(),
                    elapsed_ms,
                    result = "ok",
                    "render request completed"
                );
                Ok(document)
            }
            (Ok(_), Err(err)) => Err(err),
            (Err(err), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    error!(
                        target = "presswork::render::coordinator",
                        error = %cleanup_err,
                        "cleanup failed after render error"
                    );
                }
                warn!(
                    target = "presswork::render::coordinator",
                    op = "coordinator::run",
                    fragments = request.fragments().len(),
                    elapsed_ms,
                    result = "error",
                    error = %err,
                    "render request failed"
                );
                Err(err)
            }
        }
    }

    async fn render(
        &self,
        request: &RenderRequest,
        assembly: Assembly,
        lease_slot: &mut Option<SessionLease>,
        artifacts: &mut Vec<Artifact>,
        tasks: &mut TaskSet,
    ) -> Result<Vec<u8>, RenderError> {
        let lease = self
            .sessions
            .acquire()
            .await
            .map_err(RenderError::Session)?;
        let session = lease_slot.insert(lease).session();
        let options = Arc::new(request.options().clone());
        let permits = Arc::new(Semaphore::new(self.limits.max_concurrent_pages.get()));

        for (index, html) in request.fragments().iter().enumerate() {
            let artifact = self.artifacts.acquire(index)?;
            let target = artifact.target()?;
            artifacts.push(artifact);

            let task = PageRenderTask {
                index,
                html: html.clone(),
                options: Arc::clone(&options),
                session: Arc::clone(&session),
                target,
            };
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| RenderError::resource("render permits closed"))?;
                task.run().await
            });
        }

        join_all(tasks, request.fragments().len()).await?;

        match assembly {
            Assembly::Merge => Ok(merge_artifacts(artifacts).await?),
            Assembly::Single => {
                let artifact = artifacts
                    .first()
                    .ok_or_else(|| RenderError::resource("no artifact was allocated"))?;
                artifact.read().await.map_err(|err| {
                    RenderError::resource(format!("failed to read artifact: {err}"))
                })
            }
        }
    }

    async fn cleanup(
        &self,
        lease: Option<SessionLease>,
        artifacts: Vec<Artifact>,
    ) -> Result<(), RenderError> {
        let mut failures = Vec::new();

        for artifact in artifacts {
            if let Err(err) = artifact.release() {
                error!(
                    target = "presswork::render::coordinator",
                    op = "coordinator::cleanup",
                    error = %err,
                    "failed to release artifact"
                );
                failures.push(err.to_string());
            }
        }

        if let Some(lease) = lease {
            if let Err(err) = lease.release().await {
                failures.push(err.to_string());
            }
        }

        match failures.into_iter().next() {
            Some(reason) => Err(RenderError::resource(reason)),
            None => Ok(()),
        }
    }
}

/// Wait for every task. The first failure aborts and drains the rest.
async fn join_all(tasks: &mut TaskSet, expected: usize) -> Result<(), RenderError> {
    let mut completed = vec![false; expected];

    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok(Ok(index)) => match completed.get_mut(index) {
                Some(done) if !*done => {
                    *done = true;
                    continue;
                }
                _ => RenderError::resource(format!("unexpected completion for fragment {index}")),
            },
            Ok(Err(err)) => err,
            Err(err) => aborted(err),
        };

        tasks.shutdown().await;
        return Err(failure);
    }

    match completed.iter().position(|done| !done) {
        Some(index) => Err(RenderError::resource(format!(
            "fragment {index} never completed"
        ))),
        None => Ok(()),
    }
}

fn aborted(err: JoinError) -> RenderError {
    if err.is_panic() {
        RenderError::TaskAborted("render task panicked".to_string())
    } else {
        RenderError::TaskAborted(err.to_string())
    }
}
