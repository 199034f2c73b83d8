use std::{sync::Arc, time::Instant};

use metrics::counter;
use tracing::{debug, warn};

use crate::domain::request::PdfOptions;

use super::{
    engine::{RenderEngineError, RenderTarget},
    error::RenderError,
    session::SharedSession,
};

/// Renders one fragment into its artifact using a context of its own.
pub struct PageRenderTask {
    pub index: usize,
    pub html: String,
    pub options: Arc<PdfOptions>,
    pub session: Arc<SharedSession>,
    pub target: RenderTarget,
}

impl PageRenderTask {
    /// Returns the fragment index on success.
    pub async fn run(self) -> Result<usize, RenderError> {
        let index = self.index;
        let started_at = Instant::now();

        match self.render().await {
            Ok(()) => {
                debug!(
                    target = "presswork::render::task",
                    op = "task::render",
                    index,
                    result = "ok",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "fragment rendered"
                );
                Ok(index)
            }
            Err(source) => {
                counter!("presswork_render_failures_total").increment(1);
                warn!(
                    target = "presswork::render::task",
                    op = "task::render",
                    index,
                    result = "error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %source,
                    "fragment failed to render"
                );
                Err(RenderError::Fragment { index, source })
            }
        }
    }

    async fn render(self) -> Result<(), RenderEngineError> {
        let Self {
            html,
            options,
            session,
            target,
            ..
        } = self;

        let mut context = session.new_context().await?;
        let outcome = match context.load_content(&html).await {
            Ok(()) => context.render(&options, target).await,
            Err(err) => Err(err),
        };
        let closed = context.close().await;

        outcome?;
        closed
    }
}
