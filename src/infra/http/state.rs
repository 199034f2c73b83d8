use std::sync::Arc;

use crate::application::render::RenderCoordinator;

/// Server context shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RenderCoordinator>,
    /// Upper bound on fragments accepted by `/multiple`.
    pub max_pages: usize,
}

impl AppState {
    pub fn new(coordinator: Arc<RenderCoordinator>, max_pages: usize) -> Self {
        Self {
            coordinator,
            max_pages,
        }
    }
}
