//! HTML-to-PDF rendering pipeline.
//!
//! A request acquires one engine session, renders each fragment into its own
//! transient artifact on a task of its own, and assembles the artifacts in
//! submission order. See [`RenderCoordinator`] for the lifecycle guarantees.

mod artifacts;
mod coordinator;
mod engine;
mod error;
mod merge;
mod session;
mod task;

pub use artifacts::{Artifact, ArtifactError, TempResourceManager};
pub use coordinator::{RenderCoordinator, RenderLimits};
pub use engine::{RenderContext, RenderEngine, RenderEngineError, RenderSession, RenderTarget};
pub use error::{RenderError, RenderErrorKind};
pub use merge::{MergeError, merge_documents};
pub use session::{BrowserSessionManager, SessionLease, SharedSession};
pub use task::PageRenderTask;
