use std::time::Duration;

use thiserror::Error;

use crate::domain::error::RequestError;

use super::{artifacts::ArtifactError, engine::RenderEngineError, merge::MergeError};

/// Failure of a whole render request. No partial document accompanies any variant.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    MalformedRequest(#[from] RequestError),
    #[error("rendering session unavailable")]
    Session(#[source] RenderEngineError),
    #[error("fragment {index} failed to render")]
    Fragment {
        index: usize,
        #[source]
        source: RenderEngineError,
    },
    #[error("failed to merge rendered fragments")]
    Merge(#[from] MergeError),
    #[error("transient resource error: {0}")]
    Resource(String),
    #[error("render request exceeded {0:?}")]
    Timeout(Duration),
    #[error("render task aborted: {0}")]
    TaskAborted(String),
}

/// Coarse error classes used when mapping to transport responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderErrorKind {
    MalformedRequest,
    RenderEngine,
    Merge,
    Resource,
    Timeout,
    Internal,
}

impl RenderError {
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource(message.into())
    }

    pub fn kind(&self) -> RenderErrorKind {
        match self {
            Self::MalformedRequest(_) => RenderErrorKind::MalformedRequest,
            Self::Session(_) | Self::Fragment { .. } => RenderErrorKind::RenderEngine,
            Self::Merge(_) => RenderErrorKind::Merge,
            Self::Resource(_) => RenderErrorKind::Resource,
            Self::Timeout(_) => RenderErrorKind::Timeout,
            Self::TaskAborted(_) => RenderErrorKind::Internal,
        }
    }
}

impl From<ArtifactError> for RenderError {
    fn from(error: ArtifactError) -> Self {
        Self::Resource(error.to_string())
    }
}
