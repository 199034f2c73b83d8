//! Capability interface over the external rendering engine.
//!
//! A session is shared by every task of one request and is only used to open
//! contexts; each context renders exactly one fragment.

use std::{fs::File, io, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::domain::request::PdfOptions;

#[derive(Debug, Error)]
pub enum RenderEngineError {
    #[error("failed to launch rendering session: {0}")]
    Launch(String),
    #[error("failed to open render context: {0}")]
    Context(String),
    #[error("failed to load content: {0}")]
    Load(String),
    #[error("failed to render document: {0}")]
    Render(String),
    #[error("failed to write rendered document: {0}")]
    Write(#[from] io::Error),
    #[error("failed to close rendering resource: {0}")]
    Close(String),
}

#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn open_session(&self) -> Result<Arc<dyn RenderSession>, RenderEngineError>;
}

#[async_trait]
pub trait RenderSession: Send + Sync {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, RenderEngineError>;

    async fn close(&self) -> Result<(), RenderEngineError>;
}

#[async_trait]
pub trait RenderContext: Send {
    /// Resolves once the document and its sub-resources have settled.
    async fn load_content(&mut self, html: &str) -> Result<(), RenderEngineError>;

    async fn render(
        &mut self,
        options: &PdfOptions,
        target: RenderTarget,
    ) -> Result<(), RenderEngineError>;

    async fn close(self: Box<Self>) -> Result<(), RenderEngineError>;
}

/// Write side of one transient artifact.
///
/// Holds its own handle to the artifact file, so writes never recreate a path
/// that has already been released.
#[derive(Debug)]
pub struct RenderTarget {
    index: usize,
    file: File,
}

impl RenderTarget {
    pub(crate) fn new(index: usize, file: File) -> Self {
        Self { index, file }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub async fn write_pdf(self, bytes: &[u8]) -> Result<(), RenderEngineError> {
        let mut file = tokio::fs::File::from_std(self.file);
        file.set_len(0).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}
