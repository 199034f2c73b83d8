//! Transient per-task artifact files.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use metrics::counter;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use super::engine::RenderTarget;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to prepare artifact directory `{path}`: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to allocate artifact {index}: {source}")]
    Allocate {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("failed to release artifact `{path}`: {source}")]
    Release {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Allocates uniquely-named artifact files inside one directory and tracks how
/// many are currently alive.
#[derive(Debug, Clone)]
pub struct TempResourceManager {
    dir: PathBuf,
    live: Arc<AtomicUsize>,
}

impl TempResourceManager {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| ArtifactError::Directory {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Number of artifacts allocated and not yet released.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn acquire(&self, index: usize) -> Result<Artifact, ArtifactError> {
        let file = tempfile::Builder::new()
            .prefix(&format!("presswork-{index}-"))
            .suffix(".pdf")
            .tempfile_in(&self.dir)
            .map_err(|source| ArtifactError::Allocate { index, source })?;
        let path = file.path().to_path_buf();

        self.live.fetch_add(1, Ordering::SeqCst);
        counter!("presswork_artifacts_created_total").increment(1);
        debug!(
            target = "presswork::render::artifacts",
            index,
            path = %path.display(),
            "artifact allocated"
        );

        Ok(Artifact {
            index,
            path,
            file: Some(file),
            live: Arc::clone(&self.live),
        })
    }
}

/// One transient artifact. Released exactly once: explicitly through
/// [`Artifact::release`], otherwise when dropped.
#[derive(Debug)]
pub struct Artifact {
    index: usize,
    path: PathBuf,
    file: Option<NamedTempFile>,
    live: Arc<AtomicUsize>,
}

impl Artifact {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target(&self) -> Result<RenderTarget, ArtifactError> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| ArtifactError::Allocate {
                index: self.index,
                source: io::Error::new(io::ErrorKind::NotFound, "artifact already released"),
            })?
            .as_file()
            .try_clone()
            .map_err(|source| ArtifactError::Allocate {
                index: self.index,
                source,
            })?;
        Ok(RenderTarget::new(self.index, file))
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    pub fn release(mut self) -> Result<(), ArtifactError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), ArtifactError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        self.live.fetch_sub(1, Ordering::SeqCst);
        counter!("presswork_artifacts_released_total").increment(1);
        file.close().map_err(|source| ArtifactError::Release {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            warn!(
                target = "presswork::render::artifacts",
                index = self.index,
                error = %err,
                "failed to release dropped artifact"
            );
        }
    }
}
