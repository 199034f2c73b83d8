//! Assembles rendered artifacts into one PDF.
//!
//! Each artifact's page tree is grafted, unchanged, under a fresh root `Pages`
//! node in index order, so inherited page attributes survive the merge.

use std::time::Instant;

use lopdf::{Document, Object, ObjectId, dictionary};
use thiserror::Error;
use tracing::debug;

use super::artifacts::Artifact;

const OUTPUT_PDF_VERSION: &str = "1.7";

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("artifact {index} could not be read: {source}")]
    Read {
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact {index} is not a valid PDF document: {reason}")]
    Invalid { index: usize, reason: String },
    #[error("artifact {index} contains no pages")]
    Empty { index: usize },
    #[error("failed to serialise merged document: {0}")]
    Serialize(String),
    #[error("merge worker stopped: {0}")]
    Worker(String),
}

/// Read every artifact and merge them strictly by ascending index.
pub async fn merge_artifacts(artifacts: &[Artifact]) -> Result<Vec<u8>, MergeError> {
    let mut ordered: Vec<&Artifact> = artifacts.iter().collect();
    ordered.sort_by_key(|artifact| artifact.index());

    let mut documents = Vec::with_capacity(ordered.len());
    for artifact in ordered {
        let index = artifact.index();
        let bytes = artifact
            .read()
            .await
            .map_err(|source| MergeError::Read { index, source })?;
        documents.push((index, bytes));
    }

    tokio::task::spawn_blocking(move || merge_documents(&documents))
        .await
        .map_err(|err| MergeError::Worker(err.to_string()))?
}

/// Merge already-ordered `(index, pdf bytes)` pairs into one serialised document.
pub fn merge_documents(documents: &[(usize, Vec<u8>)]) -> Result<Vec<u8>, MergeError> {
    let started_at = Instant::now();
    let mut merged = Document::with_version(OUTPUT_PDF_VERSION);
    let mut next_id = 1;
    let mut subtrees: Vec<ObjectId> = Vec::with_capacity(documents.len());
    let mut page_count: i64 = 0;

    for (index, bytes) in documents {
        let index = *index;
        let mut document = Document::load_mem(bytes).map_err(|err| MergeError::Invalid {
            index,
            reason: err.to_string(),
        })?;
        document.renumber_objects_with(next_id);
        next_id = document.max_id + 1;

        let pages = document.get_pages().len();
        if pages == 0 {
            return Err(MergeError::Empty { index });
        }
        page_count += pages as i64;

        let catalog_id = document
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|err| MergeError::Invalid {
                index,
                reason: format!("missing catalog: {err}"),
            })?;
        let pages_id = document
            .get_dictionary(catalog_id)
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(Object::as_reference)
            .map_err(|err| MergeError::Invalid {
                index,
                reason: format!("missing page tree: {err}"),
            })?;

        document.objects.remove(&catalog_id);
        merged.objects.extend(document.objects);
        subtrees.push(pages_id);
    }

    merged.max_id = next_id.saturating_sub(1);
    let root_pages_id = merged.new_object_id();

    for subtree in &subtrees {
        let node = merged
            .get_dictionary_mut(*subtree)
            .map_err(|err| MergeError::Serialize(err.to_string()))?;
        node.set("Parent", Object::Reference(root_pages_id));
    }

    merged.objects.insert(
        root_pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => subtrees.iter().copied().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => page_count,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => root_pages_id,
    });
    merged.trailer.set("Root", catalog_id);
    merged.prune_objects();
    merged.compress();

    let mut buffer = Vec::new();
    merged
        .save_to(&mut buffer)
        .map_err(|err| MergeError::Serialize(err.to_string()))?;

    debug!(
        target = "presswork::render::merge",
        op = "merge::documents",
        documents = documents.len(),
        pages = page_count,
        bytes = buffer.len(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "artifacts merged"
    );

    Ok(buffer)
}
