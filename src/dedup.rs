//! Skip / resume / new decision for a document about to be ingested.
//!
//! A document is keyed by `(figure_id, source_file)`. Completion is recorded on
//! the document only after every chunk is stored, so an interrupted run
//! leaves a partial document that the next run resumes from its next
//! chunk index. Chunk inserts themselves ignore existing
//! `(document_id, chunk_index)` rows, which makes a resumed or concurrent
//! run safe even when two runs race on the same file.

use anyhow::Result;
use std::sync::Arc;

use crate::models::{document_id, Document};
use crate::store::{DocumentState, VectorStore};

/// What to do with a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    /// Never seen: ingest from chunk 0.
    New,
    /// A previous run stopped part-way: ingest from `next_index`.
    Resume { next_index: i64 },
    /// Nothing to do.
    AlreadyIngested { reason: String },
}

pub struct DedupGuard {
    store: Arc<dyn VectorStore>,
}

impl DedupGuard {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Whether the file at `source_file` (relative to the data root) has
    /// been fully ingested for `figure_id`.
    pub async fn already_ingested(&self, figure_id: &str, source_file: &str) -> Result<bool> {
        let state = self
            .store
            .document_state(&document_id(figure_id, source_file))
            .await?;
        Ok(state == DocumentState::Complete)
    }

    pub async fn check(&self, doc: &Document) -> Result<DedupDecision> {
        match self.store.document_state(&doc.id).await? {
            DocumentState::Complete => Ok(DedupDecision::AlreadyIngested {
                reason: "already indexed".to_string(),
            }),
            DocumentState::Partial { next_index } => Ok(DedupDecision::Resume { next_index }),
            DocumentState::Absent => {
                let twin = self
                    .store
                    .find_completed_by_hash(&doc.figure_id, &doc.content_hash)
                    .await?;
                match twin {
                    Some(other) if other.id != doc.id => Ok(DedupDecision::AlreadyIngested {
                        reason: format!("duplicate content of \"{}\"", other.source_file),
                    }),
                    _ => Ok(DedupDecision::New),
                }
            }
        }
    }
}
