//! Storage abstraction for Corpus Harness.
//!
//! The [`VectorStore`] trait defines every storage operation the
//! ingestion and retrieval pipeline needs, with two backends:
//! [`SqliteStore`] for real corpora and [`InMemoryStore`] for tests and
//! embedding in other hosts.
//!
//! Chunk rows are immutable. Inserts ignore rows whose
//! `(document_id, chunk_index)` already exists and report how many rows
//! were actually written, so concurrent or repeated runs never duplicate
//! a chunk.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ContaminationFlag, Document, FlagRecord, FlagState, SearchFilters, SearchHit};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// How far a document's ingestion has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// No record of the document.
    Absent,
    /// Started but not finished; chunks below `next_index` are stored.
    Partial { next_index: i64 },
    /// Every chunk was persisted and the document was marked complete.
    Complete,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](VectorStore::upsert_document) | Record a document before its chunks |
/// | [`document_state`](VectorStore::document_state) | Absent / partial / complete |
/// | [`find_completed_by_hash`](VectorStore::find_completed_by_hash) | Same content under another title |
/// | [`insert_chunks`](VectorStore::insert_chunks) | Conflict-ignore chunk insert |
/// | [`mark_document_complete`](VectorStore::mark_document_complete) | Completion marker |
/// | [`vector_search`](VectorStore::vector_search) | Filtered k-NN by cosine distance |
/// | [`record_flag`](VectorStore::record_flag) | Persist a contamination flag |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a document record. An incomplete record is refreshed; a
    /// completed one is left untouched.
    async fn upsert_document(&self, doc: &Document) -> Result<()>;

    async fn document_state(&self, document_id: &str) -> Result<DocumentState>;

    /// A completed document of `figure_id` whose body hashes to `content_hash`.
    async fn find_completed_by_hash(
        &self,
        figure_id: &str,
        content_hash: &str,
    ) -> Result<Option<Document>>;

    /// Insert chunks, skipping any whose `(document_id, chunk_index)`
    /// already exists. Returns the number of rows written.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize>;

    async fn mark_document_complete(&self, document_id: &str) -> Result<()>;

    /// Number of stored chunks matching `filters`.
    async fn count_chunks(&self, filters: &SearchFilters) -> Result<usize>;

    /// Number of chunks matching `filters` that carry an embedding.
    async fn count_embedded(&self, filters: &SearchFilters) -> Result<usize>;

    /// Number of distinct documents with at least one chunk matching `filters`.
    async fn count_documents(&self, filters: &SearchFilters) -> Result<usize>;

    /// Up to `limit` matching chunks in insertion order.
    async fn sample_chunks(&self, filters: &SearchFilters, limit: usize) -> Result<Vec<Chunk>>;

    /// The `k` embedded chunks matching `filters` closest to `query`,
    /// ordered by cosine distance, then `chunk_index`, then insertion order.
    async fn vector_search(
        &self,
        query: &[f32],
        filters: &SearchFilters,
        k: usize,
    ) -> Result<Vec<SearchHit>>;

    /// Record a flag. A flag that was already cleared stays cleared.
    async fn record_flag(&self, flag: &ContaminationFlag) -> Result<()>;

    async fn flag_state(&self, source_file: &str) -> Result<Option<FlagState>>;

    async fn list_flags(&self) -> Result<Vec<FlagRecord>>;

    /// Clear an open flag. Returns `false` when no open flag exists.
    async fn clear_flag(&self, source_file: &str) -> Result<bool>;
}

/// Sort hits by distance, then chunk index; the sort is stable so equal
/// keys keep insertion order.
pub(crate) fn rank_hits(hits: &mut Vec<SearchHit>, k: usize) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
    hits.truncate(k);
}
