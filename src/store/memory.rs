//! In-memory [`VectorStore`] implementation for tests and embedding.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine distance over all stored vectors.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{
    Chunk, ContaminationFlag, Document, FlagRecord, FlagState, SearchFilters, SearchHit,
};

use super::{rank_hits, DocumentState, VectorStore};

struct StoredDoc {
    doc: Document,
    completed: bool,
}

struct StoredFlag {
    flag: ContaminationFlag,
    flagged_at: i64,
    cleared: bool,
}

/// In-memory store. Chunks are kept in insertion order.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, StoredDoc>>,
    chunks: RwLock<Vec<Chunk>>,
    keys: RwLock<HashSet<(String, i64)>>,
    flags: RwLock<Vec<StoredFlag>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
            keys: RwLock::new(HashSet::new()),
            flags: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        let mut docs = write(&self.docs)?;
        match docs.get_mut(&doc.id) {
            Some(stored) if stored.completed => {}
            Some(stored) => stored.doc = doc.clone(),
            None => {
                docs.insert(
                    doc.id.clone(),
                    StoredDoc {
                        doc: doc.clone(),
                        completed: false,
                    },
                );
            }
        }
        Ok(())
    }

    async fn document_state(&self, document_id: &str) -> Result<DocumentState> {
        let docs = read(&self.docs)?;
        let Some(stored) = docs.get(document_id) else {
            return Ok(DocumentState::Absent);
        };
        if stored.completed {
            return Ok(DocumentState::Complete);
        }
        let next_index = read(&self.chunks)?
            .iter()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.chunk_index + 1)
            .max()
            .unwrap_or(0);
        Ok(DocumentState::Partial { next_index })
    }

    async fn find_completed_by_hash(
        &self,
        figure_id: &str,
        content_hash: &str,
    ) -> Result<Option<Document>> {
        let docs = read(&self.docs)?;
        Ok(docs
            .values()
            .find(|s| {
                s.completed && s.doc.figure_id == figure_id && s.doc.content_hash == content_hash
            })
            .map(|s| s.doc.clone()))
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let mut keys = write(&self.keys)?;
        let mut stored = write(&self.chunks)?;
        let mut inserted = 0;
        for chunk in chunks {
            if keys.insert((chunk.document_id.clone(), chunk.chunk_index)) {
                stored.push(chunk.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn mark_document_complete(&self, document_id: &str) -> Result<()> {
        let mut docs = write(&self.docs)?;
        match docs.get_mut(document_id) {
            Some(stored) => {
                stored.completed = true;
                Ok(())
            }
            None => Err(anyhow!("unknown document: {}", document_id)),
        }
    }

    async fn count_chunks(&self, filters: &SearchFilters) -> Result<usize> {
        let chunks = read(&self.chunks)?;
        Ok(chunks.iter().filter(|c| filters.matches(&c.metadata)).count())
    }

    async fn count_embedded(&self, filters: &SearchFilters) -> Result<usize> {
        let chunks = read(&self.chunks)?;
        Ok(chunks
            .iter()
            .filter(|c| c.embedding.is_some() && filters.matches(&c.metadata))
            .count())
    }

    async fn count_documents(&self, filters: &SearchFilters) -> Result<usize> {
        let chunks = read(&self.chunks)?;
        let docs: HashSet<&str> = chunks
            .iter()
            .filter(|c| filters.matches(&c.metadata))
            .map(|c| c.document_id.as_str())
            .collect();
        Ok(docs.len())
    }

    async fn sample_chunks(&self, filters: &SearchFilters, limit: usize) -> Result<Vec<Chunk>> {
        let chunks = read(&self.chunks)?;
        Ok(chunks
            .iter()
            .filter(|c| filters.matches(&c.metadata))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn vector_search(
        &self,
        query: &[f32],
        filters: &SearchFilters,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let chunks = read(&self.chunks)?;
        let mut hits: Vec<SearchHit> = chunks
            .iter()
            .filter(|c| filters.matches(&c.metadata))
            .filter_map(|c| {
                let vector = c.embedding.as_ref()?;
                Some(SearchHit {
                    chunk_id: c.id.clone(),
                    document_id: c.document_id.clone(),
                    chunk_index: c.chunk_index,
                    text: c.text.clone(),
                    metadata: c.metadata.clone(),
                    distance: cosine_distance(query, vector),
                })
            })
            .collect();
        rank_hits(&mut hits, k);
        Ok(hits)
    }

    async fn record_flag(&self, flag: &ContaminationFlag) -> Result<()> {
        let mut flags = write(&self.flags)?;
        let now = chrono::Utc::now().timestamp();
        match flags
            .iter_mut()
            .find(|f| f.flag.source_file == flag.source_file)
        {
            Some(existing) if existing.cleared => {}
            Some(existing) => {
                existing.flag = flag.clone();
                existing.flagged_at = now;
            }
            None => flags.push(StoredFlag {
                flag: flag.clone(),
                flagged_at: now,
                cleared: false,
            }),
        }
        Ok(())
    }

    async fn flag_state(&self, source_file: &str) -> Result<Option<FlagState>> {
        let flags = read(&self.flags)?;
        Ok(flags
            .iter()
            .find(|f| f.flag.source_file == source_file)
            .map(|f| {
                if f.cleared {
                    FlagState::Cleared
                } else {
                    FlagState::Open
                }
            }))
    }

    async fn list_flags(&self) -> Result<Vec<FlagRecord>> {
        let flags = read(&self.flags)?;
        Ok(flags
            .iter()
            .map(|f| FlagRecord {
                flag: f.flag.clone(),
                flagged_at: f.flagged_at,
                state: if f.cleared {
                    FlagState::Cleared
                } else {
                    FlagState::Open
                },
            })
            .collect())
    }

    async fn clear_flag(&self, source_file: &str) -> Result<bool> {
        let mut flags = write(&self.flags)?;
        match flags
            .iter_mut()
            .find(|f| f.flag.source_file == source_file && !f.cleared)
        {
            Some(f) => {
                f.cleared = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
