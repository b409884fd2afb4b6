//! SQLite-backed [`VectorStore`] implementation.
//!
//! Vectors are stored as little-endian f32 BLOBs on the chunk row and
//! similarity is computed in Rust. Exact filters (`figure_id`, `domain`)
//! are pushed into SQL; substring filters are applied to the fetched rows.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::config::Config;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::models::{
    Chunk, ChunkMetadata, ContaminationFlag, Document, FlagRecord, FlagState, SearchFilters,
    SearchHit,
};
use crate::{db, migrate};

use super::{rank_hits, DocumentState, VectorStore};

const META_COLUMNS: &str =
    "document_id, chunk_index, author, figure_id, title, domain, significance, position_id";
const CHUNK_COLUMNS: &str = "id, document_id, chunk_index, text, hash, embedding, \
     author, figure_id, title, domain, significance, position_id";

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and ensure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_chunk_rows(
        &self,
        columns: &str,
        filters: &SearchFilters,
        embedded_only: bool,
    ) -> Result<Vec<SqliteRow>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM chunks WHERE 1 = 1", columns));
        if embedded_only {
            qb.push(" AND embedding IS NOT NULL");
        }
        if let Some(ref figure) = filters.figure_id {
            qb.push(" AND figure_id = ").push_bind(figure.as_str());
        }
        if let Some(ref domain) = filters.domain {
            qb.push(" AND domain = ").push_bind(domain.as_str());
        }
        qb.push(" ORDER BY rowid");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows)
    }
}

fn row_to_metadata(row: &SqliteRow) -> ChunkMetadata {
    ChunkMetadata {
        author: row.get("author"),
        figure_id: row.get("figure_id"),
        title: row.get("title"),
        domain: row.get("domain"),
        significance: row.get("significance"),
        position_id: row.get("position_id"),
    }
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    let embedding: Option<Vec<u8>> = row.get("embedding");
    Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        hash: row.get("hash"),
        embedding: embedding.map(|b| blob_to_vec(&b)),
        metadata: row_to_metadata(row),
    }
}

fn row_to_document(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        author: row.get("author"),
        figure_id: row.get("figure_id"),
        domain: row.get("domain"),
        title: row.get("title"),
        source_file: row.get("source_file"),
        content_hash: row.get("content_hash"),
    }
}

fn row_to_flag(row: &SqliteRow) -> FlagRecord {
    let cleared_at: Option<i64> = row.get("cleared_at");
    FlagRecord {
        flag: ContaminationFlag {
            source_file: row.get("source_file"),
            reason: row.get("reason"),
            matched_author: row.get("matched_author"),
        },
        flagged_at: row.get("flagged_at"),
        state: if cleared_at.is_some() {
            FlagState::Cleared
        } else {
            FlagState::Open
        },
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO documents (id, author, figure_id, domain, title, source_file,
                                   content_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                author = excluded.author,
                domain = excluded.domain,
                source_file = excluded.source_file,
                content_hash = excluded.content_hash
            WHERE documents.completed_at IS NULL
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.author)
        .bind(&doc.figure_id)
        .bind(&doc.domain)
        .bind(&doc.title)
        .bind(&doc.source_file)
        .bind(&doc.content_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn document_state(&self, document_id: &str) -> Result<DocumentState> {
        let row = sqlx::query("SELECT completed_at FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(DocumentState::Absent);
        };
        let completed_at: Option<i64> = row.get("completed_at");
        if completed_at.is_some() {
            return Ok(DocumentState::Complete);
        }

        let next_index: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(chunk_index) + 1, 0) FROM chunks WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(DocumentState::Partial { next_index })
    }

    async fn find_completed_by_hash(
        &self,
        figure_id: &str,
        content_hash: &str,
    ) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, author, figure_id, domain, title, source_file, content_hash
            FROM documents
            WHERE figure_id = ? AND content_hash = ? AND completed_at IS NOT NULL
            ORDER BY completed_at ASC
            LIMIT 1
            "#,
        )
        .bind(figure_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_document))
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in chunks {
            let blob = chunk.embedding.as_deref().map(vec_to_blob);
            let result = sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, hash, embedding,
                                    author, figure_id, title, domain, significance,
                                    position_id, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(blob)
            .bind(&chunk.metadata.author)
            .bind(&chunk.metadata.figure_id)
            .bind(&chunk.metadata.title)
            .bind(&chunk.metadata.domain)
            .bind(&chunk.metadata.significance)
            .bind(&chunk.metadata.position_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted as usize)
    }

    async fn mark_document_complete(&self, document_id: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE documents SET completed_at = ? WHERE id = ? AND completed_at IS NULL",
        )
        .bind(now)
        .bind(document_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0
            && self.document_state(document_id).await? == DocumentState::Absent
        {
            bail!("unknown document: {}", document_id);
        }
        Ok(())
    }

    async fn count_chunks(&self, filters: &SearchFilters) -> Result<usize> {
        let rows = self.fetch_chunk_rows(META_COLUMNS, filters, false).await?;
        Ok(rows
            .iter()
            .filter(|row| filters.matches(&row_to_metadata(row)))
            .count())
    }

    async fn count_embedded(&self, filters: &SearchFilters) -> Result<usize> {
        let rows = self.fetch_chunk_rows(META_COLUMNS, filters, true).await?;
        Ok(rows
            .iter()
            .filter(|row| filters.matches(&row_to_metadata(row)))
            .count())
    }

    async fn count_documents(&self, filters: &SearchFilters) -> Result<usize> {
        let rows = self.fetch_chunk_rows(META_COLUMNS, filters, false).await?;
        let docs: std::collections::HashSet<String> = rows
            .iter()
            .filter(|row| filters.matches(&row_to_metadata(row)))
            .map(|row| row.get::<String, _>("document_id"))
            .collect();
        Ok(docs.len())
    }

    async fn sample_chunks(&self, filters: &SearchFilters, limit: usize) -> Result<Vec<Chunk>> {
        let rows = self.fetch_chunk_rows(CHUNK_COLUMNS, filters, false).await?;
        Ok(rows
            .iter()
            .map(row_to_chunk)
            .filter(|c| filters.matches(&c.metadata))
            .take(limit)
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
        let rows = self.fetch_chunk_rows(CHUNK_COLUMNS, filters, true).await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(row_to_chunk)
            .filter(|c| filters.matches(&c.metadata))
            .filter_map(|c| {
                let distance = cosine_distance(query, c.embedding.as_deref()?);
                Some(SearchHit {
                    chunk_id: c.id,
                    document_id: c.document_id,
                    chunk_index: c.chunk_index,
                    text: c.text,
                    metadata: c.metadata,
                    distance,
                })
            })
            .collect();

        rank_hits(&mut hits, k);
        Ok(hits)
    }

    async fn record_flag(&self, flag: &ContaminationFlag) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO contamination_flags (source_file, reason, matched_author, flagged_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(source_file) DO UPDATE SET
                reason = excluded.reason,
                matched_author = excluded.matched_author,
                flagged_at = excluded.flagged_at
            WHERE contamination_flags.cleared_at IS NULL
            "#,
        )
        .bind(&flag.source_file)
        .bind(&flag.reason)
        .bind(&flag.matched_author)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn flag_state(&self, source_file: &str) -> Result<Option<FlagState>> {
        let row = sqlx::query("SELECT cleared_at FROM contamination_flags WHERE source_file = ?")
            .bind(source_file)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| {
            let cleared_at: Option<i64> = r.get("cleared_at");
            if cleared_at.is_some() {
                FlagState::Cleared
            } else {
                FlagState::Open
            }
        }))
    }

    async fn list_flags(&self) -> Result<Vec<FlagRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT source_file, reason, matched_author, flagged_at, cleared_at
            FROM contamination_flags
            ORDER BY flagged_at ASC, source_file ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_flag).collect())
    }

    async fn clear_flag(&self, source_file: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE contamination_flags SET cleared_at = ? WHERE source_file = ? AND cleared_at IS NULL",
        )
        .bind(now)
        .bind(source_file)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
