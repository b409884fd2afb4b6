use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            author TEXT NOT NULL,
            figure_id TEXT NOT NULL,
            domain TEXT NOT NULL,
            title TEXT NOT NULL,
            source_file TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            completed_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create chunks table; metadata is denormalized so filters need no join
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB,
            author TEXT NOT NULL,
            figure_id TEXT NOT NULL,
            title TEXT NOT NULL,
            domain TEXT NOT NULL,
            significance TEXT NOT NULL,
            position_id TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create contamination flags table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contamination_flags (
            source_file TEXT PRIMARY KEY,
            reason TEXT NOT NULL,
            matched_author TEXT NOT NULL,
            flagged_at INTEGER NOT NULL,
            cleared_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_figure_id ON chunks(figure_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_figure_hash ON documents(figure_id, content_hash)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
