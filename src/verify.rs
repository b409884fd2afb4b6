//! Post-ingestion check of what is stored for one author.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::models::{AuthorSpec, Chunk, FlagRecord, FlagState, SearchFilters};
use crate::store::{SqliteStore, VectorStore};

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub author: AuthorSpec,
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
    pub samples: Vec<Chunk>,
    /// Open contamination flags on files in the author's folder.
    pub open_flags: Vec<FlagRecord>,
}

pub async fn verify_author(
    store: &dyn VectorStore,
    author: &AuthorSpec,
    sample_size: usize,
) -> Result<VerifyReport> {
    let filters = SearchFilters::figure(&author.figure_id);
    let chunks = store.count_chunks(&filters).await?;
    let documents = store.count_documents(&filters).await?;
    let embedded = store.count_embedded(&filters).await?;
    let samples = store.sample_chunks(&filters, sample_size).await?;

    let prefix = format!("{}/", author.folder);
    let open_flags = store
        .list_flags()
        .await?
        .into_iter()
        .filter(|f| f.state == FlagState::Open && f.flag.source_file.starts_with(&prefix))
        .collect();

    Ok(VerifyReport {
        author: author.clone(),
        documents,
        chunks,
        embedded,
        samples,
        open_flags,
    })
}

pub async fn run_verify(config: &Config, folder: &str) -> Result<()> {
    let Some(author) = config.author(folder) else {
        bail!("Unknown author folder: '{}'", folder);
    };

    let store = Arc::new(SqliteStore::open(config).await?);
    let report = verify_author(store.as_ref(), author, 3).await?;

    println!("verify {} ({})", report.author.name, report.author.figure_id);
    println!("  documents: {}", report.documents);
    println!("  chunks: {}", report.chunks);
    println!("  embedded: {}", report.embedded);
    if !report.samples.is_empty() {
        println!("  sample content:");
        for chunk in &report.samples {
            let preview = crate::embedding::truncate_chars(&chunk.text, PREVIEW_CHARS);
            println!(
                "    - {}: \"{}...\"",
                chunk.metadata.title,
                preview.replace('\n', " ").trim()
            );
        }
    }
    if !report.open_flags.is_empty() {
        println!("  open flags: {}", report.open_flags.len());
        for record in &report.open_flags {
            println!("    - {}: {}", record.flag.source_file, record.flag.reason);
        }
    }

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, ContaminationFlag, Document};
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_report_counts_and_flags() {
        let store = InMemoryStore::new();
        let author = AuthorSpec {
            folder: "hume".to_string(),
            name: "David Hume".to_string(),
            figure_id: "hume".to_string(),
            domain: "philosophy".to_string(),
        };
        let meta = ChunkMetadata {
            author: author.name.clone(),
            figure_id: author.figure_id.clone(),
            title: "Treatise".to_string(),
            domain: "philosophy".to_string(),
            significance: "VERBATIM_TEXT".to_string(),
            position_id: None,
        };
        let doc = Document::new(&author, "Treatise", "hume/Treatise.txt", "body");
        let mut chunks: Vec<Chunk> = (0..5)
            .map(|i| Chunk::new(&doc.id, i, &format!("impressions {}", i), meta.clone()))
            .collect();
        chunks[0].embedding = Some(vec![1.0]);
        store.insert_chunks(&chunks).await.unwrap();

        store
            .record_flag(&ContaminationFlag {
                source_file: "hume/Other.txt".to_string(),
                reason: "Contains \"by Hobbes\"".to_string(),
                matched_author: "Hobbes".to_string(),
            })
            .await
            .unwrap();
        store
            .record_flag(&ContaminationFlag {
                source_file: "kant/Other.txt".to_string(),
                reason: "x".to_string(),
                matched_author: "Mill".to_string(),
            })
            .await
            .unwrap();

        let report = verify_author(&store, &author, 3).await.unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.chunks, 5);
        assert_eq!(report.embedded, 1);
        assert_eq!(report.samples.len(), 3);
        assert_eq!(report.open_flags.len(), 1);
        assert_eq!(report.open_flags[0].flag.matched_author, "Hobbes");
    }
}
