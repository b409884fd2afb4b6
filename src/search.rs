//! Filtered nearest-neighbour retrieval over ingested chunks.
//!
//! The query is embedded with the same client used for ingestion, then
//! the store returns the `k` closest chunks that satisfy every filter.
//! A filter that matches nothing yields no results; it is never dropped
//! to widen the search.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::models::{SearchFilters, SearchHit};
use crate::store::{SqliteStore, VectorStore};

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    client: EmbeddingClient,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, client: EmbeddingClient) -> Self {
        Self { store, client }
    }

    /// The `k` chunks closest to `query` among those matching `filters`,
    /// nearest first. An empty query or `k == 0` returns nothing without
    /// calling the provider.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.client.embed_query(query).await?;
        let hits = self.store.vector_search(&vector, filters, k).await?;
        debug!(k, hits = hits.len(), filtered = !filters.is_empty(), "vector search");
        Ok(hits)
    }
}

pub async fn run_search(
    config: &Config,
    query: &str,
    filters: SearchFilters,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let client = EmbeddingClient::from_config(&config.embedding)?;
    let store = Arc::new(SqliteStore::open(config).await?);
    let retriever = Retriever::new(store.clone(), client);

    let k = limit.unwrap_or(config.retrieval.default_k);
    let hits = retriever.search(query, &filters, k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        store.pool().close().await;
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        store.pool().close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} / {}",
            i + 1,
            hit.distance,
            hit.metadata.author,
            hit.metadata.title
        );
        println!(
            "    figure: {}  domain: {}  chunk: {}",
            hit.metadata.figure_id, hit.metadata.domain, hit.chunk_index
        );
        println!(
            "    excerpt: \"{}\"",
            excerpt(&hit.text, 240).replace('\n', " ").trim()
        );
        println!("    id: {}", hit.chunk_id);
        println!();
    }

    store.pool().close().await;
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let cut = crate::embedding::truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        cut.to_string()
    }
}
