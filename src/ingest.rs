//! Ingestion pipeline orchestration.
//!
//! Each file moves through a fixed sequence of stages:
//!
//! ```text
//! New → DedupCheck ─┬─→ Skipped
//!                   └─→ ContamCheck ─┬─→ Flagged
//!                                    └─→ Chunking → Embedding → Upserting → Done
//! ```
//!
//! with `Error` reachable from every non-terminal stage. Stages report
//! expected outcomes (skip, flag, empty file) as [`StageOutcome`] values;
//! `Err` is reserved for genuine failures. Every file ends in exactly one
//! [`IngestStatus`] and produces exactly one log entry.
//!
//! Embedding batches of one file run with at most `embedding.concurrency`
//! requests in flight, but results are consumed in text order and
//! inserted as soon as they arrive, so a failure keeps every batch before
//! it. The document is marked complete only after the last batch; the
//! next run resumes an incomplete document from its next chunk index.

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunk::Passages;
use crate::config::Config;
use crate::contamination::ContaminationDetector;
use crate::dedup::{DedupDecision, DedupGuard};
use crate::embedding::EmbeddingClient;
use crate::ingest_log::{FileLogSink, LogSink};
use crate::models::{
    AuthorSpec, Chunk, ChunkMetadata, Document, FlagState, IngestStatus, IngestionLogEntry,
};
use crate::sources::{self, FileKind, SourceFile};
use crate::store::{SqliteStore, VectorStore};

/// Position of a file in the pipeline, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    New,
    DedupCheck,
    ContamCheck,
    Chunking,
    Embedding,
    Upserting,
    Done,
    Skipped,
    Flagged,
    Error,
}

/// Result of a single stage: carry on with a value, or stop with a
/// terminal outcome.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Proceed(T),
    Finish(FileOutcome),
}

/// Terminal result of processing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub source_file: String,
    pub status: IngestStatus,
    /// Chunks inserted by this attempt.
    pub chunk_count: usize,
    pub message: Option<String>,
}

impl FileOutcome {
    fn new(file: &SourceFile, status: IngestStatus, chunk_count: usize, message: Option<String>) -> Self {
        Self {
            source_file: file.relative.clone(),
            status,
            chunk_count,
            message,
        }
    }
}

/// Aggregate counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub success: usize,
    pub skipped: usize,
    pub flagged: usize,
    pub errors: usize,
    pub chunks_written: usize,
    pub outcomes: Vec<FileOutcome>,
}

impl RunSummary {
    pub fn files(&self) -> usize {
        self.success + self.skipped + self.flagged + self.errors
    }

    pub fn add(&mut self, outcome: FileOutcome) {
        match outcome.status {
            IngestStatus::Success => self.success += 1,
            IngestStatus::Skipped => self.skipped += 1,
            IngestStatus::Flagged => self.flagged += 1,
            IngestStatus::Error => self.errors += 1,
        }
        self.chunks_written += outcome.chunk_count;
        self.outcomes.push(outcome);
    }

    pub fn merge(&mut self, other: RunSummary) {
        for outcome in other.outcomes {
            self.add(outcome);
        }
    }
}

/// Drives files through the pipeline and records their outcomes.
pub struct Ingestor {
    config: Config,
    store: Arc<dyn VectorStore>,
    client: EmbeddingClient,
    detector: ContaminationDetector,
    dedup: DedupGuard,
    log: Arc<dyn LogSink>,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        store: Arc<dyn VectorStore>,
        client: EmbeddingClient,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            config: config.clone(),
            dedup: DedupGuard::new(store.clone()),
            detector: ContaminationDetector::from_config(&config.contamination),
            store,
            client,
            log,
        }
    }

    /// Ingest every configured author in table order. Authors whose
    /// folder is missing are reported and skipped.
    pub async fn ingest_all(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for author in &self.config.authors {
            if !sources::author_dir(&self.config, author).is_dir() {
                warn!(
                    "[{}] folder {} not found, skipping",
                    author.figure_id,
                    sources::author_dir(&self.config, author).display()
                );
                continue;
            }
            summary.merge(self.ingest_author(author).await?);
        }
        Ok(summary)
    }

    /// Ingest the author configured for `folder`.
    pub async fn ingest_folder(&self, folder: &str) -> Result<RunSummary> {
        let Some(author) = self.config.author(folder) else {
            bail!("Unknown author folder: '{}'", folder);
        };
        self.ingest_author(author).await
    }

    /// Ingest every file of one author. Individual file failures are
    /// recorded in the summary; only setup problems return `Err`.
    pub async fn ingest_author(&self, author: &AuthorSpec) -> Result<RunSummary> {
        let files = sources::scan_author(&self.config, author)?;
        info!("[{}] {} files found", author.figure_id, files.len());

        if let Err(e) = self.log.begin_run(author) {
            warn!("[{}] failed to write log header: {:#}", author.figure_id, e);
        }

        let parallel = self.config.ingest.max_parallel_files.max(1);
        let outcomes: Vec<FileOutcome> = stream::iter(files.iter())
            .map(|file| self.ingest_file(author, file))
            .buffer_unordered(parallel)
            .collect()
            .await;

        let mut summary = RunSummary::default();
        for outcome in outcomes {
            summary.add(outcome);
        }

        if let Err(e) = self.log.end_run(author, &summary) {
            warn!("[{}] failed to write log summary: {:#}", author.figure_id, e);
        }
        info!(
            "[{}] done: {} success, {} skipped, {} flagged, {} errors, {} chunks",
            author.figure_id,
            summary.success,
            summary.skipped,
            summary.flagged,
            summary.errors,
            summary.chunks_written
        );
        Ok(summary)
    }

    /// Process one file to a terminal outcome and log it.
    pub async fn ingest_file(&self, author: &AuthorSpec, file: &SourceFile) -> FileOutcome {
        let mut written = 0usize;
        let outcome = match self.run_stages(author, file, &mut written).await {
            Ok(outcome) => outcome,
            Err(e) => {
                transition(file, IngestState::Error);
                FileOutcome::new(file, IngestStatus::Error, written, Some(format!("{:#}", e)))
            }
        };
        self.record(author, &outcome);
        outcome
    }

    async fn run_stages(
        &self,
        author: &AuthorSpec,
        file: &SourceFile,
        written: &mut usize,
    ) -> Result<FileOutcome> {
        transition(file, IngestState::New);
        let body = file.read_body().await?;
        let doc = Document::new(author, &file.title, &file.relative, &body);

        transition(file, IngestState::DedupCheck);
        let start_index = match self.dedup_stage(file, &doc).await? {
            StageOutcome::Proceed(index) => index,
            StageOutcome::Finish(outcome) => return Ok(outcome),
        };

        transition(file, IngestState::ContamCheck);
        if let StageOutcome::Finish(outcome) = self.contamination_stage(author, file, &body).await? {
            return Ok(outcome);
        }

        self.store.upsert_document(&doc).await?;

        transition(file, IngestState::Chunking);
        let chunks = self.chunk_stage(file, &doc, &body, start_index);
        if chunks.is_empty() {
            self.store.mark_document_complete(&doc.id).await?;
            transition(file, IngestState::Done);
            let message = (start_index > 0).then(|| format!("resumed at chunk {}, nothing left", start_index));
            return Ok(FileOutcome::new(file, IngestStatus::Success, 0, message));
        }

        transition(file, IngestState::Embedding);
        if let StageOutcome::Finish(outcome) = self.embed_stage(file, chunks, written).await? {
            return Ok(outcome);
        }

        transition(file, IngestState::Upserting);
        self.store.mark_document_complete(&doc.id).await?;

        transition(file, IngestState::Done);
        let message = (start_index > 0).then(|| format!("resumed at chunk {}", start_index));
        Ok(FileOutcome::new(file, IngestStatus::Success, *written, message))
    }

    async fn dedup_stage(&self, file: &SourceFile, doc: &Document) -> Result<StageOutcome<i64>> {
        Ok(match self.dedup.check(doc).await? {
            DedupDecision::New => StageOutcome::Proceed(0),
            DedupDecision::Resume { next_index } => {
                info!("{}: resuming at chunk {}", file.relative, next_index);
                StageOutcome::Proceed(next_index)
            }
            DedupDecision::AlreadyIngested { reason } => {
                transition(file, IngestState::Skipped);
                StageOutcome::Finish(FileOutcome::new(file, IngestStatus::Skipped, 0, Some(reason)))
            }
        })
    }

    async fn contamination_stage(
        &self,
        author: &AuthorSpec,
        file: &SourceFile,
        body: &str,
    ) -> Result<StageOutcome<()>> {
        let state = self.store.flag_state(&file.relative).await?;
        if state == Some(FlagState::Cleared) {
            debug!("{}: contamination flag cleared, not screening", file.relative);
            return Ok(StageOutcome::Proceed(()));
        }

        if let Some(mut flag) = self.detector.detect(body, &author.name) {
            flag.source_file = file.relative.clone();
            self.store.record_flag(&flag).await?;
            transition(file, IngestState::Flagged);
            return Ok(StageOutcome::Finish(FileOutcome::new(
                file,
                IngestStatus::Flagged,
                0,
                Some(flag.reason),
            )));
        }

        if state == Some(FlagState::Open) {
            transition(file, IngestState::Flagged);
            return Ok(StageOutcome::Finish(FileOutcome::new(
                file,
                IngestStatus::Flagged,
                0,
                Some("open contamination flag awaiting review".to_string()),
            )));
        }

        Ok(StageOutcome::Proceed(()))
    }

    /// Chunks from `start_index` onward, with metadata attached.
    fn chunk_stage(&self, file: &SourceFile, doc: &Document, body: &str, start_index: i64) -> Vec<Chunk> {
        let skip = usize::try_from(start_index).unwrap_or(0);
        let significance = file.kind.significance(&self.config.ingest.significance);
        let base = ChunkMetadata {
            author: doc.author.clone(),
            figure_id: doc.figure_id.clone(),
            title: doc.title.clone(),
            domain: doc.domain.clone(),
            significance,
            position_id: None,
        };

        match file.kind {
            FileKind::Text => Passages::new(body, &self.config.chunking)
                .resume_from(skip)
                .map(|p| Chunk::new(&doc.id, p.index as i64, &p.text, base.clone()))
                .collect(),
            FileKind::Positions | FileKind::Quotes => {
                let prefix = if file.kind == FileKind::Positions { "pos" } else { "quote" };
                let min_entry_chars = self.config.chunking.min_entry_chars;
                sources::parse_entries(body)
                    .into_iter()
                    .filter(|entry| entry.content.chars().count() >= min_entry_chars)
                    .enumerate()
                    .skip(skip)
                    .map(|(i, entry)| {
                        let mut meta = base.clone();
                        if let Some(topic) = entry.topic {
                            meta.domain = topic;
                        }
                        meta.position_id = Some(format!("{}-{}-{:04}", doc.figure_id, prefix, i));
                        Chunk::new(&doc.id, i as i64, &entry.content, meta)
                    })
                    .collect()
            }
        }
    }

    /// Embed and insert batches in order; stop at the first failed batch.
    async fn embed_stage(
        &self,
        file: &SourceFile,
        chunks: Vec<Chunk>,
        written: &mut usize,
    ) -> Result<StageOutcome<()>> {
        let batch_size = self.config.embedding.batch_size.max(1);
        let in_flight = self.config.embedding.concurrency.max(1);

        let mut batches: Vec<Vec<Chunk>> = Vec::new();
        let mut rest = chunks.into_iter().peekable();
        while rest.peek().is_some() {
            batches.push(rest.by_ref().take(batch_size).collect());
        }
        let total = batches.len();

        let client = &self.client;
        let mut results = stream::iter(batches)
            .map(|batch| async move {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let vectors = client.embed_batch(&texts).await;
                (batch, vectors)
            })
            .buffered(in_flight);

        let mut done = 0usize;
        while let Some((mut batch, vectors)) = results.next().await {
            let vectors = match vectors {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        "{}: embedding batch {}/{} failed: {}",
                        file.relative,
                        done + 1,
                        total,
                        e
                    );
                    return Ok(StageOutcome::Finish(FileOutcome::new(
                        file,
                        IngestStatus::Error,
                        *written,
                        Some(e.to_string()),
                    )));
                }
            };

            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                chunk.embedding = Some(vector);
            }
            *written += self.store.insert_chunks(&batch).await?;
            done += 1;
            debug!("{}: batch {}/{} stored", file.relative, done, total);
        }

        Ok(StageOutcome::Proceed(()))
    }

    fn record(&self, author: &AuthorSpec, outcome: &FileOutcome) {
        let entry = IngestionLogEntry {
            timestamp: chrono::Utc::now(),
            author: author.name.clone(),
            source_file: outcome.source_file.clone(),
            status: outcome.status,
            chunk_count: outcome.chunk_count,
            message: outcome.message.clone(),
        };

        match outcome.status {
            IngestStatus::Error => warn!(
                "[{}] {} {}: {}",
                author.figure_id,
                outcome.status,
                outcome.source_file,
                outcome.message.as_deref().unwrap_or("")
            ),
            _ => info!(
                "[{}] {} {} ({} chunks)",
                author.figure_id, outcome.status, outcome.source_file, outcome.chunk_count
            ),
        }

        if let Err(e) = self.log.record(&author.folder, &entry) {
            warn!("[{}] failed to append ingestion log: {:#}", author.figure_id, e);
        }
    }
}

/// CLI entry point for `ingest <folder|all>`.
pub async fn run_ingest(config: &Config, target: &str) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Ingestion requires embeddings. Set [embedding] provider in config.");
    }
    if target != "all" && config.author(target).is_none() {
        bail!(
            "Unknown author folder: '{}'. Run `corpus authors` to list configured folders.",
            target
        );
    }

    let client = EmbeddingClient::from_config(&config.embedding)?;
    let store = Arc::new(SqliteStore::open(config).await?);
    let log = Arc::new(FileLogSink::new(&config.ingest.log_dir)?);
    let ingestor = Ingestor::new(config, store.clone(), client, log);

    let summary = if target == "all" {
        ingestor.ingest_all().await?
    } else {
        ingestor.ingest_folder(target).await?
    };

    println!("ingest {}", target);
    println!("  files: {}", summary.files());
    println!("  success: {}", summary.success);
    println!("  skipped: {}", summary.skipped);
    println!("  flagged: {}", summary.flagged);
    println!("  errors: {}", summary.errors);
    println!("  chunks written: {}", summary.chunks_written);
    for outcome in &summary.outcomes {
        if matches!(outcome.status, IngestStatus::Flagged | IngestStatus::Error) {
            println!(
                "  {} {}: {}",
                outcome.status,
                outcome.source_file,
                outcome.message.as_deref().unwrap_or("")
            );
        }
    }
    println!("ok");

    store.pool().close().await;
    Ok(())
}

fn transition(file: &SourceFile, state: IngestState) {
    debug!("{} -> {:?}", file.relative, state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, ProviderError, RetryPolicy};
    use crate::ingest_log::MemoryLogSink;
    use crate::models::SearchFilters;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Deterministic 3-d embeddings; fails every call from `fail_from` on,
    /// and every call whose input contains `fail_on`.
    struct FakeProvider {
        calls: AtomicUsize,
        fail_from: Option<usize>,
        fail_on: Option<&'static str>,
    }

    impl FakeProvider {
        fn new(fail_from: Option<usize>, fail_on: Option<&'static str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_from,
                fail_on,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeProvider {
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            3
        }
        fn max_input_chars(&self) -> usize {
            8000
        }
        fn max_batch_items(&self) -> usize {
            64
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let marked = self
                .fail_on
                .is_some_and(|marker| texts.iter().any(|t| t.contains(marker)));
            if marked || self.fail_from.is_some_and(|n| call >= n) {
                return Err(ProviderError::Server {
                    status: 500,
                    message: "down".to_string(),
                });
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0, (t.len() % 7) as f32])
                .collect())
        }
    }

    fn config(root: &Path) -> Config {
        let text = format!(
            r#"
[db]
path = "{root}/db.sqlite"

[data]
root = "{root}/corpus"

[chunking]
target_tokens = 40
overlap_tokens = 5
min_chars = 1

[embedding]
batch_size = 1
concurrency = 1
max_attempts = 2
base_delay_ms = 1
max_delay_ms = 2

[[authors]]
folder = "kant"
name = "Immanuel Kant"
figure_id = "kant"
"#,
            root = root.display()
        );
        toml::from_str(&text).unwrap()
    }

    fn write_file(root: &Path, rel: &str, body: &str) {
        let path = root.join("corpus").join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn ingestor(
        cfg: &Config,
        store: Arc<InMemoryStore>,
        log: Arc<MemoryLogSink>,
        fail_from: Option<usize>,
    ) -> Ingestor {
        ingestor_with(cfg, store, log, FakeProvider::new(fail_from, None))
    }

    fn ingestor_with(
        cfg: &Config,
        store: Arc<InMemoryStore>,
        log: Arc<MemoryLogSink>,
        provider: FakeProvider,
    ) -> Ingestor {
        let provider = Arc::new(provider);
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        Ingestor::new(cfg, store, EmbeddingClient::new(provider, policy), log)
    }

    #[tokio::test]
    async fn test_ingest_then_skip() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        write_file(tmp.path(), "kant/Critique.txt", &words(100));

        let store = Arc::new(InMemoryStore::new());
        let log = Arc::new(MemoryLogSink::new());
        let ing = ingestor(&cfg, store.clone(), log.clone(), None);

        let first = ing.ingest_folder("kant").await.unwrap();
        assert_eq!(first.success, 1);
        assert_eq!(first.chunks_written, 3);

        let second = ing.ingest_folder("kant").await.unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.chunks_written, 0);
        assert_eq!(store.count_chunks(&SearchFilters::default()).await.unwrap(), 3);

        let entries = log.for_folder("kant");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].status, IngestStatus::Skipped);
        assert_eq!(entries[1].message.as_deref(), Some("already indexed"));
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_earlier_batches_and_resumes() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        write_file(tmp.path(), "kant/Critique.txt", &words(100));

        let store = Arc::new(InMemoryStore::new());
        let log = Arc::new(MemoryLogSink::new());

        // Calls 0 and 1 succeed, call 2 and its retry fail.
        let failing = ingestor(&cfg, store.clone(), log.clone(), Some(2));
        let summary = failing.ingest_folder("kant").await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.outcomes[0].chunk_count, 2);
        assert_eq!(store.count_chunks(&SearchFilters::default()).await.unwrap(), 2);

        let healthy = ingestor(&cfg, store.clone(), log.clone(), None);
        let summary = healthy.ingest_folder("kant").await.unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.chunks_written, 1);
        assert_eq!(store.count_chunks(&SearchFilters::default()).await.unwrap(), 3);

        let third = healthy.ingest_folder("kant").await.unwrap();
        assert_eq!(third.skipped, 1);
    }

    #[tokio::test]
    async fn test_contaminated_file_is_flagged_until_cleared() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        write_file(
            tmp.path(),
            "kant/Essay.txt",
            "On Liberty, by John Stuart Mill. The sole end for which mankind are warranted.",
        );

        let store = Arc::new(InMemoryStore::new());
        let log = Arc::new(MemoryLogSink::new());
        let ing = ingestor(&cfg, store.clone(), log.clone(), None);

        let summary = ing.ingest_folder("kant").await.unwrap();
        assert_eq!(summary.flagged, 1);
        assert_eq!(store.count_chunks(&SearchFilters::default()).await.unwrap(), 0);
        assert_eq!(
            store.flag_state("kant/Essay.txt").await.unwrap(),
            Some(FlagState::Open)
        );

        assert!(store.clear_flag("kant/Essay.txt").await.unwrap());
        let summary = ing.ingest_folder("kant").await.unwrap();
        assert_eq!(summary.success, 1);
        assert!(store.count_chunks(&SearchFilters::default()).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_empty_file_succeeds_with_zero_chunks() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        write_file(tmp.path(), "kant/Blank.txt", "   \n");

        let store = Arc::new(InMemoryStore::new());
        let log = Arc::new(MemoryLogSink::new());
        let summary = ingestor(&cfg, store, log, None)
            .ingest_folder("kant")
            .await
            .unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.chunks_written, 0);
    }

    #[tokio::test]
    async fn test_positions_file_one_chunk_per_entry() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        write_file(
            tmp.path(),
            "kant/kant_positions_core.txt",
            "kant | Act only on maxims you could will as law. | ethics\nkant | Space is a form of intuition. | epistemology\n",
        );

        let store = Arc::new(InMemoryStore::new());
        let log = Arc::new(MemoryLogSink::new());
        let summary = ingestor(&cfg, store.clone(), log, None)
            .ingest_folder("kant")
            .await
            .unwrap();
        assert_eq!(summary.chunks_written, 2);

        let ethics = SearchFilters {
            domain: Some("ethics".to_string()),
            ..Default::default()
        };
        let sample = store.sample_chunks(&ethics, 10).await.unwrap();
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].metadata.significance, "POSITION");
        assert_eq!(sample[0].metadata.position_id.as_deref(), Some("kant-pos-0000"));
    }

    #[tokio::test]
    async fn test_short_entries_are_dropped_before_indexing() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        write_file(
            tmp.path(),
            "kant/kant_quotes.txt",
            "kant | Too short. | ethics\nkant | Sapere aude, dare to know. | ethics\nkant | Ought implies can. | ethics\n",
        );

        let store = Arc::new(InMemoryStore::new());
        let log = Arc::new(MemoryLogSink::new());
        let summary = ingestor(&cfg, store.clone(), log, None)
            .ingest_folder("kant")
            .await
            .unwrap();
        assert_eq!(summary.chunks_written, 2);

        let mut stored = store
            .sample_chunks(&SearchFilters::figure("kant"), 10)
            .await
            .unwrap();
        stored.sort_by_key(|c| c.chunk_index);
        let ids: Vec<_> = stored
            .iter()
            .map(|c| (c.chunk_index, c.metadata.position_id.clone().unwrap()))
            .collect();
        assert_eq!(
            ids,
            vec![
                (0, "kant-quote-0000".to_string()),
                (1, "kant-quote-0001".to_string())
            ]
        );
        assert_eq!(stored[0].text, "Sapere aude, dare to know.");
    }

    #[tokio::test]
    async fn test_concurrent_batches_keep_prefix_before_failure() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(tmp.path());
        cfg.embedding.concurrency = 3;
        let body: String = (0..6)
            .map(|i| {
                let marker = if i == 3 { " FAIL" } else { "" };
                format!("kant | Entry number {} on pure reason{}. | logic\n", i, marker)
            })
            .collect();
        write_file(tmp.path(), "kant/kant_positions.txt", &body);

        let store = Arc::new(InMemoryStore::new());
        let log = Arc::new(MemoryLogSink::new());
        let filters = SearchFilters::figure("kant");

        let failing = ingestor_with(
            &cfg,
            store.clone(),
            log.clone(),
            FakeProvider::new(None, Some("FAIL")),
        );
        let summary = failing.ingest_folder("kant").await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.outcomes[0].chunk_count, 3);

        let mut indices: Vec<i64> = store
            .sample_chunks(&filters, 10)
            .await
            .unwrap()
            .iter()
            .map(|c| c.chunk_index)
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);

        let healthy = ingestor(&cfg, store.clone(), log.clone(), None);
        let summary = healthy.ingest_folder("kant").await.unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.chunks_written, 3);
        assert_eq!(
            summary.outcomes[0].message.as_deref(),
            Some("resumed at chunk 3")
        );

        let mut indices: Vec<i64> = store
            .sample_chunks(&filters, 10)
            .await
            .unwrap()
            .iter()
            .map(|c| c.chunk_index)
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_parallel_files_each_get_one_outcome() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(tmp.path());
        cfg.ingest.max_parallel_files = 2;
        cfg.embedding.concurrency = 2;
        for title in ["Critique", "Groundwork", "Prolegomena", "Anthropology"] {
            let body = format!("{} {}", title.to_lowercase(), words(100));
            write_file(tmp.path(), &format!("kant/{}.txt", title), &body);
        }

        let store = Arc::new(InMemoryStore::new());
        let log = Arc::new(MemoryLogSink::new());
        let ing = ingestor(&cfg, store.clone(), log.clone(), None);

        let summary = ing.ingest_folder("kant").await.unwrap();
        assert_eq!(summary.files(), 4);
        assert_eq!(summary.success, 4);
        assert_eq!(summary.chunks_written, 12);
        assert_eq!(store.count_chunks(&SearchFilters::default()).await.unwrap(), 12);

        let mut logged: Vec<String> = log
            .for_folder("kant")
            .into_iter()
            .map(|e| e.source_file)
            .collect();
        logged.sort();
        assert_eq!(
            logged,
            vec![
                "kant/Anthropology.txt",
                "kant/Critique.txt",
                "kant/Groundwork.txt",
                "kant/Prolegomena.txt"
            ]
        );

        let again = ing.ingest_folder("kant").await.unwrap();
        assert_eq!(again.skipped, 4);
    }

    #[tokio::test]
    async fn test_unknown_folder_is_setup_error() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        let ing = ingestor(
            &cfg,
            Arc::new(InMemoryStore::new()),
            Arc::new(MemoryLogSink::new()),
            None,
        );
        assert!(ing.ingest_folder("hegel").await.is_err());
        // Configured but missing on disk: skipped by ingest_all.
        assert_eq!(ing.ingest_all().await.unwrap().files(), 0);
    }

    #[test]
    fn test_summary_counts() {
        let file = SourceFile {
            path: "x".into(),
            relative: "kant/x.txt".to_string(),
            title: "x".to_string(),
            kind: FileKind::Text,
        };
        let mut summary = RunSummary::default();
        summary.add(FileOutcome::new(&file, IngestStatus::Success, 4, None));
        summary.add(FileOutcome::new(&file, IngestStatus::Error, 1, None));
        summary.add(FileOutcome::new(&file, IngestStatus::Flagged, 0, None));
        assert_eq!(summary.files(), 3);
        assert_eq!(summary.chunks_written, 5);
        assert_eq!(summary.errors, 1);
    }
}
