//! End-to-end ingestion and retrieval over a real SQLite store.

use async_trait::async_trait;
use corpus_harness::config::{load_config, Config};
use corpus_harness::embedding::{EmbeddingClient, EmbeddingProvider, ProviderError, RetryPolicy};
use corpus_harness::ingest::Ingestor;
use corpus_harness::ingest_log::FileLogSink;
use corpus_harness::models::{FlagState, IngestStatus, SearchFilters};
use corpus_harness::search::Retriever;
use corpus_harness::store::{SqliteStore, VectorStore};
use corpus_harness::verify::verify_author;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Embeds by keyword: texts about "virtue" point one way, everything
/// else the other. Can be switched into a failing mode.
struct KeywordProvider {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl KeywordProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    fn model_name(&self) -> &str {
        "keyword"
    }
    fn dims(&self) -> usize {
        2
    }
    fn max_input_chars(&self) -> usize {
        8000
    }
    fn max_batch_items(&self) -> usize {
        32
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) && call > 0 {
            return Err(ProviderError::Server {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        Ok(texts
            .iter()
            .map(|t| {
                if t.contains("virtue") {
                    vec![1.0, 0.1]
                } else {
                    vec![0.1, 1.0]
                }
            })
            .collect())
    }
}

fn words(prefix: &str, n: usize) -> String {
    (0..n)
        .map(|i| format!("{}{}", prefix, i))
        .collect::<Vec<_>>()
        .join(" ")
}

fn setup(root: &Path) -> Config {
    let corpus = root.join("corpus");
    fs::create_dir_all(corpus.join("aristotle")).unwrap();
    fs::create_dir_all(corpus.join("nietzsche")).unwrap();

    let config_path = root.join("corpus.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[db]
path = "{root}/corpus.sqlite"

[data]
root = "{root}/corpus"

[embedding]
batch_size = 1
concurrency = 1
max_attempts = 2
base_delay_ms = 1
max_delay_ms = 2

[ingest]
log_dir = "{root}/logs"

[[authors]]
folder = "aristotle"
name = "Aristotle"
figure_id = "aristotle"

[[authors]]
folder = "nietzsche"
name = "Friedrich Nietzsche"
figure_id = "nietzsche"
"#,
            root = root.display()
        ),
    )
    .unwrap();
    load_config(&config_path).unwrap()
}

struct Harness {
    store: Arc<SqliteStore>,
    ingestor: Ingestor,
    log: Arc<FileLogSink>,
    provider: Arc<KeywordProvider>,
    client: EmbeddingClient,
}

async fn harness(config: &Config) -> Harness {
    let store = Arc::new(SqliteStore::open(config).await.unwrap());
    let provider = KeywordProvider::new();
    let client = EmbeddingClient::new(
        provider.clone(),
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
    );
    let log = Arc::new(FileLogSink::new(&config.ingest.log_dir).unwrap());
    let ingestor = Ingestor::new(config, store.clone(), client.clone(), log.clone());
    Harness {
        store,
        ingestor,
        log,
        provider,
        client,
    }
}

#[tokio::test]
async fn test_thousand_word_file_is_three_chunks_then_skipped() {
    let tmp = TempDir::new().unwrap();
    let config = setup(tmp.path());
    fs::write(
        config.data.root.join("aristotle/Nicomachean_Ethics.txt"),
        words("virtue", 1000),
    )
    .unwrap();
    let h = harness(&config).await;

    let first = h.ingestor.ingest_folder("aristotle").await.unwrap();
    assert_eq!(first.success, 1);
    assert_eq!(first.chunks_written, 3);

    let filters = SearchFilters::figure("aristotle");
    assert_eq!(h.store.count_chunks(&filters).await.unwrap(), 3);
    let stored = h.store.sample_chunks(&filters, 10).await.unwrap();
    assert!(stored.iter().all(|c| c.metadata.title == "Nicomachean Ethics"));
    assert!(stored.iter().all(|c| c.embedding.as_deref() == Some(&[1.0, 0.1][..])));

    let second = h.ingestor.ingest_folder("aristotle").await.unwrap();
    assert_eq!(second.skipped, 1);
    assert_eq!(second.chunks_written, 0);
    assert_eq!(h.store.count_chunks(&filters).await.unwrap(), 3);

    let log = fs::read_to_string(h.log.path_for("aristotle")).unwrap();
    let lines: Vec<&str> = log.lines().filter(|l| l.starts_with('[')).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("SUCCESS | Aristotle | aristotle/Nicomachean_Ethics.txt | 3 chunks"));
    assert!(lines[1].contains("SKIPPED"));
    assert!(lines[1].ends_with("already indexed"));
}

#[tokio::test]
async fn test_search_respects_author_filter() {
    let tmp = TempDir::new().unwrap();
    let config = setup(tmp.path());
    fs::write(
        config.data.root.join("aristotle/Ethics.txt"),
        words("virtue", 300),
    )
    .unwrap();
    fs::write(
        config.data.root.join("nietzsche/Genealogy.txt"),
        words("virtue", 300),
    )
    .unwrap();
    fs::write(
        config.data.root.join("nietzsche/Zarathustra.txt"),
        words("overman", 300),
    )
    .unwrap();
    let h = harness(&config).await;

    let summary = h.ingestor.ingest_all().await.unwrap();
    assert_eq!(summary.success, 3);

    let retriever = Retriever::new(h.store.clone(), h.client.clone());
    let hits = retriever
        .search("what is virtue", &SearchFilters::author("Nietzsche"), 5)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|hit| hit.metadata.figure_id == "nietzsche"));
    assert_eq!(hits[0].metadata.title, "Genealogy");
    assert!(hits[0].distance <= hits[1].distance);

    let none = retriever
        .search("virtue", &SearchFilters::author("Spinoza"), 5)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_failed_batch_keeps_prefix_and_resumes() {
    let tmp = TempDir::new().unwrap();
    let config = setup(tmp.path());
    fs::write(
        config.data.root.join("aristotle/Politics.txt"),
        words("polis", 1000),
    )
    .unwrap();
    let h = harness(&config).await;
    let filters = SearchFilters::figure("aristotle");

    h.provider.failing.store(true, Ordering::SeqCst);
    let failed = h.ingestor.ingest_folder("aristotle").await.unwrap();
    assert_eq!(failed.errors, 1);
    assert_eq!(failed.chunks_written, 1);
    assert_eq!(h.store.count_chunks(&filters).await.unwrap(), 1);

    h.provider.failing.store(false, Ordering::SeqCst);
    let resumed = h.ingestor.ingest_folder("aristotle").await.unwrap();
    assert_eq!(resumed.success, 1);
    assert_eq!(resumed.chunks_written, 2);
    assert_eq!(h.store.count_chunks(&filters).await.unwrap(), 3);
    assert_eq!(
        resumed.outcomes[0].message.as_deref(),
        Some("resumed at chunk 1")
    );

    let again = h.ingestor.ingest_folder("aristotle").await.unwrap();
    assert_eq!(again.skipped, 1);
}

#[tokio::test]
async fn test_contaminated_file_waits_for_review() {
    let tmp = TempDir::new().unwrap();
    let config = setup(tmp.path());
    let body = format!(
        "{} Mill argues. Mill insists. Mill replies. Mill concludes. Mill again.",
        words("ethos", 200)
    );
    fs::write(config.data.root.join("aristotle/Commentary.txt"), body).unwrap();
    let h = harness(&config).await;

    let flagged = h.ingestor.ingest_folder("aristotle").await.unwrap();
    assert_eq!(flagged.flagged, 1);
    assert_eq!(h.store.count_chunks(&SearchFilters::default()).await.unwrap(), 0);
    assert_eq!(
        h.store.flag_state("aristotle/Commentary.txt").await.unwrap(),
        Some(FlagState::Open)
    );

    let still = h.ingestor.ingest_folder("aristotle").await.unwrap();
    assert_eq!(still.flagged, 1);

    assert!(h.store.clear_flag("aristotle/Commentary.txt").await.unwrap());
    let cleared = h.ingestor.ingest_folder("aristotle").await.unwrap();
    assert_eq!(cleared.success, 1);
    assert!(cleared.chunks_written > 0);

    let report = verify_author(
        h.store.as_ref(),
        config.author("aristotle").unwrap(),
        3,
    )
    .await
    .unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks, report.embedded);
    assert!(report.open_flags.is_empty());

    let log = fs::read_to_string(h.log.path_for("aristotle")).unwrap();
    assert_eq!(log.matches("FLAGGED").count(), 2);
}

#[tokio::test]
async fn test_same_text_under_second_title_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let config = setup(tmp.path());
    let text = words("telos", 200);
    fs::write(config.data.root.join("aristotle/Physics.txt"), &text).unwrap();
    fs::write(config.data.root.join("aristotle/Physics_copy.txt"), &text).unwrap();
    let h = harness(&config).await;

    let summary = h.ingestor.ingest_folder("aristotle").await.unwrap();
    assert_eq!(summary.success, 1);
    assert_eq!(summary.skipped, 1);
    let skipped = summary
        .outcomes
        .iter()
        .find(|o| o.status == IngestStatus::Skipped)
        .unwrap();
    assert_eq!(skipped.source_file, "aristotle/Physics_copy.txt");
    assert!(skipped
        .message
        .as_deref()
        .unwrap()
        .contains("duplicate content"));
}

#[tokio::test]
async fn test_same_title_in_subfolders_are_separate_documents() {
    let tmp = TempDir::new().unwrap();
    let config = setup(tmp.path());
    let nested = config.data.root.join("aristotle/jowett");
    fs::create_dir_all(&nested).unwrap();
    fs::write(config.data.root.join("aristotle/Republic.txt"), words("alpha", 200)).unwrap();
    fs::write(nested.join("Republic.txt"), words("beta", 200)).unwrap();
    let h = harness(&config).await;

    let summary = h.ingestor.ingest_folder("aristotle").await.unwrap();
    assert_eq!(summary.success, 2);
    assert_eq!(summary.skipped, 0);

    let filters = SearchFilters::figure("aristotle");
    assert_eq!(h.store.count_documents(&filters).await.unwrap(), 2);
    let stored = h.store.sample_chunks(&filters, 10).await.unwrap();
    assert!(stored.iter().any(|c| c.text.starts_with("alpha0")));
    assert!(stored.iter().any(|c| c.text.starts_with("beta0")));
    assert!(stored.iter().all(|c| c.metadata.title == "Republic"));

    let again = h.ingestor.ingest_folder("aristotle").await.unwrap();
    assert_eq!(again.skipped, 2);
}
