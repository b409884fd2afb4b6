use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::AuthorSpec;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub contamination: ContaminationConfig,
    #[serde(default)]
    pub authors: Vec<AuthorSpec>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    /// Positions/quotes entries with fewer characters are dropped.
    #[serde(default = "default_min_entry_chars")]
    pub min_entry_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap(),
            min_chars: default_min_chars(),
            min_entry_chars: default_min_entry_chars(),
        }
    }
}

fn default_target_tokens() -> usize {
    400
}
fn default_overlap() -> usize {
    50
}
fn default_min_chars() -> usize {
    100
}
fn default_min_entry_chars() -> usize {
    11
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Chunks per embedding request issued by the ingestor.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Provider ceiling on inputs per call.
    #[serde(default = "default_max_batch_items")]
    pub max_batch_items: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Embedding requests in flight per file.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_batch_items: default_max_batch_items(),
            max_input_chars: default_max_input_chars(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            requests_per_minute: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    16
}
fn default_max_batch_items() -> usize {
    2048
}
fn default_max_input_chars() -> usize {
    8000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    32_000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_concurrency() -> usize {
    2
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
        }
    }
}

fn default_k() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_parallel_files")]
    pub max_parallel_files: usize,
    #[serde(default = "default_significance")]
    pub significance: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            max_parallel_files: default_parallel_files(),
            significance: default_significance(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
fn default_parallel_files() -> usize {
    1
}
fn default_significance() -> String {
    "VERBATIM_TEXT".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContaminationConfig {
    #[serde(default = "default_mention_threshold")]
    pub mention_threshold: usize,
    #[serde(default = "default_known_authors")]
    pub known_authors: Vec<String>,
    /// Match names only as whole words instead of anywhere in the text.
    #[serde(default)]
    pub whole_words: bool,
}

impl Default for ContaminationConfig {
    fn default() -> Self {
        Self {
            mention_threshold: default_mention_threshold(),
            known_authors: default_known_authors(),
            whole_words: false,
        }
    }
}

fn default_mention_threshold() -> usize {
    5
}

fn default_known_authors() -> Vec<String> {
    [
        "Mill",
        "John Stuart Mill",
        "Dewey",
        "John Dewey",
        "Plutarch",
        "Mises",
        "Ludwig von Mises",
        "Ricardo",
        "David Ricardo",
        "Bentham",
        "Jeremy Bentham",
        "Hobbes",
        "Thomas Hobbes",
        "Bacon",
        "Francis Bacon",
        "Montesquieu",
        "Voltaire",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Look up an author by folder name.
    pub fn author(&self, folder: &str) -> Option<&AuthorSpec> {
        self.authors.iter().find(|a| a.folder == folder)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.target_tokens == 0 {
        anyhow::bail!("chunking.target_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.target_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < chunking.target_tokens");
    }

    // Validate retrieval
    if config.retrieval.default_k == 0 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }

    // Validate embedding
    let emb = &config.embedding;
    if emb.is_enabled() {
        if emb.dims.is_none() || emb.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                emb.provider
            );
        }
        if emb.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                emb.provider
            );
        }
    }
    if emb.batch_size == 0 || emb.max_batch_items == 0 {
        anyhow::bail!("embedding.batch_size and embedding.max_batch_items must be > 0");
    }
    if emb.max_attempts == 0 {
        anyhow::bail!("embedding.max_attempts must be >= 1");
    }
    if emb.concurrency == 0 {
        anyhow::bail!("embedding.concurrency must be >= 1");
    }
    if emb.requests_per_minute == Some(0) {
        anyhow::bail!("embedding.requests_per_minute must be > 0 when set");
    }

    match emb.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.ingest.max_parallel_files == 0 {
        anyhow::bail!("ingest.max_parallel_files must be >= 1");
    }

    // Validate author table
    let mut seen = std::collections::HashSet::new();
    for author in &config.authors {
        if author.folder.trim().is_empty() || author.figure_id.trim().is_empty() {
            anyhow::bail!("authors entries need a non-empty folder and figure_id");
        }
        if !seen.insert(author.folder.as_str()) {
            anyhow::bail!("duplicate author folder: '{}'", author.folder);
        }
    }

    Ok(())
}
