//! Core data models used throughout Corpus Harness.
//!
//! These types represent the documents, chunks, audit records, and search
//! results that flow through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for the deterministic document and chunk UUIDs.
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_7a0e_3b5d_4e8a_9a1c_2f40_d7b3_8e61);

/// One row of the `[[authors]]` table: the canonical identity of a thinker
/// and the folder holding their texts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthorSpec {
    /// Folder name under `data.root` (e.g. `"plato"`).
    pub folder: String,
    /// Canonical display name (e.g. `"Plato"`).
    pub name: String,
    /// Stable identifier stored with every chunk (e.g. `"plato"`).
    pub figure_id: String,
    /// Domain tag stored with every chunk.
    #[serde(default = "default_domain")]
    pub domain: String,
}

fn default_domain() -> String {
    "philosophy".to_string()
}

/// A source document: one input file attributed to one author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub author: String,
    pub figure_id: String,
    pub domain: String,
    pub title: String,
    /// Path relative to the data root, e.g. `plato/Republic.txt`.
    pub source_file: String,
    pub content_hash: String,
}

impl Document {
    /// Build a document for `author`, deriving its id from
    /// `(figure_id, source_file)`. The title is display metadata only.
    pub fn new(author: &AuthorSpec, title: &str, source_file: &str, body: &str) -> Self {
        Self {
            id: document_id(&author.figure_id, source_file),
            author: author.name.clone(),
            figure_id: author.figure_id.clone(),
            domain: author.domain.clone(),
            title: title.to_string(),
            source_file: source_file.to_string(),
            content_hash: hash_text(body),
        }
    }
}

/// Metadata copied onto every chunk so filters never need a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    pub author: String,
    pub figure_id: String,
    pub title: String,
    pub domain: String,
    pub significance: String,
    pub position_id: Option<String>,
}

/// A chunk of a document's text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(document_id: &str, chunk_index: i64, text: &str, metadata: ChunkMetadata) -> Self {
        Self {
            id: chunk_id(document_id, chunk_index),
            document_id: document_id.to_string(),
            chunk_index,
            text: text.to_string(),
            hash: hash_text(text),
            embedding: None,
            metadata,
        }
    }
}

/// Terminal status of one file-processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Success,
    Skipped,
    Flagged,
    Error,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Success => "success",
            IngestStatus::Skipped => "skipped",
            IngestStatus::Flagged => "flagged",
            IngestStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record per file outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub source_file: String,
    pub status: IngestStatus,
    pub chunk_count: usize,
    pub message: Option<String>,
}

/// Suspected misattribution of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContaminationFlag {
    pub source_file: String,
    pub reason: String,
    pub matched_author: String,
}

/// Review state of a recorded flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState {
    /// Flag is open: the file stays blocked.
    Open,
    /// A reviewer cleared the flag: the detector is bypassed for the file.
    Cleared,
}

/// A stored flag together with its review state.
#[derive(Debug, Clone)]
pub struct FlagRecord {
    pub flag: ContaminationFlag,
    pub flagged_at: i64,
    pub state: FlagState,
}

/// Conjunctive metadata filters for retrieval and counting.
///
/// `author` and `title` match as case-insensitive substrings; `figure_id`
/// and `domain` match exactly. Unset fields do not constrain; a set
/// author or title that is blank after normalisation matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub author: Option<String>,
    pub figure_id: Option<String>,
    pub domain: Option<String>,
    pub title: Option<String>,
}

impl SearchFilters {
    pub fn author(name: &str) -> Self {
        Self {
            author: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn figure(figure_id: &str) -> Self {
        Self {
            figure_id: Some(figure_id.to_string()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.author.is_none()
            && self.figure_id.is_none()
            && self.domain.is_none()
            && self.title.is_none()
    }

    /// Whether a chunk's metadata satisfies every set filter.
    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        if let Some(ref author) = self.author {
            let needle = normalize_author_name(author);
            if needle.is_empty() || !normalize_author_name(&meta.author).contains(&needle) {
                return false;
            }
        }
        if let Some(ref figure) = self.figure_id {
            if &meta.figure_id != figure {
                return false;
            }
        }
        if let Some(ref domain) = self.domain {
            if &meta.domain != domain {
                return false;
            }
        }
        if let Some(ref title) = self.title {
            let needle = title.trim().to_lowercase();
            if needle.is_empty() || !meta.title.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// A retrieval result: a stored chunk and its distance from the query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance (`1 - cosine similarity`); lower is closer.
    pub distance: f64,
}

/// Normalize an author name for filter matching: lowercase, punctuation
/// other than hyphens removed, whitespace collapsed.
pub fn normalize_author_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | '\'' | '"' | ';' | ':'))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic document id for `(figure_id, source_file)`, where
/// `source_file` is the path relative to the data root.
pub fn document_id(figure_id: &str, source_file: &str) -> String {
    Uuid::new_v5(
        &ID_NAMESPACE,
        format!("{}\u{0}{}", figure_id, source_file).as_bytes(),
    )
    .to_string()
}

/// Deterministic chunk id for `(document_id, chunk_index)`.
pub fn chunk_id(document_id: &str, chunk_index: i64) -> String {
    Uuid::new_v5(
        &ID_NAMESPACE,
        format!("{}#{}", document_id, chunk_index).as_bytes(),
    )
    .to_string()
}

/// Hex SHA-256 of `text`.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(author: &str, figure: &str, domain: &str) -> ChunkMetadata {
        ChunkMetadata {
            author: author.to_string(),
            figure_id: figure.to_string(),
            title: "Republic".to_string(),
            domain: domain.to_string(),
            significance: "VERBATIM_TEXT".to_string(),
            position_id: None,
        }
    }

    #[test]
    fn test_ids_are_deterministic() {
        assert_eq!(
            document_id("plato", "plato/Republic.txt"),
            document_id("plato", "plato/Republic.txt")
        );
        assert_ne!(
            document_id("plato", "plato/Republic.txt"),
            document_id("plato", "plato/jowett/Republic.txt")
        );
        assert_ne!(chunk_id("d", 0), chunk_id("d", 1));
    }

    #[test]
    fn test_normalize_author_name() {
        assert_eq!(normalize_author_name("  J.-M.  Kuczynski "), "j-m kuczynski");
        assert_eq!(normalize_author_name("G.W.F. Hegel"), "gwf hegel");
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let m = meta("Friedrich Nietzsche", "nietzsche", "philosophy");
        assert!(SearchFilters::default().matches(&m));
        assert!(SearchFilters::author("nietzsche").matches(&m));
        assert!(!SearchFilters::author("Plato").matches(&m));

        let both = SearchFilters {
            author: Some("Nietzsche".to_string()),
            domain: Some("psychology".to_string()),
            ..Default::default()
        };
        assert!(!both.matches(&m));
    }

    #[test]
    fn test_figure_filter_is_exact() {
        let m = meta("William James", "james", "psychology");
        assert!(SearchFilters::figure("james").matches(&m));
        assert!(!SearchFilters::figure("james-allen").matches(&m));
    }

    #[test]
    fn test_blank_author_or_title_matches_nothing() {
        let m = meta("William James", "james", "psychology");
        assert!(!SearchFilters::author(".").matches(&m));
        assert!(!SearchFilters::author("  ").matches(&m));

        let blank_title = SearchFilters {
            title: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(!blank_title.matches(&m));
    }
}
