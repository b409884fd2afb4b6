//! Misattribution screening.
//!
//! A file filed under one author is suspicious when it keeps naming some
//! other author, or carries an explicit `by <author>` byline. This is a
//! heuristic: it produces false positives (commentary that quotes a rival
//! at length) and false negatives (unattributed anthologies), so both the
//! mention threshold and the name list come from configuration.
//!
//! Names match anywhere in the text by default, so short names like
//! "Mill" also hit "Millers"; `whole_words` narrows that.

use anyhow::{bail, Result};
use regex::Regex;

use crate::config::{Config, ContaminationConfig};
use crate::models::{ContaminationFlag, FlagState};
use crate::store::{SqliteStore, VectorStore};

struct NamePattern {
    name: String,
    mention: Regex,
    byline: Regex,
}

/// Detector compiled once from the configured name list.
pub struct ContaminationDetector {
    patterns: Vec<NamePattern>,
    threshold: usize,
}

impl ContaminationDetector {
    /// Case-insensitive substring matching, so "Mill" also counts
    /// "Millian".
    pub fn new(known_authors: &[String], threshold: usize) -> Self {
        Self::build(known_authors, threshold, false)
    }

    /// Like [`ContaminationDetector::new`] but names only match as whole
    /// words.
    pub fn whole_words(known_authors: &[String], threshold: usize) -> Self {
        Self::build(known_authors, threshold, true)
    }

    pub fn from_config(config: &ContaminationConfig) -> Self {
        Self::build(
            &config.known_authors,
            config.mention_threshold,
            config.whole_words,
        )
    }

    fn build(known_authors: &[String], threshold: usize, whole_words: bool) -> Self {
        let patterns = known_authors
            .iter()
            .filter(|n| !n.trim().is_empty())
            .filter_map(|name| compile(name, whole_words))
            .collect();
        Self {
            patterns,
            threshold: threshold.max(1),
        }
    }

    /// Screen `text` filed under `expected_author`.
    ///
    /// Names contained in the expected author's own name are ignored, so
    /// "Mill" never flags a text by "John Stuart Mill".
    pub fn detect(&self, text: &str, expected_author: &str) -> Option<ContaminationFlag> {
        let expected = expected_author.to_lowercase();

        for pattern in &self.patterns {
            if expected.contains(&pattern.name.to_lowercase()) {
                continue;
            }

            let mentions = pattern.mention.find_iter(text).count();
            if mentions >= self.threshold {
                return Some(ContaminationFlag {
                    source_file: String::new(),
                    reason: format!(
                        "Contains {} mentions of \"{}\" - possible misattribution",
                        mentions, pattern.name
                    ),
                    matched_author: pattern.name.clone(),
                });
            }

            if pattern.byline.is_match(text) {
                return Some(ContaminationFlag {
                    source_file: String::new(),
                    reason: format!("Contains \"by {}\" - likely wrong author", pattern.name),
                    matched_author: pattern.name.clone(),
                });
            }
        }

        None
    }
}

/// One-shot form of [`ContaminationDetector::detect`].
pub fn detect(
    text: &str,
    expected_author: &str,
    known_authors: &[String],
    threshold: usize,
) -> Option<ContaminationFlag> {
    ContaminationDetector::new(known_authors, threshold).detect(text, expected_author)
}

/// CLI entry point for `flags list`.
pub async fn run_list_flags(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let flags = store.list_flags().await?;
    if flags.is_empty() {
        println!("No contamination flags.");
    }
    for record in &flags {
        let state = match record.state {
            FlagState::Open => "OPEN",
            FlagState::Cleared => "CLEARED",
        };
        let when = chrono::DateTime::from_timestamp(record.flagged_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:<8} {}  {}  [{}] {}",
            state, when, record.flag.source_file, record.flag.matched_author, record.flag.reason
        );
    }
    store.pool().close().await;
    Ok(())
}

/// CLI entry point for `flags clear <file>`.
pub async fn run_clear_flag(config: &Config, source_file: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let cleared = store.clear_flag(source_file).await?;
    store.pool().close().await;
    if !cleared {
        bail!("No open contamination flag for '{}'", source_file);
    }
    println!("Cleared flag for {}. The next ingest run will index it.", source_file);
    Ok(())
}

fn compile(name: &str, whole_words: bool) -> Option<NamePattern> {
    let escaped = regex::escape(name.trim()).replace(' ', r"\s+");
    let (mention, byline) = if whole_words {
        (
            format!(r"(?i)\b{}\b", escaped),
            format!(r"(?i)\bby\s+{}\b", escaped),
        )
    } else {
        (format!("(?i){}", escaped), format!(r"(?i)by\s+{}", escaped))
    };
    let mention = Regex::new(&mention).ok()?;
    let byline = Regex::new(&byline).ok()?;
    Some(NamePattern {
        name: name.trim().to_string(),
        mention,
        byline,
    })
}
