//! Author-folder scanning and file classification.
//!
//! Each configured author owns `<data.root>/<folder>/`. Files are walked
//! recursively, filtered by `data.include_globs` / `data.exclude_globs`
//! (matched against the path relative to `data.root`), and returned in
//! sorted order so runs are deterministic.
//!
//! Most files are running text. Files whose names contain `_positions`
//! or `_quotes` instead hold one entry per line in the form
//! `thinker | content | topic`.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::AuthorSpec;

/// How a file's body is split into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Running text, split by the chunker.
    Text,
    /// One position statement per line.
    Positions,
    /// One quotation per line.
    Quotes,
}

impl FileKind {
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("_positions") {
            FileKind::Positions
        } else if lower.contains("_quotes") {
            FileKind::Quotes
        } else {
            FileKind::Text
        }
    }

    /// Significance tag stored on chunks of this kind.
    pub fn significance(&self, text_default: &str) -> String {
        match self {
            FileKind::Text => text_default.to_string(),
            FileKind::Positions => "POSITION".to_string(),
            FileKind::Quotes => "QUOTE".to_string(),
        }
    }
}

/// A file discovered in an author folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to `data.root` with `/` separators, e.g. `plato/Republic.txt`.
    pub relative: String,
    pub title: String,
    pub kind: FileKind,
}

impl SourceFile {
    pub async fn read_body(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }
}

/// One line of a positions or quotes file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub thinker: String,
    pub content: String,
    pub topic: Option<String>,
}

/// Parse `thinker | content | topic` lines; lines without a ` | `
/// separator or with empty content are ignored.
pub fn parse_entries(text: &str) -> Vec<Entry> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.contains(" | "))
        .filter_map(|line| {
            let mut parts = line.split(" | ").map(str::trim);
            let thinker = parts.next()?.to_string();
            let content = parts.next()?.to_string();
            if content.is_empty() {
                return None;
            }
            let topic = parts.next().filter(|t| !t.is_empty()).map(str::to_string);
            Some(Entry {
                thinker,
                content,
                topic,
            })
        })
        .collect()
}

/// Title derived from a file name: extension dropped, underscores as spaces.
pub fn title_from_file_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    stem.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn author_dir(config: &Config, author: &AuthorSpec) -> PathBuf {
    config.data.root.join(&author.folder)
}

/// List the ingestible files of one author, sorted by relative path.
pub fn scan_author(config: &Config, author: &AuthorSpec) -> Result<Vec<SourceFile>> {
    let root = &config.data.root;
    let dir = author_dir(config, author);
    if !dir.is_dir() {
        bail!(
            "Author folder does not exist: {} (author '{}')",
            dir.display(),
            author.name
        );
    }

    let include_set = build_globset(&config.data.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    default_excludes.extend(config.data.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&dir).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        files.push(SourceFile {
            path: path.to_path_buf(),
            relative: rel_str,
            title: title_from_file_name(path),
            kind: FileKind::from_file_name(&file_name),
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.relative.cmp(&b.relative));

    Ok(files)
}

/// CLI entry point for `authors`: the author table and folder status.
pub fn run_authors(config: &Config) -> Result<()> {
    if config.authors.is_empty() {
        println!("No authors configured. Add [[authors]] entries to the config.");
        return Ok(());
    }

    println!("{:<20} {:<28} {:<20} {:<12} FILES", "FOLDER", "NAME", "FIGURE", "DOMAIN");
    for author in &config.authors {
        let files = match scan_author(config, author) {
            Ok(files) => files.len().to_string(),
            Err(_) => "missing".to_string(),
        };
        println!(
            "{:<20} {:<28} {:<20} {:<12} {}",
            author.folder, author.name, author.figure_id, author.domain, files
        );
    }
    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
