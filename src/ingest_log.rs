//! Append-only audit trail of file outcomes.
//!
//! Every file-processing attempt produces exactly one
//! [`IngestionLogEntry`]. [`FileLogSink`] writes them one per line to
//! `<log_dir>/embedding_log_<folder>.txt`:
//!
//! ```text
//! [2024-05-01T12:00:00+00:00] SUCCESS | Plato | plato/Republic.txt | 212 chunks |
//! [2024-05-01T12:03:10+00:00] FLAGGED | Plato | plato/Odd.txt | 0 chunks | Contains "by Mill" - likely wrong author
//! ```
//!
//! Files are only ever appended to, so successive runs stay diffable.

use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::ingest::RunSummary;
use crate::models::{AuthorSpec, IngestionLogEntry};

/// Destination for ingestion audit records.
pub trait LogSink: Send + Sync {
    /// Append one outcome for a file of author folder `folder`.
    fn record(&self, folder: &str, entry: &IngestionLogEntry) -> Result<()>;

    /// Called once before an author's files are processed.
    fn begin_run(&self, _author: &AuthorSpec) -> Result<()> {
        Ok(())
    }

    /// Called once after an author's files are processed.
    fn end_run(&self, _author: &AuthorSpec, _summary: &RunSummary) -> Result<()> {
        Ok(())
    }
}

/// Render an entry as its log line (without trailing newline).
pub fn format_entry(entry: &IngestionLogEntry) -> String {
    format!(
        "[{}] {} | {} | {} | {} chunks | {}",
        entry.timestamp.to_rfc3339(),
        entry.status.as_str().to_uppercase(),
        entry.author,
        entry.source_file,
        entry.chunk_count,
        entry.message.as_deref().unwrap_or("")
    )
}

/// Per-author append-only log files.
pub struct FileLogSink {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the log file for `folder`.
    pub fn path_for(&self, folder: &str) -> PathBuf {
        self.dir.join(format!("embedding_log_{}.txt", folder))
    }

    fn append(&self, folder: &str, text: &str) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("log sink lock poisoned"))?;
        let path = self.path_for(folder);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }
}

impl LogSink for FileLogSink {
    fn record(&self, folder: &str, entry: &IngestionLogEntry) -> Result<()> {
        self.append(folder, &format!("{}\n", format_entry(entry)))
    }

    fn begin_run(&self, author: &AuthorSpec) -> Result<()> {
        let rule = "=".repeat(60);
        self.append(
            &author.folder,
            &format!(
                "{rule}\nRUN START: {} ({})\nStarted: {}\n{rule}\n",
                author.name,
                author.figure_id,
                chrono::Utc::now().to_rfc3339()
            ),
        )
    }

    fn end_run(&self, author: &AuthorSpec, summary: &RunSummary) -> Result<()> {
        let rule = "=".repeat(60);
        self.append(
            &author.folder,
            &format!(
                "{rule}\nSUMMARY\nFiles processed: {}\nChunks created: {}\nSkipped: {}\nFlagged: {}\nErrors: {}\n{rule}\n\n",
                summary.files(),
                summary.chunks_written,
                summary.skipped,
                summary.flagged,
                summary.errors
            ),
        )
    }
}

/// Collects entries in memory; for tests and library callers that
/// want the outcomes without touching disk.
#[derive(Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<(String, IngestionLogEntry)>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<IngestionLogEntry> {
        self.entries
            .lock()
            .map(|e| e.iter().map(|(_, entry)| entry.clone()).collect())
            .unwrap_or_default()
    }

    pub fn for_folder(&self, folder: &str) -> Vec<IngestionLogEntry> {
        self.entries
            .lock()
            .map(|e| {
                e.iter()
                    .filter(|(f, _)| f == folder)
                    .map(|(_, entry)| entry.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, folder: &str, entry: &IngestionLogEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("log sink lock poisoned"))?
            .push((folder.to_string(), entry.clone()));
        Ok(())
    }
}
