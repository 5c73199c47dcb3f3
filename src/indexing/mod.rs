//! Indexing pipeline: walk a source tree and upsert chunks into the stores
//!
//! Files are processed one at a time; a parse or storage failure for one
//! file becomes an error record and never aborts the run.

use crate::chunk::Chunk;
use crate::parsers::{MarkdownChunker, ParseError, YamlChunker};
use crate::search::{SearchProvider, UpsertCounts};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// Extensions indexed by default (markdown + YAML)
pub const DEFAULT_EXTENSIONS: &[&str] = &["md", "yaml", "yml"];

/// One failed file in an indexing run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

/// Statistics for one indexing run
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IndexReport {
    pub files_processed: usize,
    pub files_skipped: usize,
    /// Chunks written to the vector store
    pub chunks_created: usize,
    /// Chunks written to the lexical store
    pub chunks_updated: usize,
    pub errors: Vec<FileError>,
    pub elapsed_seconds: f64,
}

enum FileOutcome {
    Indexed { counts: UpsertCounts, chunks: usize },
    Skipped,
}

/// Indexer for building the search index from a source directory
pub struct Indexer {
    source_dir: PathBuf,
    provider: Arc<dyn SearchProvider>,
    markdown: MarkdownChunker,
    yaml: YamlChunker,
}

impl Indexer {
    pub fn new(source_dir: impl Into<PathBuf>, provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            source_dir: source_dir.into(),
            provider,
            markdown: MarkdownChunker::new(),
            yaml: YamlChunker::new(),
        }
    }

    /// Index every matching file under the source directory
    ///
    /// `extensions` are matched case-insensitively without the leading dot;
    /// `None` uses [`DEFAULT_EXTENSIONS`].
    pub async fn index_all(&self, extensions: Option<&[&str]>) -> IndexReport {
        let extensions = extensions.unwrap_or(DEFAULT_EXTENSIONS);
        let start = Instant::now();
        let mut report = IndexReport::default();

        let files: Vec<PathBuf> = WalkDir::new(&self.source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| matches_extension(path, extensions))
            .collect();

        tracing::info!(
            "found {} files to index under {}",
            files.len(),
            self.source_dir.display()
        );

        for path in files {
            let rel_path = self.relative_display(&path);
            match self.index_file(&path).await {
                Ok(FileOutcome::Indexed { counts, chunks }) => {
                    report.files_processed += 1;
                    report.chunks_created += counts.vector;
                    report.chunks_updated += counts.fts;
                    tracing::debug!("indexed {rel_path}: {chunks} chunks");
                }
                Ok(FileOutcome::Skipped) => {
                    report.files_skipped += 1;
                    tracing::debug!("skipped {rel_path}: no chunks");
                }
                Err(error) => {
                    tracing::warn!("failed to index {rel_path}: {error:#}");
                    report.errors.push(FileError {
                        file: rel_path,
                        error: format!("{error:#}"),
                    });
                }
            }
        }

        report.elapsed_seconds = start.elapsed().as_secs_f64();
        report
    }

    async fn index_file(&self, path: &Path) -> anyhow::Result<FileOutcome> {
        let chunks = self
            .parse_file(path)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if chunks.is_empty() {
            return Ok(FileOutcome::Skipped);
        }

        let counts = self
            .provider
            .upsert(&chunks)
            .await
            .with_context(|| format!("failed to store chunks from {}", path.display()))?;

        Ok(FileOutcome::Indexed {
            counts,
            chunks: chunks.len(),
        })
    }

    fn parse_file(&self, path: &Path) -> Result<Vec<Chunk>, ParseError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("md") => self.markdown.parse(path),
            Some("yaml") | Some("yml") => self.yaml.parse(path),
            other => Err(ParseError::InvalidFormat(format!(
                "unsupported file type: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }

    fn relative_display(&self, path: &Path) -> String {
        path.strip_prefix(&self.source_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

fn matches_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            extensions.iter().any(|ext| *ext == lower)
        })
        .unwrap_or(false)
}
