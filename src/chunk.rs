//! Chunk model: the atomic retrievable unit with identity, metadata, and
//! relational links.
//!
//! Chunk ids are content-addressed: a pure function of `(path, content)`,
//! stable across re-runs as long as the content is unchanged.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Kind of source a chunk was produced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Heading-structured text (markdown)
    Text,
    /// Hierarchical key/value configuration (YAML)
    Structured,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Structured => "structured",
        }
    }

    /// Parse from the stored string form
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ChunkKind::Text),
            "structured" => Some(ChunkKind::Structured),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for a document chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source file path
    pub path: String,
    /// Kind of chunk
    pub kind: ChunkKind,
    /// Hierarchical context: heading trail or dotted-key segments
    pub breadcrumb: Vec<String>,
    /// Starting line number (1-indexed)
    pub line_start: usize,
    /// Ending line number (inclusive)
    pub line_end: usize,
    /// Source file modification time (Unix seconds)
    pub source_mtime: f64,
    /// SHA-256 hex of `content`, used for change detection only
    pub content_hash: String,
}

/// A document chunk with metadata and relationships
///
/// `parent_id`/`sibling_ids` are a derived lookup index stored as plain id
/// strings, resolved against the flat chunk list of one parsed file. They
/// never hold structural references, so no cycles exist in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Content-addressed chunk id
    pub id: String,
    /// Chunk text content
    pub content: String,
    /// Chunk metadata
    pub metadata: ChunkMetadata,
    /// Id of the chunk one breadcrumb level up, if any
    pub parent_id: Option<String>,
    /// Ids of chunks sharing this chunk's breadcrumb prefix at the same depth
    pub sibling_ids: Vec<String>,
}

impl Chunk {
    /// Build a chunk, deriving its id and content hash
    pub fn new(
        path: &str,
        kind: ChunkKind,
        content: String,
        breadcrumb: Vec<String>,
        line_start: usize,
        line_end: usize,
        source_mtime: f64,
    ) -> Self {
        let content_hash = Self::generate_hash(&content);
        let id = Self::generate_id(path, &content);
        Self {
            id,
            content,
            metadata: ChunkMetadata {
                path: path.to_string(),
                kind,
                breadcrumb,
                line_start,
                line_end,
                source_mtime,
                content_hash,
            },
            parent_id: None,
            sibling_ids: Vec::new(),
        }
    }

    /// Generate the chunk id from path and content
    ///
    /// Deterministic: identical inputs always yield the identical id.
    pub fn generate_id(path: &str, content: &str) -> String {
        let digest = format!("{:x}", Sha256::digest(content.as_bytes()));
        let safe_path: String = path
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | '.') { '_' } else { c })
            .collect();
        format!("{}_{}", safe_path, &digest[..12])
    }

    /// Generate the content fingerprint used for change detection
    pub fn generate_hash(content: &str) -> String {
        format!("{:x}", Sha256::digest(content.as_bytes()))
    }

    /// Breadcrumb depth
    pub fn depth(&self) -> usize {
        self.metadata.breadcrumb.len()
    }
}

/// Resolve parent and sibling links across the chunks of one parsed file.
///
/// Parent lookup matches the chunk whose breadcrumb equals this chunk's
/// breadcrumb minus its last element (first chunk in document order wins).
/// Siblings share the same depth and the same depth-1 prefix.
pub fn link_relationships(chunks: &mut [Chunk]) {
    if chunks.is_empty() {
        return;
    }

    let mut first_by_breadcrumb: HashMap<Vec<String>, String> = HashMap::new();
    let mut peers_by_prefix: HashMap<(usize, Vec<String>), Vec<String>> = HashMap::new();

    for chunk in chunks.iter() {
        let breadcrumb = &chunk.metadata.breadcrumb;
        first_by_breadcrumb
            .entry(breadcrumb.clone())
            .or_insert_with(|| chunk.id.clone());

        let prefix = prefix_of(breadcrumb);
        peers_by_prefix
            .entry((breadcrumb.len(), prefix))
            .or_default()
            .push(chunk.id.clone());
    }

    for chunk in chunks.iter_mut() {
        let breadcrumb = &chunk.metadata.breadcrumb;
        if breadcrumb.len() > 1 {
            chunk.parent_id = first_by_breadcrumb
                .get(&breadcrumb[..breadcrumb.len() - 1])
                .cloned();
        }

        let prefix = prefix_of(breadcrumb);
        if let Some(peers) = peers_by_prefix.get(&(breadcrumb.len(), prefix)) {
            chunk.sibling_ids = peers
                .iter()
                .filter(|id| id.as_str() != chunk.id)
                .cloned()
                .collect();
        }
    }
}

fn prefix_of(breadcrumb: &[String]) -> Vec<String> {
    match breadcrumb.len() {
        0 => Vec::new(),
        n => breadcrumb[..n - 1].to_vec(),
    }
}
