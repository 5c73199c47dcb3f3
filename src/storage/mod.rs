//! Persistent chunk stores
//!
//! Two complementary backends over the same chunk model: a tantivy
//! full-text index for lexical search and an embedded LanceDB table for
//! nearest-neighbor search. Each store owns its connection for its whole
//! lifetime; dropping the store closes it.

pub mod error;
pub mod fts;
pub mod vector;

pub use error::StorageError;
pub use fts::FtsStore;
pub use vector::VectorStore;

use crate::chunk::{Chunk, ChunkKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A search hit: chunk data plus the backend's native score
///
/// Lexical hits omit the side-table fields (`source_mtime`, relations);
/// vector hits carry the complete record. The native score convention is
/// backend-internal: BM25 (higher = better) for the lexical store, cosine
/// distance (lower = better) for the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHit {
    pub id: String,
    pub content: String,
    pub path: String,
    pub kind: ChunkKind,
    pub breadcrumb: Vec<String>,
    pub line_start: usize,
    pub line_end: usize,
    pub content_hash: String,
    pub source_mtime: Option<f64>,
    pub parent_id: Option<String>,
    pub sibling_ids: Vec<String>,
    /// Backend-native score
    pub score: f32,
}

impl ChunkHit {
    /// Build a fully-populated hit from a stored chunk
    pub fn from_chunk(chunk: Chunk, score: f32) -> Self {
        Self {
            id: chunk.id,
            content: chunk.content,
            path: chunk.metadata.path,
            kind: chunk.metadata.kind,
            breadcrumb: chunk.metadata.breadcrumb,
            line_start: chunk.metadata.line_start,
            line_end: chunk.metadata.line_end,
            content_hash: chunk.metadata.content_hash,
            source_mtime: Some(chunk.metadata.source_mtime),
            parent_id: chunk.parent_id,
            sibling_ids: chunk.sibling_ids,
            score,
        }
    }
}

/// Filters applied to a store search
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Substring match against the chunk's source path
    pub path: Option<String>,
    /// Exact match against the chunk kind
    pub kind: Option<ChunkKind>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.path.is_none() && self.kind.is_none()
    }

    /// Check a stored record against the filters
    pub fn matches(&self, path: &str, kind: ChunkKind) -> bool {
        if let Some(ref needle) = self.path {
            if !path.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(want) = self.kind {
            if kind != want {
                return false;
            }
        }
        true
    }
}

/// Storage statistics for one backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_chunks: usize,
    /// Chunk counts per kind ("text"/"structured")
    pub chunk_kinds: HashMap<String, usize>,
    /// Most recent source mtime across stored chunks (Unix seconds)
    pub latest_source_mtime: Option<f64>,
    /// Vector width, reported by the vector store only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_dim: Option<usize>,
}
