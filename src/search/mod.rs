//! Hybrid search combining lexical and vector retrieval
//!
//! Both backends are queried independently and their rankings merged with
//! Reciprocal Rank Fusion. [`SearchProvider`] is the contract shared with
//! the degraded lexical-only mode; callers construct one provider at
//! process start and inject it everywhere (no global instance).

pub mod fts_only;

pub use fts_only::FtsOnlySearch;

use crate::chunk::Chunk;
use crate::storage::{ChunkHit, FtsStore, SearchFilters, StorageError, StoreStats, VectorStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// RRF damping constant: large enough that rank 1 vs rank 2 is smoothed,
/// not winner-take-all
pub const RRF_K: f32 = 60.0;

/// Default lexical weight
pub const DEFAULT_WEIGHT_FTS: f32 = 0.3;

/// Default vector weight
pub const DEFAULT_WEIGHT_VECTOR: f32 = 0.7;

/// Options for one search call
///
/// Query pre-processing (`project:` prefixes, exact-identifier weight
/// shifts) is caller policy; these are the resulting knobs.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of results
    pub limit: usize,
    /// Path/kind filters applied by both backends
    pub filters: SearchFilters,
    /// Weight of the lexical ranking in fusion
    pub weight_fts: f32,
    /// Weight of the vector ranking in fusion
    pub weight_vector: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            filters: SearchFilters::default(),
            weight_fts: DEFAULT_WEIGHT_FTS,
            weight_vector: DEFAULT_WEIGHT_VECTOR,
        }
    }
}

/// A fused search result
///
/// The hit keeps the backend's native score; the fused score is attached
/// beside it, never overwriting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedHit {
    #[serde(flatten)]
    pub hit: ChunkHit,
    /// RRF score (or, in degraded mode, the absolute native score)
    pub fused_score: f32,
}

/// Chunks written per backend by an upsert
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub vector: usize,
    pub fts: usize,
}

/// Vector backend status within aggregated statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VectorStoreStatus {
    Available {
        #[serde(flatten)]
        stats: StoreStats,
    },
    Unavailable {
        reason: String,
    },
}

/// Aggregated statistics from both backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStats {
    pub vector_store: VectorStoreStatus,
    pub fts_store: StoreStats,
}

/// Contract shared by the hybrid retriever and the degraded lexical-only
/// retriever
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Ranked search over the backing stores
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<FusedHit>, StorageError>;

    /// Fetch a chunk by id
    async fn get(&self, chunk_id: &str) -> Result<Option<Chunk>, StorageError>;

    /// Aggregated statistics
    async fn stats(&self) -> Result<SearchStats, StorageError>;

    /// Insert or update chunks in the backing stores
    async fn upsert(&self, chunks: &[Chunk]) -> Result<UpsertCounts, StorageError>;
}

/// Hybrid search over a lexical and a vector store
pub struct HybridSearch {
    fts: FtsStore,
    vector: VectorStore,
}

impl HybridSearch {
    pub fn new(fts: FtsStore, vector: VectorStore) -> Self {
        Self { fts, vector }
    }
}

#[async_trait]
impl SearchProvider for HybridSearch {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<FusedHit>, StorageError> {
        // Over-fetch so fusion can promote results beyond the caller's limit
        let fetch_limit = options.limit * 3;

        let fts_hits = self.fts.search(query, fetch_limit, &options.filters)?;
        let vector_hits = self
            .vector
            .search(query, fetch_limit, &options.filters)
            .await?;

        let mut fused = reciprocal_rank_fusion(
            &fts_hits,
            &vector_hits,
            options.weight_fts,
            options.weight_vector,
        );
        fused.truncate(options.limit);
        Ok(fused)
    }

    async fn get(&self, chunk_id: &str) -> Result<Option<Chunk>, StorageError> {
        // Lexical store first; fall back to the vector store
        if let Some(chunk) = self.fts.get(chunk_id)? {
            return Ok(Some(chunk));
        }
        self.vector.get(chunk_id).await
    }

    async fn stats(&self) -> Result<SearchStats, StorageError> {
        Ok(SearchStats {
            vector_store: VectorStoreStatus::Available {
                stats: self.vector.stats().await?,
            },
            fts_store: self.fts.stats()?,
        })
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<UpsertCounts, StorageError> {
        let vector = self.vector.upsert(chunks).await?;
        let fts = self.fts.upsert(chunks)?;
        Ok(UpsertCounts { vector, fts })
    }
}

/// Merge two backend rankings with Reciprocal Rank Fusion
///
/// Each backend contributes `weight / (k + rank)` per hit, summed per chunk
/// id. Ties sort by discovery order (lexical list walked first). When both
/// backends return a chunk, the vector payload is kept: it carries the
/// side-table fields the lexical hit omits.
pub fn reciprocal_rank_fusion(
    fts_hits: &[ChunkHit],
    vector_hits: &[ChunkHit],
    weight_fts: f32,
    weight_vector: f32,
) -> Vec<FusedHit> {
    struct Entry {
        hit: ChunkHit,
        score: f32,
        order: usize,
    }

    let mut entries: HashMap<String, Entry> = HashMap::new();
    let mut discovered = 0usize;

    for (rank, hit) in fts_hits.iter().enumerate() {
        let contribution = weight_fts / (RRF_K + (rank + 1) as f32);
        entries
            .entry(hit.id.clone())
            .and_modify(|e| e.score += contribution)
            .or_insert_with(|| {
                let order = discovered;
                discovered += 1;
                Entry {
                    hit: hit.clone(),
                    score: contribution,
                    order,
                }
            });
    }

    for (rank, hit) in vector_hits.iter().enumerate() {
        let contribution = weight_vector / (RRF_K + (rank + 1) as f32);
        match entries.entry(hit.id.clone()) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                let entry = e.get_mut();
                entry.score += contribution;
                entry.hit = hit.clone();
            }
            std::collections::hash_map::Entry::Vacant(v) => {
                v.insert(Entry {
                    hit: hit.clone(),
                    score: contribution,
                    order: discovered,
                });
                discovered += 1;
            }
        }
    }

    let mut fused: Vec<Entry> = entries.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.order.cmp(&b.order))
    });

    fused
        .into_iter()
        .map(|e| FusedHit {
            hit: e.hit,
            fused_score: e.score,
        })
        .collect()
}
