//! Lexical-only retrieval fallback
//!
//! Substitutes for [`HybridSearch`](crate::search::HybridSearch) when the
//! vector backend cannot be constructed (e.g. an incompatible host). Same
//! contract, lexical store only.

use crate::chunk::Chunk;
use crate::search::{
    FusedHit, SearchOptions, SearchProvider, SearchStats, UpsertCounts, VectorStoreStatus,
};
use crate::storage::{FtsStore, StorageError};
use async_trait::async_trait;

/// Full-text-only search provider
pub struct FtsOnlySearch {
    fts: FtsStore,
    reason: String,
}

impl FtsOnlySearch {
    /// Wrap a lexical store, recording why the vector backend is absent
    pub fn new(fts: FtsStore, reason: impl Into<String>) -> Self {
        Self {
            fts,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SearchProvider for FtsOnlySearch {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<FusedHit>, StorageError> {
        let hits = self.fts.search(query, options.limit, &options.filters)?;

        // Placeholder score for contract compatibility: the absolute native
        // score, not comparable to true RRF scores.
        Ok(hits
            .into_iter()
            .map(|hit| {
                let fused_score = hit.score.abs();
                FusedHit { hit, fused_score }
            })
            .collect())
    }

    async fn get(&self, chunk_id: &str) -> Result<Option<Chunk>, StorageError> {
        self.fts.get(chunk_id)
    }

    async fn stats(&self) -> Result<SearchStats, StorageError> {
        Ok(SearchStats {
            vector_store: VectorStoreStatus::Unavailable {
                reason: self.reason.clone(),
            },
            fts_store: self.fts.stats()?,
        })
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<UpsertCounts, StorageError> {
        let fts = self.fts.upsert(chunks)?;
        Ok(UpsertCounts { vector: 0, fts })
    }
}
