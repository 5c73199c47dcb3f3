//! End-to-end tests: index a source tree, search through the hybrid
//! retriever, and exercise the degraded lexical-only mode.

use kb_search::chunk::ChunkKind;
use kb_search::embeddings::{Embedder, Embedding, EmbeddingError};
use kb_search::indexing::Indexer;
use kb_search::search::{
    FtsOnlySearch, HybridSearch, SearchOptions, SearchProvider, VectorStoreStatus,
};
use kb_search::storage::{FtsStore, SearchFilters, VectorStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Deterministic keyword embedder so tests run without a model download.
struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn dimensions(&self) -> usize {
        4
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let lower = text.to_lowercase();
        let mut vector = vec![0.0f32; 4];
        if lower.contains("database") {
            vector[0] = 1.0;
        }
        if lower.contains("deploy") {
            vector[1] = 1.0;
        }
        if lower.contains("logging") {
            vector[2] = 1.0;
        }
        vector[3] = 0.1;
        Ok(vector)
    }

    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

fn write_tree(source: &Path) {
    fs::create_dir_all(source.join("guides")).unwrap();
    fs::write(
        source.join("guides/operations.md"),
        "# Operations\nrunbook overview\n\
         ## Database\nhow to back up the database nightly\n\
         ## Deploy\nhow to deploy a release\n",
    )
    .unwrap();
    fs::write(
        source.join("app.yaml"),
        "db:\n  host: localhost  # primary database\n  port: 5432\nlog:\n  level: info\n",
    )
    .unwrap();
}

async fn hybrid_provider(store_dir: &Path) -> Arc<dyn SearchProvider> {
    tracing_subscriber::fmt().with_env_filter("info").try_init().ok();

    let fts = FtsStore::open(&store_dir.join("fts")).unwrap();
    let vector = VectorStore::open(&store_dir.join("vectors"), Arc::new(KeywordEmbedder), 4)
        .await
        .unwrap();
    Arc::new(HybridSearch::new(fts, vector))
}

#[tokio::test]
async fn test_index_then_search() {
    let source = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    write_tree(source.path());

    let provider = hybrid_provider(store.path()).await;
    let indexer = Indexer::new(source.path(), provider.clone());

    let report = indexer.index_all(None).await;
    assert_eq!(report.files_processed, 2);
    assert!(report.errors.is_empty());
    // 3 markdown chunks + 3 yaml chunks written to both stores
    assert_eq!(report.chunks_created, 6);
    assert_eq!(report.chunks_updated, 6);

    let hits = provider
        .search("database", &SearchOptions::default())
        .await
        .unwrap();
    assert!(!hits.is_empty());
    // Both signals agree: the database runbook section ranks first
    assert!(hits[0].hit.content.contains("database"));
    assert!(hits[0].fused_score > 0.0);

    // Fused hits keep the native score and a separate fused score
    for hit in &hits {
        assert!(hit.fused_score > 0.0);
    }
}

#[tokio::test]
async fn test_reindex_is_idempotent() {
    let source = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    write_tree(source.path());

    let provider = hybrid_provider(store.path()).await;
    let indexer = Indexer::new(source.path(), provider.clone());

    indexer.index_all(None).await;
    let second = indexer.index_all(None).await;

    assert_eq!(second.files_processed, 2);
    assert_eq!(second.chunks_created, 0);
    assert_eq!(second.chunks_updated, 0);

    // Touching one value re-writes only the changed chunk
    fs::write(
        source.path().join("app.yaml"),
        "db:\n  host: localhost  # primary database\n  port: 6432\nlog:\n  level: info\n",
    )
    .unwrap();
    let third = indexer.index_all(None).await;
    assert_eq!(third.chunks_created, 1);
    assert_eq!(third.chunks_updated, 1);
}

#[tokio::test]
async fn test_filters_and_relations_through_provider() {
    let source = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    write_tree(source.path());

    let provider = hybrid_provider(store.path()).await;
    Indexer::new(source.path(), provider.clone())
        .index_all(None)
        .await;

    let options = SearchOptions {
        filters: SearchFilters {
            path: None,
            kind: Some(ChunkKind::Structured),
        },
        ..SearchOptions::default()
    };
    let hits = provider.search("database", &options).await.unwrap();
    assert!(!hits.is_empty());
    for hit in &hits {
        assert_eq!(hit.hit.kind, ChunkKind::Structured);
    }

    // The YAML db.host chunk carries its sibling link to db.port
    let host_hit = hits
        .iter()
        .find(|h| h.hit.content.contains("db.host"))
        .expect("db.host chunk in results");
    let chunk = provider.get(&host_hit.hit.id).await.unwrap().unwrap();
    assert_eq!(chunk.sibling_ids.len(), 1);

    let sibling = provider.get(&chunk.sibling_ids[0]).await.unwrap().unwrap();
    assert!(sibling.content.contains("db.port"));
    assert!(sibling.sibling_ids.contains(&chunk.id));
}

#[tokio::test]
async fn test_hybrid_stats() {
    let source = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    write_tree(source.path());

    let provider = hybrid_provider(store.path()).await;
    Indexer::new(source.path(), provider.clone())
        .index_all(None)
        .await;

    let stats = provider.stats().await.unwrap();
    assert_eq!(stats.fts_store.total_chunks, 6);
    assert_eq!(stats.fts_store.chunk_kinds.get("text"), Some(&3));
    assert_eq!(stats.fts_store.chunk_kinds.get("structured"), Some(&3));
    match stats.vector_store {
        VectorStoreStatus::Available { stats } => {
            assert_eq!(stats.total_chunks, 6);
            assert_eq!(stats.embedding_dim, Some(4));
            assert!(stats.latest_source_mtime.is_some());
        }
        VectorStoreStatus::Unavailable { .. } => panic!("vector store should be available"),
    }
}

#[tokio::test]
async fn test_degraded_mode_contract() {
    let source = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    write_tree(source.path());

    let fts = FtsStore::open(&store.path().join("fts")).unwrap();
    let provider: Arc<dyn SearchProvider> =
        Arc::new(FtsOnlySearch::new(fts, "incompatible host"));

    let report = Indexer::new(source.path(), provider.clone())
        .index_all(None)
        .await;
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.chunks_created, 0);
    assert_eq!(report.chunks_updated, 6);

    let hits = provider
        .search("database", &SearchOptions::default())
        .await
        .unwrap();
    assert!(!hits.is_empty());
    for hit in &hits {
        assert_eq!(hit.fused_score, hit.hit.score.abs());
    }

    let stats = provider.stats().await.unwrap();
    assert!(matches!(
        stats.vector_store,
        VectorStoreStatus::Unavailable { .. }
    ));
    assert_eq!(stats.fts_store.total_chunks, 6);
}
