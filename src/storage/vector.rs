//! Vector chunk store backed by embedded LanceDB
//!
//! One table per store: chunk metadata columns mirroring the lexical side
//! table plus the embedding column, keyed by chunk id. Queries embed the
//! incoming text through the configured [`Embedder`] and rank by cosine
//! distance ascending.

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Float64Array, RecordBatch, RecordBatchIterator,
    RecordBatchReader, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::connect;
use lancedb::index::scalar::BTreeIndexBuilder;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::DistanceType;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::chunk::{Chunk, ChunkKind};
use crate::embeddings::Embedder;
use crate::storage::{ChunkHit, SearchFilters, StorageError, StoreStats};

const TABLE_NAME: &str = "chunks";

/// Vector chunk store
pub struct VectorStore {
    db: lancedb::Connection,
    table_name: String,
    vector_dim: usize,
    /// Cached Arrow schema to avoid recreation on every batch
    schema: Arc<Schema>,
    embedder: Arc<dyn Embedder>,
}

impl VectorStore {
    /// Open or create the store under `dir`
    ///
    /// `vector_dim` is the table's configured vector width. A mismatch with
    /// the embedder's output dimension makes every subsequent operation
    /// meaningless, so it fails construction instead of individual queries.
    pub async fn open(
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        vector_dim: usize,
    ) -> Result<Self, StorageError> {
        if embedder.dimensions() != vector_dim {
            return Err(StorageError::configuration(format!(
                "embedding model produces {}-dim vectors but the index is configured for {}",
                embedder.dimensions(),
                vector_dim
            )));
        }

        std::fs::create_dir_all(dir)?;
        let db = connect(dir.to_string_lossy().as_ref())
            .execute()
            .await
            .map_err(|e| StorageError::backend(format!("failed to connect: {e}")))?;

        let schema = Arc::new(Self::arrow_schema(vector_dim));

        let store = Self {
            db,
            table_name: TABLE_NAME.to_string(),
            vector_dim,
            schema,
            embedder,
        };
        store.ensure_table_exists().await?;

        Ok(store)
    }

    /// Insert or update chunks, returning the number written
    ///
    /// Same change-detection policy as the lexical store: skip on matching
    /// `content_hash`, otherwise delete and reinsert. The batch is embedded
    /// once, in input order.
    pub async fn upsert(&self, chunks: &[Chunk]) -> Result<usize, StorageError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let table = self.table().await?;
        let existing = self.existing_hashes(&table, chunks).await?;

        let to_write: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| existing.get(&c.id) != Some(&c.metadata.content_hash))
            .collect();
        if to_write.is_empty() {
            return Ok(0);
        }

        let contents: Vec<String> = to_write.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(contents)?;

        let id_list = sql_id_list(to_write.iter().map(|c| c.id.as_str()));
        table
            .delete(&format!("id IN ({id_list})"))
            .await
            .map_err(|e| StorageError::backend(format!("delete failed: {e}")))?;

        let batch = self.chunks_to_batch(&to_write, &embeddings)?;
        let schema = batch.schema();
        let batches: Box<dyn RecordBatchReader + Send> =
            Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema));
        table
            .add(batches)
            .execute()
            .await
            .map_err(|e| StorageError::backend(format!("insert failed: {e}")))?;

        tracing::debug!("upserted {} chunks into vector store", to_write.len());
        Ok(to_write.len())
    }

    /// Nearest-neighbor search, ranked by cosine distance ascending
    ///
    /// The native score on each hit is the raw distance (smaller = more
    /// similar).
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkHit>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query)?;
        let table = self.table().await?;

        let mut search = table
            .vector_search(query_vector)
            .map_err(|e| StorageError::query(format!("failed to create search: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(limit);
        if let Some(predicate) = sql_filter(filters) {
            search = search.only_if(predicate);
        }

        let results = search
            .execute()
            .await
            .map_err(|e| StorageError::query(format!("search failed: {e}")))?;
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| StorageError::query(format!("failed to collect results: {e}")))?;

        let mut hits = Vec::new();
        for batch in batches {
            let chunk_jsons = string_column(&batch, "chunk_json")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| StorageError::query("missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let chunk: Chunk = serde_json::from_str(chunk_jsons.value(i))
                    .map_err(|e| StorageError::serialization(e.to_string()))?;
                hits.push(ChunkHit::from_chunk(chunk, distances.value(i)));
            }
        }

        Ok(hits)
    }

    /// Fetch a chunk by id
    pub async fn get(&self, chunk_id: &str) -> Result<Option<Chunk>, StorageError> {
        let table = self.table().await?;

        let results = table
            .query()
            .only_if(format!("id = '{}'", escape_sql(chunk_id)))
            .limit(1)
            .execute()
            .await
            .map_err(|e| StorageError::query(format!("get failed: {e}")))?;
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| StorageError::query(e.to_string()))?;

        for batch in batches {
            if batch.num_rows() > 0 {
                let chunk_jsons = string_column(&batch, "chunk_json")?;
                let chunk: Chunk = serde_json::from_str(chunk_jsons.value(0))
                    .map_err(|e| StorageError::serialization(e.to_string()))?;
                return Ok(Some(chunk));
            }
        }

        Ok(None)
    }

    /// Storage statistics, including the configured vector width
    pub async fn stats(&self) -> Result<StoreStats, StorageError> {
        let table = self.table().await?;

        let total = table
            .count_rows(None)
            .await
            .map_err(|e| StorageError::query(e.to_string()))?;

        let mut chunk_kinds = HashMap::new();
        for kind in [ChunkKind::Text, ChunkKind::Structured] {
            let count = table
                .count_rows(Some(format!("kind = '{}'", kind.as_str())))
                .await
                .map_err(|e| StorageError::query(e.to_string()))?;
            if count > 0 {
                chunk_kinds.insert(kind.as_str().to_string(), count);
            }
        }

        let mut latest_source_mtime: Option<f64> = None;
        if total > 0 {
            let results = table
                .query()
                .select(Select::Columns(vec!["source_mtime".to_string()]))
                .execute()
                .await
                .map_err(|e| StorageError::query(e.to_string()))?;
            let batches: Vec<RecordBatch> = results
                .try_collect()
                .await
                .map_err(|e| StorageError::query(e.to_string()))?;
            for batch in batches {
                let mtimes = batch
                    .column_by_name("source_mtime")
                    .and_then(|col| col.as_any().downcast_ref::<Float64Array>())
                    .ok_or_else(|| StorageError::query("missing source_mtime column"))?;
                for i in 0..mtimes.len() {
                    let mtime = mtimes.value(i);
                    if latest_source_mtime.is_none_or(|m| mtime > m) {
                        latest_source_mtime = Some(mtime);
                    }
                }
            }
        }

        Ok(StoreStats {
            total_chunks: total,
            chunk_kinds,
            latest_source_mtime,
            embedding_dim: Some(self.vector_dim),
        })
    }

    fn arrow_schema(vector_dim: usize) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("chunk_json", DataType::Utf8, false),
            Field::new("path", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("content_hash", DataType::Utf8, false),
            Field::new("source_mtime", DataType::Float64, false),
        ])
    }

    async fn ensure_table_exists(&self) -> Result<(), StorageError> {
        let tables = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| StorageError::backend(format!("failed to list tables: {e}")))?;
        if tables.contains(&self.table_name) {
            return Ok(());
        }

        let schema = self.schema.clone();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(Vec::<String>::new())),
                Arc::new(self.empty_vector_array()?),
                Arc::new(StringArray::from(Vec::<String>::new())),
                Arc::new(StringArray::from(Vec::<String>::new())),
                Arc::new(StringArray::from(Vec::<String>::new())),
                Arc::new(StringArray::from(Vec::<String>::new())),
                Arc::new(Float64Array::from(Vec::<f64>::new())),
            ],
        )
        .map_err(|e| StorageError::backend(format!("failed to create batch: {e}")))?;
        let batches: Box<dyn RecordBatchReader + Send> =
            Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema));

        let table = self
            .db
            .create_table(&self.table_name, batches)
            .execute()
            .await
            .map_err(|e| StorageError::backend(format!("failed to create table: {e}")))?;

        tracing::info!("created vector table: {}", self.table_name);

        // BTree index on id for fast upsert lookups and deletes
        table
            .create_index(&["id"], Index::BTree(BTreeIndexBuilder::default()))
            .execute()
            .await
            .map_err(|e| StorageError::backend(format!("failed to create id index: {e}")))?;

        Ok(())
    }

    fn empty_vector_array(&self) -> Result<FixedSizeListArray, StorageError> {
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        FixedSizeListArray::try_new(
            field,
            self.vector_dim as i32,
            Arc::new(Float32Array::from(Vec::<f32>::new())),
            None,
        )
        .map_err(|e| StorageError::backend(format!("failed to create vector array: {e}")))
    }

    async fn table(&self) -> Result<lancedb::Table, StorageError> {
        self.db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| StorageError::backend(format!("table not found: {e}")))
    }

    async fn existing_hashes(
        &self,
        table: &lancedb::Table,
        chunks: &[Chunk],
    ) -> Result<HashMap<String, String>, StorageError> {
        let id_list = sql_id_list(chunks.iter().map(|c| c.id.as_str()));
        let results = table
            .query()
            .only_if(format!("id IN ({id_list})"))
            .select(Select::Columns(vec![
                "id".to_string(),
                "content_hash".to_string(),
            ]))
            .limit(chunks.len())
            .execute()
            .await
            .map_err(|e| StorageError::query(e.to_string()))?;
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| StorageError::query(e.to_string()))?;

        let mut hashes = HashMap::new();
        for batch in batches {
            let ids = string_column(&batch, "id")?;
            let stored_hashes = string_column(&batch, "content_hash")?;
            for i in 0..batch.num_rows() {
                hashes.insert(ids.value(i).to_string(), stored_hashes.value(i).to_string());
            }
        }
        Ok(hashes)
    }

    fn chunks_to_batch(
        &self,
        chunks: &[&Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<RecordBatch, StorageError> {
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();

        let flat_vectors: Vec<f32> = embeddings.iter().flatten().copied().collect();
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.vector_dim as i32,
            Arc::new(Float32Array::from(flat_vectors)),
            None,
        )
        .map_err(|e| StorageError::serialization(format!("bad embedding batch: {e}")))?;

        let chunk_jsons: Result<Vec<String>, StorageError> = chunks
            .iter()
            .map(|c| {
                serde_json::to_string(c).map_err(|e| StorageError::serialization(e.to_string()))
            })
            .collect();

        let paths: Vec<String> = chunks.iter().map(|c| c.metadata.path.clone()).collect();
        let kinds: Vec<&str> = chunks.iter().map(|c| c.metadata.kind.as_str()).collect();
        let hashes: Vec<String> = chunks
            .iter()
            .map(|c| c.metadata.content_hash.clone())
            .collect();
        let mtimes: Vec<f64> = chunks.iter().map(|c| c.metadata.source_mtime).collect();

        RecordBatch::try_new(
            self.schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(vector_array),
                Arc::new(StringArray::from(chunk_jsons?)),
                Arc::new(StringArray::from(paths)),
                Arc::new(StringArray::from(kinds)),
                Arc::new(StringArray::from(hashes)),
                Arc::new(Float64Array::from(mtimes)),
            ],
        )
        .map_err(|e| StorageError::backend(format!("failed to create batch: {e}")))
    }
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a StringArray, StorageError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StorageError::query(format!("missing column: {name}")))
}

fn escape_sql(value: &str) -> String {
    value.replace('\'', "''")
}

fn sql_id_list<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    ids.map(|id| format!("'{}'", escape_sql(id)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SQL pushdown predicate for the search filters, if any
fn sql_filter(filters: &SearchFilters) -> Option<String> {
    let mut predicates = Vec::new();
    if let Some(ref path) = filters.path {
        predicates.push(format!("path LIKE '%{}%'", escape_sql(path)));
    }
    if let Some(kind) = filters.kind {
        predicates.push(format!("kind = '{}'", kind.as_str()));
    }
    if predicates.is_empty() {
        None
    } else {
        Some(predicates.join(" AND "))
    }
}
