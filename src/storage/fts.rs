//! Lexical chunk store backed by tantivy
//!
//! One searchable table (the tantivy index) plus a sled side table holding
//! the fields that never participate in scoring: source mtime and the
//! parent/sibling relations. Multi-word queries are conjunctive; path and
//! kind filters apply to stored fields after scoring.

use crate::chunk::{Chunk, ChunkKind, ChunkMetadata};
use crate::schema::{ChunkSchema, BREADCRUMB_SEPARATOR};
use crate::storage::{ChunkHit, SearchFilters, StorageError, StoreStats};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, Searcher, TantivyDocument, Term};

/// Over-fetch multiplier when a stored-field filter is active, since
/// filtering happens after scoring.
const FILTER_FETCH_FACTOR: usize = 10;

/// Side-table record: chunk fields not needed by the searchable table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SideRecord {
    source_mtime: f64,
    parent_id: Option<String>,
    sibling_ids: Vec<String>,
}

/// Full-text chunk store
pub struct FtsStore {
    index: Index,
    /// Writer access is serialized; parallel upserters queue here
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    schema: ChunkSchema,
    meta: sled::Db,
}

impl FtsStore {
    /// Open or create the store under `dir`
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        let schema = ChunkSchema::new();

        let index_dir = dir.join("tantivy");
        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(&index_dir)
                .map_err(|e| StorageError::backend(format!("failed to open index: {e}")))?
        } else {
            std::fs::create_dir_all(&index_dir)?;
            Index::create_in_dir(&index_dir, schema.schema())
                .map_err(|e| StorageError::backend(format!("failed to create index: {e}")))?
        };

        let writer = index
            .writer(50_000_000)
            .map_err(|e| StorageError::backend(format!("failed to create writer: {e}")))?;
        let reader = index
            .reader()
            .map_err(|e| StorageError::backend(format!("failed to create reader: {e}")))?;

        let meta = sled::open(dir.join("meta"))
            .map_err(|e| StorageError::backend(format!("failed to open side table: {e}")))?;

        tracing::info!("opened lexical store at {}", dir.display());

        Ok(Self {
            index,
            writer: Mutex::new(writer),
            reader,
            schema,
            meta,
        })
    }

    /// Insert or update chunks, returning the number written
    ///
    /// Per-chunk change detection: a chunk whose stored `content_hash`
    /// matches is skipped; otherwise the old document is deleted and the
    /// chunk reinserted.
    pub fn upsert(&self, chunks: &[Chunk]) -> Result<usize, StorageError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let searcher = self.reader.searcher();
        let mut to_write = Vec::new();
        for chunk in chunks {
            match self.stored_hash(&searcher, &chunk.id)? {
                Some(hash) if hash == chunk.metadata.content_hash => continue,
                _ => to_write.push(chunk),
            }
        }

        if to_write.is_empty() {
            return Ok(0);
        }

        let mut writer = self.writer.lock().unwrap();
        for chunk in &to_write {
            writer.delete_term(Term::from_field_text(self.schema.id, &chunk.id));
            writer
                .add_document(doc!(
                    self.schema.id => chunk.id.clone(),
                    self.schema.content => chunk.content.clone(),
                    self.schema.breadcrumb => chunk.metadata.breadcrumb.join(BREADCRUMB_SEPARATOR),
                    self.schema.path => chunk.metadata.path.clone(),
                    self.schema.kind => chunk.metadata.kind.as_str(),
                    self.schema.line_start => chunk.metadata.line_start as u64,
                    self.schema.line_end => chunk.metadata.line_end as u64,
                    self.schema.content_hash => chunk.metadata.content_hash.clone(),
                ))
                .map_err(|e| StorageError::backend(format!("failed to add document: {e}")))?;

            let side = SideRecord {
                source_mtime: chunk.metadata.source_mtime,
                parent_id: chunk.parent_id.clone(),
                sibling_ids: chunk.sibling_ids.clone(),
            };
            let bytes = bincode::serialize(&side)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            self.meta
                .insert(chunk.id.as_bytes(), bytes)
                .map_err(|e| StorageError::backend(format!("side table write failed: {e}")))?;
        }
        writer
            .commit()
            .map_err(|e| StorageError::backend(format!("commit failed: {e}")))?;
        drop(writer);

        self.reader
            .reload()
            .map_err(|e| StorageError::backend(format!("reader reload failed: {e}")))?;

        tracing::debug!("upserted {} chunks into lexical store", to_write.len());
        Ok(to_write.len())
    }

    /// Full-text search with native BM25 scores, best first
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkHit>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let mut parser = QueryParser::for_index(
            &self.index,
            vec![self.schema.content, self.schema.breadcrumb],
        );
        // Multi-word queries require all terms
        parser.set_conjunction_by_default();
        let parsed = parser
            .parse_query(query)
            .map_err(|e| StorageError::query(format!("bad query: {e}")))?;

        let fetch_limit = if filters.is_empty() {
            limit
        } else {
            limit * FILTER_FETCH_FACTOR
        };

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(fetch_limit))
            .map_err(|e| StorageError::query(e.to_string()))?;

        let mut hits = Vec::new();
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| StorageError::query(e.to_string()))?;
            let hit = self.doc_to_hit(&doc, score)?;
            if !filters.matches(&hit.path, hit.kind) {
                continue;
            }
            hits.push(hit);
            if hits.len() == limit {
                break;
            }
        }

        Ok(hits)
    }

    /// Fetch a chunk by id, joined with its side record
    pub fn get(&self, chunk_id: &str) -> Result<Option<Chunk>, StorageError> {
        let searcher = self.reader.searcher();
        let Some(doc) = self.doc_by_id(&searcher, chunk_id)? else {
            return Ok(None);
        };

        let hit = self.doc_to_hit(&doc, 0.0)?;
        let side = self.side_record(chunk_id)?;

        Ok(Some(Chunk {
            id: hit.id,
            content: hit.content,
            metadata: ChunkMetadata {
                path: hit.path,
                kind: hit.kind,
                breadcrumb: hit.breadcrumb,
                line_start: hit.line_start,
                line_end: hit.line_end,
                source_mtime: side.as_ref().map(|s| s.source_mtime).unwrap_or(0.0),
                content_hash: hit.content_hash,
            },
            parent_id: side.as_ref().and_then(|s| s.parent_id.clone()),
            sibling_ids: side.map(|s| s.sibling_ids).unwrap_or_default(),
        }))
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        let searcher = self.reader.searcher();
        let total = searcher.num_docs() as usize;

        let mut chunk_kinds = HashMap::new();
        for kind in [ChunkKind::Text, ChunkKind::Structured] {
            let query = TermQuery::new(
                Term::from_field_text(self.schema.kind, kind.as_str()),
                IndexRecordOption::Basic,
            );
            let count = searcher
                .search(&query, &Count)
                .map_err(|e| StorageError::query(e.to_string()))?;
            if count > 0 {
                chunk_kinds.insert(kind.as_str().to_string(), count);
            }
        }

        let mut latest_source_mtime: Option<f64> = None;
        for item in self.meta.iter() {
            let (_, value) =
                item.map_err(|e| StorageError::backend(format!("side table scan failed: {e}")))?;
            let side: SideRecord = bincode::deserialize(&value)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            if latest_source_mtime.is_none_or(|m| side.source_mtime > m) {
                latest_source_mtime = Some(side.source_mtime);
            }
        }

        Ok(StoreStats {
            total_chunks: total,
            chunk_kinds,
            latest_source_mtime,
            embedding_dim: None,
        })
    }

    fn stored_hash(
        &self,
        searcher: &Searcher,
        chunk_id: &str,
    ) -> Result<Option<String>, StorageError> {
        let Some(doc) = self.doc_by_id(searcher, chunk_id)? else {
            return Ok(None);
        };
        Ok(doc
            .get_first(self.schema.content_hash)
            .and_then(|v| v.as_str())
            .map(String::from))
    }

    fn doc_by_id(
        &self,
        searcher: &Searcher,
        chunk_id: &str,
    ) -> Result<Option<TantivyDocument>, StorageError> {
        let query = TermQuery::new(
            Term::from_field_text(self.schema.id, chunk_id),
            IndexRecordOption::Basic,
        );
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(|e| StorageError::query(e.to_string()))?;

        match top_docs.first() {
            Some((_, address)) => {
                let doc = searcher
                    .doc(*address)
                    .map_err(|e| StorageError::query(e.to_string()))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    fn doc_to_hit(&self, doc: &TantivyDocument, score: f32) -> Result<ChunkHit, StorageError> {
        let text_field = |field, name: &str| -> Result<String, StorageError> {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| StorageError::backend(format!("missing stored field: {name}")))
        };
        let u64_field = |field, name: &str| -> Result<u64, StorageError> {
            doc.get_first(field)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| StorageError::backend(format!("missing stored field: {name}")))
        };

        let breadcrumb_joined = text_field(self.schema.breadcrumb, "breadcrumb")?;
        let breadcrumb = if breadcrumb_joined.is_empty() {
            Vec::new()
        } else {
            breadcrumb_joined
                .split(BREADCRUMB_SEPARATOR)
                .map(String::from)
                .collect()
        };

        let kind_str = text_field(self.schema.kind, "kind")?;
        let kind = ChunkKind::from_str(&kind_str)
            .ok_or_else(|| StorageError::backend(format!("unknown chunk kind: {kind_str}")))?;

        Ok(ChunkHit {
            id: text_field(self.schema.id, "id")?,
            content: text_field(self.schema.content, "content")?,
            path: text_field(self.schema.path, "path")?,
            kind,
            breadcrumb,
            line_start: u64_field(self.schema.line_start, "line_start")? as usize,
            line_end: u64_field(self.schema.line_end, "line_end")? as usize,
            content_hash: text_field(self.schema.content_hash, "content_hash")?,
            source_mtime: None,
            parent_id: None,
            sibling_ids: Vec::new(),
            score,
        })
    }

    fn side_record(&self, chunk_id: &str) -> Result<Option<SideRecord>, StorageError> {
        match self
            .meta
            .get(chunk_id.as_bytes())
            .map_err(|e| StorageError::backend(format!("side table read failed: {e}")))?
        {
            Some(bytes) => {
                let side = bincode::deserialize(&bytes)
                    .map_err(|e| StorageError::serialization(e.to_string()))?;
                Ok(Some(side))
            }
            None => Ok(None),
        }
    }
}
