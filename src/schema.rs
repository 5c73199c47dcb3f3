//! Tantivy schema for the lexical chunk table
//!
//! Mirrors the searchable table of the lexical store: only `content` and
//! `breadcrumb` are tokenized, everything else is stored for retrieval and
//! post-scoring filters.

use tantivy::schema::{
    Field, IndexRecordOption, Schema, SchemaBuilder, TextFieldIndexing, TextOptions, STORED,
    STRING,
};

/// Joined-breadcrumb separator used in the stored field
pub const BREADCRUMB_SEPARATOR: &str = " > ";

/// Schema for indexing document chunks
#[derive(Clone)]
pub struct ChunkSchema {
    pub schema: Schema,

    /// Content-addressed chunk id (raw, for exact lookups and deletes)
    pub id: Field,

    /// Chunk text (indexed and stored)
    pub content: Field,

    /// Breadcrumb joined with [`BREADCRUMB_SEPARATOR`] (indexed and stored)
    pub breadcrumb: Field,

    /// Source file path (stored, substring-filtered after scoring)
    pub path: Field,

    /// Chunk kind: "text" or "structured" (stored, exact-filtered)
    pub kind: Field,

    /// Starting line number, 1-indexed (stored)
    pub line_start: Field,

    /// Ending line number, inclusive (stored)
    pub line_end: Field,

    /// Content fingerprint for change detection (stored)
    pub content_hash: Field,
}

impl ChunkSchema {
    /// Create a new chunk schema
    pub fn new() -> Self {
        let mut builder = SchemaBuilder::new();

        let text_options = TextOptions::default().set_stored().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("default")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );

        let id = builder.add_text_field("id", STRING | STORED);
        let content = builder.add_text_field("content", text_options.clone());
        let breadcrumb = builder.add_text_field("breadcrumb", text_options);
        let path = builder.add_text_field("path", STRING | STORED);
        let kind = builder.add_text_field("kind", STRING | STORED);
        let line_start = builder.add_u64_field("line_start", STORED);
        let line_end = builder.add_u64_field("line_end", STORED);
        let content_hash = builder.add_text_field("content_hash", STRING | STORED);

        Self {
            schema: builder.build(),
            id,
            content,
            breadcrumb,
            path,
            kind,
            line_start,
            line_end,
            content_hash,
        }
    }

    /// Get the schema
    pub fn schema(&self) -> Schema {
        self.schema.clone()
    }
}

impl Default for ChunkSchema {
    fn default() -> Self {
        Self::new()
    }
}
