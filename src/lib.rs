//! kb-search - hybrid lexical + semantic search over markdown and YAML trees
//!
//! Library modules for the knowledge-base search engine

pub mod chunk;
pub mod config;
pub mod embeddings;
pub mod indexing;
pub mod parsers;
pub mod schema;
pub mod search;
pub mod storage;
