//! Configuration with environment variable support

use std::env;
use std::path::PathBuf;

/// Search engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the persistent stores
    pub data_dir: PathBuf,
    /// Maximum characters per markdown chunk before paragraph re-splitting
    pub max_chunk_size: usize,
    /// Vector width the vector store is built for; must match the
    /// embedding model's output dimension
    pub vector_dim: usize,
    /// Enable debug logging
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_chunk_size: 2000,
            vector_dim: 384, // all-MiniLM-L6-v2
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - KB_DATA_DIR: data directory path
    /// - KB_MAX_CHUNK_SIZE: markdown split threshold in characters
    /// - KB_VECTOR_DIM: vector store width
    /// - KB_DEBUG: enable debug logging
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("KB_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(size) = env::var("KB_MAX_CHUNK_SIZE") {
            if let Ok(chars) = size.parse::<usize>() {
                config.max_chunk_size = chars;
            }
        }

        if let Ok(dim) = env::var("KB_VECTOR_DIM") {
            if let Ok(width) = dim.parse::<usize>() {
                config.vector_dim = width;
            }
        }

        if let Ok(debug) = env::var("KB_DEBUG") {
            config.debug = debug.eq_ignore_ascii_case("true") || debug == "1";
        }

        config
    }

    /// Directory for the lexical store
    pub fn fts_dir(&self) -> PathBuf {
        self.data_dir.join("fts")
    }

    /// Directory for the vector store
    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "kb-search")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".kb-search"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_chunk_size, 2000);
        assert_eq!(config.vector_dim, 384);
        assert!(!config.debug);
    }

    #[test]
    fn test_store_dirs_are_disjoint() {
        let config = Config::default();
        assert_ne!(config.fts_dir(), config.vector_dir());
        assert!(config.fts_dir().starts_with(&config.data_dir));
    }
}
