//! YAML chunker with key-path flattening
//!
//! Nested mappings and sequences flatten to one chunk per leaf value,
//! keyed by a dotted/indexed path (`db.host`, `servers[0].port`).

use crate::chunk::{link_relationships, Chunk, ChunkKind};
use crate::parsers::{source_mtime, ParseError};
use regex::Regex;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;

/// Parser for YAML files with flattening
pub struct YamlChunker {
    comment_re: Regex,
}

impl YamlChunker {
    pub fn new() -> Self {
        Self {
            comment_re: Regex::new(r"#\s*(.+)$").expect("valid comment regex"),
        }
    }

    /// Parse a YAML file into one chunk per flattened leaf value
    pub fn parse(&self, path: &Path) -> Result<Vec<Chunk>, ParseError> {
        if !path.exists() {
            return Err(ParseError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let mtime = source_mtime(path)?;
        let path_str = path.to_string_lossy();

        let data: Value = serde_yaml::from_str(&content)
            .map_err(|e| ParseError::InvalidFormat(e.to_string()))?;
        if data.is_null() {
            return Ok(Vec::new());
        }

        let comments = self.extract_comments(&content);

        let mut pairs = Vec::new();
        flatten(&data, "", &mut pairs);

        let mut chunks = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            // Best-effort source mapping: scan for the leaf key at line
            // start, first match wins. Repeated key names can misattribute.
            let line = find_key_line(&content, &key);

            let mut chunk_content = format!("{key}: {value}");
            if let Some(comment) = comments.get(&line) {
                chunk_content = format!("# {comment}\n{chunk_content}");
            }

            let breadcrumb: Vec<String> = key.split('.').map(String::from).collect();

            chunks.push(Chunk::new(
                &path_str,
                ChunkKind::Structured,
                chunk_content,
                breadcrumb,
                line,
                line,
                mtime,
            ));
        }

        link_relationships(&mut chunks);
        Ok(chunks)
    }

    /// Map line number to trailing-comment text
    fn extract_comments(&self, content: &str) -> HashMap<usize, String> {
        let mut comments = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            if let Some(caps) = self.comment_re.captures(line) {
                comments.insert(idx + 1, caps[1].trim().to_string());
            }
        }
        comments
    }
}

impl Default for YamlChunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Flatten a YAML tree depth-first into `dotted.key → stringified value`
/// pairs, preserving document order for mappings and positional order for
/// sequences.
fn flatten(value: &Value, parent_key: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let key = mapping_key(k);
                let new_key = if parent_key.is_empty() {
                    key
                } else {
                    format!("{parent_key}.{key}")
                };
                flatten_child(v, &new_key, out);
            }
        }
        Value::Sequence(seq) => {
            for (i, item) in seq.iter().enumerate() {
                let new_key = format!("{parent_key}[{i}]");
                flatten_child(item, &new_key, out);
            }
        }
        Value::Tagged(tagged) => flatten(&tagged.value, parent_key, out),
        scalar => out.push((parent_key.to_string(), stringify_scalar(scalar))),
    }
}

fn flatten_child(value: &Value, key: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Mapping(_) | Value::Sequence(_) | Value::Tagged(_) => flatten(value, key, out),
        scalar => out.push((key.to_string(), stringify_scalar(scalar))),
    }
}

fn mapping_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => stringify_scalar(other),
    }
}

fn stringify_scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        // Containers never reach here; flatten recurses into them first
        _ => String::new(),
    }
}

/// Locate the line carrying a flattened key's leaf name
///
/// Matches `leaf:` at line start after indentation; falls back to line 1
/// when nothing matches.
fn find_key_line(content: &str, key: &str) -> usize {
    let leaf = key.rsplit('.').next().unwrap_or(key);
    let leaf = leaf.split('[').next().unwrap_or(leaf);

    for (idx, line) in content.lines().enumerate() {
        if let Some(rest) = line.trim_start().strip_prefix(leaf) {
            if rest.trim_start().starts_with(':') {
                return idx + 1;
            }
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_missing_file() {
        let err = YamlChunker::new()
            .parse(Path::new("/nonexistent/config.yaml"))
            .unwrap_err();
        assert!(matches!(err, ParseError::NotFound(_)));
    }

    #[test]
    fn test_invalid_yaml() {
        let file = write_yaml("db: [unclosed\n  host: localhost\n");
        let err = YamlChunker::new().parse(file.path()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidFormat(_)));
    }

    #[test]
    fn test_empty_document() {
        let file = write_yaml("");
        let chunks = YamlChunker::new().parse(file.path()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_flattening() {
        let file = write_yaml("db:\n  host: localhost\n  port: 5432\n");
        let chunks = YamlChunker::new().parse(file.path()).unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.contains("db.host: localhost"));
        assert!(chunks[1].content.contains("db.port: 5432"));
        assert_eq!(chunks[0].metadata.breadcrumb, vec!["db", "host"]);
        assert_eq!(chunks[1].metadata.breadcrumb, vec!["db", "port"]);
    }

    #[test]
    fn test_sequence_indexing() {
        let file = write_yaml("servers:\n  - host: a\n  - host: b\n");
        let chunks = YamlChunker::new().parse(file.path()).unwrap();

        let keys: Vec<&str> = chunks
            .iter()
            .map(|c| c.content.split(':').next().unwrap())
            .collect();
        assert_eq!(keys, vec!["servers[0].host", "servers[1].host"]);
        assert_eq!(
            chunks[0].metadata.breadcrumb,
            vec!["servers[0]", "host"]
        );
    }

    #[test]
    fn test_scalar_stringification() {
        let file = write_yaml("flags:\n  enabled: true\n  level: 3\n  label: ~\n");
        let chunks = YamlChunker::new().parse(file.path()).unwrap();

        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert!(contents.iter().any(|c| c.ends_with("flags.enabled: true")));
        assert!(contents.iter().any(|c| c.ends_with("flags.level: 3")));
        assert!(contents.iter().any(|c| c.ends_with("flags.label: null")));
    }

    #[test]
    fn test_trailing_comment_prepended() {
        let file = write_yaml("db:\n  host: localhost  # primary database\n");
        let chunks = YamlChunker::new().parse(file.path()).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].content,
            "# primary database\ndb.host: localhost"
        );
    }

    #[test]
    fn test_line_attribution() {
        let file = write_yaml("db:\n  host: localhost\n  port: 5432\n");
        let chunks = YamlChunker::new().parse(file.path()).unwrap();

        let host = chunks.iter().find(|c| c.content.contains("host")).unwrap();
        let port = chunks.iter().find(|c| c.content.contains("port")).unwrap();
        assert_eq!(host.metadata.line_start, 2);
        assert_eq!(port.metadata.line_start, 3);
        assert_eq!(host.metadata.line_end, host.metadata.line_start);
    }

    #[test]
    fn test_unmatched_key_falls_back_to_line_one() {
        // Flow-style leaf keys never appear at line start
        let file = write_yaml("db: {host: localhost}\n");
        let chunks = YamlChunker::new().parse(file.path()).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.line_start, 1);
    }

    #[test]
    fn test_relationships() {
        let file = write_yaml("db:\n  host: localhost\n  port: 5432\nname: app\n");
        let chunks = YamlChunker::new().parse(file.path()).unwrap();

        let host = chunks.iter().find(|c| c.content.contains("host")).unwrap();
        let port = chunks.iter().find(|c| c.content.contains("port")).unwrap();

        // db.host and db.port are siblings of each other, symmetrically
        assert!(host.sibling_ids.contains(&port.id));
        assert!(port.sibling_ids.contains(&host.id));
        // No chunk exists for the bare "db" mapping, so no parent resolves
        assert_eq!(host.parent_id, None);
    }
}
