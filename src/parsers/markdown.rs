//! Markdown chunker with heading-based splitting
//!
//! Each heading opens a chunk spanning to the line before the next heading.
//! Breadcrumbs record the trail of enclosing headings, and oversized chunks
//! are re-split on paragraph boundaries.

use crate::chunk::{link_relationships, Chunk, ChunkKind};
use crate::parsers::{source_mtime, ParseError};
use regex::Regex;
use std::path::Path;

/// Default maximum characters per chunk before paragraph re-splitting
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 2000;

/// A heading occurrence in the source document
#[derive(Debug, Clone)]
struct Heading {
    level: usize,
    text: String,
    line: usize,
}

/// Parser for markdown documents with heading-based chunking
pub struct MarkdownChunker {
    max_chunk_size: usize,
    heading_re: Regex,
    paragraph_re: Regex,
}

impl MarkdownChunker {
    /// Create a chunker with the default size threshold
    pub fn new() -> Self {
        Self::with_max_chunk_size(DEFAULT_MAX_CHUNK_SIZE)
    }

    /// Create a chunker with a custom size threshold (in characters)
    pub fn with_max_chunk_size(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size,
            heading_re: Regex::new(r"^(#{1,6})\s+(.+)$").expect("valid heading regex"),
            paragraph_re: Regex::new(r"\n{2,}").expect("valid paragraph regex"),
        }
    }

    /// Parse a markdown file into chunks with relationships resolved
    pub fn parse(&self, path: &Path) -> Result<Vec<Chunk>, ParseError> {
        if !path.exists() {
            return Err(ParseError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let mtime = source_mtime(path)?;
        let path_str = path.to_string_lossy();

        let headings = self.extract_headings(&content);
        let mut chunks = self.create_chunks(&content, &headings, &path_str, mtime);
        link_relationships(&mut chunks);

        Ok(chunks)
    }

    /// Scan for heading lines, preserving document order
    ///
    /// Headings match only at line start; markers inside fenced code blocks
    /// are not excluded (documented limitation).
    fn extract_headings(&self, content: &str) -> Vec<Heading> {
        let mut headings = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if let Some(caps) = self.heading_re.captures(line) {
                headings.push(Heading {
                    level: caps[1].len(),
                    text: caps[2].trim().to_string(),
                    line: idx + 1,
                });
            }
        }
        headings
    }

    fn create_chunks(
        &self,
        content: &str,
        headings: &[Heading],
        path: &str,
        mtime: f64,
    ) -> Vec<Chunk> {
        let lines: Vec<&str> = content.split('\n').collect();

        if headings.is_empty() {
            // No headings: the entire file is one chunk with empty breadcrumb
            return vec![Chunk::new(
                path,
                ChunkKind::Text,
                content.to_string(),
                Vec::new(),
                1,
                lines.len(),
                mtime,
            )];
        }

        let mut chunks = Vec::new();
        for (i, heading) in headings.iter().enumerate() {
            let breadcrumb = build_breadcrumb(headings, i);

            let start_line = heading.line;
            let end_line = match headings.get(i + 1) {
                Some(next) => next.line - 1,
                None => lines.len(),
            };
            let chunk_content = lines[start_line - 1..end_line].join("\n");

            if chunk_content.chars().count() > self.max_chunk_size {
                for (sub_content, sub_start, sub_end) in
                    self.split_paragraphs(&chunk_content, start_line)
                {
                    chunks.push(Chunk::new(
                        path,
                        ChunkKind::Text,
                        sub_content,
                        breadcrumb.clone(),
                        sub_start,
                        sub_end,
                        mtime,
                    ));
                }
            } else {
                chunks.push(Chunk::new(
                    path,
                    ChunkKind::Text,
                    chunk_content,
                    breadcrumb,
                    start_line,
                    end_line,
                    mtime,
                ));
            }
        }

        chunks
    }

    /// Split an oversized chunk on blank-line paragraph boundaries
    ///
    /// Accumulate-and-flush: paragraphs are gathered until adding the next
    /// one would cross the threshold. A lone paragraph over the threshold
    /// still forms its own sub-chunk. Sub-chunk line ranges count paragraph
    /// newlines only, so separator blank lines shift the mapping slightly.
    fn split_paragraphs(&self, content: &str, start_line: usize) -> Vec<(String, usize, usize)> {
        let mut sub_chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_size = 0usize;
        let mut current_line = start_line;

        for para in self.paragraph_re.split(content) {
            let para_size = para.chars().count();
            if current_size + para_size > self.max_chunk_size && !current.is_empty() {
                let end_line = flush_lines(current_line, &current);
                sub_chunks.push((current.join("\n\n"), current_line, end_line - 1));
                current_line = end_line;
                current = vec![para];
                current_size = para_size;
            } else {
                current.push(para);
                current_size += para_size;
            }
        }

        if !current.is_empty() {
            let end_line = flush_lines(current_line, &current);
            sub_chunks.push((current.join("\n\n"), current_line, end_line - 1));
        }

        if sub_chunks.is_empty() {
            vec![(content.to_string(), start_line, start_line)]
        } else {
            sub_chunks
        }
    }
}

impl Default for MarkdownChunker {
    fn default() -> Self {
        Self::new()
    }
}

fn flush_lines(current_line: usize, paragraphs: &[&str]) -> usize {
    current_line
        + paragraphs
            .iter()
            .map(|p| p.matches('\n').count() + 1)
            .sum::<usize>()
}

/// Build the breadcrumb for the heading at `idx`
///
/// Walks backward keeping the nearest heading of each strictly decreasing
/// level, stopping once a level-1 heading is included, then appends the
/// heading's own text.
fn build_breadcrumb(headings: &[Heading], idx: usize) -> Vec<String> {
    let mut breadcrumb = Vec::new();
    let mut current_level = headings[idx].level;

    for heading in headings[..=idx].iter().rev() {
        if heading.level < current_level {
            breadcrumb.insert(0, heading.text.clone());
            current_level = heading.level;
            if current_level == 1 {
                break;
            }
        }
    }

    breadcrumb.push(headings[idx].text.clone());
    breadcrumb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_md(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_missing_file() {
        let chunker = MarkdownChunker::new();
        let err = chunker.parse(Path::new("/nonexistent/doc.md")).unwrap_err();
        assert!(matches!(err, ParseError::NotFound(_)));
    }

    #[test]
    fn test_no_headings_single_chunk() {
        let file = write_md("just some text\nwithout any headings\n");
        let chunks = MarkdownChunker::new().parse(file.path()).unwrap();

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].metadata.breadcrumb.is_empty());
        assert_eq!(chunks[0].content, "just some text\nwithout any headings\n");
        assert_eq!(chunks[0].metadata.line_start, 1);
        assert_eq!(chunks[0].parent_id, None);
    }

    #[test]
    fn test_nested_breadcrumbs() {
        let file = write_md("# A\nintro\n## B\nmiddle\n### C\nleaf\n");
        let chunks = MarkdownChunker::new().parse(file.path()).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].metadata.breadcrumb, vec!["A"]);
        assert_eq!(chunks[1].metadata.breadcrumb, vec!["A", "B"]);
        assert_eq!(chunks[2].metadata.breadcrumb, vec!["A", "B", "C"]);

        assert_eq!(chunks[1].parent_id, Some(chunks[0].id.clone()));
        assert_eq!(chunks[2].parent_id, Some(chunks[1].id.clone()));
    }

    #[test]
    fn test_breadcrumb_skips_deeper_uncles() {
        // The walk keeps only strictly decreasing levels: B2's breadcrumb
        // must not include C1.
        let file = write_md("# A\n## B1\n### C1\n## B2\ntext\n");
        let chunks = MarkdownChunker::new().parse(file.path()).unwrap();

        let b2 = chunks
            .iter()
            .find(|c| c.metadata.breadcrumb.last().map(String::as_str) == Some("B2"))
            .unwrap();
        assert_eq!(b2.metadata.breadcrumb, vec!["A", "B2"]);
    }

    #[test]
    fn test_chunk_line_ranges() {
        let file = write_md("# A\nline two\n## B\nline four\nline five\n");
        let chunks = MarkdownChunker::new().parse(file.path()).unwrap();

        assert_eq!(chunks[0].metadata.line_start, 1);
        assert_eq!(chunks[0].metadata.line_end, 2);
        assert_eq!(chunks[1].metadata.line_start, 3);
        assert!(chunks[1].metadata.line_end >= 5);
    }

    #[test]
    fn test_sibling_symmetry() {
        let file = write_md("# Top\n## Child1\na\n## Child2\nb\n## Child3\nc\n");
        let chunks = MarkdownChunker::new().parse(file.path()).unwrap();

        let children: Vec<&Chunk> = chunks.iter().filter(|c| c.depth() == 2).collect();
        assert_eq!(children.len(), 3);
        for child in &children {
            assert_eq!(child.sibling_ids.len(), 2);
        }
        assert!(children[0].sibling_ids.contains(&children[1].id));
        assert!(children[1].sibling_ids.contains(&children[0].id));
    }

    #[test]
    fn test_oversized_chunk_splits_on_paragraphs() {
        let para = "x".repeat(40);
        let body: Vec<String> = (0..6).map(|_| para.clone()).collect();
        let content = format!("# Big\n{}\n", body.join("\n\n"));
        let file = write_md(&content);

        let chunks = MarkdownChunker::with_max_chunk_size(100)
            .parse(file.path())
            .unwrap();

        assert!(chunks.len() > 1, "expected paragraph re-split");
        // All sub-chunks inherit the heading's breadcrumb
        for chunk in &chunks {
            assert_eq!(chunk.metadata.breadcrumb, vec!["Big"]);
        }
        // No sub-chunk payload joins more paragraphs than fit the threshold
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 100 + para.len());
        }
    }

    #[test]
    fn test_oversized_single_paragraph_kept_whole() {
        let para = "y".repeat(500);
        let content = format!("# Big\n{para}\n");
        let file = write_md(&content);

        let chunks = MarkdownChunker::with_max_chunk_size(100)
            .parse(file.path())
            .unwrap();

        // The lone oversized paragraph is not split further
        assert!(chunks.iter().any(|c| c.content.contains(&para)));
    }

    #[test]
    fn test_heading_text_trimmed() {
        let file = write_md("#   Spaced Out   \nbody\n");
        let chunks = MarkdownChunker::new().parse(file.path()).unwrap();
        assert_eq!(chunks[0].metadata.breadcrumb, vec!["Spaced Out"]);
    }

    #[test]
    fn test_indented_heading_ignored() {
        let file = write_md("text\n  # not a heading\nmore\n");
        let chunks = MarkdownChunker::new().parse(file.path()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].metadata.breadcrumb.is_empty());
    }

    #[test]
    fn test_deterministic_ids_across_parses() {
        let file = write_md("# A\nbody\n## B\nmore\n");
        let chunker = MarkdownChunker::new();
        let first = chunker.parse(file.path()).unwrap();
        let second = chunker.parse(file.path()).unwrap();

        let first_ids: Vec<&String> = first.iter().map(|c| &c.id).collect();
        let second_ids: Vec<&String> = second.iter().map(|c| &c.id).collect();
        assert_eq!(first_ids, second_ids);
    }
}
