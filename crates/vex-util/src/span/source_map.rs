//! Source map for managing VCL source files and rendering source locations.
//!
//! This module provides the [`SourceMap`] type for registering every module
//! loaded by the resolver and turning a [`Span`] back into a
//! `file:line:column` string for diagnostic display.

use std::sync::Arc;

use super::{FileId, Span};

/// A source file with its content and metadata.
///
/// # Examples
///
/// ```
/// use vex_util::span::SourceFile;
///
/// let file = SourceFile::new(0, "main.vcl", "sub vcl_recv {}\n");
/// assert_eq!(file.name(), "main.vcl");
/// assert_eq!(file.line_count(), 2);
/// ```
#[derive(Clone)]
pub struct SourceFile {
    /// Unique file identifier
    id: FileId,
    /// File name (path or display name)
    name: String,
    /// File content
    content: Arc<str>,
    /// Precomputed line start offsets
    line_starts: Arc<[usize]>,
}

impl SourceFile {
    /// Create a new source file.
    pub fn new(id: usize, name: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        let content = content.into();
        let line_starts = Self::compute_line_starts(&content);
        Self {
            id: FileId(id),
            name: name.into(),
            content,
            line_starts,
        }
    }

    /// Compute line start offsets from content.
    fn compute_line_starts(content: &str) -> Arc<[usize]> {
        let mut line_starts = vec![0];
        for (i, ch) in content.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        line_starts.into()
    }

    /// Get the file identifier.
    #[inline]
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Get the file name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the file content.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Get the total number of lines.
    #[inline]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Extract one line of source, without its trailing newline.
    pub fn line(&self, line: u32) -> Option<&str> {
        let idx = line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(idx)?;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|e| e - 1)
            .unwrap_or(self.content.len());
        self.content.get(start..end)
    }
}

/// Registry of all loaded source files.
///
/// The resolver adds each module as it loads; spans carry the returned
/// [`FileId`] so diagnostics can name the file they point into.
///
/// # Examples
///
/// ```
/// use vex_util::span::{SourceMap, Span};
///
/// let mut map = SourceMap::new();
/// let id = map.add_file("main.vcl", "sub vcl_recv {}\n");
/// let span = Span::with_file(0, 3, id, 1, 1);
/// assert_eq!(map.render(span), "main.vcl:1:1");
/// ```
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    /// Create an empty source map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file and return its identifier.
    pub fn add_file(&mut self, name: impl Into<String>, content: impl Into<Arc<str>>) -> FileId {
        let id = self.files.len();
        self.files.push(SourceFile::new(id, name, content));
        FileId(id)
    }

    /// Look up a file by identifier.
    pub fn file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.index())
    }

    /// Number of registered files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files have been registered.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over all registered files in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter()
    }

    /// Render a span as `file:line:column`.
    ///
    /// Unknown files render as `<unknown>`.
    pub fn render(&self, span: Span) -> String {
        match self.file(span.file_id) {
            Some(file) => format!("{}:{}:{}", file.name(), span.line, span.column),
            None => format!("<unknown>:{}:{}", span.line, span.column),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_file_lines() {
        let file = SourceFile::new(0, "a.vcl", "line one\nline two\n");
        assert_eq!(file.line_count(), 3);
        assert_eq!(file.line(1), Some("line one"));
        assert_eq!(file.line(2), Some("line two"));
        assert_eq!(file.line(3), Some(""));
        assert_eq!(file.line(4), None);
        assert_eq!(file.line(0), None);
    }

    #[test]
    fn test_source_map_add_and_lookup() {
        let mut map = SourceMap::new();
        let a = map.add_file("a.vcl", "acl internal {}\n");
        let b = map.add_file("b.vcl", "sub b {}\n");
        assert_eq!(a, FileId(0));
        assert_eq!(b, FileId(1));
        assert_eq!(map.len(), 2);
        assert_eq!(map.file(b).unwrap().name(), "b.vcl");
    }

    #[test]
    fn test_source_map_render() {
        let mut map = SourceMap::new();
        let id = map.add_file("main.vcl", "sub vcl_recv {}\n");
        assert_eq!(map.render(Span::with_file(0, 3, id, 1, 1)), "main.vcl:1:1");
        assert_eq!(
            map.render(Span::with_file(0, 3, FileId(9), 2, 4)),
            "<unknown>:2:4"
        );
    }
}
