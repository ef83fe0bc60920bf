//! Source files, spans, and position resolution.
//!
//! Analyzers work with [`Span`]s (raw byte ranges keyed by [`FileId`]). Spans
//! never cross the cache boundary: everything persisted to disk carries a
//! resolved [`SourcePosition`] instead.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::text::LineIndex;

/// Index of a source file within one [`FileSet`].
///
/// Ids are handed out by [`FileSet::add`] and are only meaningful for the
/// file set that issued them; they are never persisted.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(u32);

impl FileId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

/// A byte range within a single source file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Self { file, start, end }
    }
}

/// A resolved file/line/column position. Line and column are one-based.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePosition {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One parsed source file: name, full text, and its line index.
#[derive(Clone, Debug)]
pub struct SourceFile {
    id: FileId,
    name: String,
    text: Arc<str>,
    line_index: LineIndex,
}

impl SourceFile {
    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// The set of source files belonging to one loaded package.
///
/// Plays the position-resolution role for spans produced by analyzers and the
/// directive parser.
#[derive(Clone, Debug, Default)]
pub struct FileSet {
    files: Vec<Arc<SourceFile>>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, text: impl Into<Arc<str>>) -> FileId {
        let id = FileId::new(self.files.len() as u32);
        let text = text.into();
        let line_index = LineIndex::new(&text);
        self.files.push(Arc::new(SourceFile {
            id,
            name: name.into(),
            text,
            line_index,
        }));
        id
    }

    pub fn get(&self, id: FileId) -> Option<&Arc<SourceFile>> {
        self.files.get(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SourceFile>> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Resolves a byte offset in a file to a one-based source position.
    ///
    /// Unknown files resolve to a default position rather than failing: a
    /// position is display information, and a dangling span must not abort an
    /// analysis that already succeeded.
    pub fn position(&self, file: FileId, offset: u32) -> SourcePosition {
        let Some(source) = self.get(file) else {
            return SourcePosition::default();
        };
        let line_col = source.line_index.line_col(offset);
        SourcePosition {
            file: source.name.clone(),
            line: line_col.line + 1,
            column: line_col.col + 1,
        }
    }

    /// Resolves both ends of a span.
    pub fn resolve(&self, span: Span) -> (SourcePosition, SourcePosition) {
        (
            self.position(span.file, span.start),
            self.position(span.file, span.end),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn positions_are_one_based() {
        let mut files = FileSet::new();
        let id = files.add("pkg/a.x", "fn one\nfn two\n");
        let pos = files.position(id, 10);
        assert_eq!(
            pos,
            SourcePosition {
                file: "pkg/a.x".to_string(),
                line: 2,
                column: 4,
            }
        );
    }

    #[test]
    fn unknown_file_resolves_to_default() {
        let files = FileSet::new();
        assert_eq!(files.position(FileId::new(3), 0), SourcePosition::default());
    }

    #[test]
    fn resolve_covers_both_ends() {
        let mut files = FileSet::new();
        let id = files.add("b.x", "abc\ndef");
        let (start, end) = files.resolve(Span::new(id, 1, 5));
        assert_eq!((start.line, start.column), (1, 2));
        assert_eq!((end.line, end.column), (2, 2));
    }
}
