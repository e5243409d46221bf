use std::fmt;

use crate::intern::StringId;

/// A line/column pair within a script, both 0-indexed.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub(crate) struct LineCol {
    pub line: u32,
    pub column: u32,
}

impl LineCol {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Source location of an AST node.
///
/// Carries the script name (as an interned `StringId`), the line/column range
/// and the byte offsets into the source text. Byte offsets are what the
/// diagnostic formatter uses to extract the source snippet shown in error
/// messages; line/column feed stack frames.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub(crate) struct SourceSpan {
    /// Interned script name - look up in Interns to get the actual string.
    pub file: StringId,
    start: LineCol,
    end: LineCol,
    start_pos: u32,
    end_pos: u32,
}

/// Custom Debug implementation to keep AST dumps readable.
impl fmt::Debug for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SourceSpan{{{}:{}..{}:{}}}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

impl SourceSpan {
    pub const fn new(file: StringId, start: LineCol, end: LineCol, start_pos: u32, end_pos: u32) -> Self {
        Self {
            file,
            start,
            end,
            start_pos,
            end_pos,
        }
    }

    pub fn start(&self) -> LineCol {
        self.start
    }

    pub fn end(&self) -> LineCol {
        self.end
    }

    pub fn start_pos(&self) -> usize {
        self.start_pos as usize
    }

    pub fn end_pos(&self) -> usize {
        self.end_pos as usize
    }

    /// Extracts a short preview of the spanned source text for diagnostics.
    ///
    /// The preview is cut at the first newline and capped at 50 characters so
    /// error output stays single-line.
    pub fn snippet<'a>(&self, source: &'a str) -> Option<&'a str> {
        let start = self.start_pos();
        let end = self.end_pos().min(source.len());
        if start >= end || !source.is_char_boundary(start) {
            return None;
        }
        let mut text = &source[start..end.min(source.len())];
        if let Some(newline) = text.find('\n') {
            text = &text[..newline];
        }
        let mut cut = text.len().min(50);
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        Some(text[..cut].trim_end())
    }
}
