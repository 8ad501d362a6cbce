use serde::{Deserialize, Serialize};

use crate::repo::SourceFileInfo;

/// A `[start, start + length)` byte range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub length: usize,
}

impl Span {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    /// Saturates at `usize::MAX`; see [`Span::checked_end`].
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.length)
    }

    pub fn checked_end(&self) -> Option<usize> {
        self.start.checked_add(self.length)
    }
}

/// Position of a span within its line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInfo {
    /// 1-based.
    pub line_number: usize,
    /// Offset of the span start relative to the start of its line.
    pub line_span_start: usize,
    pub line_span_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    File,
    Checksum,
    Module,
    Type,
    Function,
    Method,
    Field,
    Variable,
    Constant,
    Other,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::File => "file",
            SymbolKind::Checksum => "checksum",
            SymbolKind::Module => "module",
            SymbolKind::Type => "type",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Field => "field",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Other => "other",
        }
    }
}

/// A symbol identity, referenced or defined.
///
/// `project_id` identifies the owning project by id; definitions without one
/// take the builder's project on build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub kind: SymbolKind,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl Symbol {
    pub fn new(id: impl Into<String>, kind: SymbolKind, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            display_name: display_name.into(),
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationSpan {
    pub span: Span,
    pub classification: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSpan {
    pub span: Span,
    pub symbol: Symbol,
    pub line: LineInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionSpan {
    pub span: Span,
    pub symbol: Symbol,
    pub line: LineInfo,
}

/// Finalized symbol model of one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundSourceFile {
    pub file: SourceFileInfo,
    pub project_id: String,
    pub text: String,
    pub checksum: String,
    pub classifications: Vec<ClassificationSpan>,
    pub references: Vec<ReferenceSpan>,
    pub definitions: Vec<DefinitionSpan>,
}

impl BoundSourceFile {
    pub fn definition(&self, kind: &SymbolKind) -> Option<&DefinitionSpan> {
        self.definitions.iter().find(|d| &d.symbol.kind == kind)
    }
}
