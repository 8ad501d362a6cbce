use std::path::Path;

use xxhash_rust::xxh3::xxh3_64;

use crate::error::{IngestError, Result};
use crate::repo::SourceFileInfo;

use super::lines::{LineIndex, LineRange};
use super::model::{
    BoundSourceFile, ClassificationSpan, DefinitionSpan, LineInfo, ReferenceSpan, Span, Symbol,
    SymbolKind,
};

enum Content {
    Empty,
    Append(String),
    Fixed(String),
}

/// Accumulates spans for one file and finalizes them into a [`BoundSourceFile`].
///
/// Text is either supplied up front and annotated at explicit offsets, or
/// appended piece by piece with annotations positioned at the current end of
/// the buffer. A builder uses one mode for its whole life.
pub struct BoundSourceBuilder {
    file: SourceFileInfo,
    project_id: String,
    content: Content,
    classifications: Vec<ClassificationSpan>,
    references: Vec<ReferenceSpan>,
    definitions: Vec<DefinitionSpan>,
}

impl BoundSourceBuilder {
    pub fn new(file: SourceFileInfo, project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        let display_name = Path::new(&file.logical_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.logical_path.clone());
        let file_symbol = Symbol::new(file.logical_path.clone(), SymbolKind::File, display_name)
            .with_project(project_id.clone());

        Self {
            file,
            project_id,
            content: Content::Empty,
            classifications: Vec::new(),
            references: Vec::new(),
            definitions: vec![DefinitionSpan {
                span: Span::default(),
                symbol: file_symbol,
                line: LineInfo::default(),
            }],
        }
    }

    /// Builder in fixed mode over `text`.
    pub fn with_text(file: SourceFileInfo, project_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut builder = Self::new(file, project_id);
        builder.content = Content::Fixed(text.into());
        builder
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn set_text(&mut self, text: impl Into<String>) -> Result<()> {
        match self.content {
            Content::Empty => {
                self.content = Content::Fixed(text.into());
                Ok(())
            }
            Content::Fixed(_) => Err(IngestError::Builder("text already set".to_string())),
            Content::Append(_) => Err(IngestError::Builder(
                "cannot set fixed text on an appending builder".to_string(),
            )),
        }
    }

    pub fn annotate_classification(&mut self, span: Span, classification: impl Into<String>) -> Result<()> {
        self.check_fixed_span(span)?;
        self.classifications.push(ClassificationSpan {
            span,
            classification: classification.into(),
        });
        Ok(())
    }

    pub fn annotate_reference(&mut self, span: Span, symbol: Symbol) -> Result<()> {
        self.check_fixed_span(span)?;
        self.references.push(ReferenceSpan {
            span,
            symbol,
            line: LineInfo::default(),
        });
        Ok(())
    }

    pub fn annotate_definition(&mut self, span: Span, symbol: Symbol) -> Result<()> {
        self.check_fixed_span(span)?;
        self.definitions.push(DefinitionSpan {
            span,
            symbol,
            line: LineInfo::default(),
        });
        Ok(())
    }

    /// Appends plain text and returns the span it occupies.
    pub fn append(&mut self, text: &str) -> Result<Span> {
        if let Content::Empty = self.content {
            self.content = Content::Append(String::new());
        }
        let buffer = match &mut self.content {
            Content::Append(buffer) => buffer,
            _ => {
                return Err(IngestError::Builder(
                    "cannot append to a builder with fixed text".to_string(),
                ))
            }
        };
        let span = Span::new(buffer.len(), text.len());
        buffer.push_str(text);
        Ok(span)
    }

    pub fn append_reference(&mut self, text: &str, symbol: Symbol) -> Result<Span> {
        let span = self.append(text)?;
        self.references.push(ReferenceSpan {
            span,
            symbol,
            line: LineInfo::default(),
        });
        Ok(span)
    }

    pub fn append_definition(&mut self, text: &str, symbol: Symbol) -> Result<Span> {
        let span = self.append(text)?;
        self.definitions.push(DefinitionSpan {
            span,
            symbol,
            line: LineInfo::default(),
        });
        Ok(span)
    }

    fn check_fixed_span(&self, span: Span) -> Result<()> {
        let text = match &self.content {
            Content::Fixed(text) => text,
            Content::Empty => {
                return Err(IngestError::Builder("annotation before text was set".to_string()))
            }
            Content::Append(_) => {
                return Err(IngestError::Builder(
                    "explicit annotation on an appending builder".to_string(),
                ))
            }
        };
        match span.checked_end() {
            Some(end) if end <= text.len() && text.is_char_boundary(span.start) && text.is_char_boundary(end) => Ok(()),
            _ => Err(IngestError::Builder(format!(
                "span {}+{} outside text of length {}",
                span.start,
                span.length,
                text.len()
            ))),
        }
    }

    pub fn build(self) -> Result<BoundSourceFile> {
        let Self {
            file,
            project_id,
            content,
            mut classifications,
            mut references,
            mut definitions,
        } = self;

        let text = match content {
            Content::Empty => String::new(),
            Content::Append(text) | Content::Fixed(text) => text,
        };

        let checksum = format!("{:016x}", xxh3_64(text.as_bytes()));
        definitions.push(DefinitionSpan {
            span: Span::default(),
            symbol: Symbol::new(format!("xxh3:{}", checksum), SymbolKind::Checksum, checksum.clone())
                .with_project(project_id.clone()),
            line: LineInfo::default(),
        });

        classifications.sort_by_key(|c| c.span.start);
        references.sort_by_key(|r| r.span.start);
        definitions.sort_by_key(|d| d.span.start);

        if let Some(pair) = classifications.windows(2).find(|w| w[0].span.end() > w[1].span.start) {
            return Err(IngestError::Builder(format!(
                "overlapping classifications at {} and {}",
                pair[0].span.start, pair[1].span.start
            )));
        }
        check_definitions_disjoint(&definitions)?;

        let lines = LineIndex::new(&text);
        resolve_reference_lines(&mut references, &lines);
        for definition in &mut definitions {
            if definition.symbol.project_id.is_none() {
                definition.symbol.project_id = Some(project_id.clone());
            }
            let line = lines.line_of(definition.span.start);
            definition.line = lines.info(&line, definition.span.start);
        }

        Ok(BoundSourceFile {
            file,
            project_id,
            text,
            checksum,
            classifications,
            references,
            definitions,
        })
    }
}

fn check_definitions_disjoint(definitions: &[DefinitionSpan]) -> Result<()> {
    let mut last_end = 0;
    for definition in definitions.iter().filter(|d| d.span.length > 0) {
        if definition.span.start < last_end {
            return Err(IngestError::Builder(format!(
                "overlapping definition '{}' at {}",
                definition.symbol.id, definition.span.start
            )));
        }
        last_end = definition.span.end();
    }
    Ok(())
}

/// Fills line info for references sorted by start.
///
/// References sharing a start reuse the first one's line info; a reference on
/// the same line as its predecessor reuses the line text and only shifts the
/// relative offset.
pub(crate) fn resolve_reference_lines(references: &mut [ReferenceSpan], lines: &LineIndex<'_>) {
    let mut previous: Option<(usize, LineRange, LineInfo)> = None;

    for reference in references.iter_mut() {
        let start = reference.span.start;
        let resolved = match previous.take() {
            Some((prev_start, line, info)) if prev_start == start => (start, line, info),
            Some((_, line, info)) if line.contains(start) => {
                let info = LineInfo {
                    line_span_start: start - line.start,
                    ..info
                };
                (start, line, info)
            }
            _ => {
                let line = lines.line_of(start);
                let info = lines.info(&line, start);
                (start, line, info)
            }
        };
        reference.line = resolved.2.clone();
        previous = Some(resolved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> SourceFileInfo {
        SourceFileInfo {
            repository: "demo".to_string(),
            project_id: "app".to_string(),
            path: "/repo/src/lib.rs".to_string(),
            repo_relative_path: "src/lib.rs".to_string(),
            logical_path: "demo/src/lib.rs".to_string(),
        }
    }

    fn reference(start: usize, length: usize, id: &str) -> ReferenceSpan {
        ReferenceSpan {
            span: Span::new(start, length),
            symbol: Symbol::new(id, SymbolKind::Function, id),
            line: LineInfo::default(),
        }
    }

    #[test]
    fn test_synthetic_file_and_checksum_definitions() {
        let bound = BoundSourceBuilder::with_text(info(), "app", "fn main() {}\n").build().unwrap();

        let file = bound.definition(&SymbolKind::File).unwrap();
        assert_eq!(file.symbol.id, "demo/src/lib.rs");
        assert_eq!(file.symbol.display_name, "lib.rs");
        assert_eq!(file.span.length, 0);

        let checksum = bound.definition(&SymbolKind::Checksum).unwrap();
        assert_eq!(checksum.symbol.id, format!("xxh3:{}", bound.checksum));
        assert_eq!(checksum.span.length, 0);
        assert_eq!(bound.checksum.len(), 16);
    }

    #[test]
    fn test_checksum_depends_on_text() {
        let a = BoundSourceBuilder::with_text(info(), "app", "a").build().unwrap();
        let b = BoundSourceBuilder::with_text(info(), "app", "b").build().unwrap();
        let a2 = BoundSourceBuilder::with_text(info(), "app", "a").build().unwrap();
        assert_ne!(a.checksum, b.checksum);
        assert_eq!(a.checksum, a2.checksum);
    }

    #[test]
    fn test_mode_switch_is_an_error() {
        let mut fixed = BoundSourceBuilder::with_text(info(), "app", "text");
        assert!(matches!(fixed.append("more"), Err(IngestError::Builder(_))));
        assert!(matches!(fixed.set_text("again"), Err(IngestError::Builder(_))));

        let mut appending = BoundSourceBuilder::new(info(), "app");
        appending.append("text").unwrap();
        assert!(matches!(
            appending.annotate_classification(Span::new(0, 1), "keyword"),
            Err(IngestError::Builder(_))
        ));
        assert!(matches!(appending.set_text("other"), Err(IngestError::Builder(_))));
    }

    #[test]
    fn test_annotation_requires_text_and_valid_span() {
        let mut empty = BoundSourceBuilder::new(info(), "app");
        assert!(empty.annotate_reference(Span::new(0, 0), Symbol::new("x", SymbolKind::Other, "x")).is_err());

        let mut builder = BoundSourceBuilder::with_text(info(), "app", "short");
        assert!(builder.annotate_classification(Span::new(3, 10), "keyword").is_err());
        assert!(builder.annotate_classification(Span::new(0, 5), "keyword").is_ok());
    }

    #[test]
    fn test_overflowing_span_is_rejected() {
        let mut builder = BoundSourceBuilder::with_text(info(), "app", "short");
        let result = builder.annotate_classification(Span::new(usize::MAX, 2), "keyword");
        assert!(matches!(result, Err(IngestError::Builder(_))));
        let result = builder.annotate_definition(Span::new(2, usize::MAX), Symbol::new("x", SymbolKind::Other, "x"));
        assert!(matches!(result, Err(IngestError::Builder(_))));
        assert_eq!(Span::new(usize::MAX, 2).end(), usize::MAX);
    }

    #[test]
    fn test_bound_source_reads_back_from_json() {
        let mut builder = BoundSourceBuilder::with_text(info(), "app", "fn main() {}\n");
        builder
            .annotate_definition(Span::new(3, 4), Symbol::new("main", SymbolKind::Function, "main"))
            .unwrap();
        let bound = builder.build().unwrap();

        let json = serde_json::to_string(&bound).unwrap();
        let restored: BoundSourceFile = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.file, info());
        assert_eq!(restored.definitions.len(), bound.definitions.len());
    }

    #[test]
    fn test_append_positions_follow_buffer() {
        let mut builder = BoundSourceBuilder::new(info(), "app");
        builder.append("use ").unwrap();
        let reference = builder
            .append_reference("std", Symbol::new("std", SymbolKind::Module, "std"))
            .unwrap();
        builder.append(";\nfn ").unwrap();
        let definition = builder
            .append_definition("run", Symbol::new("crate::run", SymbolKind::Function, "run"))
            .unwrap();
        builder.append("() {}\n").unwrap();

        assert_eq!(reference, Span::new(4, 3));
        assert_eq!(definition, Span::new(12, 3));

        let bound = builder.build().unwrap();
        assert_eq!(bound.text, "use std;\nfn run() {}\n");
        assert_eq!(&bound.text[reference.start..reference.end()], "std");

        let run = bound.definitions.iter().find(|d| d.symbol.id == "crate::run").unwrap();
        assert_eq!(run.line.line_number, 2);
        assert_eq!(run.line.line_span_start, 3);
        assert_eq!(run.line.line_span_text, "fn run() {}");
        assert_eq!(run.symbol.project_id.as_deref(), Some("app"));
    }

    #[test]
    fn test_spans_sorted_and_definition_project_defaulted() {
        let text = "alpha beta gamma";
        let mut builder = BoundSourceBuilder::with_text(info(), "app", text);
        builder.annotate_classification(Span::new(11, 5), "identifier").unwrap();
        builder.annotate_classification(Span::new(0, 5), "keyword").unwrap();
        builder
            .annotate_definition(Span::new(6, 4), Symbol::new("beta", SymbolKind::Variable, "beta"))
            .unwrap();
        builder
            .annotate_definition(
                Span::new(0, 5),
                Symbol::new("alpha", SymbolKind::Variable, "alpha").with_project("other"),
            )
            .unwrap();

        let bound = builder.build().unwrap();
        let starts: Vec<_> = bound.classifications.iter().map(|c| c.span.start).collect();
        assert_eq!(starts, vec![0, 11]);

        let alpha = bound.definitions.iter().find(|d| d.symbol.id == "alpha").unwrap();
        let beta = bound.definitions.iter().find(|d| d.symbol.id == "beta").unwrap();
        assert_eq!(alpha.symbol.project_id.as_deref(), Some("other"));
        assert_eq!(beta.symbol.project_id.as_deref(), Some("app"));
        assert!(bound.definitions.windows(2).all(|w| w[0].span.start <= w[1].span.start));
    }

    #[test]
    fn test_overlapping_classifications_rejected() {
        let mut builder = BoundSourceBuilder::with_text(info(), "app", "abcdefgh");
        builder.annotate_classification(Span::new(0, 4), "a").unwrap();
        builder.annotate_classification(Span::new(2, 4), "b").unwrap();
        assert!(matches!(builder.build(), Err(IngestError::Builder(_))));
    }

    #[test]
    fn test_overlapping_definitions_rejected() {
        let mut builder = BoundSourceBuilder::with_text(info(), "app", "abcdefgh");
        builder
            .annotate_definition(Span::new(0, 4), Symbol::new("a", SymbolKind::Other, "a"))
            .unwrap();
        builder
            .annotate_definition(Span::new(3, 2), Symbol::new("b", SymbolKind::Other, "b"))
            .unwrap();
        assert!(matches!(builder.build(), Err(IngestError::Builder(_))));
    }

    #[test]
    fn test_same_start_references_share_one_line_lookup() {
        let text = "first line\nsecond.call(x);\n";
        let lines = LineIndex::new(text);
        let mut references = vec![reference(11, 4, "a"), reference(11, 4, "b")];

        resolve_reference_lines(&mut references, &lines);

        assert_eq!(lines.lookups(), 1);
        assert_eq!(references[0].line, references[1].line);
        assert_eq!(references[0].line.line_number, 2);
        assert_eq!(references[0].line.line_span_start, 0);
        assert_eq!(references[0].line.line_span_text, "second.call(x);");
    }

    #[test]
    fn test_same_line_references_reuse_line_text() {
        let text = "first line\nsecond.call(x);\nthird";
        let lines = LineIndex::new(text);
        let mut references = vec![
            reference(11, 6, "second"),
            reference(18, 4, "call"),
            reference(18, 4, "call2"),
            reference(27, 5, "third"),
        ];

        resolve_reference_lines(&mut references, &lines);

        assert_eq!(lines.lookups(), 2);
        assert_eq!(references[1].line.line_number, 2);
        assert_eq!(references[1].line.line_span_start, 7);
        assert_eq!(references[1].line.line_span_text, "second.call(x);");
        assert_eq!(references[2].line, references[1].line);
        assert_eq!(references[3].line.line_number, 3);
        assert_eq!(references[3].line.line_span_text, "third");
    }

    #[test]
    fn test_build_resolves_reference_lines() {
        let text = "let x = y;\nlet z = y;\n";
        let mut builder = BoundSourceBuilder::with_text(info(), "app", text);
        let y = Symbol::new("y", SymbolKind::Variable, "y");
        builder.annotate_reference(Span::new(19, 1), y.clone()).unwrap();
        builder.annotate_reference(Span::new(8, 1), y).unwrap();

        let bound = builder.build().unwrap();
        assert_eq!(bound.references[0].span.start, 8);
        assert_eq!(bound.references[0].line.line_number, 1);
        assert_eq!(bound.references[1].line.line_number, 2);
        assert_eq!(bound.references[1].line.line_span_start, 8);
    }
}
