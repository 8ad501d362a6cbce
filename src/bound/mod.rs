//! Per-file symbol model: classification, reference and definition spans over
//! the file text.

pub mod builder;
mod lines;
pub mod model;

pub use builder::BoundSourceBuilder;
pub use model::{
    BoundSourceFile, ClassificationSpan, DefinitionSpan, LineInfo, ReferenceSpan, Span, Symbol,
    SymbolKind,
};
