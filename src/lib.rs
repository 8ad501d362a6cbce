pub mod analysis;
pub mod bound;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filesystem;
pub mod importer;
pub mod repo;
pub mod sink;

pub use analysis::{
    AnalysisHost, AnalysisTarget, AnalyzedProject, AnalyzerRegistry, ExplicitProjectAnalyzer,
    FileAnalyzer, ManifestProjectAnalyzer, ProjectAnalyzer, TextFileAnalyzer,
};
pub use bound::{
    BoundSourceBuilder, BoundSourceFile, ClassificationSpan, DefinitionSpan, LineInfo,
    ReferenceSpan, Span, Symbol, SymbolKind,
};
pub use cache::ConcurrentCache;
pub use config::{IngestConfig, MountConfig, ProjectConfig, CONFIG_FILENAME};
pub use dispatch::{Barrier, CompletionTracker, DispatchContext, Priority, TaskDispatcher, TaskHandle};
pub use error::{IngestError, Result};
pub use filesystem::{
    AllFilters, BinaryFileFilter, CachingFileSystem, DirectoryFileSystem, ExtensionAllowFilter,
    FileFilter, FileSystem, HiddenDirectoryFilter, IgnoreDialect, IgnoreFileCache,
    IgnoreFileFilter, IgnoreMatcher, PathExclusionFilter, UnionFileSystem,
};
pub use importer::{
    ImportOutcome, ImportPhase, ImportProgress, Importer, ProgressSnapshot, RepositorySettings,
};
pub use repo::{Mount, Project, ProjectKind, RepoFile, Repository, SourceFileInfo, DEFAULT_PROJECT_ID};
pub use sink::{JsonLinesTarget, MemoryTarget};
