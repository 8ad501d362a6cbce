use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::filesystem::extension_of;

use super::{DefaultProjectAnalyzer, FileAnalyzer, ProjectAnalyzer};

/// Analyzers resolved at configuration time.
///
/// File analyzers are keyed by extension, with an optional fallback for files
/// no analyzer claims. Project analyzers keep their declared order.
pub struct AnalyzerRegistry {
    file_analyzers: Vec<Arc<dyn FileAnalyzer>>,
    extension_map: HashMap<String, usize>,
    fallback: Option<usize>,
    project_analyzers: Vec<Arc<dyn ProjectAnalyzer>>,
    default_project_analyzer: Arc<dyn ProjectAnalyzer>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self {
            file_analyzers: Vec::new(),
            extension_map: HashMap::new(),
            fallback: None,
            project_analyzers: Vec::new(),
            default_project_analyzer: Arc::new(DefaultProjectAnalyzer),
        }
    }

    pub fn register_file_analyzer(&mut self, analyzer: Arc<dyn FileAnalyzer>) {
        let index = self.file_analyzers.len();
        for ext in analyzer.supported_extensions() {
            self.extension_map.insert(ext.to_lowercase(), index);
        }
        self.file_analyzers.push(analyzer);
    }

    /// Registers the analyzer used when no extension matches.
    pub fn set_fallback(&mut self, analyzer: Arc<dyn FileAnalyzer>) {
        let index = self.file_analyzers.len();
        self.register_file_analyzer(analyzer);
        self.fallback = Some(index);
    }

    pub fn register_project_analyzer(&mut self, analyzer: Arc<dyn ProjectAnalyzer>) {
        self.project_analyzers.push(analyzer);
    }

    pub fn file_analyzer_for(&self, path: &Path) -> Option<Arc<dyn FileAnalyzer>> {
        self.extension_map
            .get(&extension_of(path))
            .or(self.fallback.as_ref())
            .map(|&index| self.file_analyzers[index].clone())
    }

    pub fn file_analyzer(&self, name: &str) -> Option<Arc<dyn FileAnalyzer>> {
        self.file_analyzers.iter().find(|a| a.name() == name).cloned()
    }

    /// All file analyzers in registration order, fallback included.
    pub fn file_analyzers(&self) -> &[Arc<dyn FileAnalyzer>] {
        &self.file_analyzers
    }

    /// Project analyzers in declared order.
    pub fn project_analyzers(&self) -> &[Arc<dyn ProjectAnalyzer>] {
        &self.project_analyzers
    }

    /// Analyzer for a project by name; unknown names resolve to the default.
    pub fn project_analyzer(&self, name: &str) -> Arc<dyn ProjectAnalyzer> {
        self.project_analyzers
            .iter()
            .find(|a| a.name() == name)
            .cloned()
            .unwrap_or_else(|| self.default_project_analyzer.clone())
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        self.extension_map.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisHost;
    use crate::dispatch::DispatchContext;
    use crate::error::Result;
    use crate::repo::{RepoFile, Repository, DEFAULT_PROJECT_ANALYZER};

    struct Named(&'static str, &'static [&'static str]);

    impl FileAnalyzer for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn supported_extensions(&self) -> &[&str] {
            self.1
        }
        fn analyze(
            &self,
            _host: &AnalysisHost,
            _repo: &Arc<Repository>,
            _ctx: &DispatchContext,
            _file: &Arc<RepoFile>,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct Manifest;

    impl ProjectAnalyzer for Manifest {
        fn name(&self) -> &str {
            "manifest"
        }
    }

    #[test]
    fn test_lookup_by_extension_case_insensitive() {
        let mut registry = AnalyzerRegistry::new();
        registry.register_file_analyzer(Arc::new(Named("rust", &["rs"])));
        registry.register_file_analyzer(Arc::new(Named("web", &["ts", "tsx"])));

        assert_eq!(registry.file_analyzer_for(Path::new("/r/a.RS")).unwrap().name(), "rust");
        assert_eq!(registry.file_analyzer_for(Path::new("/r/b.tsx")).unwrap().name(), "web");
        assert!(registry.file_analyzer_for(Path::new("/r/c.md")).is_none());
        assert_eq!(registry.supported_extensions().len(), 3);
    }

    #[test]
    fn test_fallback_applies_to_unclaimed_files() {
        let mut registry = AnalyzerRegistry::new();
        registry.register_file_analyzer(Arc::new(Named("rust", &["rs"])));
        registry.set_fallback(Arc::new(Named("text", &[])));

        assert_eq!(registry.file_analyzer_for(Path::new("/r/a.rs")).unwrap().name(), "rust");
        assert_eq!(registry.file_analyzer_for(Path::new("/r/Makefile")).unwrap().name(), "text");
        assert_eq!(registry.file_analyzers().len(), 2);
        assert!(registry.file_analyzer("text").is_some());
    }

    #[test]
    fn test_project_analyzer_resolution() {
        let mut registry = AnalyzerRegistry::new();
        registry.register_project_analyzer(Arc::new(Manifest));

        assert_eq!(registry.project_analyzer("manifest").name(), "manifest");
        assert_eq!(registry.project_analyzer("unknown").name(), DEFAULT_PROJECT_ANALYZER);
        assert_eq!(registry.project_analyzers().len(), 1);
    }
}
