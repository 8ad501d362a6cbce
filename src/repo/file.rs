use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::analysis::{AnalysisHost, FileAnalyzer};
use crate::dispatch::DispatchContext;
use crate::error::Result;

use super::Repository;

/// Identity and display paths of a file, detached from the graph.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceFileInfo {
    pub repository: String,
    pub project_id: String,
    pub path: String,
    pub repo_relative_path: String,
    pub logical_path: String,
}

/// A discovered file.
///
/// The primary project is the single owner at any moment; it is only ever
/// changed under the file's own lock.
pub struct RepoFile {
    path: String,
    key: String,
    repo_relative_path: String,
    logical_path: String,
    primary_project: Mutex<String>,
    shadow: bool,
    ignored: AtomicBool,
    analyzed: AtomicBool,
    explicit_analyzer: OnceCell<Arc<dyn FileAnalyzer>>,
}

impl std::fmt::Debug for RepoFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoFile")
            .field("path", &self.path)
            .field("primary_project", &*self.primary_project.lock())
            .field("shadow", &self.shadow)
            .finish()
    }
}

impl RepoFile {
    pub(crate) fn new(
        path: String,
        key: String,
        repo_relative_path: String,
        logical_path: String,
        owner: &str,
        shadow: bool,
    ) -> Self {
        Self {
            path,
            key,
            repo_relative_path,
            logical_path,
            primary_project: Mutex::new(owner.to_string()),
            shadow,
            ignored: AtomicBool::new(false),
            analyzed: AtomicBool::new(false),
            explicit_analyzer: OnceCell::new(),
        }
    }

    /// Absolute path with forward slashes.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Case-insensitive identity key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn repo_relative_path(&self) -> &str {
        &self.repo_relative_path
    }

    pub fn logical_path(&self) -> &str {
        &self.logical_path
    }

    pub fn primary_project(&self) -> String {
        self.primary_project.lock().clone()
    }

    pub fn is_owned_by(&self, project_id: &str) -> bool {
        *self.primary_project.lock() == project_id
    }

    /// Moves ownership to `to` only while `from` still owns the file.
    pub(crate) fn transfer(&self, from: &str, to: &str) -> bool {
        let mut owner = self.primary_project.lock();
        if *owner != from {
            return false;
        }
        *owner = to.to_string();
        true
    }

    pub fn is_shadow(&self) -> bool {
        self.shadow
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored.load(Ordering::Acquire)
    }

    pub fn set_ignored(&self, ignored: bool) {
        self.ignored.store(ignored, Ordering::Release);
    }

    pub fn is_analyzed(&self) -> bool {
        self.analyzed.load(Ordering::Acquire)
    }

    pub fn has_explicit_analyzer(&self) -> bool {
        self.explicit_analyzer.get().is_some()
    }

    /// Pins the analyzer for this file; the first assignment wins.
    pub fn set_explicit_analyzer(&self, analyzer: Arc<dyn FileAnalyzer>) -> bool {
        self.explicit_analyzer.set(analyzer).is_ok()
    }

    pub fn source_info(&self, repository: &str) -> SourceFileInfo {
        SourceFileInfo {
            repository: repository.to_string(),
            project_id: self.primary_project(),
            path: self.path.clone(),
            repo_relative_path: self.repo_relative_path.clone(),
            logical_path: self.logical_path.clone(),
        }
    }

    /// Hands the file to its analyzer, at most once per file.
    ///
    /// Returns whether this call started the analysis.
    pub fn analyze(
        self: &Arc<Self>,
        host: &AnalysisHost,
        repo: &Arc<Repository>,
        ctx: &DispatchContext,
    ) -> Result<bool> {
        if self.is_ignored() {
            return Ok(false);
        }
        if self.analyzed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        let analyzer = match self.explicit_analyzer.get() {
            Some(analyzer) => Some(analyzer.clone()),
            None => host.analyzers.file_analyzer_for(Path::new(&self.path)),
        };
        let Some(analyzer) = analyzer else {
            tracing::debug!(path = %self.path, "No analyzer for file");
            return Ok(false);
        };

        host.progress.file_scheduled();
        analyzer.analyze(host, repo, ctx, self)?;
        Ok(true)
    }
}
