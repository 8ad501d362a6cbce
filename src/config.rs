//! Import configuration, read from `.code-ingest.yml`.
//!
//! ```yaml
//! repository: shop
//! mounts:
//!   - name: vendored
//!     path: third_party
//! include_extensions: [rs, toml, md]
//! excluded_paths: ["/target/"]
//! projects:
//!   - id: web
//!     directory: frontend
//!     kind: source
//! include_projects: ["^web", "^core"]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalyzerRegistry, ExplicitProjectAnalyzer, ManifestProjectAnalyzer, TextFileAnalyzer};
use crate::dispatch::TaskDispatcher;
use crate::error::{IngestError, Result};
use crate::filesystem::{
    AllFilters, BinaryFileFilter, DirectoryFileSystem, ExtensionAllowFilter, FileFilter,
    HiddenDirectoryFilter, IgnoreDialect, IgnoreFileCache, IgnoreFileFilter, PathExclusionFilter,
};
use crate::repo::{Mount, ProjectKind};

/// Name of the configuration file looked up at the repository root.
pub const CONFIG_FILENAME: &str = ".code-ingest.yml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    /// Absolute, or relative to the repository root.
    pub directory: PathBuf,
    #[serde(default)]
    pub kind: ProjectKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Defaults to the root directory name.
    pub repository: Option<String>,
    pub root: Option<PathBuf>,
    pub mounts: Vec<MountConfig>,
    /// Empty means every extension.
    pub include_extensions: Vec<String>,
    pub binary_extensions: Vec<String>,
    pub excluded_paths: Vec<String>,
    pub skip_hidden_directories: bool,
    /// Empty disables ignore files.
    pub ignore_file: String,
    pub ignore_dialect: IgnoreDialect,
    pub max_parallelism: Option<usize>,
    pub discovery_threads: Option<usize>,
    pub projects: Vec<ProjectConfig>,
    pub project_manifests: Vec<String>,
    pub include_projects: Vec<String>,
    pub finalize: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            repository: None,
            root: None,
            mounts: Vec::new(),
            include_extensions: Vec::new(),
            binary_extensions: [
                "png", "jpg", "jpeg", "gif", "ico", "pdf", "zip", "gz", "tar", "jar", "dll", "exe",
                "so", "dylib", "class", "o", "a", "lib", "bin", "woff", "woff2",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            excluded_paths: Vec::new(),
            skip_hidden_directories: true,
            ignore_file: IgnoreFileCache::DEFAULT_FILE_NAME.to_string(),
            ignore_dialect: IgnoreDialect::Standard,
            max_parallelism: None,
            discovery_threads: None,
            projects: Vec::new(),
            project_manifests: [
                "Cargo.toml",
                "package.json",
                "pom.xml",
                "build.gradle",
                "build.gradle.kts",
                "go.mod",
                "pyproject.toml",
                "*.csproj",
                "*.sln",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            include_projects: Vec::new(),
            finalize: true,
        }
    }
}

impl IngestConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: IngestConfig = serde_yaml::from_str(content)
            .map_err(|e| IngestError::Config(format!("Invalid config YAML: {}", e)))?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads `root/.code-ingest.yml` when present, defaults otherwise.
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILENAME);
        if path.is_file() {
            tracing::info!(path = %path.display(), "Loading config");
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn repository_name(&self, root: &Path) -> String {
        self.repository.clone().unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "repository".to_string())
        })
    }

    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
            .unwrap_or_else(TaskDispatcher::default_parallelism)
    }

    pub fn discovery_threads(&self) -> usize {
        self.discovery_threads
            .unwrap_or_else(DirectoryFileSystem::default_threads)
    }

    /// Mounts resolved against `root`.
    pub fn mounts(&self, root: &Path) -> Vec<Mount> {
        self.mounts
            .iter()
            .map(|m| Mount::new(m.name.clone(), &root.join(&m.path)))
            .collect()
    }

    /// OR of `include_projects`, or `None` to include every project.
    pub fn project_filter(&self) -> Result<Option<Regex>> {
        if self.include_projects.is_empty() {
            return Ok(None);
        }
        let combined = self
            .include_projects
            .iter()
            .map(|p| format!("(?:{})", p))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Some(Regex::new(&combined)?))
    }

    /// Composes the discovery filter pipeline.
    ///
    /// Cheap path checks come first; content sniffing runs last.
    pub fn build_filter(&self, root: &Path) -> Arc<dyn FileFilter> {
        let mut filters = AllFilters::new(Vec::new());
        if self.skip_hidden_directories {
            filters.push(Arc::new(HiddenDirectoryFilter));
        }
        if !self.excluded_paths.is_empty() {
            filters.push(Arc::new(PathExclusionFilter::new(&self.excluded_paths)));
        }
        if !self.ignore_file.is_empty() {
            let cache = IgnoreFileCache::new(self.ignore_file.clone(), self.ignore_dialect).with_root(root);
            filters.push(Arc::new(IgnoreFileFilter::new(Arc::new(cache))));
        }
        if !self.include_extensions.is_empty() {
            filters.push(Arc::new(ExtensionAllowFilter::new(&self.include_extensions)));
        }
        filters.push(Arc::new(BinaryFileFilter::new(&self.binary_extensions)));
        Arc::new(filters)
    }

    /// Built-in analyzers: configured projects first, manifests second, plain
    /// text for every file.
    pub fn build_registry(&self) -> AnalyzerRegistry {
        let mut registry = AnalyzerRegistry::new();
        if !self.projects.is_empty() {
            registry.register_project_analyzer(Arc::new(ExplicitProjectAnalyzer::new(self.projects.clone())));
        }
        if !self.project_manifests.is_empty() {
            registry.register_project_analyzer(Arc::new(ManifestProjectAnalyzer::new(&self.project_manifests)));
        }
        registry.set_fallback(Arc::new(TextFileAnalyzer));
        registry
    }
}
