//! In-memory ownership graph: a repository owns projects, projects own files.
//!
//! Every repository has exactly one default project that initially owns each
//! discovered file. Explicit projects claim files either directly through
//! [`Repository::add_file`] or through the reassignment pass in [`reassign`].

pub mod file;
pub mod project;
pub mod reassign;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;

use crate::cache::ConcurrentCache;
use crate::error::{IngestError, Result};
use crate::filesystem::{normalize_path, path_key, strip_prefix_ignore_case};

pub use file::{RepoFile, SourceFileInfo};
pub use project::{normalize_directory, Project, ProjectKind};

pub const DEFAULT_PROJECT_ID: &str = "__default__";

/// Pseudo mount for files outside every named mount.
pub const EXTERNAL_ROOT: &str = "external";

/// Name of the analyzer that drives the default project.
pub const DEFAULT_PROJECT_ANALYZER: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub name: String,
    root: String,
    key: String,
}

impl Mount {
    pub fn new(name: impl Into<String>, root: &Path) -> Self {
        let root = normalize_directory(&normalize_path(root));
        let key = path_key(&root);
        Self {
            name: name.into(),
            root,
            key,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }
}

#[derive(Default)]
struct ProjectTable {
    ordered: Vec<Arc<Project>>,
    by_id: HashMap<String, Arc<Project>>,
    next_sequence: u64,
}

pub struct Repository {
    name: String,
    root: PathBuf,
    root_prefix: String,
    mounts: Vec<Mount>,
    default_project: Arc<Project>,
    projects: RwLock<ProjectTable>,
    files: ConcurrentCache<String, Arc<RepoFile>>,
    shadow_files: AtomicUsize,
    project_filter: Option<Regex>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("root", &self.root)
            .finish()
    }
}

impl Repository {
    /// Creates a repository whose root is also its first named mount.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let root = root.into();
        let root_prefix = normalize_directory(&normalize_path(&root));
        let default_project = Arc::new(Project::new(
            DEFAULT_PROJECT_ID.to_string(),
            root_prefix.clone(),
            ProjectKind::Default,
            DEFAULT_PROJECT_ANALYZER.to_string(),
            0,
        ));
        let mounts = vec![Mount::new(name.clone(), &root)];

        Self {
            name,
            root,
            root_prefix,
            mounts,
            default_project,
            projects: RwLock::new(ProjectTable {
                next_sequence: 1,
                ..Default::default()
            }),
            files: ConcurrentCache::new(),
            shadow_files: AtomicUsize::new(0),
            project_filter: None,
        }
    }

    /// Adds named mount roots; the most specific mount wins.
    pub fn with_mounts(mut self, mounts: impl IntoIterator<Item = Mount>) -> Self {
        self.mounts.extend(mounts);
        self.mounts.sort_by(|a, b| b.key.len().cmp(&a.key.len()));
        self
    }

    /// Restricts which projects are analyzed to ids matching `filter`.
    pub fn with_project_filter(mut self, filter: Option<Regex>) -> Self {
        self.project_filter = filter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    pub fn default_project(&self) -> &Arc<Project> {
        &self.default_project
    }

    /// Explicit projects in creation order.
    pub fn projects(&self) -> Vec<Arc<Project>> {
        self.projects.read().ordered.clone()
    }

    /// Default project followed by the explicit projects.
    pub fn all_projects(&self) -> Vec<Arc<Project>> {
        let mut all = vec![self.default_project.clone()];
        all.extend(self.projects());
        all
    }

    pub fn project(&self, id: &str) -> Option<Arc<Project>> {
        if id == DEFAULT_PROJECT_ID {
            return Some(self.default_project.clone());
        }
        self.projects.read().by_id.get(id).cloned()
    }

    pub fn includes_project(&self, project: &Project) -> bool {
        match &self.project_filter {
            Some(filter) => filter.is_match(project.id()),
            None => true,
        }
    }

    /// Creates an explicit project, or returns the existing one with that id.
    ///
    /// The flag is true only for the call that created the project. Relative
    /// directories resolve against the repository root.
    pub fn create_project(
        &self,
        id: &str,
        directory: &Path,
        kind: ProjectKind,
        analyzer: &str,
    ) -> Result<(Arc<Project>, bool)> {
        if id.is_empty() || id == DEFAULT_PROJECT_ID {
            return Err(IngestError::Structural(format!("invalid project id '{}'", id)));
        }
        if directory.as_os_str().is_empty() {
            return Err(IngestError::Structural(format!("project '{}' has an empty directory", id)));
        }

        let directory = if directory.is_absolute() {
            directory.to_path_buf()
        } else {
            self.root.join(directory)
        };

        let mut table = self.projects.write();
        if let Some(existing) = table.by_id.get(id) {
            return Ok((existing.clone(), false));
        }

        let sequence = table.next_sequence;
        table.next_sequence += 1;
        let project = Arc::new(Project::new(
            id.to_string(),
            normalize_directory(&normalize_path(&directory)),
            kind,
            analyzer.to_string(),
            sequence,
        ));
        table.ordered.push(project.clone());
        table.by_id.insert(id.to_string(), project.clone());

        tracing::debug!(project = %id, directory = %project.directory(), "Created project");
        Ok((project, true))
    }

    /// Registers `path` with a project.
    ///
    /// An unseen path is created owned by the project. A path owned by the
    /// default project moves to a non-default caller. A path already owned by
    /// a different non-default project yields a separate shadow file for the
    /// caller and leaves the original owner in place.
    pub fn add_file(&self, project_id: &str, path: &Path) -> Result<Arc<RepoFile>> {
        if path.as_os_str().is_empty() {
            return Err(IngestError::Structural("empty file path".to_string()));
        }
        let project = self
            .project(project_id)
            .ok_or_else(|| IngestError::Structural(format!("unknown project '{}'", project_id)))?;

        let normalized = normalize_path(path);
        let key = path_key(&normalized);

        let file = match self.files.get(&key) {
            Some(existing) => existing,
            None => {
                let created = Arc::new(self.new_file(normalized.clone(), key.clone(), project.id(), false));
                let (file, inserted) = self.files.insert_if_absent(key.clone(), created);
                if inserted {
                    project.push_file(file.clone());
                    return Ok(file);
                }
                file
            }
        };

        if project.is_default() || file.is_owned_by(project.id()) {
            return Ok(file);
        }

        if file.transfer(DEFAULT_PROJECT_ID, project.id()) {
            project.push_file(file.clone());
            return Ok(file);
        }

        let shadow = Arc::new(self.new_file(normalized, key, project.id(), true));
        self.shadow_files.fetch_add(1, Ordering::Relaxed);
        project.push_file(shadow.clone());
        tracing::debug!(path = %shadow.path(), project = %project.id(), "Created shadow file");
        Ok(shadow)
    }

    fn new_file(&self, path: String, key: String, owner: &str, shadow: bool) -> RepoFile {
        let repo_relative_path = self.relative_path(&path);
        let logical_path = self.logical_path(&path);
        RepoFile::new(path, key, repo_relative_path, logical_path, owner, shadow)
    }

    pub fn file(&self, path: &Path) -> Option<Arc<RepoFile>> {
        self.files.get(&path_key(&normalize_path(path)))
    }

    pub fn files(&self) -> Vec<Arc<RepoFile>> {
        self.files.values()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn shadow_file_count(&self) -> usize {
        self.shadow_files.load(Ordering::Relaxed)
    }

    /// Path relative to the repository root, or the full path for files
    /// outside it.
    pub fn relative_path(&self, path: &str) -> String {
        let path = path.replace('\\', "/");
        match strip_prefix_ignore_case(&path, &self.root_prefix) {
            Some(relative) => relative.to_string(),
            None => path,
        }
    }

    /// Path under the most specific named mount, or under [`EXTERNAL_ROOT`].
    pub fn logical_path(&self, path: &str) -> String {
        let path = path.replace('\\', "/");
        for mount in &self.mounts {
            if let Some(rest) = strip_prefix_ignore_case(&path, &mount.root) {
                return format!("{}/{}", mount.name, rest);
            }
        }
        format!("{}/{}", EXTERNAL_ROOT, path.trim_start_matches('/').replace(':', ""))
    }
}
