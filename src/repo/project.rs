use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::file::RepoFile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    /// The catch-all project of a repository.
    Default,
    #[default]
    Source,
    Generated,
    Metadata,
}

impl ProjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Default => "default",
            ProjectKind::Source => "source",
            ProjectKind::Generated => "generated",
            ProjectKind::Metadata => "metadata",
        }
    }
}

/// A logical project: a directory scope owning a list of files.
pub struct Project {
    id: String,
    directory: String,
    directory_key: String,
    kind: ProjectKind,
    analyzer: String,
    sequence: u64,
    files: Mutex<Vec<Arc<RepoFile>>>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("directory", &self.directory)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Project {
    pub(crate) fn new(id: String, directory: String, kind: ProjectKind, analyzer: String, sequence: u64) -> Self {
        let directory_key = directory.to_lowercase();
        Self {
            id,
            directory,
            directory_key,
            kind,
            analyzer,
            sequence,
            files: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory scope, always ending in `/`.
    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub(crate) fn directory_key(&self) -> &str {
        &self.directory_key
    }

    pub fn kind(&self) -> ProjectKind {
        self.kind
    }

    pub fn is_default(&self) -> bool {
        self.kind == ProjectKind::Default
    }

    /// Name of the project analyzer responsible for this project.
    pub fn analyzer(&self) -> &str {
        &self.analyzer
    }

    /// Creation order within the repository.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn files(&self) -> Vec<Arc<RepoFile>> {
        self.files.lock().clone()
    }

    /// Files this project currently owns.
    pub fn owned_files(&self) -> Vec<Arc<RepoFile>> {
        self.files
            .lock()
            .iter()
            .filter(|f| f.is_owned_by(&self.id))
            .cloned()
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    pub(crate) fn push_file(&self, file: Arc<RepoFile>) {
        self.files.lock().push(file);
    }

    pub(crate) fn with_files<R>(&self, f: impl FnOnce(&mut Vec<Arc<RepoFile>>) -> R) -> R {
        f(&mut self.files.lock())
    }
}

/// Normalizes a directory scope to forward slashes with a trailing `/`.
pub fn normalize_directory(directory: &str) -> String {
    let mut normalized = directory.replace('\\', "/");
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}
