use std::path::Path;
use std::sync::Arc;

use crate::config::ProjectConfig;
use crate::dispatch::DispatchContext;
use crate::error::{IngestError, Result};
use crate::filesystem::normalize_path;
use crate::repo::{normalize_directory, ProjectKind, RepoFile, Repository};

use super::{AnalysisHost, ProjectAnalyzer};

/// Creates the projects listed in configuration.
pub struct ExplicitProjectAnalyzer {
    projects: Vec<ProjectConfig>,
}

impl ExplicitProjectAnalyzer {
    pub fn new(projects: Vec<ProjectConfig>) -> Self {
        Self { projects }
    }
}

impl ProjectAnalyzer for ExplicitProjectAnalyzer {
    fn name(&self) -> &str {
        "explicit"
    }

    fn create_projects(&self, _host: &AnalysisHost, repo: &Arc<Repository>, _ctx: &DispatchContext) -> Result<()> {
        for project in &self.projects {
            repo.create_project(&project.id, &project.directory, project.kind, self.name())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ManifestPattern {
    Name(String),
    Suffix(String),
}

impl ManifestPattern {
    fn parse(pattern: &str) -> Self {
        let pattern = pattern.to_lowercase();
        match pattern.strip_prefix('*') {
            Some(suffix) => ManifestPattern::Suffix(suffix.to_string()),
            None => ManifestPattern::Name(pattern),
        }
    }

    fn matches(&self, file_name: &str) -> bool {
        match self {
            ManifestPattern::Name(name) => file_name == name,
            ManifestPattern::Suffix(suffix) => file_name.ends_with(suffix.as_str()),
        }
    }
}

/// Turns build manifests into projects rooted at the manifest's directory.
///
/// Patterns are file names (`Cargo.toml`) or `*`-prefixed suffixes
/// (`*.csproj`), matched case-insensitively.
pub struct ManifestProjectAnalyzer {
    patterns: Vec<ManifestPattern>,
}

impl ManifestProjectAnalyzer {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns.into_iter().map(|p| ManifestPattern::parse(p.as_ref())).collect(),
        }
    }

    fn project_id(repo: &Repository, directory: &Path) -> String {
        let relative = repo.relative_path(&normalize_directory(&normalize_path(directory)));
        match relative.trim_end_matches('/') {
            "" => repo.name().to_string(),
            id => id.to_string(),
        }
    }
}

impl ProjectAnalyzer for ManifestProjectAnalyzer {
    fn name(&self) -> &str {
        "manifest"
    }

    fn is_candidate_project_file(&self, _repo: &Repository, file: &RepoFile) -> bool {
        let file_name = match Path::new(file.path()).file_name() {
            Some(name) => name.to_string_lossy().to_lowercase(),
            None => return false,
        };
        self.patterns.iter().any(|p| p.matches(&file_name))
    }

    fn create_projects_from_file(
        &self,
        _host: &AnalysisHost,
        repo: &Arc<Repository>,
        _ctx: &DispatchContext,
        file: &Arc<RepoFile>,
    ) -> Result<()> {
        let manifest = Path::new(file.path());
        let directory = manifest
            .parent()
            .ok_or_else(|| IngestError::Structural(format!("manifest '{}' has no directory", file.path())))?;

        let id = Self::project_id(repo, directory);
        let (project, created) = repo.create_project(&id, directory, ProjectKind::Source, self.name())?;
        repo.add_file(project.id(), manifest)?;
        if created {
            tracing::debug!(project = %id, manifest = %file.path(), "Project created from manifest");
        }
        Ok(())
    }
}
