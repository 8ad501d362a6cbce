//! Moves default-project files to the most specific explicit project.

use std::sync::Arc;

use super::{Project, RepoFile, Repository, DEFAULT_PROJECT_ID};

impl Repository {
    /// Runs the reassignment pass and returns how many files moved.
    ///
    /// Projects with longer directory scopes claim first, so a file in a
    /// nested project never lands in an enclosing one. Equal scope lengths
    /// keep creation order.
    pub fn reassign_files(&self) -> usize {
        let default = self.default_project().clone();

        let mut files = default.with_files(|files| {
            files.sort_by(|a, b| a.key().cmp(b.key()));
            files.clone()
        });
        files.retain(|f| f.is_owned_by(DEFAULT_PROJECT_ID));

        let mut projects = self.projects();
        projects.sort_by_key(|p| p.sequence());
        projects.sort_by(|a, b| b.directory_key().len().cmp(&a.directory_key().len()));

        let mut moved = 0;
        for project in &projects {
            moved += claim_range(&files, project);
        }

        default.with_files(|files| files.retain(|f| f.is_owned_by(DEFAULT_PROJECT_ID)));
        tracing::info!(moved, projects = projects.len(), "Reassigned files to projects");
        moved
    }
}

/// Claims the contiguous run of `files` under the project's directory.
fn claim_range(files: &[Arc<RepoFile>], project: &Arc<Project>) -> usize {
    let prefix = project.directory_key();
    let start = files.partition_point(|f| f.key() < prefix);

    let mut claimed = 0;
    for file in files[start..].iter().take_while(|f| f.key().starts_with(prefix)) {
        if file.transfer(DEFAULT_PROJECT_ID, project.id()) {
            project.push_file(file.clone());
            claimed += 1;
        }
    }
    claimed
}
