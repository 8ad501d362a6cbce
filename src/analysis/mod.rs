//! Analyzer contracts and the storage sink they report to.
//!
//! File analyzers turn one file into a [`BoundSourceFile`]; project analyzers
//! declare projects and drive analysis of the files a project owns. Both run
//! on the [`TaskDispatcher`](crate::dispatch::TaskDispatcher) and report
//! through an [`AnalysisTarget`].

pub mod projects;
pub mod registry;
pub mod text;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use crate::bound::BoundSourceFile;
use crate::dispatch::dispatcher::panic_message;
use crate::dispatch::{DispatchContext, Priority, TaskDispatcher};
use crate::error::{IngestError, Result};
use crate::filesystem::FileSystem;
use crate::importer::ImportProgress;
use crate::repo::{Project, ProjectKind, RepoFile, Repository, DEFAULT_PROJECT_ANALYZER};

pub use projects::{ExplicitProjectAnalyzer, ManifestProjectAnalyzer};
pub use registry::AnalyzerRegistry;
pub use text::TextFileAnalyzer;

/// Collaborators shared by every analyzer during one import.
#[derive(Clone)]
pub struct AnalysisHost {
    pub dispatcher: Arc<TaskDispatcher>,
    pub target: Arc<dyn AnalysisTarget>,
    pub file_system: Arc<dyn FileSystem>,
    pub analyzers: Arc<AnalyzerRegistry>,
    pub progress: ImportProgress,
}

/// Project-level metadata uploaded after a project's files were analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzedProject {
    pub repository: String,
    pub project_id: String,
    pub directory: String,
    pub kind: ProjectKind,
    pub analyzer: String,
    pub file_count: usize,
    pub analyzed_files: usize,
}

impl AnalyzedProject {
    pub fn new(repo: &Repository, project: &Project, file_count: usize, analyzed_files: usize) -> Self {
        Self {
            repository: repo.name().to_string(),
            project_id: project.id().to_string(),
            directory: project.directory().to_string(),
            kind: project.kind(),
            analyzer: project.analyzer().to_string(),
            file_count,
            analyzed_files,
        }
    }
}

/// Storage sink for analysis results.
///
/// Calls arrive concurrently from dispatcher workers.
pub trait AnalysisTarget: Send + Sync {
    fn add_repository(&self, repo: &Repository) -> Result<()>;
    fn add_project(&self, project: &Project, metadata: &AnalyzedProject) -> Result<()>;
    fn upload(&self, file: &RepoFile, source: BoundSourceFile) -> Result<()>;
    fn finalize_repository(&self, repo: &Repository) -> Result<()>;
}

pub trait FileAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase extensions without the dot.
    fn supported_extensions(&self) -> &[&str];

    fn initialize(&self, _host: &AnalysisHost, _repo: &Arc<Repository>, _ctx: &DispatchContext) -> Result<()> {
        Ok(())
    }

    fn finalize(&self, _host: &AnalysisHost, _repo: &Arc<Repository>, _ctx: &DispatchContext) -> Result<()> {
        Ok(())
    }

    /// Called at most once per file. Implementations queue their own work and
    /// eventually upload the result.
    fn analyze(
        &self,
        host: &AnalysisHost,
        repo: &Arc<Repository>,
        ctx: &DispatchContext,
        file: &Arc<RepoFile>,
    ) -> Result<()>;
}

pub trait ProjectAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Declares projects known up front.
    fn create_projects(&self, _host: &AnalysisHost, _repo: &Arc<Repository>, _ctx: &DispatchContext) -> Result<()> {
        Ok(())
    }

    fn is_candidate_project_file(&self, _repo: &Repository, _file: &RepoFile) -> bool {
        false
    }

    /// Creates projects from a candidate file still owned by the default project.
    fn create_projects_from_file(
        &self,
        _host: &AnalysisHost,
        _repo: &Arc<Repository>,
        _ctx: &DispatchContext,
        _file: &Arc<RepoFile>,
    ) -> Result<()> {
        Ok(())
    }

    fn analyze(
        &self,
        host: &AnalysisHost,
        repo: &Arc<Repository>,
        ctx: &DispatchContext,
        project: &Arc<Project>,
    ) -> Result<()> {
        analyze_project_files(host, repo, ctx, project)
    }
}

/// Analyzer for the default project; relies entirely on the trait defaults.
pub struct DefaultProjectAnalyzer;

impl ProjectAnalyzer for DefaultProjectAnalyzer {
    fn name(&self) -> &str {
        DEFAULT_PROJECT_ANALYZER
    }
}

/// Analyzes every file the project owns, then uploads project metadata.
///
/// A failing or panicking file is logged and counted; the remaining files
/// still run.
pub fn analyze_project_files(
    host: &AnalysisHost,
    repo: &Arc<Repository>,
    ctx: &DispatchContext,
    project: &Arc<Project>,
) -> Result<()> {
    let files = project.owned_files();
    let mut analyzed = 0;
    for file in &files {
        let outcome = catch_unwind(AssertUnwindSafe(|| file.analyze(host, repo, ctx)))
            .unwrap_or_else(|payload| Err(IngestError::TaskPanicked(panic_message(payload))));
        match outcome {
            Ok(true) => analyzed += 1,
            Ok(false) => {}
            Err(e) => {
                host.progress.file_failed();
                tracing::warn!(path = %file.path(), error = %e, "File analysis failed");
            }
        }
    }

    let metadata = AnalyzedProject::new(repo, project, files.len(), analyzed);
    host.target.add_project(project, &metadata)?;
    host.progress.project_analyzed();
    tracing::debug!(project = %project.id(), files = files.len(), analyzed, "Project analyzed");
    Ok(())
}

/// Queues `build` at analysis priority and the upload of its result at upload
/// priority.
///
/// Failures are logged with the file path and counted; they never reach the
/// caller.
pub fn schedule_analysis<F>(
    host: &AnalysisHost,
    repo: &Arc<Repository>,
    ctx: &DispatchContext,
    file: &Arc<RepoFile>,
    build: F,
) where
    F: FnOnce(&AnalysisHost, &Repository, &RepoFile) -> Result<BoundSourceFile> + Send + 'static,
{
    let host = host.clone();
    let repo = repo.clone();
    let file = file.clone();
    let dispatcher = host.dispatcher.clone();

    let _ = dispatcher.run(ctx, Priority::Analyze, move |child| {
        let bound = match build(&host, &repo, &file) {
            Ok(bound) => bound,
            Err(e) => {
                host.progress.file_failed();
                tracing::warn!(path = %file.path(), error = %e, "File analysis failed");
                return Err(e);
            }
        };
        host.progress
            .file_analyzed(bound.references.len() + bound.definitions.len());

        let uploader = host.clone();
        let _ = host.dispatcher.run(&child, Priority::Upload, move |_| {
            let path = file.path().to_string();
            match uploader.target.upload(&file, bound) {
                Ok(()) => uploader.progress.file_uploaded(),
                Err(e) => {
                    uploader.progress.file_failed();
                    tracing::warn!(path = %path, error = %e, "Upload failed");
                }
            }
            Ok(())
        });
        Ok(())
    });
}


#[cfg(test)]
mod tests {
    use super::test_support::test_host_with;
    use super::*;
    use crate::dispatch::DispatchContext;
    use crate::error::IngestError;
    use crate::repo::DEFAULT_PROJECT_ID;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAnalyzer {
        runs: AtomicUsize,
    }

    impl FileAnalyzer for CountingAnalyzer {
        fn name(&self) -> &str {
            "counting"
        }

        fn supported_extensions(&self) -> &[&str] {
            &["cnt"]
        }

        fn analyze(
            &self,
            _host: &AnalysisHost,
            _repo: &Arc<Repository>,
            _ctx: &DispatchContext,
            _file: &Arc<RepoFile>,
        ) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(())
        }
    }

    struct FailingAnalyzer;

    impl FileAnalyzer for FailingAnalyzer {
        fn name(&self) -> &str {
            "failing"
        }

        fn supported_extensions(&self) -> &[&str] {
            &["bad"]
        }

        fn analyze(
            &self,
            _host: &AnalysisHost,
            _repo: &Arc<Repository>,
            _ctx: &DispatchContext,
            _file: &Arc<RepoFile>,
        ) -> Result<()> {
            Err(IngestError::Analysis("unparseable".to_string()))
        }
    }

    struct PanickingAnalyzer;

    impl FileAnalyzer for PanickingAnalyzer {
        fn name(&self) -> &str {
            "panicking"
        }

        fn supported_extensions(&self) -> &[&str] {
            &["boom"]
        }

        fn analyze(
            &self,
            _host: &AnalysisHost,
            _repo: &Arc<Repository>,
            _ctx: &DispatchContext,
            file: &Arc<RepoFile>,
        ) -> Result<()> {
            panic!("analyzer blew up on {}", file.path());
        }
    }

    #[test]
    fn test_concurrent_analyze_runs_analyzer_once() {
        let (host, _) = test_host_with(&[]);
        let repo = Arc::new(Repository::new("demo", "/repo"));
        let file = repo.add_file(DEFAULT_PROJECT_ID, Path::new("/repo/a.cnt")).unwrap();
        let analyzer = Arc::new(CountingAnalyzer {
            runs: AtomicUsize::new(0),
        });
        assert!(file.set_explicit_analyzer(analyzer.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let (host, repo, file) = (host.clone(), repo.clone(), file.clone());
                std::thread::spawn(move || file.analyze(&host, &repo, &DispatchContext::root()).unwrap())
            })
            .collect();
        let started = handles.into_iter().map(|h| h.join().unwrap()).filter(|s| *s).count();

        assert_eq!(started, 1);
        assert_eq!(analyzer.runs.load(Ordering::SeqCst), 1);
        assert!(file.is_analyzed());
    }

    #[test]
    fn test_ignored_file_is_not_analyzed() {
        let (host, _) = test_host_with(&[]);
        let repo = Arc::new(Repository::new("demo", "/repo"));
        let file = repo.add_file(DEFAULT_PROJECT_ID, Path::new("/repo/a.txt")).unwrap();
        file.set_ignored(true);

        assert!(!file.analyze(&host, &repo, &DispatchContext::root()).unwrap());
        assert!(!file.is_analyzed());
    }

    #[tokio::test]
    async fn test_project_analysis_isolates_failures_and_uploads() {
        let (mut host, target) = test_host_with(&[("/repo/a.txt", "alpha\n"), ("/repo/b.bad", "??")]);
        let mut analyzers = AnalyzerRegistry::new();
        analyzers.register_file_analyzer(Arc::new(FailingAnalyzer));
        analyzers.set_fallback(Arc::new(TextFileAnalyzer));
        host.analyzers = Arc::new(analyzers);

        let repo = Arc::new(Repository::new("demo", "/repo"));
        repo.add_file(DEFAULT_PROJECT_ID, Path::new("/repo/a.txt")).unwrap();
        repo.add_file(DEFAULT_PROJECT_ID, Path::new("/repo/b.bad")).unwrap();

        let default = repo.default_project().clone();
        analyze_project_files(&host, &repo, &DispatchContext::root(), &default).unwrap();
        host.dispatcher.drain().await;

        assert_eq!(target.upload_count(), 1);
        let upload = target.uploaded("a.txt").unwrap();
        assert_eq!(upload.text, "alpha\n");
        assert_eq!(upload.project_id, DEFAULT_PROJECT_ID);

        let projects = target.projects();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].file_count, 2);
        assert_eq!(projects[0].analyzed_files, 1);

        let snapshot = host.progress.snapshot();
        assert_eq!(snapshot.files_failed, 1);
        assert_eq!(snapshot.files_uploaded, 1);
    }

    #[tokio::test]
    async fn test_panicking_analyzer_does_not_stop_project() {
        let (mut host, target) = test_host_with(&[
            ("/repo/a.boom", "x"),
            ("/repo/b.txt", "bravo\n"),
            ("/repo/c.txt", "charlie\n"),
        ]);
        let mut analyzers = AnalyzerRegistry::new();
        analyzers.register_file_analyzer(Arc::new(PanickingAnalyzer));
        analyzers.set_fallback(Arc::new(TextFileAnalyzer));
        host.analyzers = Arc::new(analyzers);

        let repo = Arc::new(Repository::new("demo", "/repo"));
        for path in ["/repo/a.boom", "/repo/b.txt", "/repo/c.txt"] {
            repo.add_file(DEFAULT_PROJECT_ID, Path::new(path)).unwrap();
        }

        let default = repo.default_project().clone();
        analyze_project_files(&host, &repo, &DispatchContext::root(), &default).unwrap();
        host.dispatcher.drain().await;

        assert_eq!(target.upload_count(), 2);
        let projects = target.projects();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].analyzed_files, 2);
        assert_eq!(host.progress.snapshot().files_failed, 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_logged_not_fatal() {
        let (host, target) = test_host_with(&[]);
        let repo = Arc::new(Repository::new("demo", "/repo"));
        let file = repo.add_file(DEFAULT_PROJECT_ID, Path::new("/repo/missing.txt")).unwrap();

        assert!(file.analyze(&host, &repo, &DispatchContext::root()).unwrap());
        host.dispatcher.drain().await;

        assert_eq!(target.upload_count(), 0);
        assert_eq!(host.progress.snapshot().files_failed, 1);
    }
}
