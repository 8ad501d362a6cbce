//! Drives one ingestion run through its phases.
//!
//! Phases run strictly in order and every phase ends with a dispatcher
//! barrier, so work a phase queued (including work queued by that work) has
//! finished before the next phase starts.

pub mod progress;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;

use crate::analysis::{AnalysisHost, AnalysisTarget};
use crate::config::IngestConfig;
use crate::dispatch::{DispatchContext, Priority, TaskDispatcher};
use crate::error::Result;
use crate::filesystem::{normalize_path, path_key, CachingFileSystem, DirectoryFileSystem, FileFilter};
use crate::repo::{Mount, RepoFile, Repository, DEFAULT_PROJECT_ID};

pub use progress::{ImportProgress, ProgressSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Idle,
    ResolveRepository,
    InitializeAnalyzers,
    ExplicitProjects,
    Discover,
    CandidateProjects,
    Reassign,
    Analyze,
    FinalizeAnalyzers,
    FinalizeRepository,
    Done,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportPhase::Idle => "idle",
            ImportPhase::ResolveRepository => "resolve-repository",
            ImportPhase::InitializeAnalyzers => "initialize-analyzers",
            ImportPhase::ExplicitProjects => "explicit-projects",
            ImportPhase::Discover => "discover",
            ImportPhase::CandidateProjects => "candidate-projects",
            ImportPhase::Reassign => "reassign",
            ImportPhase::Analyze => "analyze",
            ImportPhase::FinalizeAnalyzers => "finalize-analyzers",
            ImportPhase::FinalizeRepository => "finalize-repository",
            ImportPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// What to import and how the repository is set up on first creation.
#[derive(Debug, Clone)]
pub struct RepositorySettings {
    pub name: String,
    pub root: PathBuf,
    pub mounts: Vec<Mount>,
    pub project_filter: Option<Regex>,
    pub finalize: bool,
}

impl RepositorySettings {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            mounts: Vec::new(),
            project_filter: None,
            finalize: true,
        }
    }

    pub fn from_config(config: &IngestConfig, root: &Path) -> Result<Self> {
        Ok(Self {
            name: config.repository_name(root),
            root: root.to_path_buf(),
            mounts: config.mounts(root),
            project_filter: config.project_filter()?,
            finalize: config.finalize,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub repository: Arc<Repository>,
    /// Whether this run created the repository.
    pub created: bool,
    pub progress: ProgressSnapshot,
}

pub struct Importer {
    host: AnalysisHost,
    filter: Option<Arc<dyn FileFilter>>,
    repositories: DashMap<String, Arc<Repository>>,
    phase: Mutex<ImportPhase>,
}

impl Importer {
    pub fn new(host: AnalysisHost) -> Self {
        Self {
            host,
            filter: None,
            repositories: DashMap::new(),
            phase: Mutex::new(ImportPhase::Idle),
        }
    }

    /// Files registered outside enumeration that `filter` rejects are marked
    /// ignored after discovery.
    pub fn with_file_filter(mut self, filter: Arc<dyn FileFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Wires the built-in stack for `root`: a dispatcher, a cached directory
    /// walk through the configured filters, and the configured analyzers.
    ///
    /// Call from within a tokio runtime to let dispatched work use it.
    pub fn from_config(config: &IngestConfig, root: &Path, target: Arc<dyn AnalysisTarget>) -> Result<Self> {
        let dispatcher = Arc::new(TaskDispatcher::new(config.max_parallelism())?);
        let filter = config.build_filter(root);
        let walker = DirectoryFileSystem::with_threads(root, filter.clone(), config.discovery_threads());
        let host = AnalysisHost {
            dispatcher,
            target,
            file_system: Arc::new(CachingFileSystem::new(Arc::new(walker))),
            analyzers: Arc::new(config.build_registry()),
            progress: ImportProgress::new(),
        };
        Ok(Self::new(host).with_file_filter(filter))
    }

    pub fn host(&self) -> &AnalysisHost {
        &self.host
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.host.progress.snapshot()
    }

    pub fn phase(&self) -> ImportPhase {
        *self.phase.lock()
    }

    pub fn repository(&self, name: &str) -> Option<Arc<Repository>> {
        self.repositories.get(name).map(|r| r.value().clone())
    }

    /// Looks up the repository by name, creating it on first use.
    ///
    /// Exactly one caller per name observes `true`.
    pub fn resolve_repository(&self, settings: &RepositorySettings) -> (Arc<Repository>, bool) {
        match self.repositories.entry(settings.name.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let repo = Arc::new(
                    Repository::new(settings.name.clone(), settings.root.clone())
                        .with_mounts(settings.mounts.iter().cloned())
                        .with_project_filter(settings.project_filter.clone()),
                );
                entry.insert(repo.clone());
                (repo, true)
            }
        }
    }

    fn enter(&self, phase: ImportPhase) {
        *self.phase.lock() = phase;
        tracing::info!(phase = %phase, "Import phase");
    }

    async fn barrier(&self) {
        self.host.dispatcher.drain().await;
    }

    /// Runs every phase against the repository named in `settings`.
    ///
    /// Failures of single files or projects are logged and counted; only a
    /// failing phase-level call or a structural error aborts the run.
    pub async fn import(&self, settings: &RepositorySettings) -> Result<ImportOutcome> {
        let ctx = DispatchContext::root();
        let host = &self.host;
        host.progress.start();

        self.enter(ImportPhase::ResolveRepository);
        let (repo, created) = self.resolve_repository(settings);
        if created {
            host.target.add_repository(&repo)?;
        }
        self.barrier().await;

        self.enter(ImportPhase::InitializeAnalyzers);
        for analyzer in host.analyzers.file_analyzers() {
            analyzer.initialize(host, &repo, &ctx)?;
        }
        self.barrier().await;

        self.enter(ImportPhase::ExplicitProjects);
        for analyzer in host.analyzers.project_analyzers() {
            analyzer.create_projects(host, &repo, &ctx)?;
            self.barrier().await;
        }

        self.enter(ImportPhase::Discover);
        let candidates = self.discover(&repo, &ctx).await?;
        self.barrier().await;

        self.enter(ImportPhase::CandidateProjects);
        for (analyzer, files) in host.analyzers.project_analyzers().iter().zip(candidates) {
            for file in files.iter().filter(|f| f.is_owned_by(DEFAULT_PROJECT_ID)) {
                isolate(
                    analyzer.create_projects_from_file(host, &repo, &ctx, file),
                    "Project creation from candidate failed",
                    file.path(),
                )?;
            }
            self.barrier().await;
        }

        self.enter(ImportPhase::Reassign);
        repo.reassign_files();
        self.barrier().await;

        self.enter(ImportPhase::Analyze);
        self.analyze_projects(&repo, &ctx);
        self.barrier().await;

        self.enter(ImportPhase::FinalizeAnalyzers);
        for analyzer in host.analyzers.file_analyzers() {
            analyzer.finalize(host, &repo, &ctx)?;
        }
        self.barrier().await;

        if settings.finalize {
            self.enter(ImportPhase::FinalizeRepository);
            host.target.finalize_repository(&repo)?;
            self.barrier().await;
        }

        host.progress.set_shadow_files(repo.shadow_file_count());
        host.progress.finish();
        self.enter(ImportPhase::Done);

        let progress = host.progress.snapshot();
        tracing::info!(
            repository = %repo.name(),
            files = progress.files_discovered,
            analyzed = progress.files_analyzed,
            uploaded = progress.files_uploaded,
            failed = progress.files_failed,
            projects = progress.projects_analyzed,
            elapsed_ms = progress.elapsed_ms,
            "Import complete"
        );

        Ok(ImportOutcome {
            repository: repo,
            created,
            progress,
        })
    }

    /// Registers every discovered file with the default project and collects
    /// candidate project files per project analyzer. Files registered earlier
    /// that the filter rejects are marked ignored.
    ///
    /// Enumeration blocks, so it runs on a dispatcher worker.
    async fn discover(&self, repo: &Arc<Repository>, ctx: &DispatchContext) -> Result<Vec<Vec<Arc<RepoFile>>>> {
        let host = self.host.clone();
        let repo = repo.clone();
        let filter = self.filter.clone();

        self.host
            .dispatcher
            .run(ctx, Priority::Background, move |_| {
                let analyzers = host.analyzers.project_analyzers();
                let mut candidates = vec![Vec::new(); analyzers.len()];
                let mut enumerated = HashSet::new();

                for path in host.file_system.list_files() {
                    enumerated.insert(path_key(&normalize_path(&path)));
                    let file = repo.add_file(DEFAULT_PROJECT_ID, &path)?;
                    host.progress.file_discovered();
                    if file.has_explicit_analyzer() {
                        continue;
                    }
                    for (index, analyzer) in analyzers.iter().enumerate() {
                        if analyzer.is_candidate_project_file(&repo, &file) {
                            candidates[index].push(file.clone());
                        }
                    }
                }

                if let Some(filter) = filter {
                    for file in repo.files() {
                        if !enumerated.contains(file.key()) && !filter.include_file(Path::new(file.path())) {
                            file.set_ignored(true);
                            tracing::debug!(path = %file.path(), "Registered file rejected by filters");
                        }
                    }
                }

                tracing::info!(files = repo.file_count(), "Discovery complete");
                Ok(candidates)
            })
            .await
    }

    /// Queues analysis of every included project; each project fails alone.
    fn analyze_projects(&self, repo: &Arc<Repository>, ctx: &DispatchContext) {
        for project in repo.all_projects() {
            if !repo.includes_project(&project) {
                tracing::debug!(project = %project.id(), "Project excluded from analysis");
                continue;
            }
            let host = self.host.clone();
            let repo = repo.clone();
            let _ = self.host.dispatcher.run(ctx, Priority::Analyze, move |child| {
                let analyzer = host.analyzers.project_analyzer(project.analyzer());
                if let Err(e) = analyzer.analyze(&host, &repo, &child, &project) {
                    tracing::warn!(project = %project.id(), error = %e, "Project analysis failed");
                    return Err(e);
                }
                Ok(())
            });
        }
    }
}

/// Logs a local failure and carries on; structural errors still abort.
fn isolate(result: Result<()>, message: &str, path: &str) -> Result<()> {
    match result {
        Err(e) if e.is_structural() => Err(e),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "{}", message);
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::test_host_with;
    use crate::analysis::{FileAnalyzer, ManifestProjectAnalyzer, ProjectAnalyzer};
    use crate::analysis::{AnalyzerRegistry, TextFileAnalyzer};
    use crate::error::IngestError;
    use crate::filesystem::ExtensionAllowFilter;
    use crate::sink::MemoryTarget;

    fn importer_with(
        files: &[(&str, &str)],
        configure: impl FnOnce(&mut AnalyzerRegistry),
    ) -> (Importer, Arc<MemoryTarget>) {
        let (mut host, target) = test_host_with(files);
        let mut analyzers = AnalyzerRegistry::new();
        configure(&mut analyzers);
        analyzers.set_fallback(Arc::new(TextFileAnalyzer));
        host.analyzers = Arc::new(analyzers);
        (Importer::new(host), target)
    }

    #[tokio::test]
    async fn test_repository_created_exactly_once() {
        let (importer, target) = importer_with(&[], |_| {});
        let settings = RepositorySettings::new("demo", "/repo");

        let first = importer.import(&settings).await.unwrap();
        let second = importer.import(&settings).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert!(Arc::ptr_eq(&first.repository, &second.repository));
        assert_eq!(target.repositories(), vec!["demo"]);
        assert_eq!(target.finalized().len(), 2);
        assert_eq!(importer.phase(), ImportPhase::Done);
    }

    #[test]
    fn test_concurrent_resolve_reports_one_creator() {
        let (importer, _) = importer_with(&[], |_| {});
        let importer = Arc::new(importer);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let importer = importer.clone();
                std::thread::spawn(move || importer.resolve_repository(&RepositorySettings::new("demo", "/repo")).1)
            })
            .collect();
        let created = handles.into_iter().map(|h| h.join().unwrap()).filter(|c| *c).count();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_manifest_projects_claim_their_files() {
        let (importer, target) = importer_with(
            &[
                ("/repo/README.md", "readme"),
                ("/repo/core/Cargo.toml", "[package]"),
                ("/repo/core/src/lib.rs", "pub fn f() {}"),
                ("/repo/core/plugins/Cargo.toml", "[package]"),
                ("/repo/core/plugins/src/lib.rs", "pub fn g() {}"),
            ],
            |registry| registry.register_project_analyzer(Arc::new(ManifestProjectAnalyzer::new(["Cargo.toml"]))),
        );

        let outcome = importer
            .import(&RepositorySettings::new("demo", "/repo"))
            .await
            .unwrap();
        let repo = outcome.repository;

        let owner = |path: &str| repo.file(Path::new(path)).unwrap().primary_project();
        assert_eq!(owner("/repo/core/src/lib.rs"), "core");
        assert_eq!(owner("/repo/core/plugins/src/lib.rs"), "core/plugins");
        assert_eq!(owner("/repo/core/plugins/Cargo.toml"), "core/plugins");
        assert_eq!(owner("/repo/README.md"), DEFAULT_PROJECT_ID);

        assert_eq!(target.upload_count(), 5);
        assert_eq!(
            target.uploaded("core/plugins/src/lib.rs").unwrap().project_id,
            "core/plugins"
        );
        assert_eq!(target.projects().len(), 3);
        assert_eq!(outcome.progress.files_discovered, 5);
        assert_eq!(outcome.progress.files_uploaded, 5);
        assert_eq!(outcome.progress.projects_analyzed, 3);
    }

    #[tokio::test]
    async fn test_project_filter_limits_analysis() {
        let (importer, target) = importer_with(
            &[("/repo/web/package.json", "{}"), ("/repo/tools/go.mod", "module t")],
            |registry| {
                registry.register_project_analyzer(Arc::new(ManifestProjectAnalyzer::new(["package.json", "go.mod"])))
            },
        );
        let mut settings = RepositorySettings::new("demo", "/repo");
        settings.project_filter = Some(Regex::new("^web$").unwrap());
        settings.finalize = false;

        importer.import(&settings).await.unwrap();

        let analyzed: Vec<_> = target.projects().into_iter().map(|p| p.project_id).collect();
        assert_eq!(analyzed, vec!["web"]);
        assert_eq!(target.upload_count(), 1);
        assert!(target.finalized().is_empty());
    }

    struct EarlyProjects;

    impl ProjectAnalyzer for EarlyProjects {
        fn name(&self) -> &str {
            "early"
        }

        fn create_projects(&self, _host: &AnalysisHost, repo: &Arc<Repository>, _ctx: &DispatchContext) -> Result<()> {
            let (project, _) = repo.create_project(
                "solution",
                Path::new("/repo/app"),
                crate::repo::ProjectKind::Source,
                self.name(),
            )?;
            repo.add_file(project.id(), Path::new("/repo/app/App.csproj"))?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_explicit_projects_precede_candidates() {
        let (importer, _) = importer_with(
            &[("/repo/app/App.csproj", "<Project/>"), ("/repo/app/Program.cs", "class P {}")],
            |registry| {
                registry.register_project_analyzer(Arc::new(EarlyProjects));
                registry.register_project_analyzer(Arc::new(ManifestProjectAnalyzer::new(["*.csproj"])));
            },
        );

        let outcome = importer
            .import(&RepositorySettings::new("demo", "/repo"))
            .await
            .unwrap();
        let repo = outcome.repository;

        // The manifest analyzer saw the csproj already claimed and stood back.
        assert!(repo.project("app").is_none());
        assert_eq!(repo.projects().len(), 1);
        assert_eq!(
            repo.file(Path::new("/repo/app/Program.cs")).unwrap().primary_project(),
            "solution"
        );
    }

    struct Pinned;

    impl FileAnalyzer for Pinned {
        fn name(&self) -> &str {
            "pinned"
        }

        fn supported_extensions(&self) -> &[&str] {
            &[]
        }

        fn initialize(&self, _host: &AnalysisHost, repo: &Arc<Repository>, _ctx: &DispatchContext) -> Result<()> {
            let file = repo.add_file(DEFAULT_PROJECT_ID, Path::new("/repo/lib/Cargo.toml"))?;
            file.set_explicit_analyzer(Arc::new(Pinned));
            Ok(())
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

    #[tokio::test]
    async fn test_files_with_explicit_analyzer_are_not_candidates() {
        let (importer, target) = importer_with(&[("/repo/lib/Cargo.toml", "[package]")], |registry| {
            registry.register_file_analyzer(Arc::new(Pinned));
            registry.register_project_analyzer(Arc::new(ManifestProjectAnalyzer::new(["Cargo.toml"])));
        });

        let outcome = importer
            .import(&RepositorySettings::new("demo", "/repo"))
            .await
            .unwrap();

        assert!(outcome.repository.projects().is_empty());
        assert_eq!(target.upload_count(), 0);
        assert!(outcome.repository.file(Path::new("/repo/lib/Cargo.toml")).unwrap().is_analyzed());
    }

    struct Registering;

    impl FileAnalyzer for Registering {
        fn name(&self) -> &str {
            "registering"
        }

        fn supported_extensions(&self) -> &[&str] {
            &[]
        }

        fn initialize(&self, _host: &AnalysisHost, repo: &Arc<Repository>, _ctx: &DispatchContext) -> Result<()> {
            repo.add_file(DEFAULT_PROJECT_ID, Path::new("/repo/out/schema.gen"))?;
            repo.add_file(DEFAULT_PROJECT_ID, Path::new("/repo/notes.txt"))?;
            Ok(())
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

    #[tokio::test]
    async fn test_registered_files_rejected_by_filter_are_ignored() {
        let (importer, target) = importer_with(&[("/repo/a.txt", "alpha"), ("/repo/notes.txt", "notes")], |registry| {
            registry.register_file_analyzer(Arc::new(Registering));
        });
        let importer = importer.with_file_filter(Arc::new(ExtensionAllowFilter::new(["txt"])));

        let outcome = importer
            .import(&RepositorySettings::new("demo", "/repo"))
            .await
            .unwrap();
        let repo = outcome.repository;

        let generated = repo.file(Path::new("/repo/out/schema.gen")).unwrap();
        assert!(generated.is_ignored());
        assert!(!generated.is_analyzed());
        assert!(!repo.file(Path::new("/repo/notes.txt")).unwrap().is_ignored());
        assert_eq!(target.upload_count(), 2);
        assert_eq!(outcome.progress.files_failed, 0);
    }

    struct BrokenInit;

    impl FileAnalyzer for BrokenInit {
        fn name(&self) -> &str {
            "broken"
        }

        fn supported_extensions(&self) -> &[&str] {
            &["x"]
        }

        fn initialize(&self, _host: &AnalysisHost, _repo: &Arc<Repository>, _ctx: &DispatchContext) -> Result<()> {
            Err(IngestError::Analysis("index unavailable".to_string()))
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

    #[tokio::test]
    async fn test_phase_level_failure_aborts() {
        let (importer, target) = importer_with(&[("/repo/a.x", "")], |registry| {
            registry.register_file_analyzer(Arc::new(BrokenInit));
        });

        let result = importer.import(&RepositorySettings::new("demo", "/repo")).await;

        assert!(matches!(result, Err(IngestError::Analysis(_))));
        assert_eq!(importer.phase(), ImportPhase::InitializeAnalyzers);
        assert_eq!(target.upload_count(), 0);
    }

    #[test]
    fn test_isolate_keeps_structural_errors() {
        assert!(isolate(Err(IngestError::Analysis("x".into())), "failed", "/p").is_ok());
        assert!(isolate(Err(IngestError::Structural("x".into())), "failed", "/p").is_err());
    }
}
