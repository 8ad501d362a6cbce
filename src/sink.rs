//! Ready-made [`AnalysisTarget`] implementations.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;

use crate::analysis::{AnalysisTarget, AnalyzedProject};
use crate::bound::BoundSourceFile;
use crate::error::Result;
use crate::repo::{Project, RepoFile, Repository};

/// Keeps every call in memory.
#[derive(Default)]
pub struct MemoryTarget {
    repositories: Mutex<Vec<String>>,
    projects: Mutex<Vec<AnalyzedProject>>,
    uploads: Mutex<Vec<BoundSourceFile>>,
    finalized: Mutex<Vec<String>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repositories(&self) -> Vec<String> {
        self.repositories.lock().clone()
    }

    pub fn projects(&self) -> Vec<AnalyzedProject> {
        self.projects.lock().clone()
    }

    pub fn uploads(&self) -> Vec<BoundSourceFile> {
        self.uploads.lock().clone()
    }

    /// Upload for a repo-relative path.
    pub fn uploaded(&self, repo_relative_path: &str) -> Option<BoundSourceFile> {
        self.uploads
            .lock()
            .iter()
            .find(|u| u.file.repo_relative_path == repo_relative_path)
            .cloned()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().len()
    }

    pub fn finalized(&self) -> Vec<String> {
        self.finalized.lock().clone()
    }
}

impl AnalysisTarget for MemoryTarget {
    fn add_repository(&self, repo: &Repository) -> Result<()> {
        self.repositories.lock().push(repo.name().to_string());
        Ok(())
    }

    fn add_project(&self, _project: &Project, metadata: &AnalyzedProject) -> Result<()> {
        self.projects.lock().push(metadata.clone());
        Ok(())
    }

    fn upload(&self, _file: &RepoFile, source: BoundSourceFile) -> Result<()> {
        self.uploads.lock().push(source);
        Ok(())
    }

    fn finalize_repository(&self, repo: &Repository) -> Result<()> {
        self.finalized.lock().push(repo.name().to_string());
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Record<'a> {
    Repository { name: &'a str, root: String },
    Project(&'a AnalyzedProject),
    File(&'a BoundSourceFile),
    Finalized { name: &'a str },
}

/// Writes one JSON object per call, one per line.
pub struct JsonLinesTarget {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesTarget {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    fn write(&self, record: &Record<'_>) -> Result<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl AnalysisTarget for JsonLinesTarget {
    fn add_repository(&self, repo: &Repository) -> Result<()> {
        self.write(&Record::Repository {
            name: repo.name(),
            root: repo.root().display().to_string(),
        })
    }

    fn add_project(&self, _project: &Project, metadata: &AnalyzedProject) -> Result<()> {
        self.write(&Record::Project(metadata))
    }

    fn upload(&self, _file: &RepoFile, source: BoundSourceFile) -> Result<()> {
        self.write(&Record::File(&source))
    }

    fn finalize_repository(&self, repo: &Repository) -> Result<()> {
        self.write(&Record::Finalized { name: repo.name() })?;
        self.writer.lock().flush()?;
        Ok(())
    }
}
