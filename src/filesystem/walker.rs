use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::Arc;

use ::ignore::{DirEntry, WalkBuilder, WalkState};

use super::filters::FileFilter;
use super::{FileIter, FileSystem};

/// Enumerates a directory tree in parallel through a filter pipeline.
///
/// The walk runs on its own thread with `ignore`'s parallel walker; every
/// entry passes through the filter before it is yielded or descended into,
/// and included files stream out through a channel that completes when the
/// tree is exhausted. The walker's built-in ignore handling is disabled; ignore
/// files are applied by [`IgnoreFileFilter`](super::IgnoreFileFilter).
pub struct DirectoryFileSystem {
    root: PathBuf,
    filter: Arc<dyn FileFilter>,
    threads: usize,
}

impl DirectoryFileSystem {
    /// Host CPU count.
    pub fn default_threads() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn new(root: impl Into<PathBuf>, filter: Arc<dyn FileFilter>) -> Self {
        Self::with_threads(root, filter, Self::default_threads())
    }

    pub fn with_threads(root: impl Into<PathBuf>, filter: Arc<dyn FileFilter>, threads: usize) -> Self {
        Self {
            root: root.into(),
            filter,
            threads: threads.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn include_entry(filter: &dyn FileFilter, entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    match entry.file_type() {
        Some(file_type) if file_type.is_dir() => filter.include_directory(entry.path()),
        _ => filter.include_file(entry.path()),
    }
}

impl FileSystem for DirectoryFileSystem {
    fn list_files(&self) -> FileIter<'_> {
        if !self.root.is_dir() {
            tracing::warn!(root = %self.root.display(), "Discovery root is not a directory");
            return Box::new(std::iter::empty());
        }

        let filter = self.filter.clone();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .threads(self.threads)
            .filter_entry(move |entry| include_entry(filter.as_ref(), entry))
            .build_parallel();

        let (tx, rx) = channel();
        let spawned = std::thread::Builder::new()
            .name("ingest-discover".to_string())
            .spawn(move || {
                walker.run(|| {
                    let tx = tx.clone();
                    Box::new(move |result| {
                        let entry = match result {
                            Ok(entry) => entry,
                            Err(e) => {
                                tracing::warn!(error = %e, "Skipping unreadable entry");
                                return WalkState::Continue;
                            }
                        };
                        let is_file = match entry.file_type() {
                            Some(file_type) if file_type.is_file() => true,
                            Some(file_type) if file_type.is_symlink() => entry.path().is_file(),
                            _ => false,
                        };
                        if is_file && tx.send(entry.into_path()).is_err() {
                            // Consumer went away.
                            return WalkState::Quit;
                        }
                        WalkState::Continue
                    })
                });
            });

        if let Err(e) = spawned {
            tracing::warn!(root = %self.root.display(), error = %e, "Failed to start discovery");
            return Box::new(std::iter::empty());
        }
        Box::new(rx.into_iter())
    }
}
