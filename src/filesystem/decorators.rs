use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::Result;

use super::{normalize_path, path_key, FileIter, FileSystem};

/// Materializes the wrapped enumeration once and replays it afterwards.
pub struct CachingFileSystem {
    inner: Arc<dyn FileSystem>,
    files: OnceCell<Vec<PathBuf>>,
}

impl CachingFileSystem {
    pub fn new(inner: Arc<dyn FileSystem>) -> Self {
        Self {
            inner,
            files: OnceCell::new(),
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.files.get().is_some()
    }
}

impl FileSystem for CachingFileSystem {
    fn list_files(&self) -> FileIter<'_> {
        let files = self.files.get_or_init(|| self.inner.list_files().collect());
        Box::new(files.iter().cloned())
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        self.inner.open(path)
    }
}

/// Lists an explicit file set ahead of the wrapped enumeration, skipping
/// wrapped entries that duplicate an explicit one.
pub struct UnionFileSystem {
    explicit: Vec<PathBuf>,
    keys: HashSet<String>,
    inner: Arc<dyn FileSystem>,
}

impl UnionFileSystem {
    pub fn new(explicit: Vec<PathBuf>, inner: Arc<dyn FileSystem>) -> Self {
        let mut keys = HashSet::new();
        let explicit = explicit
            .into_iter()
            .filter(|p| keys.insert(path_key(&normalize_path(p))))
            .collect();
        Self {
            explicit,
            keys,
            inner,
        }
    }
}

impl FileSystem for UnionFileSystem {
    fn list_files(&self) -> FileIter<'_> {
        let wrapped = self
            .inner
            .list_files()
            .filter(move |p| !self.keys.contains(&path_key(&normalize_path(p))));
        Box::new(self.explicit.iter().cloned().chain(wrapped))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        self.inner.open(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedFileSystem {
        files: Vec<PathBuf>,
        listings: AtomicUsize,
    }

    impl FixedFileSystem {
        fn new(files: &[&str]) -> Self {
            Self {
                files: files.iter().map(PathBuf::from).collect(),
                listings: AtomicUsize::new(0),
            }
        }
    }

    impl FileSystem for FixedFileSystem {
        fn list_files(&self) -> FileIter<'_> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            Box::new(self.files.clone().into_iter())
        }
    }

    #[test]
    fn test_caching_enumerates_inner_once() {
        let inner = Arc::new(FixedFileSystem::new(&["/r/a.rs", "/r/b.rs"]));
        let caching = CachingFileSystem::new(inner.clone());
        assert!(!caching.is_materialized());

        let first: Vec<_> = caching.list_files().collect();
        let second: Vec<_> = caching.list_files().collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(inner.listings.load(Ordering::SeqCst), 1);
        assert!(caching.is_materialized());
    }

    #[test]
    fn test_union_prepends_and_deduplicates() {
        let inner = Arc::new(FixedFileSystem::new(&["/r/a.rs", "/r/B.rs", "/r/c.rs"]));
        let union = UnionFileSystem::new(
            vec![PathBuf::from("/r/b.rs"), PathBuf::from("/r/x.rs"), PathBuf::from("/R/X.rs")],
            inner,
        );

        let files: Vec<_> = union.list_files().collect();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/r/b.rs"),
                PathBuf::from("/r/x.rs"),
                PathBuf::from("/r/a.rs"),
                PathBuf::from("/r/c.rs"),
            ]
        );
    }
}
