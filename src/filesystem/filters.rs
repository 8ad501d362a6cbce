use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cache::ConcurrentCache;

use super::{extension_of, normalize_path};

/// Decides whether a directory or file takes part in discovery.
///
/// Directory exclusion is checked before descending, so excluding a
/// directory prunes its whole subtree.
pub trait FileFilter: Send + Sync {
    fn include_directory(&self, _dir: &Path) -> bool {
        true
    }

    fn include_file(&self, _path: &Path) -> bool {
        true
    }
}

/// Logical AND of an ordered list of filters; stops at the first rejection.
#[derive(Default)]
pub struct AllFilters {
    filters: Vec<Arc<dyn FileFilter>>,
}

impl AllFilters {
    pub fn new(filters: Vec<Arc<dyn FileFilter>>) -> Self {
        Self { filters }
    }

    pub fn push(&mut self, filter: Arc<dyn FileFilter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl FileFilter for AllFilters {
    fn include_directory(&self, dir: &Path) -> bool {
        self.filters.iter().all(|f| f.include_directory(dir))
    }

    fn include_file(&self, path: &Path) -> bool {
        self.filters.iter().all(|f| f.include_file(path))
    }
}

fn extension_set<I, S>(extensions: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    extensions
        .into_iter()
        .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
        .collect()
}

/// Admits only files whose extension is listed.
pub struct ExtensionAllowFilter {
    extensions: HashSet<String>,
}

impl ExtensionAllowFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extension_set(extensions),
        }
    }
}

impl FileFilter for ExtensionAllowFilter {
    fn include_file(&self, path: &Path) -> bool {
        self.extensions.contains(&extension_of(path))
    }
}

/// Rejects denied extensions, and sniffs everything else for NUL bytes.
///
/// The sniffing verdict is cached per extension, so only the first file of a
/// given extension is sniffed.
pub struct BinaryFileFilter {
    denied: HashSet<String>,
    verdicts: ConcurrentCache<String, bool>,
    sniff_bytes: usize,
    sniffs: AtomicUsize,
}

impl BinaryFileFilter {
    pub const DEFAULT_SNIFF_BYTES: usize = 8000;

    pub fn new<I, S>(denied_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            denied: extension_set(denied_extensions),
            verdicts: ConcurrentCache::new(),
            sniff_bytes: Self::DEFAULT_SNIFF_BYTES,
            sniffs: AtomicUsize::new(0),
        }
    }

    pub fn with_sniff_bytes(mut self, sniff_bytes: usize) -> Self {
        self.sniff_bytes = sniff_bytes.max(1);
        self
    }

    /// Number of files actually read for sniffing.
    pub fn sniff_count(&self) -> usize {
        self.sniffs.load(Ordering::Relaxed)
    }

    fn sniff(&self, path: &Path) -> std::io::Result<bool> {
        self.sniffs.fetch_add(1, Ordering::Relaxed);
        let mut buf = Vec::with_capacity(self.sniff_bytes);
        std::fs::File::open(path)?
            .take(self.sniff_bytes as u64)
            .read_to_end(&mut buf)?;
        Ok(buf.contains(&0))
    }

    fn is_binary(&self, path: &Path) -> Option<bool> {
        let ext = extension_of(path);
        if !ext.is_empty() {
            if let Some(verdict) = self.verdicts.get(&ext) {
                return Some(verdict);
            }
        }

        match self.sniff(path) {
            Ok(binary) if ext.is_empty() => Some(binary),
            Ok(binary) => Some(self.verdicts.insert_if_absent(ext, binary).0),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to sniff file content");
                None
            }
        }
    }
}

impl FileFilter for BinaryFileFilter {
    fn include_file(&self, path: &Path) -> bool {
        if self.denied.contains(&extension_of(path)) {
            return false;
        }
        // Unreadable files are skipped along with binary ones.
        matches!(self.is_binary(path), Some(false))
    }
}

/// Skips directories whose name starts with a dot.
pub struct HiddenDirectoryFilter;

impl FileFilter for HiddenDirectoryFilter {
    fn include_directory(&self, dir: &Path) -> bool {
        !dir.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
    }
}

/// Excludes any path containing one of the fragments (case-insensitive).
pub struct PathExclusionFilter {
    fragments: Vec<String>,
}

impl PathExclusionFilter {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fragments: fragments
                .into_iter()
                .map(|f| f.as_ref().replace('\\', "/").to_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    fn excluded(&self, path: &Path, is_dir: bool) -> bool {
        let mut normalized = normalize_path(path).to_lowercase();
        if is_dir && !normalized.ends_with('/') {
            normalized.push('/');
        }
        self.fragments.iter().any(|f| normalized.contains(f.as_str()))
    }
}

impl FileFilter for PathExclusionFilter {
    fn include_directory(&self, dir: &Path) -> bool {
        !self.excluded(dir, true)
    }

    fn include_file(&self, path: &Path) -> bool {
        !self.excluded(path, false)
    }
}
