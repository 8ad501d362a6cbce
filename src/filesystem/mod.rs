//! File discovery.
//!
//! A [`FileSystem`] enumerates candidate files under a root and opens them for
//! reading. [`DirectoryFileSystem`] walks a real directory tree through a
//! [`FileFilter`] pipeline; the decorators in [`decorators`] cache or extend an
//! enumeration.

pub mod decorators;
pub mod filters;
pub mod ignore;
pub mod walker;

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use decorators::{CachingFileSystem, UnionFileSystem};
pub use filters::{
    AllFilters, BinaryFileFilter, ExtensionAllowFilter, FileFilter, HiddenDirectoryFilter,
    PathExclusionFilter,
};
pub use self::ignore::{IgnoreDialect, IgnoreFileCache, IgnoreFileFilter, IgnoreMatcher};
pub use walker::DirectoryFileSystem;

pub type FileIter<'a> = Box<dyn Iterator<Item = PathBuf> + Send + 'a>;

pub trait FileSystem: Send + Sync {
    fn list_files(&self) -> FileIter<'_>;

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }

    /// Reads a whole file as text, replacing invalid UTF-8.
    fn read_text(&self, path: &Path) -> Result<String> {
        let mut bytes = Vec::new();
        self.open(path)?.read_to_end(&mut bytes)?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

/// Renders a path with forward slashes.
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Case-insensitive identity key for a path.
pub fn path_key(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Strips `prefix` from `path`, comparing one character at a time under the
/// same case folding as [`path_key`].
pub fn strip_prefix_ignore_case<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let mut rest = path;
    for expected in prefix.chars() {
        let mut chars = rest.chars();
        let actual = chars.next()?;
        if actual != expected && !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
        rest = chars.as_str();
    }
    Some(rest)
}

/// Lowercased extension without the dot; empty when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default()
}
