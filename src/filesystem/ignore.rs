//! Ignore-file pattern matching.
//!
//! Lines of an ignore file compile into two regexes: one for ordinary
//! (excluding) patterns and one for `!`-negated (force-including) patterns. A
//! path is excluded iff the exclusion regex matches and the inclusion regex
//! does not.
//!
//! Matchers are looked up per directory by walking toward the root until an
//! ignore file is found; the result, including "none found", is cached for
//! every directory visited on the way.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cache::ConcurrentCache;
use crate::error::Result;

use super::filters::FileFilter;
use super::normalize_path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreDialect {
    /// `**` spans separators.
    #[default]
    Standard,
    /// Backslashes are separators and `**` behaves like `*`.
    Legacy,
}

#[derive(Debug)]
pub struct IgnoreMatcher {
    base: PathBuf,
    exclude: Option<Regex>,
    include: Option<Regex>,
}

impl IgnoreMatcher {
    /// Compiles ignore-file content whose patterns are relative to `base`.
    pub fn parse(base: impl Into<PathBuf>, content: &str, dialect: IgnoreDialect) -> Result<Self> {
        let mut excludes = Vec::new();
        let mut includes = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (negated, pattern) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let Some(translated) = translate(pattern, dialect) else {
                continue;
            };
            if negated {
                includes.push(translated);
            } else {
                excludes.push(translated);
            }
        }

        Ok(Self {
            base: base.into(),
            exclude: combine(&excludes)?,
            include: combine(&includes)?,
        })
    }

    pub fn from_patterns(patterns: &[&str], dialect: IgnoreDialect) -> Result<Self> {
        Self::parse(PathBuf::new(), &patterns.join("\n"), dialect)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Tests a `/`-separated path relative to the matcher's base.
    pub fn is_excluded(&self, relative: &str) -> bool {
        let relative = relative.trim_start_matches('/');
        let excluded = self
            .exclude
            .as_ref()
            .map(|re| re.is_match(relative))
            .unwrap_or(false);
        excluded
            && !self
                .include
                .as_ref()
                .map(|re| re.is_match(relative))
                .unwrap_or(false)
    }

    pub fn includes(&self, relative: &str) -> bool {
        !self.is_excluded(relative)
    }

    /// Tests an absolute path; paths outside the base are never excluded.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        match path.strip_prefix(&self.base) {
            Ok(relative) => self.is_excluded(&normalize_path(relative)),
            Err(_) => false,
        }
    }
}

fn combine(patterns: &[String]) -> Result<Option<Regex>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let alternation = patterns
        .iter()
        .map(|p| format!("(?:{})", p))
        .collect::<Vec<_>>()
        .join("|");
    Ok(Some(Regex::new(&alternation)?))
}

/// Translates one ignore pattern into an anchored regex source.
fn translate(pattern: &str, dialect: IgnoreDialect) -> Option<String> {
    let mut pattern = pattern.to_string();
    if dialect == IgnoreDialect::Legacy {
        pattern = pattern.replace('\\', "/");
    }

    let anchored = pattern.starts_with('/');
    let directory_only = pattern.ends_with('/');
    let body = pattern.trim_start_matches('/').trim_end_matches('/');
    if body.is_empty() {
        return None;
    }

    let mut regex = String::with_capacity(body.len() * 2 + 16);
    regex.push_str(if anchored { "^" } else { "^(?:.*/)?" });

    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if dialect == IgnoreDialect::Standard && chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    regex.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    regex.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            c => regex.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
        i += 1;
    }

    regex.push_str(if directory_only { "(?:/|$)" } else { "$" });
    Some(regex)
}

/// Per-directory cache of the nearest ignore file's matcher.
pub struct IgnoreFileCache {
    file_name: String,
    dialect: IgnoreDialect,
    root: Option<PathBuf>,
    matchers: ConcurrentCache<PathBuf, Option<Arc<IgnoreMatcher>>>,
    loads: AtomicUsize,
}

impl IgnoreFileCache {
    pub const DEFAULT_FILE_NAME: &'static str = ".gitignore";

    pub fn new(file_name: impl Into<String>, dialect: IgnoreDialect) -> Self {
        Self {
            file_name: file_name.into(),
            dialect,
            root: None,
            matchers: ConcurrentCache::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Stops upward lookups at `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Number of ignore files read and compiled so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn matcher_for(&self, dir: &Path) -> Option<Arc<IgnoreMatcher>> {
        let mut visited: Vec<PathBuf> = Vec::new();
        let mut current = Some(dir);

        let found = loop {
            let Some(candidate_dir) = current else {
                break None;
            };
            if let Some(cached) = self.matchers.get(candidate_dir) {
                break cached;
            }
            visited.push(candidate_dir.to_path_buf());

            let ignore_file = candidate_dir.join(&self.file_name);
            if ignore_file.is_file() {
                break self.load(candidate_dir, &ignore_file);
            }
            if self.root.as_deref() == Some(candidate_dir) {
                break None;
            }
            current = candidate_dir.parent();
        };

        let mut result = found.clone();
        for (index, visited_dir) in visited.into_iter().enumerate() {
            let (stored, _) = self.matchers.insert_if_absent(visited_dir, found.clone());
            if index == 0 {
                result = stored;
            }
        }
        result
    }

    fn load(&self, dir: &Path, ignore_file: &Path) -> Option<Arc<IgnoreMatcher>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let content = match std::fs::read_to_string(ignore_file) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %ignore_file.display(), error = %e, "Failed to read ignore file");
                return None;
            }
        };
        match IgnoreMatcher::parse(dir, &content, self.dialect) {
            Ok(matcher) => Some(Arc::new(matcher)),
            Err(e) => {
                tracing::warn!(path = %ignore_file.display(), error = %e, "Ignoring malformed ignore file");
                None
            }
        }
    }
}

/// Applies the nearest ignore file to every directory and file.
pub struct IgnoreFileFilter {
    cache: Arc<IgnoreFileCache>,
}

impl IgnoreFileFilter {
    pub fn new(cache: Arc<IgnoreFileCache>) -> Self {
        Self { cache }
    }

    fn excluded(&self, path: &Path) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        self.cache
            .matcher_for(parent)
            .map(|m| m.is_path_excluded(path))
            .unwrap_or(false)
    }
}

impl FileFilter for IgnoreFileFilter {
    fn include_directory(&self, dir: &Path) -> bool {
        !self.excluded(dir)
    }

    fn include_file(&self, path: &Path) -> bool {
        !self.excluded(path)
    }
}
