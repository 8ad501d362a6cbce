use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

/// Shared counters for one import run. Cloning shares the counters.
#[derive(Clone, Default)]
pub struct ImportProgress {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    files_discovered: AtomicUsize,
    files_scheduled: AtomicUsize,
    files_analyzed: AtomicUsize,
    files_uploaded: AtomicUsize,
    files_failed: AtomicUsize,
    symbols: AtomicUsize,
    projects_analyzed: AtomicUsize,
    shadow_files: AtomicUsize,
    is_active: AtomicBool,
    started_at: Mutex<Option<Instant>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub is_active: bool,
    pub files_discovered: usize,
    pub files_scheduled: usize,
    pub files_analyzed: usize,
    pub files_uploaded: usize,
    pub files_failed: usize,
    pub symbols: usize,
    pub projects_analyzed: usize,
    pub shadow_files: usize,
    pub elapsed_ms: u64,
}

impl ImportProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.files_discovered,
            &inner.files_scheduled,
            &inner.files_analyzed,
            &inner.files_uploaded,
            &inner.files_failed,
            &inner.symbols,
            &inner.projects_analyzed,
            &inner.shadow_files,
        ] {
            counter.store(0, Ordering::Release);
        }
        inner.is_active.store(true, Ordering::Release);
        *inner.started_at.lock() = Some(Instant::now());
    }

    pub fn file_discovered(&self) {
        self.inner.files_discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_scheduled(&self) {
        self.inner.files_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_analyzed(&self, symbols: usize) {
        self.inner.files_analyzed.fetch_add(1, Ordering::Relaxed);
        self.inner.symbols.fetch_add(symbols, Ordering::Relaxed);
    }

    pub fn file_uploaded(&self) {
        self.inner.files_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_failed(&self) {
        self.inner.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn project_analyzed(&self) {
        self.inner.projects_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_shadow_files(&self, count: usize) {
        self.inner.shadow_files.store(count, Ordering::Release);
    }

    pub fn finish(&self) {
        self.inner.is_active.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let inner = &self.inner;
        let elapsed_ms = inner
            .started_at
            .lock()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        ProgressSnapshot {
            is_active: inner.is_active.load(Ordering::Acquire),
            files_discovered: inner.files_discovered.load(Ordering::Acquire),
            files_scheduled: inner.files_scheduled.load(Ordering::Acquire),
            files_analyzed: inner.files_analyzed.load(Ordering::Acquire),
            files_uploaded: inner.files_uploaded.load(Ordering::Acquire),
            files_failed: inner.files_failed.load(Ordering::Acquire),
            symbols: inner.symbols.load(Ordering::Acquire),
            projects_analyzed: inner.projects_analyzed.load(Ordering::Acquire),
            shadow_files: inner.shadow_files.load(Ordering::Acquire),
            elapsed_ms,
        }
    }
}
