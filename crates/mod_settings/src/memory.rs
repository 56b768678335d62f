//! In-memory settings storage with injectable failures, for tests.

use crate::backend::SettingsBackend;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

/// Settings kept in memory, with injectable failures.
///
/// Exercises the retry and error paths of a store without touching disk.
#[derive(Debug)]
pub struct MemoryBackend {
    location: PathBuf,
    contents: Mutex<Option<String>>,
    read_failures: AtomicU32,
    write_failures: AtomicU32,
    read_attempts: AtomicU32,
    write_attempts: AtomicU32,
}

/// Failure budget meaning "fail every attempt".
pub const ALWAYS_FAIL: u32 = u32::MAX;

impl MemoryBackend {
    /// An empty backend reporting `location` in diagnostics.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            contents: Mutex::new(None),
            read_failures: AtomicU32::new(0),
            write_failures: AtomicU32::new(0),
            read_attempts: AtomicU32::new(0),
            write_attempts: AtomicU32::new(0),
        }
    }

    /// A backend that already holds `contents`.
    pub fn with_contents(location: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let mut backend = Self::new(location);
        *backend.contents.get_mut() = Some(contents.into());
        backend
    }

    /// Makes the next `count` reads fail. [`ALWAYS_FAIL`] fails all of them.
    pub fn fail_reads(&self, count: u32) {
        self.read_failures.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` writes fail. [`ALWAYS_FAIL`] fails all of them.
    pub fn fail_writes(&self, count: u32) {
        self.write_failures.store(count, Ordering::SeqCst);
    }

    pub async fn contents(&self) -> Option<String> {
        self.contents.lock().await.clone()
    }

    pub async fn set_contents(&self, contents: impl Into<String>) {
        *self.contents.lock().await = Some(contents.into());
    }

    pub fn read_attempts(&self) -> u32 {
        self.read_attempts.load(Ordering::SeqCst)
    }

    pub fn write_attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    fn take_failure(budget: &AtomicU32) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| match remaining {
                0 => None,
                ALWAYS_FAIL => Some(ALWAYS_FAIL),
                n => Some(n - 1),
            })
            .is_ok()
    }

    fn injected(operation: &str) -> io::Error {
        io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("injected {operation} failure"),
        )
    }
}

#[async_trait]
impl SettingsBackend for MemoryBackend {
    fn location(&self) -> &Path {
        &self.location
    }

    async fn exists(&self) -> bool {
        self.contents.lock().await.is_some()
    }

    async fn read(&self) -> io::Result<String> {
        self.read_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.read_failures) {
            return Err(Self::injected("read"));
        }

        self.contents
            .lock()
            .await
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no settings stored"))
    }

    async fn write(&self, contents: &str) -> io::Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.write_failures) {
            return Err(Self::injected("write"));
        }

        *self.contents.lock().await = Some(contents.to_string());
        Ok(())
    }
}
