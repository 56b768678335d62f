//! Storage behind a settings store.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// File name of a mod's settings inside its install directory.
pub const SETTINGS_FILE_NAME: &str = "Settings.json";

/// Where settings text is kept.
///
/// Each call is a single attempt; retrying is the store's job. Writes must
/// either replace the stored text completely or leave it untouched.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// Path reported in diagnostics.
    fn location(&self) -> &Path;

    /// Whether settings have been stored before.
    async fn exists(&self) -> bool;

    /// Reads the stored text.
    async fn read(&self) -> io::Result<String>;

    /// Replaces the stored text.
    async fn write(&self, contents: &str) -> io::Result<()>;
}

#[async_trait]
impl<T: SettingsBackend + ?Sized> SettingsBackend for Arc<T> {
    fn location(&self) -> &Path {
        (**self).location()
    }

    async fn exists(&self) -> bool {
        (**self).exists().await
    }

    async fn read(&self) -> io::Result<String> {
        (**self).read().await
    }

    async fn write(&self, contents: &str) -> io::Result<()> {
        (**self).write(contents).await
    }
}

// ============================================================================
// File Backend
// ============================================================================

/// Settings kept in a file on disk.
///
/// Writes go to a sibling `.tmp` file which is then renamed over the target,
/// so a failed write never truncates existing settings.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `Settings.json` inside a mod's install directory.
    pub fn in_mod_dir(mod_path: impl AsRef<Path>) -> Self {
        Self::new(mod_path.as_ref().join(SETTINGS_FILE_NAME))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SettingsBackend for FileBackend {
    fn location(&self) -> &Path {
        &self.path
    }

    async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    async fn read(&self) -> io::Result<String> {
        tokio::fs::read_to_string(&self.path).await
    }

    async fn write(&self, contents: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.temp_path();
        let result = match tokio::fs::write(&temp_path, contents).await {
            Ok(()) => tokio::fs::rename(&temp_path, &self.path).await,
            Err(e) => Err(e),
        };

        if result.is_err() {
            debug!("Write of {} failed, discarding temp file", temp_path.display());
            tokio::fs::remove_file(&temp_path).await.ok();
        }

        result
    }
}
