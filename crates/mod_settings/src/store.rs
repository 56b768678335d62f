//! The settings store: sole owner of a mod's settings value and the only
//! code that reads or writes its backing file.

use crate::backend::{FileBackend, SettingsBackend};
use crate::codec;
use crate::error::SettingsError;
use crate::retry::{retry_with_bound, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// What [`SettingsStore::load`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No settings existed; defaults were written
    Created,
    /// Existing settings were read
    Loaded,
}

/// Owns a settings value of type `S` and persists it through a
/// [`SettingsBackend`].
///
/// A failed load leaves the current value untouched.
pub struct SettingsStore<S> {
    settings: S,
    backend: Box<dyn SettingsBackend>,
    retry: RetryPolicy,
}

impl<S> SettingsStore<S>
where
    S: Serialize + DeserializeOwned + Default + Send + Sync,
{
    /// Creates a store holding default settings. Nothing is read until
    /// [`load`](Self::load) is called.
    pub fn new(backend: impl SettingsBackend + 'static, retry: RetryPolicy) -> Self {
        Self {
            settings: S::default(),
            backend: Box::new(backend),
            retry,
        }
    }

    /// A store backed by `Settings.json` in the mod's install directory.
    pub fn for_mod(mod_path: impl AsRef<Path>, retry: RetryPolicy) -> Self {
        Self::new(FileBackend::in_mod_dir(mod_path), retry)
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    /// Mutable access for live changes. Nothing is persisted until
    /// [`save`](Self::save).
    pub fn settings_mut(&mut self) -> &mut S {
        &mut self.settings
    }

    /// Replaces the in-memory settings, returning the previous value.
    pub fn replace(&mut self, settings: S) -> S {
        std::mem::replace(&mut self.settings, settings)
    }

    /// Path of the backing file.
    pub fn location(&self) -> &Path {
        self.backend.location()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Loads settings, writing defaults first if none are stored.
    ///
    /// # Errors
    ///
    /// - [`SettingsError::Io`] if reading (or creating the defaults) failed
    ///   on every attempt
    /// - [`SettingsError::Deserialization`] if the stored text is not valid
    ///
    /// In both cases the in-memory settings are left as they were.
    pub async fn load(&mut self) -> Result<LoadOutcome, SettingsError> {
        if !self.backend.exists().await {
            info!("Creating {}...", self.location().display());
            let defaults = S::default();
            self.write_value(&defaults).await?;
            self.settings = defaults;
            return Ok(LoadOutcome::Created);
        }

        info!("Loading settings from {}...", self.location().display());

        let backend = &self.backend;
        let text = retry_with_bound(&self.retry, "settings read", |_| backend.read())
            .await
            .map_err(|e| SettingsError::Io {
                path: self.backend.location().to_path_buf(),
                attempts: e.attempts,
                source: e.source,
            })?;

        let settings =
            codec::from_text::<S>(&text).map_err(|source| SettingsError::Deserialization {
                path: self.backend.location().to_path_buf(),
                source,
            })?;

        self.settings = settings;
        debug!("Settings loaded from {}", self.location().display());
        Ok(LoadOutcome::Loaded)
    }

    /// Writes the current settings.
    ///
    /// # Errors
    ///
    /// [`SettingsError::Io`] once every write attempt has failed; the stored
    /// text is then whatever it was before the call.
    pub async fn save(&self) -> Result<(), SettingsError> {
        self.write_value(&self.settings).await
    }

    async fn write_value(&self, value: &S) -> Result<(), SettingsError> {
        let text = codec::to_text(value).map_err(|source| SettingsError::Serialization {
            path: self.location().to_path_buf(),
            source,
        })?;

        let backend = &self.backend;
        let text = text.as_str();
        retry_with_bound(&self.retry, "settings write", |_| backend.write(text))
            .await
            .map_err(|e| SettingsError::Io {
                path: self.location().to_path_buf(),
                attempts: e.attempts,
                source: e.source,
            })?;

        debug!("Settings written to {}", self.location().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackend, ALWAYS_FAIL};
    use serde::Deserialize;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    enum Greeting {
        Wave,
        HighFive,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct TestSettings {
        motd: String,
        greeting: Greeting,
        limit: u32,
    }

    impl Default for TestSettings {
        fn default() -> Self {
            Self {
                motd: "Welcome to Dereth".to_string(),
                greeting: Greeting::Wave,
                limit: 5,
            }
        }
    }

    fn memory_store(backend: &Arc<MemoryBackend>) -> SettingsStore<TestSettings> {
        SettingsStore::new(backend.clone(), RetryPolicy::immediate(10))
    }

    #[tokio::test]
    async fn test_load_missing_file_creates_defaults() {
        let dir = TempDir::new().unwrap();
        let mut store: SettingsStore<TestSettings> =
            SettingsStore::for_mod(dir.path(), RetryPolicy::immediate(10));

        assert_eq!(store.load().await.unwrap(), LoadOutcome::Created);

        let text = std::fs::read_to_string(dir.path().join("Settings.json")).unwrap();
        let on_disk: TestSettings = codec::from_text(&text).unwrap();
        assert_eq!(on_disk, TestSettings::default());
        assert_eq!(store.settings(), &TestSettings::default());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut store: SettingsStore<TestSettings> =
            SettingsStore::for_mod(dir.path(), RetryPolicy::immediate(10));

        store.settings_mut().motd = "Ünïcødé <motd>".to_string();
        store.settings_mut().greeting = Greeting::HighFive;
        store.settings_mut().limit = 42;
        store.save().await.unwrap();

        let expected = store.settings().clone();
        let mut reloaded: SettingsStore<TestSettings> =
            SettingsStore::for_mod(dir.path(), RetryPolicy::immediate(10));
        assert_eq!(reloaded.load().await.unwrap(), LoadOutcome::Loaded);
        assert_eq!(reloaded.settings(), &expected);

        let text = std::fs::read_to_string(dir.path().join("Settings.json")).unwrap();
        assert!(text.contains("\"highFive\""));
        assert!(text.contains("Ünïcødé <motd>"));
    }

    #[tokio::test]
    async fn test_save_failure_leaves_stored_text_unchanged() {
        let backend = Arc::new(MemoryBackend::with_contents("mem/Settings.json", "original"));
        backend.fail_writes(ALWAYS_FAIL);
        let store = memory_store(&backend);

        let err = store.save().await.unwrap_err();

        assert!(err.is_io());
        assert!(matches!(err, SettingsError::Io { attempts: 10, .. }));
        assert_eq!(backend.write_attempts(), 10);
        assert_eq!(backend.contents().await.as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn test_save_recovers_from_transient_failures() {
        let backend = Arc::new(MemoryBackend::new("mem/Settings.json"));
        backend.fail_writes(9);
        let store = memory_store(&backend);

        store.save().await.unwrap();
        assert_eq!(backend.write_attempts(), 10);
        assert!(backend.contents().await.is_some());
    }

    #[tokio::test]
    async fn test_unparseable_text_keeps_previous_settings() {
        let backend = Arc::new(MemoryBackend::with_contents("mem/Settings.json", "{ broken"));
        let mut store = memory_store(&backend);
        store.settings_mut().limit = 99;

        let err = store.load().await.unwrap_err();

        assert!(matches!(err, SettingsError::Deserialization { .. }));
        assert_eq!(err.path(), Path::new("mem/Settings.json"));
        assert_eq!(store.settings().limit, 99);
        // Parse errors are not retried
        assert_eq!(backend.read_attempts(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_keeps_previous_settings() {
        let backend = Arc::new(MemoryBackend::with_contents("mem/Settings.json", "{}"));
        backend.fail_reads(ALWAYS_FAIL);
        let mut store = memory_store(&backend);
        store.settings_mut().limit = 7;

        let err = store.load().await.unwrap_err();

        assert!(matches!(err, SettingsError::Io { attempts: 10, .. }));
        assert_eq!(store.settings().limit, 7);
        assert_eq!(backend.read_attempts(), 10);
    }

    #[tokio::test]
    async fn test_load_creating_defaults_fails_when_storage_rejects_writes() {
        let backend = Arc::new(MemoryBackend::new("mem/Settings.json"));
        backend.fail_writes(ALWAYS_FAIL);
        let mut store = memory_store(&backend);
        store.settings_mut().limit = 3;

        assert!(store.load().await.unwrap_err().is_io());
        assert_eq!(store.settings().limit, 3);
        assert!(backend.contents().await.is_none());
    }

    #[tokio::test]
    async fn test_load_accepts_trailing_commas_and_missing_fields() {
        let backend = Arc::new(MemoryBackend::with_contents(
            "mem/Settings.json",
            "{\n  \"greeting\": \"highFive\",\n}",
        ));
        let mut store = memory_store(&backend);

        assert_eq!(store.load().await.unwrap(), LoadOutcome::Loaded);
        assert_eq!(store.settings().greeting, Greeting::HighFive);
        assert_eq!(store.settings().limit, 5);
    }

    #[test]
    fn test_replace_returns_previous() {
        let backend = Arc::new(MemoryBackend::new("mem/Settings.json"));
        let mut store = memory_store(&backend);

        let previous = store.replace(TestSettings {
            limit: 1,
            ..TestSettings::default()
        });
        assert_eq!(previous, TestSettings::default());
        assert_eq!(store.settings().limit, 1);
        assert_eq!(store.retry_policy().max_attempts, 10);
    }
}
