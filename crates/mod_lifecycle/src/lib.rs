//! # Mod Lifecycle
//!
//! Drives a mod through `Stopped → Loading → Running | Error → Stopped`.
//!
//! The outcome of loading settings decides where `start` lands. A mod that
//! ends up in [`ModState::Error`] asks the host to disable it; a mod shut
//! down while in error logs an "improper shutdown" diagnostic. Whether
//! settings are written back on shutdown is a per-mod choice exposed through
//! [`ModSettings::shutdown_persistence`].

use mod_api::{LogLevel, ModHost, ModState};
use mod_settings::{LoadOutcome, RetryPolicy, SettingsError, SettingsStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What happens to live settings changes when the mod shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShutdownPersistence {
    /// Changes apply live and are discarded at shutdown; edit the file
    /// while the mod is not running
    #[default]
    KeepLive,
    /// Settings are written back when a running mod shuts down
    SaveOnShutdown,
}

/// Settings types a [`LifecycleController`] can own.
pub trait ModSettings: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Shutdown persistence policy carried by these settings.
    fn shutdown_persistence(&self) -> ShutdownPersistence {
        ShutdownPersistence::KeepLive
    }
}

/// Lifecycle state machine plus the settings it gates.
pub struct LifecycleController<S> {
    mod_path: PathBuf,
    state: ModState,
    store: SettingsStore<S>,
}

impl<S: ModSettings> LifecycleController<S> {
    /// A controller for the mod installed at `mod_path`, persisting to
    /// `Settings.json` in that directory.
    pub fn new(mod_path: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        let mod_path = mod_path.into();
        let store = SettingsStore::for_mod(&mod_path, retry);
        Self::with_store(mod_path, store)
    }

    /// A controller using an already configured store.
    pub fn with_store(mod_path: impl Into<PathBuf>, store: SettingsStore<S>) -> Self {
        Self {
            mod_path: mod_path.into(),
            state: ModState::Stopped,
            store,
        }
    }

    pub fn state(&self) -> ModState {
        self.state
    }

    pub fn mod_path(&self) -> &Path {
        &self.mod_path
    }

    /// Current settings. Only meaningful while the state is not `Error`.
    pub fn settings(&self) -> &S {
        self.store.settings()
    }

    pub fn settings_mut(&mut self) -> &mut S {
        self.store.settings_mut()
    }

    pub fn settings_path(&self) -> &Path {
        self.store.location()
    }

    /// Loads settings and moves to `Running`, or to `Error` after asking the
    /// host to disable this mod.
    pub async fn start(&mut self, host: &dyn ModHost) -> ModState {
        if self.state == ModState::Running {
            host.log(
                LogLevel::Warn,
                &format!("Start ignored, already running: {}", self.mod_path.display()),
            );
            return self.state;
        }

        self.state = ModState::Loading;

        match self.store.load().await {
            Ok(LoadOutcome::Created) => {
                debug!("Default settings created for {}", self.mod_path.display())
            }
            Ok(LoadOutcome::Loaded) => {}
            Err(e) => self.fail(host, "load", &e),
        }

        if self.state == ModState::Error {
            host.disable_mod_by_path(&self.mod_path);
            return self.state;
        }

        self.state = ModState::Running;
        self.state
    }

    /// Shuts the mod down, saving first if the settings ask for it.
    pub async fn shutdown(&mut self, host: &dyn ModHost) {
        if self.state == ModState::Running
            && self.store.settings().shutdown_persistence() == ShutdownPersistence::SaveOnShutdown
        {
            if let Err(e) = self.store.save().await {
                self.fail(host, "save", &e);
            }
        }

        if self.state == ModState::Error {
            host.log(
                LogLevel::Error,
                &format!("Improper shutdown: {}", self.mod_path.display()),
            );
        }

        self.state = ModState::Stopped;
    }

    /// Writes the current settings. A failure moves the mod to `Error`.
    pub async fn save_settings(&mut self, host: &dyn ModHost) -> Result<(), SettingsError> {
        if let Err(e) = self.store.save().await {
            self.fail(host, "save", &e);
            return Err(e);
        }
        Ok(())
    }

    fn fail(&mut self, host: &dyn ModHost, operation: &str, error: &SettingsError) {
        let message = match error {
            SettingsError::Deserialization { path, .. } => {
                format!("Failed to deserialize Settings: {}", path.display())
            }
            other => format!(
                "Failed to {} settings at {}: {}",
                operation,
                other.path().display(),
                other
            ),
        };
        host.log(LogLevel::Warn, &message);
        self.state = ModState::Error;
    }
}
