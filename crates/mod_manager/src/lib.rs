//! In-process mod manager
//!
//! Hosts statically linked mods: registers them, drives their lifecycle,
//! honours their disable requests and dispatches their commands. Implements
//! [`ModHost`] so mods can call back into it.

use dashmap::DashMap;
use mod_api::{
    log_to_tracing, CommandInvocation, LogLevel, ModContainer, ModError, ModHost, ModInstance,
    ModState,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

// ============================================================================
// Mod Manager
// ============================================================================

/// Manages registered mods and their lifecycles
pub struct ModManager {
    /// Registered mods by name
    mods: DashMap<String, Arc<ModContainer>>,
    /// Registration order; mods start in this order and stop in reverse
    load_order: RwLock<Vec<String>>,
    /// Directory mods are installed under
    mods_directory: PathBuf,
    /// State of mods that asked to be disabled during their last start
    failed_starts: DashMap<String, ModState>,
    /// Dispatch statistics
    stats: ManagerCounters,
}

#[derive(Debug, Default)]
struct ManagerCounters {
    disable_requests: AtomicU64,
    commands_dispatched: AtomicU64,
    commands_failed: AtomicU64,
}

impl ModManager {
    /// Create a new mod manager for mods installed under `mods_directory`
    pub fn new(mods_directory: impl AsRef<Path>) -> Arc<Self> {
        Arc::new(Self {
            mods: DashMap::new(),
            load_order: RwLock::new(Vec::new()),
            mods_directory: mods_directory.as_ref().to_path_buf(),
            failed_starts: DashMap::new(),
            stats: ManagerCounters::default(),
        })
    }

    pub fn mods_directory(&self) -> &Path {
        &self.mods_directory
    }

    /// Install path for a mod named `name`
    pub fn mod_path(&self, name: &str) -> PathBuf {
        self.mods_directory.join(name)
    }

    /// Register a mod installed at `<mods directory>/<name>`
    pub async fn register_mod(
        &self,
        instance: Arc<dyn ModInstance>,
    ) -> Result<Arc<ModContainer>, ModError> {
        let path = self.mod_path(instance.name());
        self.register_mod_at(path, instance).await
    }

    /// Register a mod installed at an explicit path
    pub async fn register_mod_at(
        &self,
        path: impl Into<PathBuf>,
        instance: Arc<dyn ModInstance>,
    ) -> Result<Arc<ModContainer>, ModError> {
        let container = Arc::new(ModContainer::new(path, instance));
        let name = container.name().to_string();

        let mut load_order = self.load_order.write().await;
        if self.mods.contains_key(&name) {
            return Err(ModError::AlreadyRegistered(name));
        }

        self.mods.insert(name.clone(), container.clone());
        load_order.push(name.clone());

        info!(
            "Registered mod {} v{} at {}",
            name,
            container.instance().version(),
            container.path().display()
        );
        Ok(container)
    }

    /// Start a single mod.
    ///
    /// A disabled mod is re-enabled first. If the mod asks to be disabled
    /// while starting, it is shut down before this returns and the state it
    /// failed in (usually `Error`) is returned and kept for [`get_stats`].
    ///
    /// [`get_stats`]: Self::get_stats
    pub async fn start_mod(self: &Arc<Self>, name: &str) -> Result<ModState, ModError> {
        let container = self.container(name)?;
        let host: Arc<dyn ModHost> = self.clone();

        container.set_enabled(true);
        info!("Starting mod: {}", name);
        container.instance().start(host.clone()).await;

        let state = container.instance().state().await;
        if !container.is_enabled() {
            warn!("Mod {} was disabled during start ({}), shutting it down", name, state);
            self.failed_starts.insert(name.to_string(), state);
            container.instance().shutdown(host).await;
            return Ok(state);
        }

        self.failed_starts.remove(name);
        info!("Mod {} is {}", name, state);
        Ok(state)
    }

    /// Start every enabled mod in registration order, returning the names of
    /// those that reached `Running`
    pub async fn start_all(self: &Arc<Self>) -> Vec<String> {
        let names = self.load_order.read().await.clone();
        let mut running = Vec::new();

        info!("Starting {} mods", names.len());

        for name in names {
            match self.start_mod(&name).await {
                Ok(ModState::Running) => running.push(name),
                Ok(state) => warn!("Mod {} did not start, state: {}", name, state),
                Err(e) => error!("Failed to start mod {}: {}", name, e),
            }
        }

        info!("{} mods running", running.len());
        running
    }

    /// Shut down a single mod and disable it
    pub async fn shutdown_mod(self: &Arc<Self>, name: &str) -> Result<(), ModError> {
        let container = self.container(name)?;

        if !container.set_enabled(false) {
            debug!("Mod {} already disabled", name);
            return Ok(());
        }

        info!("Shutting down mod: {}", name);
        container.instance().shutdown(self.clone()).await;
        Ok(())
    }

    /// Shut down all enabled mods in reverse registration order
    pub async fn shutdown_all(self: &Arc<Self>) {
        let names = self.load_order.read().await.clone();

        info!("Shutting down {} mods", names.len());

        for name in names.iter().rev() {
            if let Err(e) = self.shutdown_mod(name).await {
                error!("Error shutting down mod {}: {}", name, e);
            }
        }

        info!("All mods shut down");
    }

    /// Dispatch a command to the first enabled mod that offers it
    pub async fn run_command(
        self: &Arc<Self>,
        invocation: CommandInvocation,
    ) -> Result<(), ModError> {
        let names = self.load_order.read().await.clone();

        for name in names {
            let Some(container) = self.get_mod_by_name(&name) else {
                continue;
            };
            if !container.is_enabled() {
                continue;
            }

            let Some(descriptor) = container
                .instance()
                .commands()
                .into_iter()
                .find(|c| c.name.eq_ignore_ascii_case(&invocation.command))
            else {
                continue;
            };

            if invocation.access_level < descriptor.access_level {
                return Err(ModError::AccessDenied {
                    command: descriptor.name,
                    required: descriptor.access_level,
                });
            }

            let state = container.instance().state().await;
            if !state.is_running() {
                return Err(ModError::ModUnavailable { name, state });
            }

            debug!(
                "{} runs /{} via {}",
                invocation.invoker, invocation.command, name
            );
            self.stats.commands_dispatched.fetch_add(1, Ordering::Relaxed);

            return container
                .instance()
                .execute_command(self.clone(), &invocation)
                .await
                .map_err(|e| {
                    self.stats.commands_failed.fetch_add(1, Ordering::Relaxed);
                    error!("Command /{} failed: {}", invocation.command, e);
                    e
                });
        }

        Err(ModError::CommandNotFound(invocation.command))
    }

    /// Get names of registered mods in registration order
    pub async fn get_registered_mods(&self) -> Vec<String> {
        self.load_order.read().await.clone()
    }

    /// Get the lifecycle state of every registered mod
    pub async fn get_mod_states(&self) -> Vec<(String, ModState)> {
        let containers: Vec<Arc<ModContainer>> = self
            .load_order
            .read()
            .await
            .iter()
            .filter_map(|name| self.get_mod_by_name(name))
            .collect();

        let states =
            futures::future::join_all(containers.iter().map(|c| c.instance().state())).await;

        containers
            .iter()
            .map(|c| c.name().to_string())
            .zip(states)
            .collect()
    }

    /// Get mod system statistics
    pub async fn get_stats(&self) -> ModSystemStats {
        let states = self.get_mod_states().await;

        let mods: Vec<ModStats> = states
            .into_iter()
            .filter_map(|(name, state)| {
                self.get_mod_by_name(&name).map(|container| ModStats {
                    version: container.instance().version().to_string(),
                    path: container.path().to_path_buf(),
                    enabled: container.is_enabled(),
                    failed_start: self.failed_starts.get(&name).map(|entry| *entry.value()),
                    name,
                    state,
                })
            })
            .collect();

        ModSystemStats {
            total_mods: mods.len(),
            running_mods: mods.iter().filter(|m| m.state.is_running()).count(),
            disabled_mods: mods.iter().filter(|m| !m.enabled).count(),
            failed_mods: mods.iter().filter(|m| m.failed_start.is_some()).count(),
            disable_requests: self.stats.disable_requests.load(Ordering::Relaxed),
            commands_dispatched: self.stats.commands_dispatched.load(Ordering::Relaxed),
            commands_failed: self.stats.commands_failed.load(Ordering::Relaxed),
            mods,
        }
    }

    fn container(&self, name: &str) -> Result<Arc<ModContainer>, ModError> {
        self.get_mod_by_name(name)
            .ok_or_else(|| ModError::NotFound(name.to_string()))
    }
}

impl ModHost for ModManager {
    fn log(&self, level: LogLevel, message: &str) {
        log_to_tracing(level, message);
    }

    fn disable_mod_by_path(&self, path: &Path) {
        self.stats.disable_requests.fetch_add(1, Ordering::Relaxed);

        let target = self
            .mods
            .iter()
            .find(|entry| entry.value().path() == path)
            .map(|entry| entry.value().clone());

        match target {
            Some(container) => {
                container.set_enabled(false);
                info!("Disabled mod {} at {}", container.name(), path.display());
            }
            None => warn!("Disable requested for unknown mod path: {}", path.display()),
        }
    }

    fn get_mod_by_name(&self, name: &str) -> Option<Arc<ModContainer>> {
        self.mods.get(name).map(|entry| entry.value().clone())
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ModSystemStats {
    pub total_mods: usize,
    pub running_mods: usize,
    pub disabled_mods: usize,
    /// Mods whose last start ended with a disable request
    pub failed_mods: usize,
    pub disable_requests: u64,
    pub commands_dispatched: u64,
    pub commands_failed: u64,
    pub mods: Vec<ModStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModStats {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub enabled: bool,
    pub state: ModState,
    /// State the last start failed in, if it did
    pub failed_start: Option<ModState>,
}

// ============================================================================
// Tests
// ============================================================================
