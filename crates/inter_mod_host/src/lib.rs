//! InterModHost: the mod other mods reach into.
//!
//! Keeps two counters. The process-wide counter is a plain static any crate
//! linking this one can bump; the instance counter belongs to the running
//! [`HostMod`] and is reachable through the [`SharedCounters`] capability or
//! by downcasting the instance.

use async_trait::async_trait;
use mod_api::{
    AccessLevel, CommandDescriptor, CommandInvocation, LogLevel, ModError, ModHost, ModInstance,
    ModState, SharedCounters,
};
use mod_lifecycle::{LifecycleController, ModSettings, ShutdownPersistence};
use mod_settings::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Name the host mod registers under.
pub const HOST_MOD_NAME: &str = "InterModHost";

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Bumps the process-wide counter, returning its previous value.
pub fn increment_global_counter() -> u64 {
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub fn global_counter() -> u64 {
    COUNTER.load(Ordering::Relaxed)
}

/// Settings of the host mod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostSettings {
    /// Value the instance counter is reset to on start
    pub counter_seed: u64,
    pub shutdown_persistence: ShutdownPersistence,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            counter_seed: 0,
            shutdown_persistence: ShutdownPersistence::KeepLive,
        }
    }
}

impl ModSettings for HostSettings {
    fn shutdown_persistence(&self) -> ShutdownPersistence {
        self.shutdown_persistence
    }
}

pub struct HostMod {
    instance_counter: AtomicU64,
    lifecycle: Mutex<LifecycleController<HostSettings>>,
}

impl HostMod {
    /// A host mod installed at `mod_path`.
    pub fn new(mod_path: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self::with_lifecycle(LifecycleController::new(mod_path, retry))
    }

    pub fn with_lifecycle(lifecycle: LifecycleController<HostSettings>) -> Self {
        Self {
            instance_counter: AtomicU64::new(0),
            lifecycle: Mutex::new(lifecycle),
        }
    }
}

impl SharedCounters for HostMod {
    fn increment_instance_counter(&self) -> u64 {
        self.instance_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn instance_counter(&self) -> u64 {
        self.instance_counter.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ModInstance for HostMod {
    fn name(&self) -> &str {
        HOST_MOD_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn start(&self, host: Arc<dyn ModHost>) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.start(host.as_ref()).await == ModState::Running {
            let seed = lifecycle.settings().counter_seed;
            self.instance_counter.store(seed, Ordering::Relaxed);
            debug!("{} running, instance counter seeded at {}", HOST_MOD_NAME, seed);
        }
    }

    async fn shutdown(&self, host: Arc<dyn ModHost>) {
        self.lifecycle.lock().await.shutdown(host.as_ref()).await;
    }

    async fn state(&self) -> ModState {
        self.lifecycle.lock().await.state()
    }

    fn commands(&self) -> Vec<CommandDescriptor> {
        vec![CommandDescriptor::new(
            "counters",
            AccessLevel::Player,
            "Shows the InterModHost counters",
        )]
    }

    async fn execute_command(
        &self,
        host: Arc<dyn ModHost>,
        invocation: &CommandInvocation,
    ) -> Result<(), ModError> {
        if !invocation.command.eq_ignore_ascii_case("counters") {
            return Err(ModError::CommandNotFound(invocation.command.clone()));
        }

        host.log(
            LogLevel::Info,
            &format!(
                "Counter: {} | InstanceCounter: {}",
                global_counter(),
                self.instance_counter()
            ),
        );
        Ok(())
    }

    fn shared_counters(&self) -> Option<&dyn SharedCounters> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mod_api::ModContainer;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingHost {
        logs: StdMutex<Vec<String>>,
        disabled: StdMutex<Vec<PathBuf>>,
    }

    impl ModHost for RecordingHost {
        fn log(&self, _level: LogLevel, message: &str) {
            self.logs.lock().unwrap().push(message.to_string());
        }

        fn disable_mod_by_path(&self, path: &Path) {
            self.disabled.lock().unwrap().push(path.to_path_buf());
        }

        fn get_mod_by_name(&self, _name: &str) -> Option<Arc<ModContainer>> {
            None
        }
    }

    #[tokio::test]
    async fn test_start_seeds_instance_counter() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Settings.json"), "{\"counterSeed\": 40,}").unwrap();

        let host = Arc::new(RecordingHost::default());
        let host_mod = HostMod::new(dir.path(), RetryPolicy::immediate(3));
        host_mod.start(host.clone()).await;

        assert_eq!(host_mod.state().await, ModState::Running);
        assert_eq!(host_mod.increment_instance_counter(), 40);
        assert_eq!(host_mod.instance_counter(), 41);
    }

    #[tokio::test]
    async fn test_start_failure_disables_and_keeps_counter() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Settings.json"), "counterSeed = 40").unwrap();

        let host = Arc::new(RecordingHost::default());
        let host_mod = HostMod::new(dir.path(), RetryPolicy::immediate(3));
        host_mod.start(host.clone()).await;

        assert_eq!(host_mod.state().await, ModState::Error);
        assert_eq!(host_mod.instance_counter(), 0);
        assert_eq!(host.disabled.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_counters_command_reports_values() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(RecordingHost::default());
        let host_mod = HostMod::new(dir.path(), RetryPolicy::immediate(3));
        host_mod.start(host.clone()).await;
        host_mod.increment_instance_counter();

        let invocation = CommandInvocation::new("tester", AccessLevel::Player, "Counters");
        host_mod.execute_command(host.clone(), &invocation).await.unwrap();

        let logs = host.logs.lock().unwrap();
        assert!(logs.last().unwrap().contains("InstanceCounter: 1"));
    }

    #[test]
    fn test_global_counter_returns_previous_value() {
        let before = increment_global_counter();
        assert!(global_counter() > before);
    }

    #[test]
    fn test_exposes_capability_and_concrete_type() {
        let host_mod = HostMod::new("mods/InterModHost", RetryPolicy::immediate(1));
        let instance: &dyn ModInstance = &host_mod;

        assert!(instance.shared_counters().is_some());
        assert!(instance.as_any().downcast_ref::<HostMod>().is_some());
        assert_eq!(instance.name(), "InterModHost");
    }
}
