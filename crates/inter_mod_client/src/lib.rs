//! InterModClient: a mod that reaches across the mod boundary.
//!
//! Its `test` command finds the InterModHost mod through the host and bumps
//! its counters, first through the concrete [`HostMod`] type and then, if
//! the instance is something else, through the [`SharedCounters`]
//! capability.
//!
//! [`SharedCounters`]: mod_api::SharedCounters

use async_trait::async_trait;
use inter_mod_host::{HostMod, HOST_MOD_NAME};
use mod_api::{
    AccessLevel, CommandDescriptor, CommandInvocation, LogLevel, ModError, ModHost, ModInstance,
    ModState, SharedCounters,
};
use mod_lifecycle::{LifecycleController, ModSettings, ShutdownPersistence};
use mod_settings::{RetryPolicy, SettingsError};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Name the client mod registers under.
pub const CLIENT_MOD_NAME: &str = "InterModClient";

/// Name of the diagnostic command.
pub const TEST_COMMAND: &str = "test";

/// How the `test` command resolves the host mod's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostLookup {
    /// Downcast to the concrete host type, falling back to the capability
    #[default]
    TypedThenCapability,
    /// Only query the capability
    CapabilityOnly,
}

/// Settings of the client mod, stored in its `Settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientSettings {
    /// Mod to look up
    pub host_mod_name: String,
    pub host_lookup: HostLookup,
    pub shutdown_persistence: ShutdownPersistence,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host_mod_name: HOST_MOD_NAME.to_string(),
            host_lookup: HostLookup::default(),
            shutdown_persistence: ShutdownPersistence::default(),
        }
    }
}

impl ModSettings for ClientSettings {
    fn shutdown_persistence(&self) -> ShutdownPersistence {
        self.shutdown_persistence
    }
}

pub struct ClientMod {
    lifecycle: Mutex<LifecycleController<ClientSettings>>,
}

impl ClientMod {
    /// A client mod installed at `mod_path`.
    pub fn new(mod_path: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self::with_lifecycle(LifecycleController::new(mod_path, retry))
    }

    pub fn with_lifecycle(lifecycle: LifecycleController<ClientSettings>) -> Self {
        Self {
            lifecycle: Mutex::new(lifecycle),
        }
    }

    pub async fn settings(&self) -> ClientSettings {
        self.lifecycle.lock().await.settings().clone()
    }

    /// Applies a live change to the settings. Not persisted on its own.
    pub async fn update_settings(&self, update: impl FnOnce(&mut ClientSettings)) {
        update(self.lifecycle.lock().await.settings_mut());
    }

    /// Writes the current settings; a failure puts the mod in error.
    pub async fn save_settings(&self, host: &dyn ModHost) -> Result<(), SettingsError> {
        self.lifecycle.lock().await.save_settings(host).await
    }

    async fn handle_inter_mod_test(&self, host: &dyn ModHost) -> Result<(), ModError> {
        let settings = self.settings().await;
        debug!(
            "Inter-mod test: looking up {} ({:?})",
            settings.host_mod_name, settings.host_lookup
        );

        host.log(
            LogLevel::Info,
            &inter_mod_host::increment_global_counter().to_string(),
        );

        let Some(container) = host.get_mod_by_name(&settings.host_mod_name) else {
            host.log(LogLevel::Info, "Host not found.");
            return Ok(());
        };
        let instance = container.instance();

        if settings.host_lookup == HostLookup::TypedThenCapability {
            if let Some(host_mod) = instance.as_any().downcast_ref::<HostMod>() {
                let previous = host_mod.increment_instance_counter();
                host.log(LogLevel::Info, &format!("Found host: {}", previous));
                return Ok(());
            }
            host.log(
                LogLevel::Debug,
                &format!(
                    "{} is not an {}, querying capabilities",
                    container.name(),
                    HOST_MOD_NAME
                ),
            );
        }

        match instance.shared_counters() {
            Some(counters) => {
                let previous = counters.increment_instance_counter();
                host.log(LogLevel::Info, &format!("Capability counter: {}", previous));
                Ok(())
            }
            None => Err(ModError::Execution(format!(
                "{} exposes no shared counters",
                container.name()
            ))),
        }
    }
}

#[async_trait]
impl ModInstance for ClientMod {
    fn name(&self) -> &str {
        CLIENT_MOD_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn start(&self, host: Arc<dyn ModHost>) {
        self.lifecycle.lock().await.start(host.as_ref()).await;
    }

    async fn shutdown(&self, host: Arc<dyn ModHost>) {
        self.lifecycle.lock().await.shutdown(host.as_ref()).await;
    }

    async fn state(&self) -> ModState {
        self.lifecycle.lock().await.state()
    }

    fn commands(&self) -> Vec<CommandDescriptor> {
        vec![CommandDescriptor::new(
            TEST_COMMAND,
            AccessLevel::Player,
            "Finds InterModHost and bumps its counters",
        )]
    }

    async fn execute_command(
        &self,
        host: Arc<dyn ModHost>,
        invocation: &CommandInvocation,
    ) -> Result<(), ModError> {
        if invocation.command.eq_ignore_ascii_case(TEST_COMMAND) {
            self.handle_inter_mod_test(host.as_ref()).await
        } else {
            Err(ModError::CommandNotFound(invocation.command.clone()))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
