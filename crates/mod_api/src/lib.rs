//! # Mod API
//!
//! The contract between a game server host and the mods it drives.
//!
//! A host owns a set of [`ModContainer`]s, each wrapping a [`ModInstance`].
//! The host calls [`ModInstance::start`] and [`ModInstance::shutdown`], and
//! mods call back into the host through [`ModHost`] to log, to request that
//! they be disabled, or to locate another mod by name.
//!
//! ## Cross-mod interop
//!
//! Mods that want to cooperate do so through capability traits rather than
//! untyped property access. A mod exposes a capability by overriding the
//! matching query on [`ModInstance`] (for example
//! [`ModInstance::shared_counters`]); callers that link against the concrete
//! mod crate may also downcast through [`ModInstance::as_any`].
//!
//! ```rust,ignore
//! let Some(container) = host.get_mod_by_name("InterModHost") else {
//!     host.log(LogLevel::Info, "Host not found.");
//!     return Ok(());
//! };
//!
//! if let Some(counters) = container.instance().shared_counters() {
//!     let previous = counters.increment_instance_counter();
//!     host.log(LogLevel::Info, &format!("Capability counter: {previous}"));
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// Lifecycle State
// ============================================================================

/// Lifecycle state of a single mod instance.
///
/// A mod begins in `Stopped`, moves to `Loading` when the host starts it and
/// then settles in either `Running` or `Error`. Shutdown returns it to
/// `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModState {
    /// Not started yet, or shut down
    #[default]
    Stopped,
    /// Start has been requested and settings are being loaded
    Loading,
    /// Started successfully and usable
    Running,
    /// Start or persistence failed; the instance is no longer usable
    Error,
}

impl ModState {
    /// Whether the instance can serve commands.
    pub fn is_running(self) -> bool {
        matches!(self, ModState::Running)
    }
}

impl fmt::Display for ModState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModState::Stopped => "stopped",
            ModState::Loading => "loading",
            ModState::Running => "running",
            ModState::Error => "error",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Logging and Access Levels
// ============================================================================

/// Severity of a message sent to the host's logging sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Failures that end the useful life of a mod instance
    Error,
    /// Recoverable problems, or failures the mod handled locally
    Warn,
    /// Lifecycle progress and command output
    Info,
    /// Detailed diagnostics
    Debug,
}

/// Privilege required to run a command, ordered from least to most trusted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum AccessLevel {
    #[default]
    Player,
    Advocate,
    Sentinel,
    Envoy,
    Developer,
    Admin,
}

// ============================================================================
// Commands
// ============================================================================

/// A command a mod offers to the host's command dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Name typed by the invoker, matched case-insensitively by hosts
    pub name: String,
    /// Minimum access level of the invoker
    pub access_level: AccessLevel,
    /// One-line help text
    pub description: String,
}

impl CommandDescriptor {
    pub fn new(
        name: impl Into<String>,
        access_level: AccessLevel,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            access_level,
            description: description.into(),
        }
    }
}

/// A single invocation of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Who issued the command (account or console name)
    pub invoker: String,
    /// Access level of the invoker
    pub access_level: AccessLevel,
    /// Command name as typed
    pub command: String,
    /// Remaining whitespace-separated arguments
    pub parameters: Vec<String>,
}

impl CommandInvocation {
    pub fn new(
        invoker: impl Into<String>,
        access_level: AccessLevel,
        command: impl Into<String>,
    ) -> Self {
        Self {
            invoker: invoker.into(),
            access_level,
            command: command.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced to a host by mod-facing operations.
///
/// Lifecycle failures are deliberately absent: a mod handles those locally
/// by moving to [`ModState::Error`] and asking the host to disable it.
#[derive(Debug, thiserror::Error)]
pub enum ModError {
    /// No mod with this name is registered
    #[error("Mod not found: {0}")]
    NotFound(String),
    /// A mod with this name is already registered
    #[error("Mod already registered: {0}")]
    AlreadyRegistered(String),
    /// No enabled mod offers the requested command
    #[error("Command not found: {0}")]
    CommandNotFound(String),
    /// The invoker's access level is below the command's requirement
    #[error("Access denied for command {command}: requires {required:?}")]
    AccessDenied {
        command: String,
        required: AccessLevel,
    },
    /// The mod that owns the command is not running
    #[error("Mod unavailable: {name} is {state}")]
    ModUnavailable { name: String, state: ModState },
    /// The command ran and failed
    #[error("Command execution error: {0}")]
    Execution(String),
}

// ============================================================================
// Capabilities
// ============================================================================

/// Capability exposed by mods that keep counters other mods may bump.
///
/// Increments return the value held *before* the increment.
pub trait SharedCounters: Send + Sync {
    /// Increments the counter owned by this particular instance.
    fn increment_instance_counter(&self) -> u64;

    /// Current value of the instance counter.
    fn instance_counter(&self) -> u64;
}

// ============================================================================
// Mod and Host Traits
// ============================================================================

/// A mod instance as seen by the host.
///
/// All methods take `&self`: instances are shared between the host and any
/// other mod that looks them up, so mutable state lives behind the
/// implementor's own locks.
#[async_trait]
pub trait ModInstance: Send + Sync + 'static {
    /// Stable, unique name used for lookups.
    fn name(&self) -> &str;

    /// Version string of the mod.
    fn version(&self) -> &str;

    /// Starts the mod.
    ///
    /// Failures never propagate to the caller. A mod that cannot start moves
    /// itself to [`ModState::Error`] and calls
    /// [`ModHost::disable_mod_by_path`].
    ///
    /// # Arguments
    ///
    /// * `host` - Callback surface of the host driving this mod
    async fn start(&self, host: Arc<dyn ModHost>);

    /// Shuts the mod down. Logs a diagnostic if called while in error.
    async fn shutdown(&self, host: Arc<dyn ModHost>);

    /// Current lifecycle state.
    async fn state(&self) -> ModState;

    /// Commands this mod offers. Empty by default.
    fn commands(&self) -> Vec<CommandDescriptor> {
        Vec::new()
    }

    /// Executes one of the commands returned by [`ModInstance::commands`].
    ///
    /// # Returns
    ///
    /// `Ok(())` once the command has run, or `Err(ModError)` if the command
    /// is unknown to this mod or failed.
    async fn execute_command(
        &self,
        _host: Arc<dyn ModHost>,
        invocation: &CommandInvocation,
    ) -> Result<(), ModError> {
        Err(ModError::CommandNotFound(invocation.command.clone()))
    }

    /// Queries the [`SharedCounters`] capability.
    fn shared_counters(&self) -> Option<&dyn SharedCounters> {
        None
    }

    /// Access to the concrete type for callers that link against it.
    fn as_any(&self) -> &dyn Any;
}

/// Services the host offers to mods.
pub trait ModHost: Send + Sync {
    /// Writes a message to the host's logging sink.
    fn log(&self, level: LogLevel, message: &str);

    /// Asks the host to disable the mod installed at `path`.
    ///
    /// The request is honoured by the host after the current call into the
    /// mod returns; mods must not expect to be shut down re-entrantly.
    fn disable_mod_by_path(&self, path: &Path);

    /// Looks up a registered mod by name.
    fn get_mod_by_name(&self, name: &str) -> Option<Arc<ModContainer>>;
}

// ============================================================================
// Mod Container
// ============================================================================

/// Host-side record of an installed mod.
pub struct ModContainer {
    name: String,
    path: PathBuf,
    instance: Arc<dyn ModInstance>,
    enabled: AtomicBool,
}

impl ModContainer {
    /// Wraps `instance`, installed at `path`. Containers start enabled.
    pub fn new(path: impl Into<PathBuf>, instance: Arc<dyn ModInstance>) -> Self {
        Self {
            name: instance.name().to_string(),
            path: path.into(),
            instance,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory the mod is installed in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn instance(&self) -> &Arc<dyn ModInstance> {
        &self.instance
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Sets the enabled flag, returning the previous value.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::AcqRel)
    }
}

impl fmt::Debug for ModContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModContainer")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Routes a host log call onto `tracing`.
///
/// Hosts that have no sink of their own can forward [`ModHost::log`] here.
pub fn log_to_tracing(level: LogLevel, message: &str) {
    match level {
        LogLevel::Error => tracing::error!("{}", message),
        LogLevel::Warn => tracing::warn!("{}", message),
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Debug => tracing::debug!("{}", message),
    }
}
