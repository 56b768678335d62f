//! # Mod Settings
//!
//! Persistence for a mod's settings: one in-memory value, one JSON file, and
//! bounded retries around every read and write.
//!
//! ```rust,ignore
//! let mut store: SettingsStore<MySettings> =
//!     SettingsStore::for_mod("mods/InterModClient", RetryPolicy::default());
//!
//! match store.load().await {
//!     Ok(LoadOutcome::Created) => info!("Wrote default settings"),
//!     Ok(LoadOutcome::Loaded) => {}
//!     Err(e) => warn!("{}", e),
//! }
//! ```

pub mod backend;
pub mod codec;
mod error;
#[cfg(any(test, feature = "test-util"))]
mod memory;
pub mod retry;
mod store;

pub use backend::{FileBackend, SettingsBackend, SETTINGS_FILE_NAME};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryBackend, ALWAYS_FAIL};
pub use error::SettingsError;
pub use retry::{
    retry_with_bound, Backoff, RetryExhausted, RetryPolicy, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_DELAY,
};
pub use store::{LoadOutcome, SettingsStore};
