use std::io;
use std::path::{Path, PathBuf};

/// Errors raised while loading or saving settings.
///
/// - **Io**: storage kept failing until the retry bound was reached
/// - **Serialization**: the in-memory settings could not be encoded
/// - **Deserialization**: stored text is not valid settings; never retried
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O failure on {} after {} attempt(s): {}", .path.display(), .attempts, .source)]
    Io {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize settings for {}: {}", .path.display(), .source)]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to deserialize settings: {}: {}", .path.display(), .source)]
    Deserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SettingsError {
    /// File the failure relates to.
    pub fn path(&self) -> &Path {
        match self {
            SettingsError::Io { path, .. }
            | SettingsError::Serialization { path, .. }
            | SettingsError::Deserialization { path, .. } => path,
        }
    }

    pub fn is_io(&self) -> bool {
        matches!(self, SettingsError::Io { .. })
    }
}
