//! Audio resource handles.
//!
//! A [`SoundSource`] names the audio a player is bound to. The composition
//! layer never opens it; only the platform backend does.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::embedded;
use super::error::PlayerError;

/// Supported audio file extensions.
const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "flac", "aiff", "m4a"];

/// Represents the audio resource a player is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoundSource {
    /// An audio file on disk.
    File {
        /// Display name (e.g. "drums").
        name: String,
        /// Path to the file.
        path: PathBuf,
    },
    /// Audio compiled into the binary.
    Embedded {
        /// Name of the embedded sound (e.g. "silence").
        name: String,
    },
}

impl SoundSource {
    /// Creates a file source.
    #[must_use]
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::File {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Creates a file source named after the file stem.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::File { name, path }
    }

    /// Creates an embedded source.
    #[must_use]
    pub fn embedded(name: impl Into<String>) -> Self {
        Self::Embedded { name: name.into() }
    }

    /// Returns the name of the source.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } | Self::Embedded { name } => name,
        }
    }

    /// Returns the file path if this is a file source.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path, .. } => Some(path),
            Self::Embedded { .. } => None,
        }
    }

    /// Returns true if this is an embedded source.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Embedded { .. })
    }

    /// Checks that the source can plausibly be loaded, without decoding it.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::Prepare`] for unknown embedded names and for
    /// file paths with an unsupported extension.
    pub fn validate(&self) -> Result<(), PlayerError> {
        match self {
            Self::Embedded { name } => {
                if !embedded::EMBEDDED_SOUND_NAMES.contains(&name.as_str()) {
                    return Err(self.prepare_error("no embedded sound with this name"));
                }
            }
            Self::File { path, .. } => {
                let supported = path
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase())
                    .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()));
                if !supported {
                    return Err(self.prepare_error("unsupported audio file extension"));
                }
            }
        }
        Ok(())
    }

    /// Builds a preparation error for this source.
    pub(crate) fn prepare_error(&self, reason: impl Into<String>) -> PlayerError {
        PlayerError::Prepare {
            resource: self.name().to_string(),
            reason: reason.into(),
        }
    }
}
