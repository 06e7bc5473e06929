//! Background music configuration.
//!
//! The configuration names the audio resources behind each part of the
//! background music and a handful of tuning values. It is stored as JSON,
//! by default at `<config dir>/racing-companion/music.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sound::SoundSource;

/// Errors that can occur while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for this schema.
    #[error("invalid configuration format: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration parsed but holds unusable values.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// No configuration directory exists on this system.
    #[error("configuration directory not found")]
    NoConfigDir,
}

impl ConfigError {
    /// Returns true if the file was missing rather than malformed.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

fn default_volume() -> f32 {
    1.0
}

fn default_hurry_up_speed() -> f32 {
    1.25
}

fn default_transition_divisor() -> u32 {
    4
}

/// Audio resources and tuning for [`crate::music::BackgroundMusic`].
///
/// # Example
///
/// ```
/// use racing_companion::config::MusicConfig;
///
/// let config = MusicConfig::from_json_str(r#"{
///     "main_stages": [{ "kind": "embedded", "name": "tick" }],
///     "break_track": { "kind": "embedded", "name": "silence" },
///     "transitions": [{ "kind": "embedded", "name": "silence" }]
/// }"#).unwrap();
/// assert_eq!(config.volume, 1.0);
/// assert_eq!(config.transition_divisor, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicConfig {
    /// Main music, one resource per stage, in order.
    pub main_stages: Vec<SoundSource>,

    /// Music looped during breaks.
    pub break_track: SoundSource,

    /// Transition cues played when a break ends, in order.
    pub transitions: Vec<SoundSource>,

    /// Overall volume in `0.0..=1.0`.
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Speed factor applied to the main music on hurry-up.
    #[serde(default = "default_hurry_up_speed")]
    pub hurry_up_speed: f32,

    /// The suggested continue interval is the transition length divided by
    /// this.
    #[serde(default = "default_transition_divisor")]
    pub transition_divisor: u32,
}

impl MusicConfig {
    /// A configuration built entirely from embedded sounds.
    #[must_use]
    pub fn silent_demo() -> Self {
        Self {
            main_stages: vec![SoundSource::embedded("tick"), SoundSource::embedded("tick")],
            break_track: SoundSource::embedded("silence"),
            transitions: vec![SoundSource::embedded("silence")],
            volume: default_volume(),
            hurry_up_speed: default_hurry_up_speed(),
            transition_divisor: default_transition_divisor(),
        }
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the values are invalid.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Default location of the configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if the platform has no
    /// configuration directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("racing-companion").join("music.json"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Serializes the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main_stages.is_empty() {
            return Err(ConfigError::Invalid("main_stages must not be empty".into()));
        }
        if self.transitions.is_empty() {
            return Err(ConfigError::Invalid("transitions must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(ConfigError::Invalid(format!(
                "volume must be between 0 and 1, got {}",
                self.volume
            )));
        }
        if !(self.hurry_up_speed > 0.0 && self.hurry_up_speed.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "hurry_up_speed must be positive, got {}",
                self.hurry_up_speed
            )));
        }
        if self.transition_divisor == 0 {
            return Err(ConfigError::Invalid(
                "transition_divisor must be at least 1".into(),
            ));
        }
        self.sources()
            .try_for_each(SoundSource::validate)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Every resource named by the configuration.
    pub fn sources(&self) -> impl Iterator<Item = &SoundSource> {
        self.main_stages
            .iter()
            .chain(std::iter::once(&self.break_track))
            .chain(&self.transitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // Parsing Tests
    // ------------------------------------------------------------------------

    mod parsing_tests {
        use super::*;

        const MINIMAL: &str = r#"{
            "main_stages": [{ "kind": "file", "name": "a", "path": "a.ogg" }],
            "break_track": { "kind": "embedded", "name": "silence" },
            "transitions": [{ "kind": "embedded", "name": "tick" }]
        }"#;

        #[test]
        fn test_defaults_apply() {
            let config = MusicConfig::from_json_str(MINIMAL).unwrap();
            assert_eq!(config.volume, 1.0);
            assert_eq!(config.hurry_up_speed, 1.25);
            assert_eq!(config.transition_divisor, 4);
            assert_eq!(config.main_stages[0], SoundSource::file("a", "a.ogg"));
        }

        #[test]
        fn test_malformed_json() {
            let err = MusicConfig::from_json_str("{").unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)));
        }

        #[test]
        fn test_missing_field() {
            let err = MusicConfig::from_json_str(r#"{ "main_stages": [] }"#).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)));
        }

        #[test]
        fn test_json_roundtrip_of_demo() {
            let demo = MusicConfig::silent_demo();
            let json = demo.to_json_string().unwrap();
            assert_eq!(MusicConfig::from_json_str(&json).unwrap(), demo);
        }
    }

    // ------------------------------------------------------------------------
    // Validation Tests
    // ------------------------------------------------------------------------

    mod validation_tests {
        use super::*;

        #[test]
        fn test_demo_is_valid() {
            assert!(MusicConfig::silent_demo().validate().is_ok());
        }

        #[test]
        fn test_empty_main_stages() {
            let mut config = MusicConfig::silent_demo();
            config.main_stages.clear();
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }

        #[test]
        fn test_empty_transitions() {
            let mut config = MusicConfig::silent_demo();
            config.transitions.clear();
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_volume_range() {
            let mut config = MusicConfig::silent_demo();
            config.volume = 1.5;
            assert!(config.validate().is_err());
            config.volume = 0.0;
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_hurry_up_speed_must_be_positive() {
            let mut config = MusicConfig::silent_demo();
            config.hurry_up_speed = 0.0;
            assert!(config.validate().is_err());
            config.hurry_up_speed = f32::NAN;
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_zero_divisor() {
            let mut config = MusicConfig::silent_demo();
            config.transition_divisor = 0;
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_invalid_source() {
            let mut config = MusicConfig::silent_demo();
            config.break_track = SoundSource::embedded("missing");
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("missing"));
        }
    }

    // ------------------------------------------------------------------------
    // Loading Tests
    // ------------------------------------------------------------------------

    mod loading_tests {
        use super::*;
        use std::io::Write;

        #[test]
        fn test_load_from_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(MusicConfig::silent_demo().to_json_string().unwrap().as_bytes())
                .unwrap();
            let config = MusicConfig::load(file.path()).unwrap();
            assert_eq!(config.main_stages.len(), 2);
        }

        #[test]
        fn test_load_missing_file() {
            let err = MusicConfig::load(Path::new("/nonexistent/music.json")).unwrap_err();
            assert!(err.is_not_found());
        }

        #[test]
        fn test_default_path_file_name() {
            if let Ok(path) = MusicConfig::default_path() {
                assert!(path.ends_with("racing-companion/music.json"));
            }
        }
    }
}
