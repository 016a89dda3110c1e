//! Device configuration for the detector
//!
//! Pure in-process configuration: detection profiles per surface, the tag
//! strings used to classify overlaps and calibration surfaces, and the clip
//! identities handed to the audio collaborator. Persisted as TOML under the
//! platform config directory; a default file is written on first run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::audio::ClipId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No config directory available on this platform")]
    NoConfigDir,

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A named detection range bound to a surface category.
///
/// Profiles are immutable after construction; calibration copies the active
/// profile's `range` into the detector's current max distance but never
/// edits the profile itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionProfile {
    pub name: String,
    /// Detection radius in meters.
    pub range: f32,
}

/// The two calibration surfaces the device knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub ground: DetectionProfile,
    pub asphalt: DetectionProfile,
}

/// Tag strings supplied by the physics collaborator, matched verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagConfig {
    pub danger: String,
    pub scrap: String,
    pub asphalt: String,
    pub ground: String,
}

/// Clip identities handed to the audio collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipConfig {
    pub danger: String,
    pub scrap: String,
    pub calibration: String,
}

impl ClipConfig {
    pub fn danger_clip(&self) -> ClipId {
        ClipId::new(self.danger.clone())
    }

    pub fn scrap_clip(&self) -> ClipId {
        ClipId::new(self.scrap.clone())
    }

    pub fn calibration_clip(&self) -> ClipId {
        ClipId::new(self.calibration.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub profiles: ProfileConfig,
    pub tags: TagConfig,
    pub clips: ClipConfig,

    /// Length of the downward calibration ray in meters.
    pub calibration_ray_length: f32,

    /// Interval between audio parameter updates in milliseconds.
    pub tick_interval_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            profiles: ProfileConfig {
                ground: DetectionProfile {
                    name: "Ground".to_string(),
                    range: 1.0, // soft ground, full detection radius
                },
                asphalt: DetectionProfile {
                    name: "Asphalt".to_string(),
                    range: 0.3, // dense surface, tight radius
                },
            },
            tags: TagConfig {
                danger: "Danger".to_string(),
                scrap: "Scrap".to_string(),
                asphalt: "Asphalt".to_string(),
                ground: "Ground".to_string(),
            },
            clips: ClipConfig {
                danger: "danger_beep".to_string(),
                scrap: "scrap_beep".to_string(),
                calibration: "calibration_chirp".to_string(),
            },
            calibration_ray_length: 2.0,
            tick_interval_ms: 16, // one audio update per rendered frame
        }
    }
}

impl DetectorConfig {
    /// Path of the persisted config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join("opendetector").join("config.toml"))
    }

    /// Loads the persisted config, writing the default file first if none
    /// exists yet.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            info!("No config found at {:?}, writing defaults", path);
            let config = Self::default();
            config.store(&path)?;
            return Ok(config);
        }

        debug!("Loading config from {:?}", path);
        let raw = fs::read_to_string(&path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn store(&self, path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)?;
        fs::write(path, raw)?;
        info!("Config written to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_profiles() {
        let config = DetectorConfig::default();
        assert_eq!(config.profiles.ground.range, 1.0);
        assert_eq!(config.profiles.asphalt.range, 0.3);
        assert_eq!(config.calibration_ray_length, 2.0);
        assert_eq!(
            config.clips.calibration_clip(),
            ClipId::new("calibration_chirp")
        );
    }

    #[test]
    fn toml_round_trip_preserves_config() {
        let config = DetectorConfig::default();
        let raw = toml::to_string_pretty(&config).expect("serialize");
        let parsed: DetectorConfig = toml::from_str(&raw).expect("parse");
        assert_eq!(parsed, config);
    }
}
