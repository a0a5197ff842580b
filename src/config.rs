//! Configuration types for speech playback and lip-sync.

use crate::error::{LipSyncError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    /// Audio output settings.
    pub audio: AudioConfig,
    /// Loudness-driven mouth animation.
    pub amplitude: AmplitudeConfig,
    /// Animation frame cadence.
    pub frames: FrameConfig,
    /// Optional phoneme cue extraction.
    pub cues: CueConfig,
    /// Avatar asset lookup.
    pub avatar: AvatarConfig,
}

/// Audio output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output sample rate in Hz. Decoded clips are resampled to this rate.
    pub output_sample_rate: u32,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_sample_rate: 24_000,
            output_device: None,
        }
    }
}

/// Amplitude analyzer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmplitudeConfig {
    /// Number of most recent samples read per frame (must be a power of two).
    pub window_size: usize,
    /// Multiplier applied to the RMS before clamping to `[0, 1]`.
    pub gain: f32,
}

impl Default for AmplitudeConfig {
    fn default() -> Self {
        Self {
            window_size: 256,
            gain: 3.0,
        }
    }
}

/// Animation frame cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Frames per second for the mouth-shape pump.
    pub frame_rate_hz: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { frame_rate_hz: 60 }
    }
}

impl FrameConfig {
    /// Duration of one frame.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }
}

/// Phoneme cue extraction (Rhubarb Lip Sync) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CueConfig {
    /// Whether to attempt cue extraction at all.
    pub enabled: bool,
    /// Explicit path to the `rhubarb` binary (None = look up on `PATH`).
    pub rhubarb_path: Option<PathBuf>,
    /// Rhubarb recognizer: `phonetic` (language independent) or `pocketSphinx`.
    pub recognizer: String,
    /// Give up waiting for cues after this many milliseconds (None = wait
    /// until playback ends).
    pub timeout_ms: Option<u64>,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rhubarb_path: None,
            recognizer: "phonetic".to_owned(),
            timeout_ms: None,
        }
    }
}

/// Avatar asset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Base path/URL prefix for avatar assets.
    pub asset_base: String,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            asset_base: "/avatar".to_owned(),
        }
    }
}

impl LipSyncConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| LipSyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| LipSyncError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/concierge-lipsync/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config)
                .join("concierge-lipsync")
                .join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("concierge-lipsync")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/concierge-lipsync/config.toml")
        }
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`LipSyncError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.audio.output_sample_rate == 0 {
            return Err(LipSyncError::Config(
                "audio.output_sample_rate must be positive".into(),
            ));
        }
        if !self.amplitude.window_size.is_power_of_two() {
            return Err(LipSyncError::Config(format!(
                "amplitude.window_size must be a power of two, got {}",
                self.amplitude.window_size
            )));
        }
        if !self.amplitude.gain.is_finite() || self.amplitude.gain <= 0.0 {
            return Err(LipSyncError::Config(format!(
                "amplitude.gain must be a positive number, got {}",
                self.amplitude.gain
            )));
        }
        if self.frames.frame_rate_hz == 0 || self.frames.frame_rate_hz > 1000 {
            return Err(LipSyncError::Config(format!(
                "frames.frame_rate_hz must be in 1..=1000, got {}",
                self.frames.frame_rate_hz
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LipSyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.amplitude.window_size, 256);
        assert!((config.amplitude.gain - 3.0).abs() < f32::EPSILON);
        assert_eq!(config.frames.frame_rate_hz, 60);
        assert!(config.cues.enabled);
        assert!(config.cues.timeout_ms.is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = LipSyncConfig::default();
        config.amplitude.window_size = 512;
        config.frames.frame_rate_hz = 30;
        config.cues.timeout_ms = Some(1500);
        config.audio.output_device = Some("Speakers".to_owned());

        config.save_to_file(&path).unwrap();
        let loaded = LipSyncConfig::from_file(&path).unwrap();
        assert_eq!(loaded.amplitude.window_size, 512);
        assert_eq!(loaded.frames.frame_rate_hz, 30);
        assert_eq!(loaded.cues.timeout_ms, Some(1500));
        assert_eq!(loaded.audio.output_device.as_deref(), Some("Speakers"));
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cues]\nenabled = false\n").unwrap();

        let loaded = LipSyncConfig::from_file(&path).unwrap();
        assert!(!loaded.cues.enabled);
        assert_eq!(loaded.cues.recognizer, "phonetic");
        assert_eq!(loaded.amplitude.window_size, 256);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = LipSyncConfig::from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(LipSyncError::Io(_))));
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();

        let result = LipSyncConfig::from_file(&path);
        assert!(matches!(result, Err(LipSyncError::Config(_))));
    }

    #[test]
    fn rejects_non_power_of_two_window() {
        let mut config = LipSyncConfig::default();
        config.amplitude.window_size = 300;
        assert!(config.validate().is_err());
        config.amplitude.window_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_gain_and_frame_rate() {
        let mut config = LipSyncConfig::default();
        config.amplitude.gain = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = LipSyncConfig::default();
        config.frames.frame_rate_hz = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn frame_interval_matches_rate() {
        let frames = FrameConfig { frame_rate_hz: 50 };
        assert_eq!(frames.frame_interval(), std::time::Duration::from_millis(20));
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = LipSyncConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("concierge-lipsync"));
    }
}
