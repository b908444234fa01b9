//! Session descriptors and the on-disk configuration file.
//!
//! [`CaptureSessionConfig`] describes how one session configures the camera
//! and never changes once the session is opened. [`QuietCamConfig`] is the
//! TOML file hosts load defaults from.

use crate::errors::CameraError;
use crate::naming::ArtifactNamer;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default recording frame rate.
pub const DEFAULT_FRAME_RATE: u32 = 24;

/// Which way the lens faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lens {
    Front,
    Back,
}

/// Flash for stills, torch for recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashPolicy {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "4:3")]
    Ratio4x3,
    #[serde(rename = "16:9")]
    Ratio16x9,
}

/// The single size hint that drives use case binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSize {
    Resolution { width: u32, height: u32 },
    AspectRatio(AspectRatio),
}

/// How often a still session captures without being asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureFrequency {
    /// Only on explicit `capture_image` calls.
    OneShot,
    /// Every interval while started, in addition to explicit calls.
    Recurring(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Result<Self, CameraError> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(CameraError::Config(format!(
                "Rotation must be 0, 90, 180 or 270 degrees, got {}",
                other
            ))),
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

/// Immutable camera configuration for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSessionConfig {
    pub lens: Lens,
    pub target: Option<TargetSize>,
    pub rotation: Option<Rotation>,
    pub flash: FlashPolicy,
    /// Only read by still sessions.
    pub frequency: CaptureFrequency,
    /// Only read by video sessions.
    pub frame_rate: u32,
}

impl CaptureSessionConfig {
    pub fn new(lens: Lens) -> Self {
        Self {
            lens,
            target: None,
            rotation: None,
            flash: FlashPolicy::Off,
            frequency: CaptureFrequency::OneShot,
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.target = Some(TargetSize::Resolution { width, height });
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.target = Some(TargetSize::AspectRatio(ratio));
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_flash(mut self, flash: FlashPolicy) -> Self {
        self.flash = flash;
        self
    }

    pub fn with_frequency(mut self, frequency: CaptureFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps;
        self
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        if let Some(TargetSize::Resolution { width, height }) = self.target {
            if width == 0 || height == 0 {
                return Err(CameraError::Config(format!(
                    "Invalid target resolution {}x{}",
                    width, height
                )));
            }
        }
        if self.frame_rate == 0 || self.frame_rate > 240 {
            return Err(CameraError::Config(
                "Invalid frame rate (must be 1-240)".to_string(),
            ));
        }
        if self.frequency == CaptureFrequency::Recurring(Duration::ZERO) {
            return Err(CameraError::Config(
                "Recurring capture interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CaptureSessionConfig {
    fn default() -> Self {
        Self::new(Lens::Front)
    }
}

/// Root configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietCamConfig {
    pub capture: CaptureDefaults,
    pub storage: StorageConfig,
}

/// Camera defaults applied to every session built from the file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDefaults {
    pub lens: Lens,
    pub flash: FlashPolicy,
    pub frame_rate: u32,
    /// Target resolution [width, height]; exclusive with `aspect_ratio`
    pub target_resolution: Option<[u32; 2]>,
    pub aspect_ratio: Option<AspectRatio>,
    /// Rotation override in degrees
    pub rotation: Option<u32>,
    /// Recurring still interval in milliseconds; absent means one-shot
    pub capture_interval_ms: Option<u64>,
}

/// Output location and file naming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub output_directory: String,
    pub file_prefix: String,
}

impl Default for QuietCamConfig {
    fn default() -> Self {
        Self {
            capture: CaptureDefaults {
                lens: Lens::Front,
                flash: FlashPolicy::Off,
                frame_rate: DEFAULT_FRAME_RATE,
                target_resolution: None,
                aspect_ratio: None,
                rotation: None,
                capture_interval_ms: None,
            },
            storage: StorageConfig {
                output_directory: "./captures".to_string(),
                file_prefix: String::new(),
            },
        }
    }
}

impl QuietCamConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::Config(format!("Failed to read config file: {}", e)))?;

        let config: QuietCamConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("quietcam.toml")
    }

    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        if self.capture.target_resolution.is_some() && self.capture.aspect_ratio.is_some() {
            return Err(CameraError::Config(
                "Set either target_resolution or aspect_ratio, not both".to_string(),
            ));
        }
        if let Some(degrees) = self.capture.rotation {
            Rotation::from_degrees(degrees)?;
        }
        if self.storage.output_directory.trim().is_empty() {
            return Err(CameraError::Config("Output directory is empty".to_string()));
        }
        if self
            .storage
            .file_prefix
            .contains(|c| std::path::is_separator(c))
        {
            return Err(CameraError::Config(
                "File prefix must not contain path separators".to_string(),
            ));
        }
        self.session_config()?.validate()
    }

    /// Session descriptor built from the `[capture]` section.
    pub fn session_config(&self) -> Result<CaptureSessionConfig, CameraError> {
        let mut config = CaptureSessionConfig::new(self.capture.lens)
            .with_flash(self.capture.flash)
            .with_frame_rate(self.capture.frame_rate);

        match (self.capture.target_resolution, self.capture.aspect_ratio) {
            (Some([width, height]), _) => config = config.with_resolution(width, height),
            (None, Some(ratio)) => config = config.with_aspect_ratio(ratio),
            (None, None) => {}
        }
        if let Some(degrees) = self.capture.rotation {
            config = config.with_rotation(Rotation::from_degrees(degrees)?);
        }
        if let Some(ms) = self.capture.capture_interval_ms {
            config = config.with_frequency(CaptureFrequency::Recurring(Duration::from_millis(ms)));
        }
        Ok(config)
    }

    pub fn output_directory(&self) -> PathBuf {
        PathBuf::from(&self.storage.output_directory)
    }

    pub fn artifact_namer(&self) -> ArtifactNamer {
        ArtifactNamer::with_prefix(self.storage.file_prefix.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_config() {
        let config = CaptureSessionConfig::default();
        assert_eq!(config.lens, Lens::Front);
        assert_eq!(config.flash, FlashPolicy::Off);
        assert_eq!(config.frame_rate, 24);
        assert!(config.target.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_last_size_hint_wins() {
        let config = CaptureSessionConfig::new(Lens::Front)
            .with_aspect_ratio(AspectRatio::Ratio16x9)
            .with_resolution(1080, 1920);
        assert_eq!(
            config.target,
            Some(TargetSize::Resolution {
                width: 1080,
                height: 1920
            })
        );
    }

    #[test]
    fn test_session_config_validation() {
        assert!(CaptureSessionConfig::default()
            .with_resolution(0, 720)
            .validate()
            .is_err());
        assert!(CaptureSessionConfig::default()
            .with_frame_rate(0)
            .validate()
            .is_err());
        assert!(CaptureSessionConfig::default()
            .with_frame_rate(241)
            .validate()
            .is_err());
        assert!(CaptureSessionConfig::default()
            .with_frequency(CaptureFrequency::Recurring(Duration::ZERO))
            .validate()
            .is_err());
    }

    #[test]
    fn test_capture_interval_from_file() {
        let mut config = QuietCamConfig::default();
        assert_eq!(
            config.session_config().unwrap().frequency,
            CaptureFrequency::OneShot
        );

        config.capture.capture_interval_ms = Some(1500);
        assert_eq!(
            config.session_config().unwrap().frequency,
            CaptureFrequency::Recurring(Duration::from_millis(1500))
        );

        config.capture.capture_interval_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rotation_degrees() {
        assert_eq!(Rotation::from_degrees(270).unwrap(), Rotation::Deg270);
        assert_eq!(Rotation::Deg90.degrees(), 90);
        assert!(Rotation::from_degrees(45).is_err());
    }

    #[test]
    fn test_file_config_rejects_both_size_hints() {
        let mut config = QuietCamConfig::default();
        config.capture.target_resolution = Some([1920, 1080]);
        config.capture.aspect_ratio = Some(AspectRatio::Ratio16x9);
        assert!(config.validate().is_err());

        config.capture.aspect_ratio = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_config_to_session_config() {
        let mut config = QuietCamConfig::default();
        config.capture.lens = Lens::Back;
        config.capture.flash = FlashPolicy::On;
        config.capture.aspect_ratio = Some(AspectRatio::Ratio4x3);
        config.capture.rotation = Some(90);

        let session = config.session_config().unwrap();
        assert_eq!(session.lens, Lens::Back);
        assert_eq!(session.flash, FlashPolicy::On);
        assert_eq!(session.target, Some(TargetSize::AspectRatio(AspectRatio::Ratio4x3)));
        assert_eq!(session.rotation, Some(Rotation::Deg90));
    }

    #[test]
    fn test_prefix_with_separator_rejected() {
        let mut config = QuietCamConfig::default();
        config.storage.file_prefix = "a/b".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("quietcam.toml");

        let mut config = QuietCamConfig::default();
        config.capture.target_resolution = Some([1080, 1920]);
        config.capture.frame_rate = 30;
        config.storage.file_prefix = "cam-".to_string();
        assert!(config.save_to_file(&config_path).is_ok());

        let loaded = QuietCamConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.capture.target_resolution, Some([1080, 1920]));
        assert_eq!(loaded.capture.frame_rate, 30);
        assert_eq!(loaded.storage.file_prefix, "cam-");
    }

    #[test]
    fn test_config_toml_format() {
        let config = QuietCamConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[capture]"));
        assert!(toml_string.contains("[storage]"));
        assert!(toml_string.contains("lens = \"front\""));
        assert!(toml_string.contains("frame_rate = 24"));
    }

    #[test]
    fn test_parse_handwritten_toml() {
        let text = r#"
            [capture]
            lens = "front"
            flash = "on"
            frame_rate = 30
            aspect_ratio = "16:9"
            rotation = 180

            [storage]
            output_directory = "/tmp/quietcam"
            file_prefix = "clip-"
        "#;
        let config: QuietCamConfig = toml::from_str(text).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.capture.aspect_ratio, Some(AspectRatio::Ratio16x9));
        assert_eq!(config.output_directory(), PathBuf::from("/tmp/quietcam"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = QuietCamConfig::load_from_file("nonexistent_quietcam.toml");
        assert!(result.is_ok());
        assert_eq!(result.unwrap().capture.frame_rate, 24);
    }
}
