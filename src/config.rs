//! Configuration management for idcapture
//!
//! Provides the per-session [`DetectionConfig`], capture profile presets, and
//! TOML loading/saving of the root configuration file.

use crate::errors::CaptureError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Thresholds and feature toggles for one capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub enable_document_detection: bool,
    pub enable_blur_detection: bool,
    pub enable_glare_detection: bool,
    pub enable_face_detection: bool,
    /// Gate readiness on stable document bounds across frames
    pub enable_motion_gating: bool,
    /// Minimum document confidence for readiness (0.0-1.0)
    pub min_document_confidence: f32,
    /// Confidence floor for a strong face match (0.0-1.0)
    pub min_face_confidence: f32,
    /// Glare score above which a frame has glare (0.0-1.0)
    pub max_glare_score: f32,
    /// Bounds deltas at or below this many pixels are treated as jitter
    pub motion_jitter_px: f32,
    /// Countdown length once the document is stable
    pub auto_capture_delay_ms: u64,
    /// Consecutive ready frames before the countdown starts
    pub min_stable_frames: u32,
    /// Consecutive non-ready frames tolerated before resetting
    pub grace_period_frames: u32,
    /// Analysis rate cap, frames per second
    pub target_fps: u32,
    /// Integer downscale factor applied by the sampler
    pub downscale: u32,
    /// Run document, blur and glare stages on scoped threads
    pub parallel_stages: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enable_document_detection: true,
            enable_blur_detection: true,
            enable_glare_detection: true,
            enable_face_detection: true,
            enable_motion_gating: true,
            min_document_confidence: 0.7,
            min_face_confidence: 0.5,
            max_glare_score: 0.35,
            motion_jitter_px: 8.0,
            auto_capture_delay_ms: 1500,
            min_stable_frames: 3,
            grace_period_frames: 5,
            target_fps: 10,
            downscale: 2,
            parallel_stages: true,
        }
    }
}

/// Which side of the verification flow a session is capturing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureProfile {
    DocumentFront,
    DocumentBack,
    Selfie,
}

impl std::str::FromStr for CaptureProfile {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" | "document_front" => Ok(CaptureProfile::DocumentFront),
            "back" | "document_back" => Ok(CaptureProfile::DocumentBack),
            "selfie" => Ok(CaptureProfile::Selfie),
            other => Err(CaptureError::Config(format!("Unknown capture profile: {}", other))),
        }
    }
}

impl DetectionConfig {
    /// Preset for a capture profile
    pub fn for_profile(profile: CaptureProfile) -> Self {
        let base = Self::default();
        match profile {
            CaptureProfile::DocumentFront => base,
            // The back of an ID has no portrait
            CaptureProfile::DocumentBack => Self {
                enable_face_detection: false,
                ..base
            },
            CaptureProfile::Selfie => Self {
                enable_glare_detection: false,
                min_face_confidence: 0.6,
                auto_capture_delay_ms: 2000,
                ..base
            },
        }
    }

    /// Lower sample rate and coarser buffers for weak devices
    pub fn constrained(self) -> Self {
        Self {
            target_fps: self.target_fps.min(5),
            downscale: self.downscale.max(4),
            parallel_stages: false,
            ..self
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.target_fps.max(1) as u64)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("min_document_confidence", self.min_document_confidence),
            ("min_face_confidence", self.min_face_confidence),
            ("max_glare_score", self.max_glare_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be between 0.0 and 1.0", name));
            }
        }
        if self.motion_jitter_px < 0.0 {
            return Err("Motion jitter tolerance cannot be negative".to_string());
        }
        if self.target_fps == 0 || self.target_fps > 60 {
            return Err("Invalid target FPS (must be 1-60)".to_string());
        }
        if self.downscale == 0 || self.downscale > 8 {
            return Err("Downscale factor must be between 1 and 8".to_string());
        }
        if self.min_stable_frames == 0 {
            return Err("min_stable_frames must be at least 1".to_string());
        }
        if self.grace_period_frames == 0 {
            return Err("grace_period_frames must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Face model loading configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceModelConfig {
    /// Give up on the model after this long and run without faces
    pub load_timeout_ms: u64,
}

impl Default for FaceModelConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: 5000,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdCaptureConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub face_model: FaceModelConfig,
}

impl IdCaptureConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CaptureError::Config(format!("Failed to read config file: {}", e)))?;

        let config: IdCaptureConfig = toml::from_str(&contents)
            .map_err(|e| CaptureError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(CaptureError::Config)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CaptureError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CaptureError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CaptureError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CaptureError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("idcapture.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        self.detection.validate()?;
        if self.face_model.load_timeout_ms == 0 {
            return Err("Face model load timeout must be positive".to_string());
        }
        Ok(())
    }
}
