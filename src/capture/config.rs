//! Capture and sampler configuration.
//!
//! The capture preset asks for steady illumination and a fixed frame
//! size so that frame-to-frame brightness follows blood volume rather
//! than auto-exposure. Sampler parameters are fixed for the lifetime of
//! a session.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default subsampling step, in pixels, along both axes of the ROI.
pub const DEFAULT_SAMPLE_STRIDE: usize = 8;

/// Default red-channel mean above which a finger is considered present.
pub const DEFAULT_FINGER_THRESHOLD: f64 = 120.0;

/// Configuration for the capture device and stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera device index used by the native backend.
    pub device_id: u32,
    /// Requested frame width in pixels.
    pub width: u32,
    /// Requested frame height in pixels.
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
    /// Illumination level in `(0.0, 1.0]` applied when the device has a torch.
    pub torch_level: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 640,
            height: 480,
            fps: 30,
            torch_level: 1.0,
        }
    }
}

impl CaptureConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if !(self.torch_level > 0.0 && self.torch_level <= 1.0) {
            return Err(ConfigError::InvalidTorchLevel(self.torch_level));
        }
        Ok(())
    }
}

/// Parameters of the per-frame finger detection.
///
/// The defaults are empirical: a finger pressed over a lit lens saturates
/// the red channel, an uncovered lens shows a markedly darker scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Visit every `stride`-th row and column of the region of interest.
    pub stride: usize,
    /// Strict lower bound on the red mean for a positive detection.
    pub threshold: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            stride: DEFAULT_SAMPLE_STRIDE,
            threshold: DEFAULT_FINGER_THRESHOLD,
        }
    }
}

impl SamplerConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stride == 0 {
            return Err(ConfigError::InvalidStride);
        }
        if !self.threshold.is_finite() || !(0.0..=255.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        Ok(())
    }

    /// Classifies a red-channel mean. The comparison is strict.
    #[inline]
    pub fn classify(&self, mean: f64) -> bool {
        mean > self.threshold
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Frame rate outside 1-120.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Torch level outside (0, 1].
    #[error("invalid torch level {0} (must be in (0, 1])")]
    InvalidTorchLevel(f32),
    /// Stride of zero.
    #[error("sample stride must be at least 1")]
    InvalidStride,
    /// Threshold outside 0-255.
    #[error("invalid finger threshold {0} (must be within 0-255)")]
    InvalidThreshold(f64),
    /// Config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// Config file is not valid TOML.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[capture]` table.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// `[sampler]` table.
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// `[output]` table.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output configuration for the command-line runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Run until interrupted (true) or for a fixed number of frames (false).
    pub continuous: bool,
    /// Number of frames to feed if not continuous.
    pub frame_count: u32,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            frame_count: 150,
            metrics_port: 9090,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        config.sampler.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(CaptureConfig::default().validate().is_ok());
        assert!(SamplerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = CaptureConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_torch_level_bounds() {
        let mut config = CaptureConfig::default();
        config.torch_level = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTorchLevel(_))
        ));
        config.torch_level = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_stride_invalid() {
        let config = SamplerConfig {
            stride: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidStride)));
    }

    #[test]
    fn test_threshold_must_be_finite_and_in_range() {
        for threshold in [f64::NAN, -1.0, 300.0] {
            let config = SamplerConfig {
                threshold,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidThreshold(_))
            ));
        }
    }

    #[test]
    fn test_classify_is_strict() {
        let config = SamplerConfig::default();
        assert!(!config.classify(120.0));
        assert!(config.classify(120.0001));
        assert!(config.classify(200.0));
        assert!(!config.classify(50.0));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = FileConfig::from_toml(
            r#"
            [sampler]
            threshold = 100.0

            [output]
            continuous = true
            "#,
        )
        .unwrap();

        assert_eq!(config.sampler.threshold, 100.0);
        assert_eq!(config.sampler.stride, DEFAULT_SAMPLE_STRIDE);
        assert_eq!(config.capture.width, 640);
        assert!(config.output.continuous);
        assert_eq!(config.output.frame_count, 150);
    }

    #[test]
    fn test_invalid_toml_sampler_rejected() {
        let result = FileConfig::from_toml("[sampler]\nstride = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidStride)));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = FileConfig::from_toml("[capture\nwidth = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
