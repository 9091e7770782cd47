use crate::common::error::{FaceBankError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub models: ModelConfig,
    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub detector_path: PathBuf,
    pub recognizer_path: PathBuf,
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_optimization_level() -> u32 {
    3
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    pub input_width: u32,
    pub input_height: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f32,
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_nms_threshold() -> f32 {
    0.45
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    pub input_size: u32,
    #[serde(default = "default_normalization_value")]
    pub normalization_value: f32,
}

fn default_normalization_value() -> f32 {
    127.5
}

/// Distance thresholds for descriptor comparison. The enrollment value is the
/// strict one used when checking captures against each other; verification is
/// the looser login-time threshold.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_enrollment_tolerance")]
    pub enrollment_tolerance: f64,
    #[serde(default = "default_verification_tolerance")]
    pub verification_tolerance: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            enrollment_tolerance: default_enrollment_tolerance(),
            verification_tolerance: default_verification_tolerance(),
        }
    }
}

fn default_enrollment_tolerance() -> f64 {
    0.3
}

fn default_verification_tolerance() -> f64 {
    0.6
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub presence_check: bool,
    #[serde(default = "default_min_brightness")]
    pub min_brightness: f32,
    #[serde(default = "default_min_contrast")]
    pub min_contrast: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            presence_check: default_true(),
            min_brightness: default_min_brightness(),
            min_contrast: default_min_contrast(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_min_brightness() -> f32 {
    0.2
}

fn default_min_contrast() -> f32 {
    0.15
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub accounts_dir: PathBuf,
    pub uploads_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
        }
    }
}

fn default_session_ttl() -> u64 {
    900
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceBankError::Other(anyhow::anyhow!(
                "Config file not found: {}. Please create it from the example.",
                path.display()
            )));
        }

        tracing::info!("Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| FaceBankError::Other(anyhow::anyhow!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(FaceBankError::Other(anyhow::anyhow!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(FaceBankError::Other(anyhow::anyhow!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }
        if self.detector.confidence_threshold < 0.0 || self.detector.confidence_threshold > 1.0 {
            return Err(FaceBankError::Other(anyhow::anyhow!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.confidence_threshold
            )));
        }
        if self.detector.nms_threshold <= 0.0 || self.detector.nms_threshold > 1.0 {
            return Err(FaceBankError::Other(anyhow::anyhow!(
                "NMS threshold must be between 0.0 and 1.0, got {}",
                self.detector.nms_threshold
            )));
        }

        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(FaceBankError::Other(anyhow::anyhow!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }

        for (name, tolerance) in [
            ("enrollment_tolerance", self.matching.enrollment_tolerance),
            ("verification_tolerance", self.matching.verification_tolerance),
        ] {
            if tolerance <= 0.0 || tolerance > 4.0 {
                return Err(FaceBankError::Other(anyhow::anyhow!(
                    "{} must be between 0.0 and 4.0, got {}",
                    name,
                    tolerance
                )));
            }
        }

        if self.extraction.timeout_ms < 100 || self.extraction.timeout_ms > 60_000 {
            return Err(FaceBankError::Other(anyhow::anyhow!(
                "Extraction timeout must be between 100 and 60000 ms, got {}",
                self.extraction.timeout_ms
            )));
        }

        if self.session.ttl_seconds == 0 {
            return Err(FaceBankError::Other(anyhow::anyhow!(
                "Session TTL must be at least 1 second"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> String {
        r#"
            [models]
            detector_path = "models/face_detector.onnx"
            recognizer_path = "models/face_recognizer.onnx"

            [detector]
            input_width = 640
            input_height = 640

            [recognizer]
            input_size = 112

            [storage]
            accounts_dir = "dev_data/accounts"
            uploads_dir = "dev_data/uploads"
        "#
        .to_string()
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let config: Config = toml::from_str(&sample_toml()).unwrap();
        assert_eq!(config.matching.enrollment_tolerance, 0.3);
        assert_eq!(config.matching.verification_tolerance, 0.6);
        assert_eq!(config.extraction.timeout_ms, 5000);
        assert!(config.extraction.presence_check);
        assert_eq!(config.session.ttl_seconds, 900);
        assert_eq!(config.detector.confidence_threshold, 0.5);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_tolerance() {
        let mut config: Config = toml::from_str(&sample_toml()).unwrap();
        config.matching.verification_tolerance = 5.0;
        assert!(config.validate().is_err());

        config.matching.verification_tolerance = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_detector_dimensions() {
        let mut config: Config = toml::from_str(&sample_toml()).unwrap();
        config.detector.input_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_timeout() {
        let mut config: Config = toml::from_str(&sample_toml()).unwrap();
        config.extraction.timeout_ms = 10;
        assert!(config.validate().is_err());
    }
}
