//! Pipeline tunables.
//!
//! Every field has a default, so a config file only needs the keys it wants
//! to override:
//!
//! ```toml
//! [window]
//! capacity = 30
//!
//! [ink]
//! adaptive_c = 7
//! ```

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub localizer: LocalizerConfig,
    pub aligner: AlignerConfig,
    pub occupancy: OccupancyConfig,
    pub window: WindowConfig,
    pub background: BackgroundConfig,
    pub ink: InkConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    /// Intensity above which a pixel counts as board surface.
    pub threshold: u8,
    /// Minimum contour area (px²) for a whiteboard candidate.
    pub min_area: u32,
    pub bilateral_diameter: u32,
    pub bilateral_sigma_color: f32,
    pub bilateral_sigma_space: f32,
    /// Side of the rectangular closing kernel.
    pub close_kernel: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    pub max_features: usize,
    pub fast_threshold: u8,
    pub keep_best_matches: usize,
    pub min_match_count: usize,
    /// RANSAC reprojection threshold in pixels.
    pub ransac_threshold: f64,
    pub ransac_max_iterations: usize,
    pub ransac_confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OccupancyConfig {
    /// Detections below this confidence are ignored.
    pub confidence: f32,
    pub person_label: String,
    /// Binarization level for resized region masks.
    pub mask_threshold: f32,
    /// Side of the elliptical closing kernel.
    pub close_kernel: u32,
    /// Fraction of pixels that must be covered for a frame to contain the presenter.
    pub min_person_area_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub capacity: usize,
    pub min_batch: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub inpaint_radius: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InkConfig {
    pub bilateral_diameter: u32,
    pub bilateral_sigma_color: f32,
    pub bilateral_sigma_space: f32,
    pub adaptive_block_size: u32,
    pub adaptive_c: f32,
    pub open_kernel: u32,
    pub close_kernel: u32,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            threshold: 200,
            min_area: 10_000,
            bilateral_diameter: 9,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_space: 75.0,
            close_kernel: 7,
        }
    }
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            max_features: 1000,
            fast_threshold: 20,
            keep_best_matches: 50,
            min_match_count: 10,
            ransac_threshold: 5.0,
            ransac_max_iterations: 2000,
            ransac_confidence: 0.995,
        }
    }
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            confidence: 0.4,
            person_label: "person".into(),
            mask_threshold: 0.5,
            close_kernel: 5,
            min_person_area_ratio: 0.003,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            min_batch: 5,
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self { inpaint_radius: 3 }
    }
}

impl Default for InkConfig {
    fn default() -> Self {
        Self {
            bilateral_diameter: 5,
            bilateral_sigma_color: 50.0,
            bilateral_sigma_space: 50.0,
            adaptive_block_size: 31,
            adaptive_c: 5.0,
            open_kernel: 3,
            close_kernel: 2,
        }
    }
}

impl InkConfig {
    /// Adaptive threshold block size, forced odd and at least 3.
    pub fn block_size(&self) -> u32 {
        let v = self.adaptive_block_size.max(3);
        if v % 2 == 0 {
            v + 1
        } else {
            v
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let window = &self.window;
        if window.capacity == 0 {
            return Err(ConfigError::Invalid("window.capacity must be > 0".into()));
        }
        if window.min_batch == 0 {
            return Err(ConfigError::Invalid("window.min_batch must be > 0".into()));
        }
        if window.min_batch > window.capacity {
            return Err(ConfigError::Invalid(format!(
                "window.min_batch ({}) exceeds window.capacity ({})",
                window.min_batch, window.capacity
            )));
        }
        if !(0.0..=1.0).contains(&self.occupancy.min_person_area_ratio) {
            return Err(ConfigError::Invalid(
                "occupancy.min_person_area_ratio must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.occupancy.confidence) {
            return Err(ConfigError::Invalid(
                "occupancy.confidence must be within [0, 1]".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.aligner.ransac_confidence) {
            return Err(ConfigError::Invalid(
                "aligner.ransac_confidence must be within [0, 1)".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.localizer.threshold, 200);
        assert_eq!(config.localizer.min_area, 10_000);
        assert_eq!(config.aligner.max_features, 1000);
        assert_eq!(config.aligner.min_match_count, 10);
        assert_eq!(config.window.capacity, 20);
        assert_eq!(config.window.min_batch, 5);
        assert_eq!(config.occupancy.person_label, "person");
        assert_eq!(config.ink.block_size(), 31);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [window]
            capacity = 8

            [ink]
            adaptive_c = 7.0
            "#,
        )
        .unwrap();

        assert_eq!(config.window.capacity, 8);
        assert_eq!(config.window.min_batch, 5);
        assert_eq!(config.ink.adaptive_c, 7.0);
        assert_eq!(config.ink.adaptive_block_size, 31);
        assert_eq!(config.localizer.threshold, 200);
    }

    #[test]
    fn rejects_min_batch_above_capacity() {
        let err = PipelineConfig::from_toml("[window]\ncapacity = 3\nmin_batch = 4\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = PipelineConfig::from_toml("[window\ncapacity = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn even_block_size_is_bumped_to_odd() {
        let ink = InkConfig {
            adaptive_block_size: 30,
            ..InkConfig::default()
        };
        assert_eq!(ink.block_size(), 31);

        let tiny = InkConfig {
            adaptive_block_size: 1,
            ..InkConfig::default()
        };
        assert_eq!(tiny.block_size(), 3);
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[occupancy]\nmin_person_area_ratio = 0.01").unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.occupancy.min_person_area_ratio, 0.01);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = PipelineConfig::load(Path::new("/nonexistent/whiteboard.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile(_, _)));
    }
}
