pub mod capture;
pub mod overlay;
pub mod pipeline;
pub mod scan;
pub mod utils;

use std::path::Path;

use arc_swap::ArcSwap;
use capture::{PixelFormat, Rotation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use overlay::OverlayConfig;
pub use scan::DecoderConfig;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub decoder: DecoderConfig,
    pub overlay: OverlayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// V4L2 device node, live capture only
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    /// Clockwise rotation that makes frames upright
    pub rotation: Rotation,
    pub buffer_count: u32,
    /// Loop replayed images until stopped
    pub repeat: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".into(),
            width: 800,
            height: 600,
            fps: 30,
            format: PixelFormat::Mjpeg,
            rotation: Rotation::Deg0,
            buffer_count: 4,
            repeat: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Decodes slower than this are logged
    pub slow_decode_ms: u64,
    /// Capacity of the event channel handed to consumers
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            slow_decode_ms: 100,
            event_capacity: 16,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Load(#[from] ::config::ConfigError),
}

impl Config {
    /// Defaults, then the optional TOML file, then `CODESCAN__SECTION__KEY`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut builder =
            ::config::Config::builder().add_source(::config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            builder = builder.add_source(::config::File::from(path).format(::config::FileFormat::Toml));
        }

        let config = builder
            .add_source(
                ::config::Environment::with_prefix("CODESCAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::WindowShape;
    use crate::scan::SymbolFormat;

    #[test]
    fn defaults_without_a_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.capture, CaptureConfig::default());
        assert_eq!(config.pipeline.event_capacity, 16);
        assert_eq!(config.decoder.formats.len(), SymbolFormat::ALL.len());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codescan.toml");
        std::fs::write(
            &path,
            r#"
[capture]
fps = 12
rotation = 90
repeat = true

[decoder]
formats = ["qr", "ean13"]

[overlay]
shape = "square"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.capture.fps, 12);
        assert_eq!(config.capture.rotation, Rotation::Deg90);
        assert!(config.capture.repeat);
        assert_eq!(config.capture.width, 800);
        assert_eq!(config.decoder.formats, vec![SymbolFormat::Qr, SymbolFormat::Ean13]);
        assert_eq!(config.overlay.shape, WindowShape::Square);
    }

    #[test]
    fn bad_rotation_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codescan.toml");
        std::fs::write(&path, "[capture]\nrotation = 45\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/codescan.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
