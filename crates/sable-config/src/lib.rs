//! Sable configuration system
//!
//! Centralized configuration for the engine, loaded from `sable.toml` as an
//! alternative to wiring every knob through constructor arguments. Every
//! field has a default, so a missing or partial file still yields a usable
//! configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sable_surface::Rgba;

/// Main configuration structure for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SableConfig {
    /// Canvas and layer settings.
    pub canvas: CanvasConfig,
    /// Animation timeline settings.
    pub animation: AnimationConfig,
}

/// Canvas and layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Viewport width in logical pixels.
    pub width: u32,
    /// Viewport height in logical pixels.
    pub height: u32,
    /// Ratio of device pixels to logical pixels applied to every layer.
    pub device_pixel_ratio: f64,
    /// Background color the base layer clears to.
    pub clear_color: Option<Rgba>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            device_pixel_ratio: 1.0,
            clear_color: None,
        }
    }
}

/// Animation timeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Whether the timeline starts running as soon as the engine is built.
    pub autostart: bool,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self { autostart: true }
    }
}

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl SableConfig {
    /// Load `sable.toml` from the working directory; defaults when the file
    /// does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("sable.toml")
    }

    /// Load a specific file; defaults when it does not exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SableConfig::default();
        assert_eq!(config.canvas.width, 640);
        assert_eq!(config.canvas.device_pixel_ratio, 1.0);
        assert!(config.animation.autostart);
    }

    #[test]
    fn test_partial_toml_fills_in_defaults() {
        let config: SableConfig = toml::from_str(
            r#"
            [canvas]
            width = 1280
            height = 720
            "#,
        )
        .unwrap();
        assert_eq!(config.canvas.width, 1280);
        assert_eq!(config.canvas.height, 720);
        assert_eq!(config.canvas.device_pixel_ratio, 1.0);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = SableConfig::load_from("definitely-not-a-real-file.toml").unwrap();
        assert_eq!(config.canvas.width, 640);
    }

    #[test]
    fn test_clear_color_round_trips() {
        let mut config = SableConfig::default();
        config.canvas.clear_color = Some(Rgba::opaque(10.0, 20.0, 30.0));
        let text = toml::to_string(&config).unwrap();
        let back: SableConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.canvas.clear_color, config.canvas.clear_color);
    }
}
