//! Engine configuration file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, Result};

/// Lowest sample rate the filter bank is calibrated for.
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Static engine settings, fixed for the lifetime of an [`Engine`](crate::Engine).
///
/// # TOML Format
///
/// ```toml
/// sample_rate = 48000
/// block_size = 128
/// queue_capacity = 100
/// swap_lr = false
/// master_volume = 80
/// key_shift = 64
/// ```
///
/// Every field is optional and falls back to its default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Samples per rendered block.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Event queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Swap left and right output channels.
    #[serde(default)]
    pub swap_lr: bool,

    /// Initial master volume control (0..=127).
    #[serde(default = "default_master_volume")]
    pub master_volume: u8,

    /// Initial key shift control (0..=127, 64 is no shift).
    #[serde(default = "default_key_shift")]
    pub key_shift: u8,
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_block_size() -> usize {
    256
}

fn default_queue_capacity() -> usize {
    100
}

fn default_master_volume() -> u8 {
    80
}

fn default_key_shift() -> u8 {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            queue_capacity: default_queue_capacity(),
            swap_lr: false,
            master_volume: default_master_volume(),
            key_shift: default_key_shift(),
        }
    }
}

impl EngineConfig {
    /// Sample rate as `f32`, for DSP constructors.
    pub fn sample_rate_f32(&self) -> f32 {
        self.sample_rate as f32
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < MIN_SAMPLE_RATE {
            return Err(EngineError::Config(format!(
                "sample rate {} below {MIN_SAMPLE_RATE} Hz",
                self.sample_rate
            )));
        }
        if self.block_size == 0 {
            return Err(EngineError::Config("block size must be non-zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::Config(
                "queue capacity must be non-zero".into(),
            ));
        }
        if self.master_volume > 127 || self.key_shift > 127 {
            return Err(EngineError::Config(
                "controls must be in 0..=127".into(),
            ));
        }
        Ok(())
    }

    /// Load and validate a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::read_file(path, e))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| EngineError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
