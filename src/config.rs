//! Configuration for the ensemble averaging engine.
//!
//! ## File format
//!
//! Every section and key is optional; missing values take the defaults
//! below.
//!
//! ```toml
//! window_size = 10
//! running_average = false
//! trigger = "sample_count"   # or "timer"
//! timer_interval_ms = 1000
//!
//! [channels.amplitude]
//! enabled = true
//! scale = 1.0
//!
//! [reference_layer]
//! enabled = true
//! min_bin = 1
//! max_bin = 3
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_WINDOW_SIZE;
use crate::ensemble::ChannelKind;
use crate::error::{AverageError, Result};

/// What causes an average to be published
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Publish once the window holds `window_size` ensembles
    #[default]
    SampleCount,
    /// Publish on every timer tick
    Timer,
}

/// Per-channel averaging settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Average this channel
    pub enabled: bool,
    /// Multiplier applied to the averaged values
    pub scale: f32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            scale: 1.0,
        }
    }
}

/// Settings for every averaged channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub amplitude: ChannelSettings,
    pub correlation: ChannelSettings,
    pub beam_velocity: ChannelSettings,
    pub instrument_velocity: ChannelSettings,
    pub earth_velocity: ChannelSettings,
    pub bottom_track: ChannelSettings,
}

impl ChannelsConfig {
    pub fn get(&self, kind: ChannelKind) -> &ChannelSettings {
        match kind {
            ChannelKind::Amplitude => &self.amplitude,
            ChannelKind::Correlation => &self.correlation,
            ChannelKind::BeamVelocity => &self.beam_velocity,
            ChannelKind::InstrumentVelocity => &self.instrument_velocity,
            ChannelKind::EarthVelocity => &self.earth_velocity,
            ChannelKind::BottomTrack => &self.bottom_track,
        }
    }

    pub fn get_mut(&mut self, kind: ChannelKind) -> &mut ChannelSettings {
        match kind {
            ChannelKind::Amplitude => &mut self.amplitude,
            ChannelKind::Correlation => &mut self.correlation,
            ChannelKind::BeamVelocity => &mut self.beam_velocity,
            ChannelKind::InstrumentVelocity => &mut self.instrument_velocity,
            ChannelKind::EarthVelocity => &mut self.earth_velocity,
            ChannelKind::BottomTrack => &mut self.bottom_track,
        }
    }

    /// Enabled channels in publish order
    pub fn enabled(&self) -> impl Iterator<Item = (ChannelKind, ChannelSettings)> + '_ {
        ChannelKind::ALL
            .into_iter()
            .map(|kind| (kind, *self.get(kind)))
            .filter(|(_, settings)| settings.enabled)
    }
}

/// Reference-layer averaging of earth velocity
///
/// When enabled its result replaces the plain earth-velocity average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceLayerConfig {
    pub enabled: bool,
    /// First bin of the reference layer (inclusive)
    pub min_bin: usize,
    /// Last bin of the reference layer (inclusive)
    pub max_bin: usize,
    /// Multiplier applied to the averaged velocities
    pub scale: f32,
}

impl Default for ReferenceLayerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_bin: 1,
            max_bin: 3,
            scale: 1.0,
        }
    }
}

/// Averaging engine configuration
///
/// # Example
/// ```
/// use adcp_average::config::{AverageConfig, TriggerMode};
///
/// let config = AverageConfig::from_toml_str("window_size = 4\ntrigger = \"timer\"").unwrap();
/// assert_eq!(config.window_size, 4);
/// assert_eq!(config.trigger, TriggerMode::Timer);
/// assert!(config.channels.amplitude.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AverageConfig {
    /// Ensembles per average
    pub window_size: usize,
    /// Slide the window by one ensemble after each publish instead of restarting it
    pub running_average: bool,
    /// Publish trigger
    pub trigger: TriggerMode,
    /// Timer period in milliseconds (only used with `TriggerMode::Timer`)
    pub timer_interval_ms: u64,
    /// Plain per-channel averaging
    pub channels: ChannelsConfig,
    /// Reference-layer earth-velocity averaging
    pub reference_layer: ReferenceLayerConfig,
}

const DEFAULT_TIMER_INTERVAL_MS: u64 = 1000;

impl Default for AverageConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            running_average: false,
            trigger: TriggerMode::SampleCount,
            timer_interval_ms: DEFAULT_TIMER_INTERVAL_MS,
            channels: ChannelsConfig::default(),
            reference_layer: ReferenceLayerConfig::default(),
        }
    }
}

impl AverageConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AverageError::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Copy with out-of-range values clamped to usable ones
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();

        if config.window_size == 0 {
            log::warn!("window size 0 is invalid, using {}", DEFAULT_WINDOW_SIZE);
            config.window_size = DEFAULT_WINDOW_SIZE;
        }

        let layer = &mut config.reference_layer;
        if layer.max_bin < layer.min_bin {
            log::warn!(
                "reference layer max bin {} is below min bin {}, using {}",
                layer.max_bin,
                layer.min_bin,
                layer.min_bin
            );
            layer.max_bin = layer.min_bin;
        }

        if config.timer_interval_ms == 0 {
            log::warn!("timer interval 0 ms is invalid, using {} ms", DEFAULT_TIMER_INTERVAL_MS);
            config.timer_interval_ms = DEFAULT_TIMER_INTERVAL_MS;
        }

        config
    }

    pub fn timer_interval(&self) -> Duration {
        Duration::from_millis(self.timer_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = AverageConfig::from_toml_str("").unwrap();
        assert_eq!(config, AverageConfig::default());
    }

    #[test]
    fn test_channel_sections() {
        let config = AverageConfig::from_toml_str(
            r#"
            running_average = true

            [channels.correlation]
            enabled = false

            [channels.amplitude]
            scale = 0.5

            [reference_layer]
            enabled = true
            min_bin = 2
            max_bin = 6
            "#,
        )
        .unwrap();

        assert!(config.running_average);
        assert!(!config.channels.correlation.enabled);
        assert!(config.channels.amplitude.enabled);
        assert_eq!(config.channels.get(ChannelKind::Amplitude).scale, 0.5);
        assert!(config.reference_layer.enabled);
        assert_eq!(config.reference_layer.min_bin, 2);
        assert_eq!(config.reference_layer.max_bin, 6);
        assert_eq!(config.reference_layer.scale, 1.0);

        let enabled: Vec<ChannelKind> = config.channels.enabled().map(|(k, _)| k).collect();
        assert!(!enabled.contains(&ChannelKind::Correlation));
        assert_eq!(enabled.len(), 5);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AverageConfig::from_toml_str("window_size = \"many\"").unwrap_err();
        assert!(matches!(err, AverageError::Config(_)));
    }

    #[test]
    fn test_normalized_clamps() {
        let mut config = AverageConfig {
            window_size: 0,
            timer_interval_ms: 0,
            ..AverageConfig::default()
        };
        config.reference_layer.min_bin = 4;
        config.reference_layer.max_bin = 1;

        let config = config.normalized();
        assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
        assert_eq!(config.reference_layer.max_bin, 4);
        assert_eq!(config.timer_interval(), Duration::from_millis(1000));
    }
}
