// THEORY:
// Everything tunable about the pipeline lives in one settings file. The file is
// optional: each section has defaults, and any value can be overridden from the
// environment (`FLICKER_TRACKING__DISTANCE_GATE=12`, for example). The raw
// settings are plain serde structs; converting them into a `PipelineConfig` is
// where ranges are checked, so a bad file fails at startup rather than mid-show.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::core_modules::blob_extractor::AreaBand;
use crate::core_modules::control_emitter::ControlChannel;
use crate::core_modules::modulator::ModulatorConfig;
use crate::core_modules::tracker::TrackerConfig;
use crate::error::{Error, Result};
use crate::pipeline::PipelineConfig;

const ENV_PREFIX: &str = "FLICKER";

/// The settings file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// MIDI output to open. Names starting with `mock` never touch hardware.
    pub midi_device: String,
    pub area: AreaSettings,
    pub tracking: TrackingSettings,
    pub modulator: ModulatorSettings,
    pub channels: Vec<ChannelSettings>,
    pub parallel_extraction: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AreaSettings {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackingSettings {
    pub distance_gate: f64,
    pub speed_threshold: f64,
    pub maturity_ms: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModulatorSettings {
    pub attack_a: f64,
    pub decay_a: f64,
    pub attack_b: f64,
    pub decay_b: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChannelSettings {
    pub channel: u8,
    pub controller: u8,
    #[serde(default = "default_channel_value")]
    pub default_value: f64,
}

fn default_channel_value() -> f64 {
    0.5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            midi_device: "mock".to_string(),
            area: AreaSettings::default(),
            tracking: TrackingSettings::default(),
            modulator: ModulatorSettings::default(),
            channels: vec![
                ChannelSettings {
                    channel: 7,
                    controller: 0,
                    default_value: default_channel_value(),
                },
                ChannelSettings {
                    channel: 10,
                    controller: 1,
                    default_value: default_channel_value(),
                },
                ChannelSettings {
                    channel: 14,
                    controller: 42,
                    default_value: default_channel_value(),
                },
            ],
            parallel_extraction: false,
        }
    }
}

impl Default for AreaSettings {
    fn default() -> Self {
        let band = AreaBand::default();
        Self {
            min: band.min(),
            max: band.max(),
        }
    }
}

impl Default for TrackingSettings {
    fn default() -> Self {
        let tracker = TrackerConfig::default();
        Self {
            distance_gate: 10.0,
            speed_threshold: tracker.speed_threshold,
            maturity_ms: tracker.maturity.as_millis() as u64,
        }
    }
}

impl Default for ModulatorSettings {
    fn default() -> Self {
        let modulator = ModulatorConfig::default();
        Self {
            attack_a: modulator.attack_a,
            decay_a: modulator.decay_a,
            attack_b: modulator.attack_b,
            decay_b: modulator.decay_b,
        }
    }
}

impl Settings {
    /// Loads settings from an optional file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        Self::finish(builder)
    }

    /// Parses settings from YAML text, then applies environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Settings> {
        let builder = ::config::Config::builder()
            .add_source(::config::File::from_str(yaml, ::config::FileFormat::Yaml));
        Self::finish(builder)
    }

    fn finish(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Settings> {
        Ok(builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?)
    }

    /// Validates the settings and turns them into a pipeline configuration.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let tracking = &self.tracking;
        if !tracking.distance_gate.is_finite() || tracking.distance_gate < 0.0 {
            return Err(Error::range("distance_gate", tracking.distance_gate));
        }

        let tracker = TrackerConfig {
            speed_threshold: tracking.speed_threshold,
            maturity: Duration::from_millis(tracking.maturity_ms),
        };
        tracker.validate()?;

        let modulator = ModulatorConfig {
            attack_a: self.modulator.attack_a,
            decay_a: self.modulator.decay_a,
            attack_b: self.modulator.attack_b,
            decay_b: self.modulator.decay_b,
        };
        modulator.validate()?;

        let channels = self
            .channels
            .iter()
            .map(|c| ControlChannel::new(c.channel, c.controller, c.default_value))
            .collect::<Result<Vec<_>>>()?;

        Ok(PipelineConfig {
            area: AreaBand::new(self.area.min, self.area.max)?,
            distance_gate: tracking.distance_gate,
            tracker,
            modulator,
            channels,
            parallel_extraction: self.parallel_extraction,
        })
    }
}
