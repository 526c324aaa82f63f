// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::{OutputFormat, SampleFormat};

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_BUFFER_SIZE: usize = 512;
const DEFAULT_EXPORT_DURATION: Duration = Duration::from_secs(30);

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Engine {
    /// The output device. Names starting with "mock" select the mock device.
    device: String,

    /// Output sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Output channel count (default: 2)
    channels: Option<u16>,

    /// Stream sample format (default: "float")
    sample_format: Option<String>,

    /// Stream bits per sample (default: 32)
    bits_per_sample: Option<u16>,

    /// Frames per render quantum (default: 512)
    buffer_size: Option<usize>,

    /// Directory exported mixes are written to (default: the system temp dir)
    export_dir: Option<PathBuf>,

    /// Gain given to new tracks (default: 1.0)
    default_gain: Option<f32>,

    /// Speed rate given to new tracks (default: 1.0)
    default_speed_rate: Option<f32>,

    /// Main mixer output volume (default: 1.0)
    output_volume: Option<f32>,

    /// How much audio an export captures, e.g. "30s".
    export_duration: Option<String>,
}

impl Engine {
    /// New will create a new engine configuration for the given device.
    pub fn new(device: &str) -> Engine {
        Engine {
            device: device.to_string(),
            sample_rate: None,
            channels: None,
            sample_format: None,
            bits_per_sample: None,
            buffer_size: None,
            export_dir: None,
            default_gain: None,
            default_speed_rate: None,
            output_volume: None,
            export_duration: None,
        }
    }

    /// Parse an engine configuration from a YAML file and validate it.
    pub fn deserialize(path: &Path) -> Result<Engine, ConfigError> {
        let engine = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Engine>()?;
        engine.validate()?;
        Ok(engine)
    }

    /// Rejects values the engine can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size() == 0 {
            return Err(ConfigError::Invalid(
                "buffer_size must be greater than 0".into(),
            ));
        }
        let gain = self.default_gain();
        if !(0.0..=1.0).contains(&gain) {
            return Err(ConfigError::Invalid(format!(
                "default_gain must be between 0 and 1, got {}",
                gain
            )));
        }
        self.output_format()?;
        self.export_duration()?;
        Ok(())
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Engine {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Engine {
        self.channels = Some(channels);
        self
    }

    pub fn with_export_dir(mut self, export_dir: &Path) -> Engine {
        self.export_dir = Some(export_dir.to_path_buf());
        self
    }

    pub fn with_defaults(mut self, gain: f32, speed_rate: f32) -> Engine {
        self.default_gain = Some(gain);
        self.default_speed_rate = Some(speed_rate);
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the output sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 2)
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    /// Returns the stream sample format (default: Float)
    pub fn sample_format(&self) -> Result<SampleFormat, ConfigError> {
        match self.sample_format.as_deref() {
            Some(format) => Ok(SampleFormat::from_str(format)?),
            None => Ok(SampleFormat::Float),
        }
    }

    /// Returns the stream bits per sample (default: 32)
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample.unwrap_or(32)
    }

    /// Returns the output format described by this configuration.
    pub fn output_format(&self) -> Result<OutputFormat, ConfigError> {
        Ok(OutputFormat::new(
            self.sample_rate(),
            self.channels(),
            self.sample_format()?,
            self.bits_per_sample(),
        )?)
    }

    /// Returns the number of frames per render quantum (default: 512)
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    /// Returns the export directory (default: the system temp dir)
    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(env::temp_dir)
    }

    pub fn default_gain(&self) -> f32 {
        self.default_gain.unwrap_or(1.0)
    }

    pub fn default_speed_rate(&self) -> f32 {
        self.default_speed_rate.unwrap_or(1.0)
    }

    pub fn output_volume(&self) -> f32 {
        self.output_volume.unwrap_or(1.0)
    }

    /// Returns how much audio an export captures (default: 30s)
    pub fn export_duration(&self) -> Result<Duration, ConfigError> {
        match &self.export_duration {
            Some(duration) => Ok(DurationString::from_string(duration.clone())
                .map_err(|e| ConfigError::Invalid(format!("export_duration: {}", e)))?
                .into()),
            None => Ok(DEFAULT_EXPORT_DURATION),
        }
    }
}
