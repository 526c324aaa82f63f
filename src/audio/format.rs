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

use std::{fmt, str::FromStr};

/// Errors produced when describing an output format.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FormatError {
    #[error("sample rate must be greater than 0")]
    ZeroSampleRate,

    #[error("channel count must be greater than 0")]
    ZeroChannels,

    #[error("unsupported bit depth {bits} for {format} samples")]
    UnsupportedBits { format: SampleFormat, bits: u16 },

    #[error("unsupported sample format: {0}")]
    UnknownSampleFormat(String),
}

/// Sample representation used by an output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Integer samples (16 or 32 bit).
    Int,
    /// Floating point samples (32 bit).
    Float,
}

impl FromStr for SampleFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, FormatError> {
        match s {
            "float" | "Float" => Ok(SampleFormat::Float),
            "int" | "Int" => Ok(SampleFormat::Int),
            _ => Err(FormatError::UnknownSampleFormat(s.to_string())),
        }
    }
}

impl SampleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The format of the live mixer output. Exported mixes inherit the sample rate
/// and channel count; the sample representation only matters to the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Sample format of the device stream.
    pub sample_format: SampleFormat,
    /// Bits per sample of the device stream.
    pub bits_per_sample: u16,
}

impl OutputFormat {
    /// Creates a new output format, rejecting combinations no stream can carry.
    pub fn new(
        sample_rate: u32,
        channels: u16,
        sample_format: SampleFormat,
        bits_per_sample: u16,
    ) -> Result<Self, FormatError> {
        if sample_rate == 0 {
            return Err(FormatError::ZeroSampleRate);
        }
        if channels == 0 {
            return Err(FormatError::ZeroChannels);
        }
        let supported = match sample_format {
            SampleFormat::Float => bits_per_sample == 32,
            SampleFormat::Int => bits_per_sample == 16 || bits_per_sample == 32,
        };
        if !supported {
            return Err(FormatError::UnsupportedBits {
                format: sample_format,
                bits: bits_per_sample,
            });
        }

        Ok(OutputFormat {
            sample_rate,
            channels,
            sample_format,
            bits_per_sample,
        })
    }

    /// A 32-bit float format at the given rate and channel count.
    pub fn float(sample_rate: u32, channels: u16) -> Result<Self, FormatError> {
        Self::new(sample_rate, channels, SampleFormat::Float, 32)
    }

    /// The WAV spec used for mixdown files: rate and channels from the live
    /// output, always stored as 32-bit float so the mix is written unclipped.
    pub fn mixdown_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        }
    }

    /// Number of interleaved samples in the given number of frames.
    pub fn samples_for_frames(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }
}

impl Default for OutputFormat {
    /// 44.1kHz stereo float.
    fn default() -> Self {
        OutputFormat {
            sample_rate: 44100,
            channels: 2,
            sample_format: SampleFormat::Float,
            bits_per_sample: 32,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}{}",
            self.sample_rate, self.channels, self.sample_format, self.bits_per_sample
        )
    }
}
