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

//! Decoded, fixed-length audio sources.
//!
//! A source is loaded once, fully decoded into memory, and then shared
//! read-only between the track that owns it and the player node that
//! schedules it.

mod decode;
mod error;
mod loader;

use std::time::Duration;

pub use error::SourceError;
pub use loader::SourceLoader;

/// A fully decoded audio buffer in interleaved f32 format.
#[derive(Debug)]
pub struct AudioSource {
    name: String,
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl AudioSource {
    /// Creates a source from interleaved samples. A trailing partial frame is dropped.
    pub fn from_interleaved(
        name: &str,
        mut samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
    ) -> Result<AudioSource, SourceError> {
        if channels == 0 {
            return Err(SourceError::InvalidLayout(format!(
                "{}: source has no channels",
                name
            )));
        }
        if sample_rate == 0 {
            return Err(SourceError::InvalidLayout(format!(
                "{}: source has no sample rate",
                name
            )));
        }

        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);

        Ok(AudioSource {
            name: name.to_string(),
            samples,
            channels,
            sample_rate,
        })
    }

    /// The name the source was loaded under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Raw interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the sample of `frame` as heard on `out_channel` of an output with
    /// `out_channels` channels. Mono sources feed every output channel; wider
    /// sources fold their extra channels onto the output modulo its width.
    #[inline]
    pub fn sample_for_output(&self, frame: usize, out_channel: usize, out_channels: usize) -> f32 {
        let channels = self.channels as usize;
        let base = frame * channels;
        if channels == 1 {
            return self.samples[base];
        }

        (out_channel..channels)
            .step_by(out_channels.max(1))
            .map(|channel| self.samples[base + channel])
            .sum()
    }

    /// Approximate memory held by the decoded samples.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}
