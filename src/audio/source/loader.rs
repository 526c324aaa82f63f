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
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::decode::decode_file;
use super::error::SourceError;
use super::AudioSource;

/// Loads sources from disk, converting them to the engine's output rate and
/// caching them so tracks loaded from the same file share one decoded buffer.
pub struct SourceLoader {
    /// Loaded sources by file path.
    cache: HashMap<PathBuf, Arc<AudioSource>>,
    /// Sample rate every loaded source is converted to.
    target_sample_rate: u32,
}

impl SourceLoader {
    pub fn new(target_sample_rate: u32) -> Self {
        Self {
            cache: HashMap::new(),
            target_sample_rate,
        }
    }

    /// Loads the source at `path`, returning the cached copy if already loaded.
    pub fn load(&mut self, path: &Path) -> Result<Arc<AudioSource>, SourceError> {
        if let Some(source) = self.cache.get(path) {
            debug!(path = ?path, "Using cached source");
            return Ok(source.clone());
        }

        info!(path = ?path, "Loading source into memory");
        let decoded = decode_file(path)?;

        let samples = if decoded.sample_rate != self.target_sample_rate {
            info!(
                source_rate = decoded.sample_rate,
                target_rate = self.target_sample_rate,
                "Converting source sample rate"
            );
            resample_linear(
                &decoded.samples,
                decoded.channels,
                decoded.sample_rate,
                self.target_sample_rate,
            )
        } else {
            decoded.samples
        };

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let source = Arc::new(AudioSource::from_interleaved(
            &name,
            samples,
            decoded.channels,
            self.target_sample_rate,
        )?);

        info!(
            path = ?path,
            channels = source.channels(),
            sample_rate = source.sample_rate(),
            duration_ms = source.duration().as_millis(),
            memory_kb = source.memory_size() / 1024,
            "Source loaded"
        );

        self.cache.insert(path.to_path_buf(), source.clone());
        Ok(source)
    }

    /// Drops every cached source that no track holds anymore.
    pub fn evict_unused(&mut self) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, source| Arc::strong_count(source) > 1);
        before - self.cache.len()
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Total memory held by cached sources.
    pub fn total_memory_usage(&self) -> usize {
        self.cache.values().map(|s| s.memory_size()).sum()
    }
}

impl std::fmt::Debug for SourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLoader")
            .field("cached_sources", &self.cache.len())
            .field("target_sample_rate", &self.target_sample_rate)
            .field("total_memory_kb", &(self.total_memory_usage() / 1024))
            .finish()
    }
}

/// Converts interleaved samples between rates with linear interpolation.
/// Good enough for loop material.
fn resample_linear(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let channels = channel_count as usize;
    let ratio = target_rate as f64 / source_rate as f64;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let position = target_frame as f64 / ratio;
        let frame = position.floor() as usize;
        let frac = position.fract() as f32;

        for channel in 0..channels {
            let current = samples
                .get(frame * channels + channel)
                .copied()
                .unwrap_or(0.0);
            let next = samples
                .get((frame + 1) * channels + channel)
                .copied()
                .unwrap_or(current);
            output.push(current + (next - current) * frac);
        }
    }

    output
}
