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

//! Mixdown export.
//!
//! A mixdown file is opened in the live output format and filled either by a
//! recording tap on the running engine or by rendering the graph offline.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use hound::WavWriter;
use tracing::{debug, info, span, warn, Level};

use crate::audio::OutputFormat;
use crate::graph::mixer::Mixer;

/// Rendered quanta a recording may queue before the render thread starts
/// dropping them.
const RECORDING_QUEUE_BLOCKS: usize = 1024;

/// Errors surfaced by export operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("unable to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("a recording is already running")]
    AlreadyRecording,

    #[error("no recording is running")]
    NotRecording,

    #[error("export task failed: {0}")]
    Join(String),
}

/// A writable WAV file in the mixer's output format.
pub struct MixdownFile {
    path: PathBuf,
    format: OutputFormat,
    writer: WavWriter<BufWriter<File>>,
    frames_written: u64,
}

impl MixdownFile {
    /// Creates the file at `path`. Fails if the destination can't be created.
    pub fn create(path: &Path, format: OutputFormat) -> Result<MixdownFile, ExportError> {
        let file = File::create(path).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let writer = WavWriter::new(BufWriter::new(file), format.mixdown_spec())?;
        debug!(path = ?path, format = %format, "Mixdown file created");

        Ok(MixdownFile {
            path: path.to_path_buf(),
            format,
            writer,
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> &OutputFormat {
        &self.format
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Appends interleaved samples. The slice should hold whole frames.
    pub fn write_frames(&mut self, samples: &[f32]) -> Result<(), ExportError> {
        for &sample in samples {
            self.writer.write_sample(sample)?;
        }
        self.frames_written += (samples.len() / self.format.channels as usize) as u64;
        Ok(())
    }

    /// Writes the header and closes the file. A file with no frames is a valid
    /// silent WAV.
    pub fn finalize(self) -> Result<PathBuf, ExportError> {
        self.writer.finalize()?;
        info!(
            path = ?self.path,
            frames = self.frames_written,
            "Mixdown written"
        );
        Ok(self.path)
    }
}

/// A live recording of the engine output into a mixdown file.
pub struct Recording {
    path: PathBuf,
    /// The mixer's dropped block count when the recording started.
    dropped_at_start: u64,
    writer: thread::JoinHandle<Result<PathBuf, ExportError>>,
}

impl Recording {
    /// Installs a tap on the mixer and writes every rendered quantum to `file`
    /// from a dedicated thread, off the render path.
    pub fn start(mixer: &Mixer, mut file: MixdownFile) -> Recording {
        let (tx, rx) = bounded::<Vec<f32>>(RECORDING_QUEUE_BLOCKS);
        let path = file.path().to_path_buf();

        let writer = thread::spawn(move || {
            let span = span!(Level::INFO, "recording");
            let _enter = span.enter();

            // Ends once the tap is removed and the queue is drained.
            for block in rx.iter() {
                file.write_frames(&block)?;
            }
            file.finalize()
        });

        let dropped_at_start = mixer.dropped_blocks();
        mixer.install_tap(tx);
        info!(path = ?path, "Recording started");
        Recording {
            path,
            dropped_at_start,
            writer,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the tap and waits for the writer to finish the file.
    pub fn stop(self, mixer: &Mixer) -> Result<PathBuf, ExportError> {
        mixer.remove_tap();
        let dropped = mixer.dropped_blocks() - self.dropped_at_start;
        if dropped > 0 {
            warn!(path = ?self.path, dropped, "Recording dropped quanta");
        }
        self.writer
            .join()
            .map_err(|_| ExportError::Join("recording writer panicked".to_string()))?
    }
}

/// Renders `duration` of the mixer output into `file` without a device clock,
/// `quantum` frames at a time, and finalizes it.
pub fn render_offline(
    mixer: &Mixer,
    mut file: MixdownFile,
    duration: Duration,
    quantum: usize,
) -> Result<PathBuf, ExportError> {
    let format = mixer.format();
    let total = (duration.as_secs_f64() * format.sample_rate as f64).round() as usize;
    let quantum = quantum.max(1);
    let mut buffer = vec![0.0; format.samples_for_frames(quantum)];

    let mut remaining = total;
    while remaining > 0 {
        let frames = remaining.min(quantum);
        let block = &mut buffer[..format.samples_for_frames(frames)];
        mixer.render_untapped(block);
        file.write_frames(block)?;
        remaining -= frames;
    }

    file.finalize()
}
