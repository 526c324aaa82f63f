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
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{info, span, Level};

use crate::audio::{EngineError, OutputFormat};
use crate::graph::mixer::Mixer;

/// A mock device. Never touches hardware; audio is only rendered when
/// something calls `pull`.
#[derive(Clone)]
pub struct Device {
    name: String,
    format: OutputFormat,
    running: Arc<AtomicBool>,
    fail_next_start: Arc<AtomicBool>,
    starts: Arc<AtomicU64>,
    mixer: Arc<Mutex<Option<Mixer>>>,
}

impl Device {
    /// Creates a mock device with the given name and output format.
    pub fn new(name: &str, format: OutputFormat) -> Device {
        Device {
            name: name.to_string(),
            format,
            running: Arc::new(AtomicBool::new(false)),
            fail_next_start: Arc::new(AtomicBool::new(false)),
            starts: Arc::new(AtomicU64::new(0)),
            mixer: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes the next start attempt fail.
    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::Relaxed);
    }

    /// Number of times the device went from stopped to running.
    pub fn start_count(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }

    /// Renders `frames` frames the way a hardware callback would. Returns
    /// silence while the device is stopped.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mixer = self.mixer.lock();
        match mixer.as_ref() {
            Some(mixer) if self.running.load(Ordering::Acquire) => mixer.render_frames(frames),
            _ => vec![0.0; self.format.samples_for_frames(frames)],
        }
    }
}

impl crate::audio::Device for Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_format(&self) -> OutputFormat {
        self.format.clone()
    }

    fn start(&self, mixer: Mixer) -> Result<(), EngineError> {
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.fail_next_start.swap(false, Ordering::Relaxed) {
            return Err(EngineError::Start(format!(
                "mock device {} refused to start",
                self.name
            )));
        }

        let span = span!(Level::INFO, "engine (mock)");
        let _enter = span.enter();

        *self.mixer.lock() = Some(mixer);
        self.running.store(true, Ordering::Release);
        self.starts.fetch_add(1, Ordering::Relaxed);
        info!(device = self.name, format = %self.format, "Mock engine running");
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        *self.mixer.lock() = None;
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
