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
use std::{fmt, sync::Arc};

use crate::config;
use crate::graph::mixer::Mixer;

pub mod cpal;
pub mod error;
pub mod format;
pub mod mock;
pub mod source;
mod thread_priority;

pub use error::EngineError;
pub use format::{OutputFormat, SampleFormat};

/// An output device that pulls rendered audio from the mixer. The device owns
/// the real-time render thread; everything else runs on the controlling thread.
pub trait Device: fmt::Display + Send + Sync {
    /// The name of the device.
    fn name(&self) -> &str;

    /// The format the device renders at. Exported mixes inherit this format.
    fn output_format(&self) -> OutputFormat;

    /// Starts pulling audio from the given mixer. Starting a running device is a no-op.
    fn start(&self, mixer: Mixer) -> Result<(), EngineError>;

    /// Stops pulling audio. Nodes connected to the mixer are left untouched.
    fn stop(&self);

    /// Returns true if the device is currently pulling audio.
    fn is_running(&self) -> bool;
}

/// Lists the output devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, EngineError> {
    cpal::Device::list()
}

/// Gets the device named by the engine configuration.
pub fn get_device(config: &config::Engine) -> Result<Arc<dyn Device>, EngineError> {
    let format = config.output_format()?;
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::new(device, format)));
    }

    let Ok(buffer_size) = u32::try_from(config.buffer_size()) else {
        return Err(EngineError::Unsupported("oversized buffer_size".into()));
    };
    Ok(Arc::new(cpal::Device::get(device, format, buffer_size)?))
}
