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
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use super::thread_priority::{
    callback_thread_priority, configure_callback_thread, rt_audio_enabled,
};
use crate::audio::{Device as AudioDevice, EngineError, OutputFormat, SampleFormat};
use crate::graph::mixer::Mixer;

/// A running output stream. cpal streams can't leave the thread that built
/// them, so each one lives on its own thread until told to stop.
struct StreamHandle {
    stop_tx: Sender<()>,
    thread: thread::JoinHandle<()>,
}

/// A small wrapper around a cpal::Device that renders the mixer.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The format the stream is opened with.
    format: OutputFormat,
    /// Frames per callback, or the backend default.
    buffer_size: Option<u32>,
    /// The running stream, if any.
    stream: Mutex<Option<StreamHandle>>,
    /// Set while the stream is playing.
    running: Arc<AtomicBool>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) ({})",
            self.name,
            self.format,
            self.host_id.name()
        )
    }
}

/// The stream config for an output format and an optional fixed callback size.
fn stream_config(format: &OutputFormat, buffer_size: Option<u32>) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: match buffer_size {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        },
    }
}

/// Handles stream errors. The stream is dead after one (e.g. the device was
/// unplugged), so the device stops reporting itself as running and the next
/// start opens a fresh stream.
fn stream_error_callback(
    name: String,
    running: Arc<AtomicBool>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        error!(device = name, err = %err, "cpal output stream error");
        running.store(false, Ordering::Release);
    }
}

/// Builds an output stream of sample type `T` that renders the mixer on every callback.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Mixer,
    on_error: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let priority = callback_thread_priority();
    let rt_audio = rt_audio_enabled();
    let mut priority_set = false;
    let mut scratch: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            configure_callback_thread(priority, rt_audio, &mut priority_set);
            scratch.resize(data.len(), 0.0);
            mixer.render(&mut scratch);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        on_error,
        None,
    )
}

/// Converts a cpal sample format into ours, if we can render it.
fn output_sample_format(format: cpal::SampleFormat) -> Option<(SampleFormat, u16)> {
    match format {
        cpal::SampleFormat::F32 => Some((SampleFormat::Float, 32)),
        cpal::SampleFormat::I16 => Some((SampleFormat::Int, 16)),
        cpal::SampleFormat::I32 => Some((SampleFormat::Int, 32)),
        _ => None,
    }
}

impl Device {
    /// Lists cpal output devices in their default configuration.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, EngineError> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    fn list_cpal_devices() -> Result<Vec<Device>, EngineError> {
        // Backends print a lot while probing; keep it off the terminal.
        let _shh_stdout = shh::stdout().map_err(|e| EngineError::Start(e.to_string()))?;
        let _shh_stderr = shh::stderr().map_err(|e| EngineError::Start(e.to_string()))?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = match cpal::host_from_id(host_id) {
                Ok(host) => host,
                Err(e) => {
                    error!(err = %e, host = host_id.name(), "Unable to open host");
                    continue;
                }
            };
            let host_devices = match host.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(err = %e, host = host_id.name(), "Unable to list devices for host");
                    continue;
                }
            };

            for device in host_devices {
                let Ok(config) = device.default_output_config() else {
                    continue;
                };
                let Some((sample_format, bits)) = output_sample_format(config.sample_format())
                else {
                    continue;
                };
                let rate = config.sample_rate().0;
                let channels = config.channels();
                let Ok(format) = OutputFormat::new(rate, channels, sample_format, bits) else {
                    continue;
                };
                let Ok(name) = device.name() else {
                    continue;
                };

                devices.push(Device {
                    name,
                    host_id,
                    device,
                    format,
                    buffer_size: None,
                    stream: Mutex::new(None),
                    running: Arc::new(AtomicBool::new(false)),
                });
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the named cpal device, or the host default for "default", opened
    /// with the given format and `buffer_size` frames per callback.
    pub fn get(name: &str, format: OutputFormat, buffer_size: u32) -> Result<Device, EngineError> {
        if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| EngineError::DeviceNotFound(name.to_string()))?;
            return Ok(Device {
                name: device.name().unwrap_or_else(|_| name.to_string()),
                host_id: host.id(),
                device,
                format,
                buffer_size: Some(buffer_size),
                stream: Mutex::new(None),
                running: Arc::new(AtomicBool::new(false)),
            });
        }

        match Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim() == name)
        {
            Some(mut device) => {
                device.format = format;
                device.buffer_size = Some(buffer_size);
                Ok(device)
            }
            None => Err(EngineError::DeviceNotFound(name.to_string())),
        }
    }

    /// Opens and plays a stream on a dedicated thread, waiting until it's
    /// either playing or has failed.
    fn spawn_stream(&self, mixer: Mixer) -> Result<StreamHandle, EngineError> {
        let device = self.device.clone();
        let config = stream_config(&self.format, self.buffer_size);
        let sample_format = self.format.sample_format;
        let bits = self.format.bits_per_sample;
        let name = self.name.clone();
        let running = self.running.clone();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<(), EngineError>>(1);

        let thread = thread::spawn(move || {
            let on_error = stream_error_callback(name, running.clone());
            let stream = match (sample_format, bits) {
                (SampleFormat::Float, _) => build_stream::<f32>(&device, &config, mixer, on_error),
                (SampleFormat::Int, 16) => build_stream::<i16>(&device, &config, mixer, on_error),
                (SampleFormat::Int, 32) => build_stream::<i32>(&device, &config, mixer, on_error),
                (_, bits) => {
                    let _ = ready_tx.send(Err(EngineError::Unsupported(format!(
                        "{} bit integer output",
                        bits
                    ))));
                    return;
                }
            };
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(EngineError::Start(e.to_string())));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(EngineError::Start(e.to_string())));
                return;
            }

            running.store(true, Ordering::Release);
            let _ = ready_tx.send(Ok(()));

            // Keep the stream alive until asked to stop.
            let _ = stop_rx.recv();
            running.store(false, Ordering::Release);
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(StreamHandle { stop_tx, thread }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(EngineError::Start("stream thread exited".to_string()))
            }
        }
    }
}

impl AudioDevice for Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_format(&self) -> OutputFormat {
        self.format.clone()
    }

    fn start(&self, mixer: Mixer) -> Result<(), EngineError> {
        let mut stream = self.stream.lock();
        if stream.is_some() && self.is_running() {
            return Ok(());
        }

        let span = span!(Level::INFO, "engine (cpal)");
        let _enter = span.enter();

        // A stream that errored out is still parked on its thread.
        if let Some(handle) = stream.take() {
            info!(device = self.name, "Replacing failed cpal output stream");
            let _ = handle.stop_tx.send(());
            if handle.thread.join().is_err() {
                error!(device = self.name, "cpal stream thread panicked");
            }
        }

        *stream = Some(self.spawn_stream(mixer)?);
        info!(device = self.name, format = %self.format, "cpal output stream started");
        Ok(())
    }

    fn stop(&self) {
        if let Some(handle) = self.stream.lock().take() {
            let _ = handle.stop_tx.send(());
            if handle.thread.join().is_err() {
                error!(device = self.name, "cpal stream thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.stop();
    }
}
