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

//! The engine service: owns the transport, the source loader and export state,
//! and exposes the control surface a UI drives.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, span, Level, Span};

use crate::audio::source::{AudioSource, SourceError, SourceLoader};
use crate::audio::{self, Device, EngineError, OutputFormat};
use crate::config;
use crate::export::{self, ExportError, MixdownFile, Recording};
use crate::graph::GraphManager;
use crate::registry::TrackId;
use crate::transport::TransportController;

pub struct AudioEngineService {
    transport: TransportController,
    loader: SourceLoader,
    /// Where `export_mix` creates files.
    export_dir: PathBuf,
    /// Frames per quantum for offline renders.
    quantum: usize,
    /// The running recording, if any.
    recording: Option<Recording>,
    /// The logging span.
    span: Span,
}

impl AudioEngineService {
    /// Opens the configured device and builds the service around it. The
    /// engine isn't started until the first track plays.
    pub fn new(config: &config::Engine) -> Result<AudioEngineService, EngineError> {
        config.validate()?;
        let device = audio::get_device(config)?;
        Ok(AudioEngineService::with_device(device, config))
    }

    /// Builds the service around an already opened device.
    pub fn with_device(device: Arc<dyn Device>, config: &config::Engine) -> AudioEngineService {
        let span = span!(Level::INFO, "engine service");
        let graph = GraphManager::new(device.clone());
        graph.mixer().set_output_volume(config.output_volume());
        let transport = TransportController::new(graph)
            .with_defaults(config.default_gain(), config.default_speed_rate());

        {
            let _enter = span.enter();
            info!(
                device = %device,
                format = %device.output_format(),
                export_dir = ?config.export_dir(),
                "Engine service ready"
            );
        }

        AudioEngineService {
            transport,
            loader: SourceLoader::new(device.output_format().sample_rate),
            export_dir: config.export_dir(),
            quantum: config.buffer_size(),
            recording: None,
            span,
        }
    }

    /// Registers a track for the source under a fresh id.
    pub fn add_track(&mut self, source: Arc<AudioSource>) -> TrackId {
        loop {
            let id = TrackId::random();
            match self.transport.register(id, source.clone()) {
                Ok(_) => {
                    let _enter = self.span.enter();
                    info!(track = %id, source = source.name(), "Track added");
                    return id;
                }
                Err(e) => {
                    let _enter = self.span.enter();
                    debug!(err = %e, "Track id collision, retrying");
                }
            }
        }
    }

    /// Decodes the file at `path` and registers it as a new track.
    pub fn load_track(&mut self, path: &Path) -> Result<TrackId, SourceError> {
        let source = self.loader.load(path)?;
        Ok(self.add_track(source))
    }

    pub fn play(&mut self, id: TrackId) -> bool {
        self.transport.play(id)
    }

    pub fn play_all(&mut self, ids: &[TrackId]) -> usize {
        self.transport.play_all(ids)
    }

    pub fn pause(&mut self, id: TrackId) -> bool {
        self.transport.pause(id)
    }

    pub fn pause_all(&mut self) {
        self.transport.pause_all()
    }

    /// Removes the track and releases its decoded source if nothing else uses it.
    pub fn remove(&mut self, id: TrackId) -> bool {
        let removed = self.transport.remove(id);
        if removed {
            self.loader.evict_unused();
        }
        removed
    }

    pub fn set_gain(&mut self, id: TrackId, value: f32) -> bool {
        self.transport.set_gain(id, value)
    }

    pub fn set_speed_rate(&mut self, id: TrackId, value: f32) -> bool {
        self.transport.set_speed_rate(id, value)
    }

    pub fn toggle_volume(&mut self, id: TrackId) -> Option<bool> {
        self.transport.toggle_volume(id)
    }

    /// Track ids in registration order.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.transport.registry().ids().to_vec()
    }

    pub fn is_playing(&self, id: TrackId) -> bool {
        self.transport.is_playing(id)
    }

    pub fn output_format(&self) -> OutputFormat {
        self.transport.graph().output_format()
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn transport(&self) -> &TransportController {
        &self.transport
    }

    /// Opens a new mixdown file named by a fresh id in the export directory,
    /// in the current output format. Nothing is written until a recording or
    /// offline render fills it.
    pub async fn export_mix(&self) -> Result<MixdownFile, ExportError> {
        let path = self.export_dir.join(format!("{}.wav", TrackId::random()));
        let format = self.output_format();

        tokio::task::spawn_blocking(move || MixdownFile::create(&path, format))
            .await
            .map_err(|e| ExportError::Join(e.to_string()))?
    }

    /// Starts recording the live output into `file`.
    pub fn start_recording(&mut self, file: MixdownFile) -> Result<(), ExportError> {
        if self.recording.is_some() {
            return Err(ExportError::AlreadyRecording);
        }
        self.recording = Some(Recording::start(self.transport.graph().mixer(), file));
        Ok(())
    }

    /// Stops the running recording and returns the finished file.
    pub fn stop_recording(&mut self) -> Result<PathBuf, ExportError> {
        let recording = self.recording.take().ok_or(ExportError::NotRecording)?;
        recording.stop(self.transport.graph().mixer())
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Renders `duration` of the current graph into `file` without the device
    /// clock. The device is paused for the render and resumed afterwards.
    pub fn render_offline(
        &mut self,
        file: MixdownFile,
        duration: Duration,
    ) -> Result<PathBuf, ExportError> {
        let graph = self.transport.graph_mut();
        let was_running = graph.is_running();
        graph.stop();

        let result = export::render_offline(graph.mixer(), file, duration, self.quantum);

        if was_running {
            graph.start();
        }
        result
    }

    /// Stops any recording and the engine, and tears down every node set.
    pub fn shutdown(&mut self) {
        let mixer = self.transport.graph().mixer();
        let stopped = self.recording.take().map(|recording| recording.stop(mixer));
        self.transport.shutdown();

        let _enter = self.span.enter();
        if let Some(Err(e)) = stopped {
            error!(err = %e, "Error finishing recording during shutdown");
        }
        info!("Engine service shut down");
    }
}

impl Drop for AudioEngineService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
