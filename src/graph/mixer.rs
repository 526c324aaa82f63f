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

//! Bus mixer shared between the graph manager and the render thread.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use super::node::{PlayerNode, TimePitchNode};
use super::Bus;
use crate::audio::OutputFormat;
use crate::registry::TrackId;

/// The processed output of one track, connected to a mixer bus.
#[derive(Clone)]
pub struct MixerInput {
    /// The track this input plays.
    pub track: TrackId,
    /// The player feeding the time-pitch unit.
    pub player: Arc<PlayerNode>,
    /// The time-pitch unit feeding the bus.
    pub pitch: Arc<TimePitchNode>,
}

/// Mixes every connected bus into the main output. Cloning is cheap and every
/// clone renders the same graph; output devices hold a clone.
#[derive(Clone)]
pub struct Mixer {
    /// Connected inputs by bus.
    inputs: Arc<RwLock<BTreeMap<Bus, MixerInput>>>,
    /// Output format of the mix.
    format: OutputFormat,
    /// Main output volume.
    output_volume: Arc<AtomicU32>,
    /// Receives a copy of every live quantum while a recording runs.
    tap: Arc<Mutex<Option<Sender<Vec<f32>>>>>,
    /// Quanta the tap refused because the recorder fell behind.
    dropped_blocks: Arc<AtomicU64>,
    /// Frames rendered since creation.
    frames_rendered: Arc<AtomicU64>,
}

impl Mixer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            inputs: Arc::new(RwLock::new(BTreeMap::new())),
            format,
            output_volume: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            tap: Arc::new(Mutex::new(None)),
            dropped_blocks: Arc::new(AtomicU64::new(0)),
            frames_rendered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Connects an input to the given bus, returning whatever was connected there.
    pub(crate) fn connect(&self, bus: Bus, input: MixerInput) -> Option<MixerInput> {
        self.inputs.write().insert(bus, input)
    }

    /// Disconnects the given bus. Once this returns the render thread will not
    /// pull from the disconnected nodes again.
    pub(crate) fn disconnect(&self, bus: Bus) -> Option<MixerInput> {
        self.inputs.write().remove(&bus)
    }

    pub fn is_connected(&self, bus: Bus) -> bool {
        self.inputs.read().contains_key(&bus)
    }

    /// Connected buses in ascending order.
    pub fn connected_buses(&self) -> Vec<Bus> {
        self.inputs.read().keys().copied().collect()
    }

    /// The track connected to the given bus.
    pub fn track_on(&self, bus: Bus) -> Option<TrackId> {
        self.inputs.read().get(&bus).map(|input| input.track)
    }

    pub fn format(&self) -> &OutputFormat {
        &self.format
    }

    pub fn output_volume(&self) -> f32 {
        f32::from_bits(self.output_volume.load(Ordering::Relaxed))
    }

    pub fn set_output_volume(&self, volume: f32) {
        self.output_volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Installs a recording tap. The render thread never blocks on it: when
    /// the channel is full the quantum is dropped and counted.
    pub(crate) fn install_tap(&self, sender: Sender<Vec<f32>>) {
        *self.tap.lock() = Some(sender);
    }

    /// Removes the tap, dropping its sender so the receiving side drains and ends.
    pub(crate) fn remove_tap(&self) -> bool {
        self.tap.lock().take().is_some()
    }

    /// Quanta the recording tap has dropped since creation.
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks.load(Ordering::Relaxed)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Renders one live quantum of interleaved audio into `output` and hands a
    /// copy to the recording tap, if one is installed.
    pub fn render(&self, output: &mut [f32]) {
        self.mix(output);

        if let Some(tap) = self.tap.lock().as_ref() {
            match tap.try_send(output.to_vec()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped_blocks.fetch_add(1, Ordering::Relaxed);
                }
                // The recorder going away just ends the recording.
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }

    /// Renders one quantum without feeding the recording tap. Offline renders
    /// use this so they never end up in a live recording.
    pub fn render_untapped(&self, output: &mut [f32]) {
        self.mix(output);
    }

    /// Renders `frames` live frames into a new buffer.
    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; self.format.samples_for_frames(frames)];
        self.render(&mut output);
        output
    }

    /// The input map is read-locked for the whole quantum, so structural
    /// changes land between quanta.
    fn mix(&self, output: &mut [f32]) {
        output.fill(0.0);
        let channels = self.format.channels as usize;

        {
            let inputs = self.inputs.read();
            for input in inputs.values() {
                let rate = input.pitch.rate();
                input.player.render_add(rate, output, channels);
            }
        }

        let volume = self.output_volume();
        if volume != 1.0 {
            output.iter_mut().for_each(|sample| *sample *= volume);
        }

        let frames = (output.len() / channels) as u64;
        self.frames_rendered.fetch_add(frames, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::AudioSource;
    use crate::graph::node::NodeId;

    fn input(track: TrackId, samples: Vec<f32>, channels: u16) -> MixerInput {
        let source = AudioSource::from_interleaved("t", samples, channels, 44100);
        let player = Arc::new(PlayerNode::new(NodeId(1)));
        player.schedule_buffer(Arc::new(source.unwrap()), true);
        player.play();
        MixerInput {
            track,
            player,
            pitch: Arc::new(TimePitchNode::new(NodeId(2))),
        }
    }

    #[test]
    fn test_mixes_connected_buses() {
        let mixer = Mixer::new(OutputFormat::float(44100, 2).unwrap());
        mixer.connect(0, input(TrackId::random(), vec![0.5, 0.3], 2));
        mixer.connect(1, input(TrackId::random(), vec![0.25, 0.125], 2));

        let frame = mixer.render_frames(1);
        assert_eq!(frame, vec![0.75, 0.425]);
        assert_eq!(mixer.frames_rendered(), 1);
    }

    #[test]
    fn test_disconnect_silences_bus() {
        let mixer = Mixer::new(OutputFormat::float(44100, 1).unwrap());
        mixer.connect(3, input(TrackId::random(), vec![1.0], 1));
        assert!(mixer.is_connected(3));
        assert_eq!(mixer.connected_buses(), vec![3]);

        assert!(mixer.disconnect(3).is_some());
        assert!(!mixer.is_connected(3));
        assert_eq!(mixer.render_frames(2), vec![0.0, 0.0]);
        assert!(mixer.disconnect(3).is_none());
    }

    #[test]
    fn test_output_volume() {
        let mixer = Mixer::new(OutputFormat::float(44100, 1).unwrap());
        mixer.connect(0, input(TrackId::random(), vec![0.5], 1));
        mixer.set_output_volume(0.5);
        assert_eq!(mixer.render_frames(1), vec![0.25]);
    }

    #[test]
    fn test_tap_receives_rendered_audio() {
        let mixer = Mixer::new(OutputFormat::float(44100, 1).unwrap());
        mixer.connect(0, input(TrackId::random(), vec![0.5], 1));
        let (tx, rx) = crossbeam_channel::bounded(4);
        mixer.install_tap(tx);

        mixer.render_frames(2);
        assert_eq!(rx.try_recv().unwrap(), vec![0.5, 0.5]);

        assert!(mixer.remove_tap());
        mixer.render_frames(2);
        assert!(rx.try_recv().is_err());
        assert!(!mixer.remove_tap());
    }

    #[test]
    fn test_untapped_render_skips_tap() {
        let mixer = Mixer::new(OutputFormat::float(44100, 1).unwrap());
        mixer.connect(0, input(TrackId::random(), vec![0.5], 1));
        let (tx, rx) = crossbeam_channel::bounded(4);
        mixer.install_tap(tx);

        let mut output = vec![0.0; 3];
        mixer.render_untapped(&mut output);
        assert_eq!(output, vec![0.5; 3]);
        assert!(rx.try_recv().is_err());
        assert_eq!(mixer.frames_rendered(), 3);
    }

    #[test]
    fn test_full_tap_drops_blocks() {
        let mixer = Mixer::new(OutputFormat::float(44100, 1).unwrap());
        mixer.connect(0, input(TrackId::random(), vec![0.5], 1));
        let (tx, rx) = crossbeam_channel::bounded(1);
        mixer.install_tap(tx);

        for _ in 0..3 {
            assert_eq!(mixer.render_frames(1), vec![0.5]);
        }
        assert_eq!(mixer.dropped_blocks(), 2);
        assert_eq!(rx.len(), 1);
    }
}
