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

//! Transport control: per-track and aggregate play/pause, gain, speed and
//! removal, routed to the right graph nodes.
//!
//! Per-track states are Stopped -> Playing -> Paused -> Playing, and any state
//! -> removed. Every play restarts the loop from frame 0.

use std::sync::Arc;

use tracing::{debug, info, span, warn, Level, Span};

use crate::audio::source::AudioSource;
use crate::graph::GraphManager;
use crate::registry::{RegistryError, Track, TrackId, TrackRegistry};

/// Gains outside this range are ignored.
const GAIN_RANGE: std::ops::RangeInclusive<f32> = 0.0..=1.0;

pub struct TransportController {
    registry: TrackRegistry,
    graph: GraphManager,
    /// Gain given to newly registered tracks.
    default_gain: f32,
    /// Speed rate given to newly registered tracks.
    default_speed_rate: f32,
    /// The logging span.
    span: Span,
}

impl TransportController {
    pub fn new(graph: GraphManager) -> TransportController {
        TransportController {
            registry: TrackRegistry::new(),
            graph,
            default_gain: 1.0,
            default_speed_rate: 1.0,
            span: span!(Level::INFO, "transport"),
        }
    }

    /// Sets the gain and speed rate new tracks start with.
    pub fn with_defaults(mut self, gain: f32, speed_rate: f32) -> TransportController {
        self.default_gain = gain;
        self.default_speed_rate = speed_rate;
        self
    }

    /// Registers a track. Nodes are created on its first play.
    pub fn register(
        &mut self,
        id: TrackId,
        source: Arc<AudioSource>,
    ) -> Result<&Track, RegistryError> {
        let track = self.registry.register(id, source)?;
        track.set_gain(self.default_gain);
        track.set_speed_rate(self.default_speed_rate);
        Ok(&*track)
    }

    /// Plays the track's loop from the start. Does nothing if the track is
    /// unknown, already playing, or the engine can't be started.
    pub fn play(&mut self, id: TrackId) -> bool {
        let _enter = self.span.enter();
        let Some(track) = self.registry.get(id) else {
            debug!(track = %id, "Ignoring play for unknown track");
            return false;
        };
        let source = track.source().clone();
        let gain = track.effective_gain();
        let speed_rate = track.speed_rate();

        let node_set = self.graph.ensure_node_set(id);
        if !self.graph.is_running() && !self.graph.start() {
            warn!(track = %id, "Engine not running, track will not play");
            return false;
        }
        if node_set.player.is_playing() {
            debug!(track = %id, "Track already playing");
            return false;
        }

        node_set.player.set_volume(gain);
        node_set.pitch.set_rate(speed_rate);
        node_set.player.schedule_buffer(source, true);
        node_set.player.play();
        if let Some(track) = self.registry.get_mut(id) {
            track.set_playing(true);
        }

        info!(track = %id, bus = node_set.bus, gain, speed_rate, "Track playing");
        true
    }

    /// Plays each track in order. A track that fails to play doesn't stop the
    /// rest. Returns how many started.
    pub fn play_all(&mut self, ids: &[TrackId]) -> usize {
        ids.iter().filter(|id| self.play(**id)).count()
    }

    /// Pauses the track's player, keeping its nodes. Idempotent.
    pub fn pause(&mut self, id: TrackId) -> bool {
        let _enter = self.span.enter();
        let Some(node_set) = self.graph.node_set(id) else {
            debug!(track = %id, "Ignoring pause for track without nodes");
            return false;
        };
        node_set.player.pause();
        if let Some(track) = self.registry.get_mut(id) {
            track.set_playing(false);
        }
        debug!(track = %id, "Track paused");
        true
    }

    /// Pauses every track with nodes.
    pub fn pause_all(&mut self) {
        let ids: Vec<TrackId> = self.graph.node_sets().map(|(id, _)| *id).collect();
        for id in ids {
            self.pause(id);
        }
    }

    /// Sets the track's gain. Ignored unless the engine is running, the track
    /// has nodes, and the value lies in [0, 1].
    pub fn set_gain(&mut self, id: TrackId, value: f32) -> bool {
        let _enter = self.span.enter();
        if !GAIN_RANGE.contains(&value) {
            debug!(track = %id, value, "Ignoring out of range gain");
            return false;
        }
        if !self.graph.is_running() {
            debug!(track = %id, "Ignoring gain while engine stopped");
            return false;
        }
        let (Some(node_set), Some(track)) = (self.graph.node_set(id), self.registry.get_mut(id))
        else {
            debug!(track = %id, "Ignoring gain for track without nodes");
            return false;
        };

        track.set_gain(value);
        node_set.player.set_volume(track.effective_gain());
        debug!(track = %id, value, "Gain set");
        true
    }

    /// Sets the track's speed rate on its time-pitch node. Ignored unless the
    /// engine is running and the track has nodes. The value is not clamped.
    pub fn set_speed_rate(&mut self, id: TrackId, value: f32) -> bool {
        let _enter = self.span.enter();
        if !self.graph.is_running() {
            debug!(track = %id, "Ignoring speed rate while engine stopped");
            return false;
        }
        let (Some(node_set), Some(track)) = (self.graph.node_set(id), self.registry.get_mut(id))
        else {
            debug!(track = %id, "Ignoring speed rate for track without nodes");
            return false;
        };

        track.set_speed_rate(value);
        node_set.pitch.set_rate(value);
        debug!(track = %id, value, "Speed rate set");
        true
    }

    /// Mutes or unmutes the track, returning the new state. Muting zeroes the
    /// player volume; unmuting restores the track gain.
    pub fn toggle_volume(&mut self, id: TrackId) -> Option<bool> {
        let _enter = self.span.enter();
        let track = self.registry.get_mut(id)?;
        let enabled = !track.volume_enabled();
        track.set_volume_enabled(enabled);

        let gain = track.effective_gain();
        if self.graph.is_running() {
            if let Some(node_set) = self.graph.node_set(id) {
                node_set.player.set_volume(gain);
            }
        }
        debug!(track = %id, enabled, "Volume toggled");
        Some(enabled)
    }

    /// Tears the track's nodes down and forgets the track.
    pub fn remove(&mut self, id: TrackId) -> bool {
        let _enter = self.span.enter();
        self.graph.teardown(id);
        match self.registry.remove(id) {
            Some(_) => {
                info!(track = %id, "Track removed");
                true
            }
            None => {
                debug!(track = %id, "Ignoring removal of unknown track");
                false
            }
        }
    }

    /// Returns true if the track's player is producing audio.
    pub fn is_playing(&self, id: TrackId) -> bool {
        self.graph
            .node_set(id)
            .is_some_and(|node_set| node_set.player.is_playing())
    }

    /// Stops the engine and tears down every track's nodes. Tracks stay registered.
    pub fn shutdown(&mut self) {
        let ids: Vec<TrackId> = self.graph.node_sets().map(|(id, _)| *id).collect();
        for id in ids {
            self.graph.teardown(id);
            if let Some(track) = self.registry.get_mut(id) {
                track.set_playing(false);
            }
        }
        self.graph.stop();
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &GraphManager {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut GraphManager {
        &mut self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{mock, OutputFormat};

    fn transport() -> (TransportController, Arc<mock::Device>) {
        let format = OutputFormat::float(8000, 1).unwrap();
        let device = Arc::new(mock::Device::new("mock", format));
        let graph = GraphManager::new(device.clone());
        (TransportController::new(graph), device)
    }

    fn source(value: f32) -> Arc<AudioSource> {
        Arc::new(AudioSource::from_interleaved("loop", vec![value; 8], 1, 8000).unwrap())
    }

    fn track(transport: &mut TransportController, value: f32) -> TrackId {
        let id = TrackId::random();
        transport.register(id, source(value)).unwrap();
        id
    }

    #[test]
    fn test_play_starts_engine_and_player() {
        let (mut transport, device) = transport();
        let id = track(&mut transport, 0.5);

        assert!(transport.play(id));
        assert!(transport.graph().is_running());
        assert!(transport.is_playing(id));
        assert!(transport.registry().get(id).unwrap().is_playing());
        assert_eq!(device.pull(4), vec![0.5; 4]);
    }

    #[test]
    fn test_play_unknown_track() {
        let (mut transport, device) = transport();
        assert!(!transport.play(TrackId::random()));
        assert_eq!(device.start_count(), 0);
        assert!(transport.graph().node_sets().next().is_none());
    }

    #[test]
    fn test_double_play_schedules_once() {
        let (mut transport, _) = transport();
        let id = track(&mut transport, 0.5);

        assert!(transport.play(id));
        assert!(!transport.play(id));
        let node_set = transport.graph().node_set(id).unwrap();
        assert_eq!(node_set.player.schedule_count(), 1);
    }

    #[test]
    fn test_play_with_failed_engine_start() {
        let (mut transport, device) = transport();
        let id = track(&mut transport, 0.5);

        device.fail_next_start();
        assert!(!transport.play(id));
        assert!(!transport.is_playing(id));
        // The node set is kept and the next play retries the engine.
        assert!(transport.graph().node_set(id).is_some());
        assert!(transport.play(id));
        assert!(transport.is_playing(id));
    }

    #[test]
    fn test_pause_and_resume_restarts_from_start() {
        let (mut transport, device) = transport();
        let id = track(&mut transport, 0.5);

        transport.play(id);
        device.pull(3);
        assert!(transport.pause(id));
        assert!(transport.pause(id));
        assert!(!transport.is_playing(id));
        assert_eq!(device.pull(2), vec![0.0; 2]);

        let node_set = transport.graph().node_set(id).unwrap().clone();
        assert_eq!(node_set.player.cursor(), Some(3.0));

        assert!(transport.play(id));
        assert_eq!(node_set.player.cursor(), Some(0.0));
        assert_eq!(device.pull(2), vec![0.5; 2]);
    }

    #[test]
    fn test_pause_all() {
        let (mut transport, device) = transport();
        let a = track(&mut transport, 0.25);
        let b = track(&mut transport, 0.25);
        assert_eq!(transport.play_all(&[a, b]), 2);
        assert_eq!(device.pull(1), vec![0.5]);

        transport.pause_all();
        assert!(!transport.is_playing(a));
        assert!(!transport.is_playing(b));
        assert_eq!(device.pull(1), vec![0.0]);
    }

    #[test]
    fn test_play_all_continues_past_failures() {
        let (mut transport, _) = transport();
        let a = track(&mut transport, 0.25);
        let b = track(&mut transport, 0.25);
        let unknown = TrackId::random();

        assert_eq!(transport.play_all(&[unknown, a, a, b]), 2);
        assert!(transport.is_playing(a));
        assert!(transport.is_playing(b));
    }

    #[test]
    fn test_speed_rate_ignored_while_engine_stopped() {
        let (mut transport, _) = transport();
        let id = track(&mut transport, 0.5);

        assert!(!transport.set_speed_rate(id, 2.0));
        transport.play(id);
        assert!(transport.set_speed_rate(id, 2.0));
        assert_eq!(transport.graph().node_set(id).unwrap().pitch.rate(), 2.0);
        assert_eq!(transport.registry().get(id).unwrap().speed_rate(), 2.0);

        // Stopping the engine keeps the nodes but blocks changes again.
        transport.graph_mut().stop();
        assert!(!transport.set_speed_rate(id, 4.0));
        assert_eq!(transport.graph().node_set(id).unwrap().pitch.rate(), 2.0);
    }

    #[test]
    fn test_speed_rate_not_clamped() {
        let (mut transport, _) = transport();
        let id = track(&mut transport, 0.5);
        transport.play(id);
        assert!(transport.set_speed_rate(id, 100.0));
        assert_eq!(transport.graph().node_set(id).unwrap().pitch.rate(), 100.0);
    }

    #[test]
    fn test_gain() {
        let (mut transport, device) = transport();
        let id = track(&mut transport, 0.5);

        assert!(!transport.set_gain(id, 0.5));
        transport.play(id);
        assert!(transport.set_gain(id, 0.5));
        assert_eq!(device.pull(1), vec![0.25]);

        assert!(!transport.set_gain(id, 1.5));
        assert!(!transport.set_gain(id, -0.1));
        assert!(!transport.set_gain(id, f32::NAN));
        assert_eq!(transport.registry().get(id).unwrap().gain(), 0.5);
    }

    #[test]
    fn test_setters_on_unknown_or_removed_track() {
        let (mut transport, _) = transport();
        let id = track(&mut transport, 0.5);
        let other = track(&mut transport, 0.5);
        transport.play(other);

        // Never played.
        assert!(!transport.set_gain(id, 0.5));
        assert!(!transport.set_speed_rate(id, 2.0));

        transport.play(id);
        transport.remove(id);
        assert!(!transport.set_gain(id, 0.5));
        assert!(!transport.set_speed_rate(id, 2.0));
        assert!(!transport.pause(id));
        assert!(!transport.remove(id));
    }

    #[test]
    fn test_toggle_volume() {
        let (mut transport, device) = transport();
        let id = track(&mut transport, 0.5);
        transport.play(id);

        assert_eq!(transport.toggle_volume(id), Some(false));
        assert_eq!(device.pull(1), vec![0.0]);
        // Gain changes while muted are remembered but stay silent.
        assert!(transport.set_gain(id, 0.5));
        assert_eq!(device.pull(1), vec![0.0]);

        assert_eq!(transport.toggle_volume(id), Some(true));
        assert_eq!(device.pull(1), vec![0.25]);
        assert_eq!(transport.toggle_volume(TrackId::random()), None);
    }

    #[test]
    fn test_remove_tears_down() {
        let (mut transport, device) = transport();
        let id = track(&mut transport, 0.5);
        transport.play(id);
        let bus = transport.graph().bus_of(id).unwrap();

        assert!(transport.remove(id));
        assert!(transport.registry().get(id).is_none());
        assert!(transport.graph().node_set(id).is_none());
        assert!(!transport.graph().is_bus_connected(bus));
        assert_eq!(device.pull(2), vec![0.0; 2]);
    }

    #[test]
    fn test_remove_never_played_track() {
        let (mut transport, _) = transport();
        let id = track(&mut transport, 0.5);
        assert!(transport.remove(id));
        assert!(transport.registry().is_empty());
    }

    #[test]
    fn test_defaults_apply_to_new_tracks() {
        let (transport, device) = transport();
        let mut transport = transport.with_defaults(0.5, 2.0);
        let id = track(&mut transport, 0.5);
        transport.play(id);

        assert_eq!(transport.graph().node_set(id).unwrap().pitch.rate(), 2.0);
        assert_eq!(device.pull(1), vec![0.25]);
    }

    #[test]
    fn test_shutdown() {
        let (mut transport, _) = transport();
        let id = track(&mut transport, 0.5);
        transport.play(id);

        transport.shutdown();
        assert!(!transport.graph().is_running());
        assert_eq!(transport.graph().attached_count(), 0);
        assert!(transport.registry().get(id).is_some());
        assert!(!transport.registry().get(id).unwrap().is_playing());
    }
}
