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

//! Track registry: maps track ids to their decoded sources and track state.
//!
//! The registry knows nothing about the graph. Tearing down a track's nodes
//! is the transport's job.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::audio::source::AudioSource;

/// Unique identity of a track, rendered as a version 4 UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u128);

impl TrackId {
    /// Generates a fresh random id.
    pub fn random() -> TrackId {
        let bits: u128 = rand::random();
        // Version 4, RFC 4122 variant.
        let bits = (bits & !(0xf_u128 << 76)) | (0x4_u128 << 76);
        let bits = (bits & !(0x3_u128 << 62)) | (0x2_u128 << 62);
        TrackId(bits)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xffff_ffff_ffff
        )
    }
}

impl FromStr for TrackId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, RegistryError> {
        let groups: Vec<&str> = s.split('-').collect();
        let lengths = [8, 4, 4, 4, 12];
        if groups.len() != lengths.len()
            || groups
                .iter()
                .zip(lengths)
                .any(|(group, len)| !is_hex_group(group, len))
        {
            return Err(RegistryError::InvalidId(s.to_string()));
        }

        u128::from_str_radix(&groups.concat(), 16)
            .map(TrackId)
            .map_err(|_| RegistryError::InvalidId(s.to_string()))
    }
}

fn is_hex_group(group: &str, len: usize) -> bool {
    group.len() == len && group.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Registry errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("track {0} is already registered")]
    DuplicateTrack(TrackId),

    #[error("invalid track id: {0}")]
    InvalidId(String),
}

/// A layered track.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    /// The decoded audio, shared read-only.
    source: Arc<AudioSource>,
    /// Gain in [0, 1].
    gain: f32,
    /// Playback rate in [1/32, 32].
    speed_rate: f32,
    playing: bool,
    volume_enabled: bool,
}

impl Track {
    fn new(id: TrackId, source: Arc<AudioSource>) -> Track {
        Track {
            id,
            source,
            gain: 1.0,
            speed_rate: 1.0,
            playing: false,
            volume_enabled: true,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn source(&self) -> &Arc<AudioSource> {
        &self.source
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn speed_rate(&self) -> f32 {
        self.speed_rate
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn volume_enabled(&self) -> bool {
        self.volume_enabled
    }

    /// The gain the player node should apply: nothing while muted.
    pub fn effective_gain(&self) -> f32 {
        if self.volume_enabled {
            self.gain
        } else {
            0.0
        }
    }

    pub(crate) fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub(crate) fn set_speed_rate(&mut self, speed_rate: f32) {
        self.speed_rate = speed_rate;
    }

    pub(crate) fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub(crate) fn set_volume_enabled(&mut self, enabled: bool) {
        self.volume_enabled = enabled;
    }
}

/// Tracks by id, remembering registration order.
#[derive(Default)]
pub struct TrackRegistry {
    tracks: HashMap<TrackId, Track>,
    order: Vec<TrackId>,
}

impl TrackRegistry {
    pub fn new() -> TrackRegistry {
        TrackRegistry::default()
    }

    /// Registers a track for the given source.
    pub fn register(
        &mut self,
        id: TrackId,
        source: Arc<AudioSource>,
    ) -> Result<&mut Track, RegistryError> {
        if self.tracks.contains_key(&id) {
            return Err(RegistryError::DuplicateTrack(id));
        }
        self.order.push(id);
        Ok(self.tracks.entry(id).or_insert(Track::new(id, source)))
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    /// Removes the track. Unknown ids are ignored.
    pub fn remove(&mut self, id: TrackId) -> Option<Track> {
        let track = self.tracks.remove(&id)?;
        self.order.retain(|existing| *existing != id);
        Some(track)
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.contains_key(&id)
    }

    /// Track ids in registration order.
    pub fn ids(&self) -> &[TrackId] {
        &self.order
    }

    /// Tracks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.order.iter().filter_map(|id| self.tracks.get(id))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
