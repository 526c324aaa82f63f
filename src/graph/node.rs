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

//! Processing nodes owned by the graph.
//!
//! Nodes are shared between the controlling thread, which mutates their
//! parameters, and the render thread, which pulls audio through them. All
//! parameters are atomics; only the scheduled buffer sits behind a lock.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::source::AudioSource;

/// Identifies a node attached to the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Transport state of a player node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Playing,
    Paused,
}

impl PlayerState {
    fn from_u8(value: u8) -> PlayerState {
        match value {
            1 => PlayerState::Playing,
            2 => PlayerState::Paused,
            _ => PlayerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PlayerState::Stopped => 0,
            PlayerState::Playing => 1,
            PlayerState::Paused => 2,
        }
    }
}

/// A buffer scheduled on a player along with its read position.
struct Schedule {
    buffer: Arc<AudioSource>,
    looping: bool,
    /// Fractional read position in source frames.
    cursor: f64,
}

/// Plays a scheduled buffer. Owns the playback position and the track gain.
pub struct PlayerNode {
    id: NodeId,
    state: AtomicU8,
    volume: AtomicU32,
    schedule: Mutex<Option<Schedule>>,
    /// Number of buffers ever scheduled on this node.
    schedules: AtomicU64,
}

impl PlayerNode {
    pub fn new(id: NodeId) -> PlayerNode {
        PlayerNode {
            id,
            state: AtomicU8::new(PlayerState::Stopped.as_u8()),
            volume: AtomicU32::new(1.0f32.to_bits()),
            schedule: Mutex::new(None),
            schedules: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Replaces the scheduled buffer and rewinds to frame 0.
    pub fn schedule_buffer(&self, buffer: Arc<AudioSource>, looping: bool) {
        *self.schedule.lock() = Some(Schedule {
            buffer,
            looping,
            cursor: 0.0,
        });
        self.schedules.fetch_add(1, Ordering::Relaxed);
    }

    pub fn play(&self) {
        self.set_state(PlayerState::Playing);
    }

    /// Pauses in place; the read position is kept.
    pub fn pause(&self) {
        if self.state() == PlayerState::Playing {
            self.set_state(PlayerState::Paused);
        }
    }

    /// Stops and drops the scheduled buffer.
    pub fn stop(&self) {
        self.set_state(PlayerState::Stopped);
        *self.schedule.lock() = None;
    }

    pub fn state(&self) -> PlayerState {
        PlayerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn schedule_count(&self) -> u64 {
        self.schedules.load(Ordering::Relaxed)
    }

    /// The current read position, if a buffer is scheduled.
    pub fn cursor(&self) -> Option<f64> {
        self.schedule
            .lock()
            .as_ref()
            .map(|schedule| schedule.cursor)
    }

    fn set_state(&self, state: PlayerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Adds this player's output into `output`, reading the scheduled buffer at
    /// `rate` source frames per output frame. Called from the render thread.
    pub(crate) fn render_add(&self, rate: f32, output: &mut [f32], channels: usize) {
        if !self.is_playing() || !(rate.is_finite() && rate > 0.0) {
            return;
        }
        let volume = self.volume();

        let mut guard = self.schedule.lock();
        let Some(Schedule {
            buffer,
            looping,
            cursor,
        }) = guard.as_mut()
        else {
            return;
        };

        let total = buffer.frames();
        if total == 0 {
            return;
        }
        let end = total as f64;
        let mut finished = false;

        for frame in output.chunks_exact_mut(channels) {
            if *cursor >= end {
                if *looping {
                    *cursor %= end;
                } else {
                    finished = true;
                    break;
                }
            }

            let index = *cursor as usize;
            let frac = (*cursor - index as f64) as f32;
            let next = if index + 1 < total {
                index + 1
            } else if *looping {
                0
            } else {
                index
            };

            for (channel, out) in frame.iter_mut().enumerate() {
                let current = buffer.sample_for_output(index, channel, channels);
                let following = buffer.sample_for_output(next, channel, channels);
                *out += (current + (following - current) * frac) * volume;
            }

            *cursor += rate as f64;
        }

        if finished {
            self.set_state(PlayerState::Stopped);
        }
    }
}

/// Varispeed unit between a player and its mixer bus. The rate is the number
/// of source frames consumed per output frame; 1.0 is unchanged playback.
pub struct TimePitchNode {
    id: NodeId,
    rate: AtomicU32,
}

impl TimePitchNode {
    pub fn new(id: NodeId) -> TimePitchNode {
        TimePitchNode {
            id,
            rate: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn rate(&self) -> f32 {
        f32::from_bits(self.rate.load(Ordering::Relaxed))
    }

    /// Sets the rate as given. Non-positive rates render silence.
    pub fn set_rate(&self, rate: f32) {
        self.rate.store(rate.to_bits(), Ordering::Relaxed);
    }
}
