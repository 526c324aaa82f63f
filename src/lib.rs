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
//! A multi-track looping engine. Each track is a decoded audio source played
//! in a loop through its own player and time-pitch nodes into a shared mixer,
//! with per-track gain and speed, mute, removal and mixdown export.

pub mod audio;
pub mod config;
pub mod export;
pub mod graph;
pub mod registry;
pub mod service;
#[cfg(test)]
mod test;
#[cfg(test)]
mod testutil;
pub mod transport;

pub use registry::TrackId;
pub use service::AudioEngineService;
