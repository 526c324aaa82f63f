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

//! The audio graph: player -> time-pitch -> mixer bus -> output.
//!
//! The graph manager is the only thing that touches the engine. Structural
//! changes (attach, connect, disconnect, detach) all happen here, on the
//! controlling thread, and reach the render thread through the mixer's lock.

pub mod mixer;
pub mod node;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, span, Level, Span};

use crate::audio::{Device, EngineError, OutputFormat};
use crate::export::{ExportError, MixdownFile};
use crate::registry::TrackId;

use self::mixer::{Mixer, MixerInput};
use self::node::{NodeId, PlayerNode, TimePitchNode};

/// A numbered mixer input.
pub type Bus = u32;

/// The nodes and bus owned by one track.
#[derive(Clone)]
pub struct NodeSet {
    pub player: Arc<PlayerNode>,
    pub pitch: Arc<TimePitchNode>,
    pub bus: Bus,
}

/// Where a connection lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Node(NodeId),
    MixerBus(Bus),
}

/// A directed edge in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub from: NodeId,
    pub to: Endpoint,
}

/// Owns the audio graph and the engine that renders it.
pub struct GraphManager {
    /// The output device rendering the graph.
    device: Arc<dyn Device>,
    /// The mixer every track is connected to.
    mixer: Mixer,
    /// Node sets by track.
    node_sets: HashMap<TrackId, NodeSet>,
    /// Nodes currently attached to the engine.
    attached: HashSet<NodeId>,
    /// Current connections.
    connections: Vec<Connection>,
    /// Next bus to hand out. Buses are never reused within a session.
    next_bus: Bus,
    /// Next node id to hand out.
    next_node_id: u64,
    /// Whether the engine has been prepared since the last structural change.
    prepared: bool,
    /// The logging span.
    span: Span,
}

impl GraphManager {
    /// Creates a graph rendering through the given device.
    pub fn new(device: Arc<dyn Device>) -> GraphManager {
        let mixer = Mixer::new(device.output_format());
        GraphManager {
            device,
            mixer,
            node_sets: HashMap::new(),
            attached: HashSet::new(),
            connections: Vec::new(),
            next_bus: 0,
            next_node_id: 0,
            prepared: false,
            span: span!(Level::INFO, "graph"),
        }
    }

    /// Returns the node set for the track, creating, attaching and connecting
    /// it on first use.
    pub fn ensure_node_set(&mut self, track: TrackId) -> NodeSet {
        if let Some(node_set) = self.node_sets.get(&track) {
            return node_set.clone();
        }
        let player = Arc::new(PlayerNode::new(self.allocate_node_id()));
        let pitch = Arc::new(TimePitchNode::new(self.allocate_node_id()));
        let _enter = self.span.enter();
        self.attached.insert(player.id());
        self.attached.insert(pitch.id());

        let bus = self.next_bus;
        self.next_bus += 1;

        self.connections.push(Connection {
            from: player.id(),
            to: Endpoint::Node(pitch.id()),
        });
        self.connections.push(Connection {
            from: pitch.id(),
            to: Endpoint::MixerBus(bus),
        });
        self.mixer.connect(
            bus,
            MixerInput {
                track,
                player: player.clone(),
                pitch: pitch.clone(),
            },
        );
        self.prepared = true;

        info!(
            track = %track,
            bus,
            player = %player.id(),
            pitch = %pitch.id(),
            "Node set attached"
        );

        let node_set = NodeSet { player, pitch, bus };
        self.node_sets.insert(track, node_set.clone());
        node_set
    }

    /// Stops, disconnects and detaches the track's nodes. Unknown tracks are ignored.
    pub fn teardown(&mut self, track: TrackId) -> bool {
        let _enter = self.span.enter();
        let Some(node_set) = self.node_sets.remove(&track) else {
            debug!(track = %track, "No node set to tear down");
            return false;
        };

        if node_set.player.is_playing() {
            node_set.player.stop();
        }

        // Disconnecting under the mixer's write lock guarantees the render
        // thread is not inside these nodes once we continue.
        self.mixer.disconnect(node_set.bus);
        let player_id = node_set.player.id();
        let pitch_id = node_set.pitch.id();
        self.connections
            .retain(|connection| connection.from != player_id && connection.from != pitch_id);
        self.attached.remove(&player_id);
        self.attached.remove(&pitch_id);

        info!(track = %track, bus = node_set.bus, "Node set detached");
        true
    }

    pub fn node_set(&self, track: TrackId) -> Option<&NodeSet> {
        self.node_sets.get(&track)
    }

    /// All node sets.
    pub fn node_sets(&self) -> impl Iterator<Item = (&TrackId, &NodeSet)> {
        self.node_sets.iter()
    }

    pub fn bus_of(&self, track: TrackId) -> Option<Bus> {
        self.node_sets.get(&track).map(|node_set| node_set.bus)
    }

    /// Starts the engine if it isn't running. Failures are logged and reported
    /// as `false`; the engine can be started again later.
    pub fn start(&mut self) -> bool {
        match self.try_start() {
            Ok(()) => true,
            Err(e) => {
                let _enter = self.span.enter();
                error!(err = %e, device = self.device.name(), "Unable to start engine");
                false
            }
        }
    }

    /// Starts the engine if it isn't running.
    pub fn try_start(&mut self) -> Result<(), EngineError> {
        if self.device.is_running() {
            return Ok(());
        }
        let _enter = self.span.enter();
        self.prepared = true;
        self.device.start(self.mixer.clone())?;
        info!(device = self.device.name(), format = %self.mixer.format(), "Engine started");
        Ok(())
    }

    /// Stops the engine. Nodes stay attached and connected.
    pub fn stop(&mut self) {
        if self.device.is_running() {
            self.device.stop();
            let _enter = self.span.enter();
            info!(device = self.device.name(), "Engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.device.is_running()
    }

    /// Whether the graph has been prepared for rendering.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Opens a mixdown file at `path` in the current output format. No samples
    /// are written; recording or offline rendering fills it.
    pub fn export_mix(&self, path: &Path) -> Result<MixdownFile, ExportError> {
        MixdownFile::create(path, self.output_format())
    }

    pub fn output_format(&self) -> OutputFormat {
        self.mixer.format().clone()
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.attached.contains(&node)
    }

    /// Number of nodes attached to the engine.
    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Returns true if anything is connected to the given bus.
    pub fn is_bus_connected(&self, bus: Bus) -> bool {
        self.mixer.is_connected(bus)
            || self
                .connections
                .iter()
                .any(|connection| connection.to == Endpoint::MixerBus(bus))
    }

    fn allocate_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }
}
