//! Shared fixtures for MargaNav integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, unbounded};
use marga_nav::world::describe;
use marga_nav::{
    Direction, Graph, MargaConfig, NavigationCoordinator, NavigationEvent, RoomEdge, RoomId,
    RoomNode, RoomState,
};

/// Generous wait for anything crossing a thread boundary.
pub const RECV_WAIT: Duration = Duration::from_secs(2);

/// Rooms "Room 1" .. "Room n" joined east-west.
pub fn line_nodes(n: u32) -> (Vec<RoomNode>, Vec<RoomEdge>) {
    let nodes = (1..=n)
        .map(|i| RoomNode::new(i, format!("Room {}", i), i as i32, 0))
        .collect();
    let mut edges = Vec::new();
    for i in 1..n {
        edges.push(RoomEdge::new(i, i + 1, Direction::East));
        edges.push(RoomEdge::new(i + 1, i, Direction::West));
    }
    (nodes, edges)
}

pub fn line_graph(n: u32) -> Arc<Graph> {
    let (nodes, edges) = line_nodes(n);
    Arc::new(Graph::from_parts(nodes, edges).unwrap())
}

/// Five-room line plus "Side Room" (6) north of room 2.
pub fn branch_graph() -> Arc<Graph> {
    let (mut nodes, mut edges) = line_nodes(5);
    nodes.push(RoomNode::new(6, "Side Room", 2, 1));
    edges.push(RoomEdge::new(2, 6, Direction::North));
    edges.push(RoomEdge::new(6, 2, Direction::South));
    Arc::new(Graph::from_parts(nodes, edges).unwrap())
}

/// Five-room line whose middle room is far above the default danger limit.
pub fn lair_graph() -> Arc<Graph> {
    let (mut nodes, edges) = line_nodes(5);
    nodes[2].label = "Dragon Lair".to_string();
    nodes[2].spawn_pressure = 12;
    Arc::new(Graph::from_parts(nodes, edges).unwrap())
}

/// Defaults, with completion held long enough to observe and quick safety ticks.
pub fn test_config() -> MargaConfig {
    let mut config = MargaConfig::default();
    config.coordinator.completion_grace_ms = 60_000;
    config.coordinator.safety_interval_ms = 50;
    config
}

/// Coordinator wired to an in-memory command channel.
pub struct Harness {
    pub graph: Arc<Graph>,
    pub nav: NavigationCoordinator,
    pub events: Receiver<NavigationEvent>,
    pub commands: Receiver<String>,
}

impl Harness {
    pub fn new(graph: Arc<Graph>, config: &MargaConfig) -> Self {
        let (commands_tx, commands) = unbounded::<String>();
        let (nav, events) =
            NavigationCoordinator::new(Arc::clone(&graph), config, Arc::new(commands_tx)).unwrap();
        Self {
            graph,
            nav,
            events,
            commands,
        }
    }

    /// Next command sent to the world.
    pub fn next_command(&self) -> String {
        self.commands
            .recv_timeout(RECV_WAIT)
            .expect("expected a movement command")
    }

    /// Assert nothing more is sent within `window`.
    pub fn assert_quiet(&self, window: Duration) {
        if let Ok(cmd) = self.commands.recv_timeout(window) {
            panic!("unexpected command '{}'", cmd);
        }
    }

    /// Report arrival in `room` as the parser would describe it.
    pub fn arrive(&self, room: u32) {
        self.nav.on_room_changed(self.describe(room));
    }

    pub fn describe(&self, room: u32) -> RoomState {
        describe(&self.graph, RoomId(room)).expect("room in graph")
    }

    /// Wait for the first event matching `pred`, skipping others.
    pub fn wait_for<P>(&self, pred: P) -> Option<NavigationEvent>
    where
        P: Fn(&NavigationEvent) -> bool,
    {
        wait_for_event(&self.events, pred, RECV_WAIT)
    }
}

pub fn wait_for_event<P>(
    events: &Receiver<NavigationEvent>,
    pred: P,
    timeout: Duration,
) -> Option<NavigationEvent>
where
    P: Fn(&NavigationEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}
