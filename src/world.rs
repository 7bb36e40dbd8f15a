//! In-process world simulation for offline runs and integration tests.
//!
//! The simulation thread plays the game server: it consumes direction
//! commands, walks the matching exit in the graph and, after a latency,
//! reports the room it ended up in.
//!
//! ```text
//! executor ──commands──▶ world (sim thread) ──WorldEvent──▶ coordinator
//! ```
//!
//! An unknown direction leaves the player in place and the room is
//! reported again, as a server does for "you can't go that way".

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, unbounded};

use crate::coordinator::WorldEvent;
use crate::error::{NavError, Result};
use crate::graph::{Direction, Graph, RoomId};
use crate::shared::AtomicRoom;
use crate::types::RoomState;

/// Simulation parameters.
#[derive(Clone, Debug)]
pub struct WorldConfig {
    /// Delay between receiving a command and reporting the room
    pub latency: Duration,
    pub max_hp: u32,
    /// Health lost per successful move; zero disables health reports
    pub damage_per_move: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(20),
            max_hp: 100,
            damage_per_move: 0,
        }
    }
}

/// Parser-style description of `room`: its label and visible exits.
pub fn describe(graph: &Graph, room: RoomId) -> Option<RoomState> {
    let node = graph.node(room)?;
    let exits = graph
        .outgoing(room)
        .iter()
        .filter(|e| !e.is_hidden)
        .map(|e| e.direction.clone())
        .collect();
    Some(RoomState::new(node.label.clone(), exits))
}

/// Handle to the simulation thread. Dropping it stops the thread.
pub struct SimulatedWorld {
    position: Arc<AtomicRoom>,
    moves: Arc<AtomicU64>,
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

struct Simulation {
    graph: Arc<Graph>,
    config: WorldConfig,
    position: Arc<AtomicRoom>,
    moves: Arc<AtomicU64>,
    hp: u32,
    current: RoomId,
    events: Sender<WorldEvent>,
}

impl SimulatedWorld {
    /// Start the simulation with the player in `start`.
    pub fn spawn(
        graph: Arc<Graph>,
        start: RoomId,
        commands: Receiver<String>,
        events: Sender<WorldEvent>,
        config: WorldConfig,
    ) -> Result<Self> {
        if graph.node(start).is_none() {
            return Err(NavError::UnknownRoom(start));
        }
        let position = Arc::new(AtomicRoom::new(Some(start)));
        let moves = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, shutdown_rx) = unbounded::<()>();

        let sim = Simulation {
            graph,
            hp: config.max_hp,
            config,
            position: Arc::clone(&position),
            moves: Arc::clone(&moves),
            current: start,
            events,
        };
        let handle = thread::Builder::new()
            .name("world-sim".into())
            .spawn(move || sim.run(commands, shutdown_rx))
            .map_err(|e| NavError::Thread(format!("Failed to spawn world thread: {}", e)))?;

        Ok(Self {
            position,
            moves,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Where the simulated player actually is.
    pub fn position(&self) -> Option<RoomId> {
        self.position.load(Ordering::Acquire)
    }

    /// Successful moves so far.
    pub fn moves(&self) -> u64 {
        self.moves.load(Ordering::Acquire)
    }
}

impl Drop for SimulatedWorld {
    fn drop(&mut self) {
        self.shutdown_tx.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("World simulation thread panicked");
        }
    }
}

impl Simulation {
    fn run(mut self, commands: Receiver<String>, shutdown: Receiver<()>) {
        tracing::info!("World simulation started in {}", self.current);

        loop {
            select! {
                recv(commands) -> msg => match msg {
                    Ok(command) => {
                        if !self.step(&command) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }

        tracing::info!(
            "World simulation stopped after {} moves",
            self.moves.load(Ordering::Acquire)
        );
    }

    /// Apply one command; returns false once the coordinator is gone.
    fn step(&mut self, command: &str) -> bool {
        let direction = Direction::parse(command);
        let moved = match self.graph.edge_between(self.current, &direction) {
            Some(edge) => {
                tracing::debug!("World: {} -{}-> {}", self.current, direction, edge.to);
                self.current = edge.to;
                true
            }
            None => {
                tracing::debug!("World: no exit '{}' from {}", direction, self.current);
                false
            }
        };

        if !self.config.latency.is_zero() {
            thread::sleep(self.config.latency);
        }

        if moved {
            self.moves.fetch_add(1, Ordering::AcqRel);
            self.position.store(Some(self.current), Ordering::Release);
        }
        let Some(room) = describe(&self.graph, self.current) else {
            return true;
        };
        if self.events.send(WorldEvent::RoomChanged(room)).is_err() {
            return false;
        }

        if moved && self.config.damage_per_move > 0 {
            self.hp = self.hp.saturating_sub(self.config.damage_per_move);
            let health = WorldEvent::HealthChanged {
                hp: self.hp,
                max_hp: self.config.max_hp,
            };
            if self.events.send(health).is_err() {
                return false;
            }
        }
        true
    }
}
