//! Navigation coordinator: public API and thread wiring.
//!
//! Three threads cooperate behind [`NavigationCoordinator`]:
//! - Event thread: drains inbound [`WorldEvent`]s in arrival order, updates
//!   the navigation context, identifies the room and advances the route
//! - Safety thread: periodic health and stalled-command checks
//! - Executor worker (owned by [`MovementExecutor`]): emits commands
//!
//! Caller operations run on the caller's thread and share the same
//! short-lived state lock as the event thread.

mod events;
mod navigator;
mod safety;

pub use events::{NavigationEvent, WorldEvent};

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, unbounded};

use crate::config::MargaConfig;
use crate::error::{NavError, Result};
use crate::executor::{CommandSink, MovementExecutor};
use crate::graph::{Graph, RoomId};
use crate::identify::RoomIdentifier;
use crate::planning::{NavigationConstraints, PathPlanner};
use crate::query::{Destination, RoomQuery};
use crate::types::{
    MovementMode, NavigationContext, NavigationPath, NavigationState, PauseReason, RoomState,
};
use navigator::CoordinatorCore;
use safety::SafetyMonitor;

/// Event thread wake-up period when no completion grace is pending.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Point-in-time view of navigation.
#[derive(Clone, Debug, PartialEq)]
pub struct NavigationStatus {
    pub state: NavigationState,
    pub destination: Option<RoomId>,
    pub current_room: Option<RoomId>,
    pub confidence: f32,
    /// Steps completed on the current path
    pub step_index: usize,
    pub total_steps: usize,
    pub mode: MovementMode,
    pub commands_sent: u64,
    pub combat_active: bool,
    pub health_percent: f32,
}

/// Top-level navigation engine.
///
/// Dropping the coordinator stops its threads and the executor.
pub struct NavigationCoordinator {
    core: Arc<CoordinatorCore>,
    inbound_tx: Sender<WorldEvent>,
    shutdown_tx: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl NavigationCoordinator {
    /// Build the engine over `graph`, sending movement commands to `sink`.
    ///
    /// Returns the coordinator and the receiver for its notifications.
    pub fn new(
        graph: Arc<Graph>,
        config: &MargaConfig,
        sink: Arc<dyn CommandSink>,
    ) -> Result<(Self, Receiver<NavigationEvent>)> {
        let planner = PathPlanner::new(Arc::clone(&graph), config.planner.clone());
        let identifier = RoomIdentifier::new(Arc::clone(&graph), config.identifier.clone());
        let executor = MovementExecutor::spawn(config.executor.clone(), sink)?;

        let (events_tx, events_rx) = unbounded();
        let core = Arc::new(CoordinatorCore::new(
            graph,
            planner,
            identifier,
            executor,
            config.coordinator.clone(),
            events_tx,
        ));

        let (inbound_tx, inbound_rx) = unbounded::<WorldEvent>();
        let (shutdown_tx, shutdown_rx) = unbounded::<()>();

        let event_core = Arc::clone(&core);
        let event_shutdown = shutdown_rx.clone();
        let event_handle = thread::Builder::new()
            .name("nav-events".into())
            .spawn(move || run_event_loop(event_core, inbound_rx, event_shutdown))
            .map_err(|e| NavError::Thread(format!("Failed to spawn event thread: {}", e)))?;

        let monitor = SafetyMonitor::new(Arc::clone(&core));
        let safety_handle = thread::Builder::new()
            .name("nav-safety".into())
            .spawn(move || monitor.run(shutdown_rx))
            .map_err(|e| NavError::Thread(format!("Failed to spawn safety thread: {}", e)))?;

        let coordinator = Self {
            core,
            inbound_tx,
            shutdown_tx: Some(shutdown_tx),
            threads: vec![event_handle, safety_handle],
        };
        Ok((coordinator, events_rx))
    }

    /// Sender for inbound events, for producers on other threads.
    pub fn inbound(&self) -> Sender<WorldEvent> {
        self.inbound_tx.clone()
    }

    fn push(&self, event: WorldEvent) {
        if self.inbound_tx.send(event).is_err() {
            tracing::warn!("Coordinator event thread is gone; event dropped");
        }
    }

    pub fn on_room_changed(&self, room: RoomState) {
        self.push(WorldEvent::RoomChanged(room));
    }

    pub fn on_health_changed(&self, hp: u32, max_hp: u32) {
        self.push(WorldEvent::HealthChanged { hp, max_hp });
    }

    pub fn on_combat_active(&self, active: bool) {
        self.push(WorldEvent::CombatActive(active));
    }

    /// Declare the current room outright, with full confidence.
    pub fn set_position(&self, room: RoomId) -> Result<()> {
        self.core.set_position(room)
    }

    /// Plan a route to `destination` and start walking it, replacing any
    /// attempt in progress.
    pub fn start_to(
        &self,
        destination: &Destination,
        constraints: NavigationConstraints,
    ) -> Result<NavigationPath> {
        self.core.start_to(destination, constraints)
    }

    /// Abandon navigation. Always ends in Idle.
    pub fn stop(&self) {
        self.core.stop();
    }

    pub fn pause(&self, reason: &str) -> Result<()> {
        self.core
            .pause(None, PauseReason::User(reason.to_string()))
    }

    pub fn resume(&self) -> Result<()> {
        self.core.resume(None, false)
    }

    /// Change movement mode; applies from the next command.
    pub fn set_mode(&self, mode: MovementMode) {
        tracing::info!("Movement mode set to {}", mode);
        self.core.executor.set_mode(mode);
    }

    pub fn status(&self) -> NavigationStatus {
        self.core.status()
    }

    /// Current disambiguation context.
    pub fn context(&self) -> Arc<NavigationContext> {
        self.core.context()
    }

    /// Lock-free room queries sharing this coordinator's position.
    pub fn query(&self) -> RoomQuery {
        self.core.query().clone()
    }
}

impl Drop for NavigationCoordinator {
    fn drop(&mut self) {
        // Disconnecting the shutdown channel wakes both threads
        self.shutdown_tx.take();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Coordinator thread panicked");
            }
        }
    }
}

fn run_event_loop(
    core: Arc<CoordinatorCore>,
    inbound: Receiver<WorldEvent>,
    shutdown: Receiver<()>,
) {
    tracing::info!("Coordinator event thread started");

    loop {
        let wait = core.completion_wait().unwrap_or(IDLE_POLL);

        select! {
            recv(inbound) -> msg => match msg {
                Ok(event) => core.handle(event),
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
            default(wait) => {}
        }

        core.finish_completion();
    }

    tracing::info!("Coordinator event thread shutting down");
}
