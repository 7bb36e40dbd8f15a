//! Navigation state machine shared by the event thread, the safety thread
//! and caller threads.
//!
//! Lock order is `record` then `context`. Notifications are sent only after
//! `record` is released; executor calls made under `record` never need it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::NavigationStatus;
use super::events::{NavigationEvent, WorldEvent};
use crate::config::CoordinatorConfig;
use crate::error::{NavError, Result};
use crate::executor::MovementExecutor;
use crate::graph::{Graph, RoomId};
use crate::identify::{RoomIdentifier, RoomMatchResult};
use crate::planning::{NavigationConstraints, PathPlanner};
use crate::query::{Destination, RoomQuery};
use crate::shared::{AtomicF32, AtomicRoom, ContextCell};
use crate::types::{NavigationContext, NavigationPath, NavigationState, PauseReason, RoomState};

/// Everything tied to one navigation attempt.
#[derive(Debug)]
struct AttemptRecord {
    /// Bumped on every start, stop and replacement; stale work is rejected
    attempt: u64,
    state: NavigationState,
    path: Option<Arc<NavigationPath>>,
    destination: Option<RoomId>,
    constraints: NavigationConstraints,
    replans: usize,
    completed_at: Option<Instant>,
}

impl AttemptRecord {
    fn idle() -> Self {
        Self {
            attempt: 0,
            state: NavigationState::Idle,
            path: None,
            destination: None,
            constraints: NavigationConstraints::default(),
            replans: 0,
            completed_at: None,
        }
    }
}

pub(super) struct CoordinatorCore {
    graph: Arc<Graph>,
    planner: PathPlanner,
    identifier: RoomIdentifier,
    pub(super) executor: MovementExecutor,
    query: RoomQuery,
    pub(super) config: CoordinatorConfig,
    context: ContextCell,
    record: Mutex<AttemptRecord>,
    current_room: Arc<AtomicRoom>,
    confidence: AtomicF32,
    step_index: AtomicUsize,
    total_steps: AtomicUsize,
    health_percent: AtomicF32,
    combat: AtomicBool,
    events: Sender<NavigationEvent>,
}

impl CoordinatorCore {
    /// Assemble the core around an already spawned executor.
    pub(super) fn new(
        graph: Arc<Graph>,
        planner: PathPlanner,
        identifier: RoomIdentifier,
        executor: MovementExecutor,
        config: CoordinatorConfig,
        events: Sender<NavigationEvent>,
    ) -> Self {
        let current_room = Arc::new(AtomicRoom::new(None));
        let query = RoomQuery::new(
            Arc::clone(&graph),
            planner.clone(),
            Arc::clone(&current_room),
        );
        Self {
            graph,
            planner,
            identifier,
            executor,
            query,
            config,
            context: ContextCell::default(),
            record: Mutex::new(AttemptRecord::idle()),
            current_room,
            confidence: AtomicF32::new(0.0),
            step_index: AtomicUsize::new(0),
            total_steps: AtomicUsize::new(0),
            health_percent: AtomicF32::new(100.0),
            combat: AtomicBool::new(false),
            events,
        }
    }

    pub(super) fn query(&self) -> &RoomQuery {
        &self.query
    }

    pub(super) fn context(&self) -> Arc<NavigationContext> {
        self.context.snapshot()
    }

    fn emit(&self, event: NavigationEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Navigation event dropped: no listener");
        }
    }

    pub(super) fn alert(&self, message: String) {
        tracing::warn!("{}", message);
        self.emit(NavigationEvent::Alert(message));
    }

    /// Apply `to` under the record lock; returns the new state if it changed.
    fn set_state(record: &mut AttemptRecord, to: NavigationState) -> Option<NavigationState> {
        if record.state == to {
            return None;
        }
        tracing::info!("Navigation state: {} -> {}", record.state, to);
        record.state = to.clone();
        Some(to)
    }

    fn notify(&self, changed: Option<NavigationState>) {
        if let Some(state) = changed {
            self.emit(NavigationEvent::StateChanged(state));
        }
    }

    fn room_name(&self, room: RoomId) -> String {
        match self.graph.node(room) {
            Some(node) => format!("{} ({})", node.label, room),
            None => room.to_string(),
        }
    }

    pub(super) fn state_and_attempt(&self) -> (NavigationState, u64) {
        let record = self.record.lock();
        (record.state.clone(), record.attempt)
    }

    pub(super) fn health_percent(&self) -> f32 {
        self.health_percent.load(Ordering::Acquire)
    }

    pub(super) fn handle(&self, event: WorldEvent) {
        match event {
            WorldEvent::RoomChanged(room) => self.on_room_changed(room),
            WorldEvent::HealthChanged { hp, max_hp } => {
                if max_hp == 0 {
                    tracing::debug!("Ignoring health update with zero maximum");
                    return;
                }
                let percent = hp as f32 * 100.0 / max_hp as f32;
                self.health_percent.store(percent, Ordering::Release);
                tracing::debug!("Health {}/{} ({:.0}%)", hp, max_hp, percent);
            }
            WorldEvent::CombatActive(active) => {
                if self.combat.swap(active, Ordering::AcqRel) != active {
                    tracing::info!("Combat {}", if active { "started" } else { "ended" });
                }
            }
        }
    }

    /// Declare the current room with full confidence.
    pub(super) fn set_position(&self, room: RoomId) -> Result<()> {
        if self.graph.node(room).is_none() {
            return Err(NavError::UnknownRoom(room));
        }
        self.current_room.store(Some(room), Ordering::Release);
        self.confidence.store(1.0, Ordering::Release);
        let record = self.record.lock();
        if !record.state.is_active() {
            self.context
                .replace(NavigationContext::resting_in(Some(room)));
        }
        tracing::info!("Position set to {}", self.room_name(room));
        Ok(())
    }

    /// Reject routes through rooms above the safety limit.
    fn check_route_safety(
        &self,
        path: &NavigationPath,
        constraints: &NavigationConstraints,
    ) -> Result<()> {
        let default_limit = self.config.max_safe_danger;
        for room in path.rooms() {
            let danger = self.graph.node(room).map_or(0, |n| n.danger_level());
            if constraints.exceeds_safety_limit(danger, default_limit) {
                return Err(NavError::SafetyViolation {
                    room,
                    danger,
                    limit: constraints.safety_limit(default_limit),
                });
            }
        }
        Ok(())
    }

    pub(super) fn start_to(
        &self,
        destination: &Destination,
        constraints: NavigationConstraints,
    ) -> Result<NavigationPath> {
        let goal = self.query.resolve_destination(destination)?;

        let confidence = self.confidence.load(Ordering::Acquire);
        let required = self.config.start_confidence;
        let Some(start) = self
            .current_room
            .load(Ordering::Acquire)
            .filter(|_| confidence >= required)
        else {
            return Err(NavError::PositionUnknown {
                confidence,
                required,
            });
        };

        let path = self.planner.plan(start, goal, &constraints);
        if !path.is_valid {
            let reason = path
                .failure_reason
                .clone()
                .unwrap_or_else(|| format!("no route {} -> {}", start, goal));
            return Err(NavError::Planning(reason));
        }
        self.check_route_safety(&path, &constraints)?;

        let shared_path = Arc::new(path.clone());
        let arrived = path.steps.is_empty();
        let changed = {
            let mut record = self.record.lock();
            record.attempt += 1;
            record.path = Some(Arc::clone(&shared_path));
            record.destination = Some(goal);
            record.constraints = constraints;
            record.replans = 0;
            record.completed_at = arrived.then(Instant::now);
            self.step_index.store(0, Ordering::Release);
            self.total_steps.store(path.step_count(), Ordering::Release);
            self.context
                .replace(NavigationContext::for_step(Arc::clone(&shared_path), 0));

            self.executor.stop("new navigation attempt");
            self.executor.enqueue(path.steps.clone(), 0);

            let target = if arrived {
                NavigationState::Completed
            } else {
                NavigationState::Navigating
            };
            Self::set_state(&mut record, target)
        };

        tracing::info!(
            "Navigating {} -> {}: {} steps, cost {:.1}",
            self.room_name(start),
            self.room_name(goal),
            path.step_count(),
            path.total_cost
        );
        self.notify(changed);
        if arrived {
            self.emit(NavigationEvent::Completed(self.room_name(goal)));
        }
        Ok(path)
    }

    /// Abandon the attempt, if any, and return to Idle.
    pub(super) fn stop(&self) {
        let changed = {
            let mut record = self.record.lock();
            record.attempt += 1;
            record.path = None;
            record.destination = None;
            record.replans = 0;
            record.completed_at = None;
            self.executor.stop("navigation stopped");
            self.step_index.store(0, Ordering::Release);
            self.total_steps.store(0, Ordering::Release);
            self.context.replace(NavigationContext::resting_in(
                self.current_room.load(Ordering::Acquire),
            ));
            Self::set_state(&mut record, NavigationState::Idle)
        };
        self.notify(changed);
    }

    /// Pause the attempt. `attempt` pins the transition to a specific
    /// attempt; `None` means whichever is current.
    pub(super) fn pause(&self, attempt: Option<u64>, reason: PauseReason) -> Result<()> {
        let changed = {
            let mut record = self.record.lock();
            if attempt.is_some_and(|a| a != record.attempt) {
                tracing::debug!("Rejecting pause from a finished attempt");
                return Err(NavError::NotNavigating);
            }
            let allowed = match &record.state {
                NavigationState::Navigating => true,
                // A user pause takes over a safety pause so it is not auto-resumed
                NavigationState::Paused(PauseReason::LowHealth) => {
                    matches!(reason, PauseReason::User(_))
                }
                _ => false,
            };
            if !allowed {
                return Err(NavError::NotNavigating);
            }
            self.executor.pause(reason.to_string());
            Self::set_state(&mut record, NavigationState::Paused(reason))
        };
        self.notify(changed);
        Ok(())
    }

    /// Resume a paused attempt. With `low_health_only`, user pauses are
    /// left alone.
    pub(super) fn resume(&self, attempt: Option<u64>, low_health_only: bool) -> Result<()> {
        let changed = {
            let mut record = self.record.lock();
            if attempt.is_some_and(|a| a != record.attempt) {
                tracing::debug!("Rejecting resume from a finished attempt");
                return Err(NavError::NotNavigating);
            }
            match &record.state {
                NavigationState::Paused(PauseReason::User(_)) if low_health_only => {
                    return Err(NavError::NotNavigating);
                }
                NavigationState::Paused(_) => {}
                _ => return Err(NavError::NotNavigating),
            }
            self.executor.resume();
            Self::set_state(&mut record, NavigationState::Navigating)
        };
        self.notify(changed);
        Ok(())
    }

    fn on_room_changed(&self, room: RoomState) {
        // Context first, so the identifier sees the step being executed
        let (attempt, active) = {
            let record = self.record.lock();
            let idx = self.step_index.load(Ordering::Acquire);
            let active = record
                .path
                .as_ref()
                .filter(|p| record.state.is_active() && idx < p.step_count())
                .map(|p| (Arc::clone(p), idx));
            let ctx = match &active {
                Some((path, idx)) => NavigationContext::for_step(Arc::clone(path), *idx),
                None => NavigationContext::resting_in(self.current_room.load(Ordering::Acquire)),
            };
            self.context.replace(ctx);
            (record.attempt, active)
        };

        let ctx = self.context.snapshot();
        let Some(matched) = self.identifier.resolve(&room, &ctx) else {
            self.confidence.store(0.0, Ordering::Release);
            self.alert(format!("Could not identify room '{}'", room.label));
            return;
        };
        self.current_room.store(Some(matched.room), Ordering::Release);
        self.confidence.store(matched.confidence, Ordering::Release);
        self.report_confidence(&room.label, &matched);

        let Some((path, idx)) = active else {
            return;
        };
        let Some(step) = path.steps.get(idx) else {
            return;
        };

        if matched.room == step.to {
            self.advance(attempt, &path, idx);
        } else if matched.room == step.from {
            tracing::debug!(
                "Still in {}; step {} not taken yet",
                self.room_name(step.from),
                idx
            );
        } else if let Some(ahead) = path.position_of(matched.room).filter(|&p| p > idx) {
            tracing::debug!("Skipped ahead from step {} to {}", idx, ahead);
            self.advance(attempt, &path, ahead);
        } else {
            self.replan(attempt, matched.room);
        }
    }

    fn report_confidence(&self, label: &str, matched: &RoomMatchResult) {
        if matched.confidence < self.config.alert_confidence {
            self.alert(format!(
                "Low confidence match for '{}': {} at {:.2}",
                label,
                self.room_name(matched.room),
                matched.confidence
            ));
        } else if matched.confidence < self.config.quiet_confidence {
            tracing::debug!(
                "Uncertain match for '{}': {} at {:.2} ({:?})",
                label,
                matched.room,
                matched.confidence,
                matched.tier
            );
        }
    }

    /// Record arrival at the end of step `arrived`.
    fn advance(&self, attempt: u64, path: &Arc<NavigationPath>, arrived: usize) {
        let next = arrived + 1;
        let total = path.step_count();
        let (changed, completed) = {
            let mut record = self.record.lock();
            if record.attempt != attempt || !record.state.is_active() {
                tracing::debug!("Ignoring arrival for a finished attempt");
                return;
            }
            self.step_index.store(next, Ordering::Release);
            self.executor.confirm(arrived);
            if next >= total {
                record.completed_at = Some(Instant::now());
                self.executor.stop("destination reached");
                (
                    Self::set_state(&mut record, NavigationState::Completed),
                    record.destination,
                )
            } else {
                (None, None)
            }
        };

        tracing::debug!("Arrived: step {}/{}", next, total);
        self.notify(changed);
        if let Some(goal) = completed {
            tracing::info!("Navigation completed at {}", self.room_name(goal));
            self.emit(NavigationEvent::Completed(self.room_name(goal)));
        }
    }

    fn replan(&self, attempt: u64, from: RoomId) {
        let (goal, constraints, replans) = {
            let mut record = self.record.lock();
            if record.attempt != attempt {
                return;
            }
            let Some(goal) = record.destination else {
                return;
            };
            record.replans += 1;
            (goal, record.constraints.clone(), record.replans)
        };

        let budget = self.config.max_replans;
        if replans > budget {
            self.fail(
                attempt,
                format!("off route at {} after {} replans", from, budget),
            );
            return;
        }
        self.alert(format!(
            "Off route at {}; replanning ({}/{})",
            self.room_name(from),
            replans,
            budget
        ));

        let path = self.planner.plan(from, goal, &constraints);
        if !path.is_valid {
            let reason = path.failure_reason.as_deref().unwrap_or("no route");
            self.fail(attempt, format!("replan from {} failed: {}", from, reason));
            return;
        }
        if let Err(e) = self.check_route_safety(&path, &constraints) {
            self.fail(attempt, e.to_string());
            return;
        }

        let path = Arc::new(path);
        let arrived = path.steps.is_empty();
        let changed = {
            let mut record = self.record.lock();
            if record.attempt != attempt {
                return;
            }
            record.path = Some(Arc::clone(&path));
            self.step_index.store(0, Ordering::Release);
            self.total_steps.store(path.step_count(), Ordering::Release);
            self.context
                .replace(NavigationContext::for_step(Arc::clone(&path), 0));
            if arrived {
                record.completed_at = Some(Instant::now());
                self.executor.stop("destination reached");
                Self::set_state(&mut record, NavigationState::Completed)
            } else {
                // Keeps a pause in effect
                self.executor.replace(path.steps.clone(), 0);
                None
            }
        };

        tracing::info!(
            "Replanned from {}: {} steps to {}",
            self.room_name(from),
            path.step_count(),
            self.room_name(goal)
        );
        self.notify(changed);
        if arrived {
            self.emit(NavigationEvent::Completed(self.room_name(goal)));
        }
    }

    fn fail(&self, attempt: u64, reason: String) {
        let changed = {
            let mut record = self.record.lock();
            if record.attempt != attempt {
                return;
            }
            self.executor.stop(&reason);
            record.path = None;
            Self::set_state(&mut record, NavigationState::Error(reason.clone()))
        };
        tracing::error!("Navigation failed: {}", reason);
        self.notify(changed);
    }

    /// Time left before a completed attempt returns to Idle.
    pub(super) fn completion_wait(&self) -> Option<Duration> {
        let record = self.record.lock();
        if record.state != NavigationState::Completed {
            return None;
        }
        let done = record.completed_at?;
        Some((done + self.config.completion_grace()).saturating_duration_since(Instant::now()))
    }

    /// Move a completed attempt to Idle once its grace period has run out.
    pub(super) fn finish_completion(&self) {
        let changed = {
            let mut record = self.record.lock();
            let due = record.state == NavigationState::Completed
                && record
                    .completed_at
                    .is_some_and(|t| t.elapsed() >= self.config.completion_grace());
            if !due {
                return;
            }
            record.path = None;
            record.destination = None;
            record.completed_at = None;
            self.step_index.store(0, Ordering::Release);
            self.total_steps.store(0, Ordering::Release);
            self.context.replace(NavigationContext::resting_in(
                self.current_room.load(Ordering::Acquire),
            ));
            Self::set_state(&mut record, NavigationState::Idle)
        };
        self.notify(changed);
    }

    pub(super) fn status(&self) -> NavigationStatus {
        let (state, destination) = {
            let record = self.record.lock();
            (record.state.clone(), record.destination)
        };
        let telemetry = self.executor.telemetry();
        NavigationStatus {
            state,
            destination,
            current_room: self.current_room.load(Ordering::Acquire),
            confidence: self.confidence.load(Ordering::Acquire),
            step_index: self.step_index.load(Ordering::Acquire),
            total_steps: self.total_steps.load(Ordering::Acquire),
            mode: self.executor.mode(),
            commands_sent: telemetry.commands_sent(),
            combat_active: self.combat.load(Ordering::Acquire),
            health_percent: self.health_percent(),
        }
    }
}
