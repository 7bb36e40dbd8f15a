//! Value types shared between planner, identifier, executor and coordinator.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::graph::{Direction, RoomId};

/// A parsed room description as delivered by the text parser.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoomState {
    pub label: String,
    pub exits: Vec<Direction>,
    pub items: Vec<String>,
    pub monsters: Vec<String>,
}

impl RoomState {
    pub fn new(label: impl Into<String>, exits: Vec<Direction>) -> Self {
        Self {
            label: label.into(),
            exits,
            items: Vec::new(),
            monsters: Vec::new(),
        }
    }

    /// Build from exit strings as printed by the world ("north", "e", ...).
    pub fn with_exit_names<S: AsRef<str>>(label: impl Into<String>, exits: &[S]) -> Self {
        Self::new(
            label,
            exits.iter().map(|e| Direction::parse(e.as_ref())).collect(),
        )
    }
}

/// One move along a planned route.
#[derive(Clone, Debug, PartialEq)]
pub struct NavigationStep {
    pub from: RoomId,
    pub to: RoomId,
    pub direction: Direction,
    pub requires_door: bool,
    pub is_hidden: bool,
    /// Expected time for the move to complete (used by timed mode)
    pub estimated_delay: Duration,
}

/// A planned route. Immutable once returned.
#[derive(Clone, Debug, PartialEq)]
pub struct NavigationPath {
    pub steps: Vec<NavigationStep>,
    pub is_valid: bool,
    pub total_cost: f32,
    pub failure_reason: Option<String>,
}

impl NavigationPath {
    /// A valid path (possibly empty when start == goal).
    pub fn found(steps: Vec<NavigationStep>, total_cost: f32) -> Self {
        Self {
            steps,
            is_valid: true,
            total_cost,
            failure_reason: None,
        }
    }

    /// An invalid path carrying the reason planning failed.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            is_valid: false,
            total_cost: f32::INFINITY,
            failure_reason: Some(reason.into()),
        }
    }

    /// Number of moves.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Rooms visited after leaving the start, in order.
    pub fn rooms(&self) -> impl Iterator<Item = RoomId> + '_ {
        self.steps.iter().map(|s| s.to)
    }

    /// Destination room, if the path has at least one step.
    pub fn destination(&self) -> Option<RoomId> {
        self.steps.last().map(|s| s.to)
    }

    /// Index of the step arriving at `room`, if the path visits it.
    pub fn position_of(&self, room: RoomId) -> Option<usize> {
        self.steps.iter().position(|s| s.to == room)
    }
}

/// Disambiguation signal for the identifier.
///
/// Only the coordinator writes it, by replacing the shared snapshot.
#[derive(Clone, Debug, Default)]
pub struct NavigationContext {
    pub previous_room: Option<RoomId>,
    pub expected_room: Option<RoomId>,
    pub last_direction: Option<Direction>,
    pub path: Option<Arc<NavigationPath>>,
    pub current_step_index: usize,
    pub last_movement_at: Option<Instant>,
}

impl NavigationContext {
    /// Context for an idle client standing in a known room.
    pub fn resting_in(room: Option<RoomId>) -> Self {
        Self {
            previous_room: room,
            ..Self::default()
        }
    }

    /// Context while executing `step_index` of `path`.
    pub fn for_step(path: Arc<NavigationPath>, step_index: usize) -> Self {
        let step = path.steps.get(step_index);
        Self {
            previous_room: step.map(|s| s.from),
            expected_room: step.map(|s| s.to),
            last_direction: step.map(|s| s.direction.clone()),
            current_step_index: step_index,
            last_movement_at: Some(Instant::now()),
            path: Some(path),
        }
    }
}

/// Policy trading speed against confirmation-based reliability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementMode {
    /// Wait for arrival confirmation (bounded by a fallback timeout)
    #[default]
    Reliable,
    /// Race a short delay against confirmation
    Balanced,
    /// Fixed short delay with door/hidden surcharges; no confirmation wait
    Fast,
    /// Per-step delay from edge properties; confirmation ignored
    #[serde(alias = "legacy")]
    Timed,
}

impl MovementMode {
    pub fn as_u8(self) -> u8 {
        match self {
            MovementMode::Reliable => 0,
            MovementMode::Balanced => 1,
            MovementMode::Fast => 2,
            MovementMode::Timed => 3,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => MovementMode::Balanced,
            2 => MovementMode::Fast,
            3 => MovementMode::Timed,
            _ => MovementMode::Reliable,
        }
    }
}

impl FromStr for MovementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reliable" => Ok(MovementMode::Reliable),
            "balanced" => Ok(MovementMode::Balanced),
            "fast" => Ok(MovementMode::Fast),
            "timed" | "legacy" => Ok(MovementMode::Timed),
            other => Err(format!("unknown movement mode '{}'", other)),
        }
    }
}

impl fmt::Display for MovementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MovementMode::Reliable => "reliable",
            MovementMode::Balanced => "balanced",
            MovementMode::Fast => "fast",
            MovementMode::Timed => "timed",
        };
        f.write_str(name)
    }
}

/// Why navigation is paused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PauseReason {
    /// Caller-requested pause; never resumed automatically
    User(String),
    /// Safety loop pause; resumed when health recovers
    LowHealth,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::User(reason) => f.write_str(reason),
            PauseReason::LowHealth => f.write_str("low health"),
        }
    }
}

/// Authoritative navigation state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavigationState {
    Idle,
    Navigating,
    Paused(PauseReason),
    Completed,
    Error(String),
}

impl NavigationState {
    /// Navigating or paused: an attempt is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, NavigationState::Navigating | NavigationState::Paused(_))
    }
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationState::Idle => f.write_str("Idle"),
            NavigationState::Navigating => f.write_str("Navigating"),
            NavigationState::Paused(reason) => write!(f, "Paused ({})", reason),
            NavigationState::Completed => f.write_str("Completed"),
            NavigationState::Error(e) => write!(f, "Error ({})", e),
        }
    }
}
