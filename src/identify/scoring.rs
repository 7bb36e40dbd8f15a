//! Candidate scoring signals for the full identification tier.
//!
//! Each signal yields a score in [0, 1]. `path` and `context` are absent
//! (`None`) when the navigation context carries nothing to compare against;
//! absent signals drop out of the blend and the remaining weights are
//! renormalized.

use std::collections::BTreeSet;

use crate::graph::{Direction, Graph, RoomId};
use crate::types::NavigationContext;

/// Per-signal blend weights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Weights {
    pub name: f32,
    pub exits: f32,
    pub path: f32,
    pub context: f32,
}

impl Weights {
    pub const BASELINE: Weights = Weights {
        name: 0.35,
        exits: 0.25,
        path: 0.25,
        context: 0.15,
    };

    /// Used once any candidate sits convincingly on the planned path.
    pub const PATH_LED: Weights = Weights {
        name: 0.25,
        exits: 0.20,
        path: 0.40,
        context: 0.15,
    };
}

/// Path score above which the blend switches to `Weights::PATH_LED`.
pub(crate) const PATH_LED_THRESHOLD: f32 = 0.8;

/// Raw signal values for one candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SignalScores {
    pub name: f32,
    pub exits: f32,
    pub path: Option<f32>,
    pub context: Option<f32>,
}

impl SignalScores {
    /// Weighted mean over the signals that are present.
    pub fn blend(&self, w: &Weights) -> f32 {
        let mut total = w.name * self.name + w.exits * self.exits;
        let mut weight = w.name + w.exits;
        if let Some(path) = self.path {
            total += w.path * path;
            weight += w.path;
        }
        if let Some(context) = self.context {
            total += w.context * context;
            weight += w.context;
        }
        if weight <= 0.0 {
            return 0.0;
        }
        (total / weight).clamp(0.0, 1.0)
    }
}

/// Directions a visitor can see leaving `room`: every non-hidden exit.
pub(crate) fn visible_exits(graph: &Graph, room: RoomId) -> BTreeSet<Direction> {
    graph
        .outgoing(room)
        .iter()
        .filter(|e| !e.is_hidden)
        .map(|e| e.direction.clone())
        .collect()
}

/// Exit-set agreement. Identical sets score 1.0; otherwise Jaccard
/// similarity scaled down and penalized per missing or extra exit.
pub(crate) fn exit_score(observed: &BTreeSet<Direction>, actual: &BTreeSet<Direction>) -> f32 {
    if observed == actual {
        return 1.0;
    }
    let shared = observed.intersection(actual).count();
    let union = observed.union(actual).count();
    let missing = actual.difference(observed).count();
    let extra = observed.difference(actual).count();
    let jaccard = shared as f32 / union as f32;
    (0.9 * jaccard - 0.05 * (missing + extra) as f32).max(0.0)
}

/// Agreement with the planned path, absent without an expected room.
pub(crate) fn path_score(candidate: RoomId, ctx: &NavigationContext) -> Option<f32> {
    let expected = ctx.expected_room?;
    if candidate == expected {
        return Some(0.95);
    }
    let on_path = ctx.path.as_ref().and_then(|path| {
        let idx = path.position_of(candidate)?;
        let len = path.step_count().max(1) as f32;
        let offset = idx.abs_diff(ctx.current_step_index) as f32;
        Some(0.6 * (1.0 - offset / len).max(0.0))
    });
    Some(on_path.unwrap_or(0.1))
}

/// Agreement with the last move, absent without a previous room.
pub(crate) fn context_score(
    graph: &Graph,
    candidate: RoomId,
    ctx: &NavigationContext,
) -> Option<f32> {
    let previous = ctx.previous_room?;
    let adjacent = graph.is_adjacent(previous, candidate) || graph.is_adjacent(candidate, previous);

    let Some(direction) = &ctx.last_direction else {
        // Standing still: staying put is the likeliest explanation
        let score = if candidate == previous {
            0.7
        } else if adjacent {
            0.6
        } else {
            0.1
        };
        return Some(score);
    };

    if candidate == previous {
        return Some(0.05);
    }
    let forward = graph
        .edge_between(previous, direction)
        .is_some_and(|e| e.to == candidate);
    let reverse = direction.opposite().is_some_and(|back| {
        graph
            .edge_between(candidate, &back)
            .is_some_and(|e| e.to == previous)
    });
    let score = if forward || reverse {
        0.9
    } else if adjacent {
        0.5
    } else {
        0.1
    };
    Some(score)
}
