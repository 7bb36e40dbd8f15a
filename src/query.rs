//! Room lookup for destination entry and display.
//!
//! Queries read the immutable graph and the current-room atomic only, so
//! they never contend with navigation.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::{NavError, Result};
use crate::graph::{Graph, RoomId, RoomNode};
use crate::planning::PathPlanner;
use crate::shared::AtomicRoom;
use crate::utils::{normalize_label, normalized_similarity};

/// Labels scoring below this are not suggested.
const SUGGEST_FLOOR: f32 = 0.4;

/// Candidates ranked by text before distances are computed, per result.
const DISTANCE_FANOUT: usize = 4;

/// Where to navigate to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Id(RoomId),
    Name(String),
}

impl FromStr for Destination {
    type Err = std::convert::Infallible;

    /// Numeric text (optionally `#`-prefixed) is a room id; anything else
    /// is a name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        Ok(match digits.parse::<u32>() {
            Ok(id) => Destination::Id(RoomId(id)),
            Err(_) => Destination::Name(trimmed.to_string()),
        })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Id(id) => write!(f, "{}", id),
            Destination::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// A ranked room suggestion.
#[derive(Clone, Debug, PartialEq)]
pub struct Suggestion {
    pub room_id: RoomId,
    pub label: String,
    pub region: String,
    /// Text match quality in [0, 1]
    pub score: f32,
    /// Unconstrained steps from the reference room, if reachable
    pub distance: Option<usize>,
}

/// Text search and suggestions over the room graph.
#[derive(Clone)]
pub struct RoomQuery {
    graph: Arc<Graph>,
    planner: PathPlanner,
    current_room: Arc<AtomicRoom>,
}

/// Text score of `label` against `input`, both normalized. Substring hits
/// rank above plain edit-distance matches.
fn text_score(input: &str, label: &str) -> f32 {
    let similarity = normalized_similarity(input, label);
    if !input.is_empty() && label.contains(input) {
        let coverage = input.len() as f32 / label.len().max(1) as f32;
        similarity.max(0.75 + 0.25 * coverage)
    } else {
        similarity
    }
}

fn by_distance(a: Option<usize>, b: Option<usize>) -> CmpOrdering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    }
}

impl RoomQuery {
    pub fn new(graph: Arc<Graph>, planner: PathPlanner, current_room: Arc<AtomicRoom>) -> Self {
        Self {
            graph,
            planner,
            current_room,
        }
    }

    pub fn current_room(&self) -> Option<RoomId> {
        self.current_room.load(Ordering::Acquire)
    }

    /// Rooms whose label contains `substring` (case-insensitive), in
    /// snapshot order.
    pub fn find_rooms_by_text(&self, substring: &str, limit: usize) -> Vec<&RoomNode> {
        let needle = normalize_label(substring);
        if needle.is_empty() {
            return Vec::new();
        }
        self.graph
            .find_nodes(|n| normalize_label(&n.label).contains(&needle), limit)
    }

    /// Ranked rooms for free-text `input`, annotated with the distance from
    /// the current room.
    pub fn suggest(&self, input: &str, limit: usize) -> Vec<Suggestion> {
        self.suggest_from(input, self.current_room(), limit)
    }

    /// Like [`suggest`](Self::suggest) with an explicit reference room.
    pub fn suggest_from(&self, input: &str, from: Option<RoomId>, limit: usize) -> Vec<Suggestion> {
        let needle = normalize_label(input);
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(f32, RoomId)> = self
            .graph
            .labels()
            .filter_map(|(label, rooms)| {
                let score = text_score(&needle, label);
                (score >= SUGGEST_FLOOR).then_some((score, rooms))
            })
            .flat_map(|(score, rooms)| rooms.iter().map(move |&r| (score, r)))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(limit.saturating_mul(DISTANCE_FANOUT));

        let mut suggestions: Vec<Suggestion> = scored
            .into_iter()
            .filter_map(|(score, room)| {
                let node = self.graph.node(room)?;
                Some(Suggestion {
                    room_id: room,
                    label: node.label.clone(),
                    region: node.region.clone(),
                    score,
                    distance: from.and_then(|f| self.planner.distance(f, room)),
                })
            })
            .collect();
        suggestions.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(by_distance(a.distance, b.distance))
                .then(a.room_id.cmp(&b.room_id))
        });
        suggestions.truncate(limit);
        suggestions
    }

    /// Resolve a destination to a room id.
    ///
    /// Names prefer an exact label match, nearest first by unconstrained
    /// distance; failing that, the best suggestion.
    pub fn resolve_destination(&self, destination: &Destination) -> Result<RoomId> {
        match destination {
            Destination::Id(id) => self
                .graph
                .node(*id)
                .map(|n| n.id)
                .ok_or(NavError::UnknownRoom(*id)),
            Destination::Name(name) => {
                let exact = self.graph.nodes_with_label(name);
                if !exact.is_empty() {
                    let from = self.current_room();
                    let nearest = exact.iter().copied().min_by(|&a, &b| {
                        let da = from.and_then(|f| self.planner.distance(f, a));
                        let db = from.and_then(|f| self.planner.distance(f, b));
                        by_distance(da, db).then(a.cmp(&b))
                    });
                    if let Some(room) = nearest {
                        return Ok(room);
                    }
                }
                self.suggest(name, 1)
                    .first()
                    .map(|s| s.room_id)
                    .ok_or_else(|| NavError::UnknownDestination(name.clone()))
            }
        }
    }
}
