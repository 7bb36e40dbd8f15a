//! Two-tier room identification with a context-keyed match cache.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::cache::ShardedCache;
use super::scoring::{
    PATH_LED_THRESHOLD, SignalScores, Weights, context_score, exit_score, path_score,
    visible_exits,
};
use crate::config::IdentifierConfig;
use crate::graph::{Direction, Graph, RoomId};
use crate::types::{NavigationContext, RoomState};
use crate::utils::{label_similarity, normalize_label, normalized_similarity};

/// Most runners-up reported with a match.
const MAX_ALTERNATIVES: usize = 3;

/// How a match was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchTier {
    /// Expected room's label matched
    Fast,
    /// Full contextual scoring
    Full,
    /// Full-tier result served from the cache
    Cached,
}

/// A scored runner-up.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchCandidate {
    pub room: RoomId,
    pub score: f32,
}

/// Outcome of resolving one observed room.
#[derive(Clone, Debug, PartialEq)]
pub struct RoomMatchResult {
    pub room: RoomId,
    pub confidence: f32,
    pub tier: MatchTier,
    pub alternatives: Vec<MatchCandidate>,
}

/// Everything the full tier's answer depends on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct MatchKey {
    label: String,
    exits: Vec<Direction>,
    previous: Option<RoomId>,
    expected: Option<RoomId>,
    direction: Option<Direction>,
    step_index: usize,
    /// (destination, step count) of the active path
    path: Option<(Option<RoomId>, usize)>,
}

impl MatchKey {
    fn new(label: &str, exits: &BTreeSet<Direction>, ctx: &NavigationContext) -> Self {
        Self {
            label: label.to_string(),
            exits: exits.iter().cloned().collect(),
            previous: ctx.previous_room,
            expected: ctx.expected_room,
            direction: ctx.last_direction.clone(),
            step_index: ctx.current_step_index,
            path: ctx
                .path
                .as_ref()
                .map(|p| (p.destination(), p.step_count())),
        }
    }
}

/// Maps an observed `RoomState` to a graph node.
///
/// Thread-safe; the coordinator event thread and ad-hoc callers may resolve
/// concurrently. The graph is immutable and the cache is sharded.
pub struct RoomIdentifier {
    graph: Arc<Graph>,
    config: IdentifierConfig,
    cache: ShardedCache<MatchKey, RoomMatchResult>,
}

impl RoomIdentifier {
    pub fn new(graph: Arc<Graph>, config: IdentifierConfig) -> Self {
        let cache = ShardedCache::new(
            config.cache_capacity,
            config.cache_shards,
            config.cache_ttl(),
        );
        Self {
            graph,
            config,
            cache,
        }
    }

    pub fn with_defaults(graph: Arc<Graph>) -> Self {
        Self::new(graph, IdentifierConfig::default())
    }

    /// Resolve which room `state` describes, given the navigation context.
    ///
    /// Returns `None` when nothing scores at least `min_confidence`.
    pub fn resolve(
        &self,
        state: &RoomState,
        ctx: &NavigationContext,
    ) -> Option<RoomMatchResult> {
        if let Some(hit) = self.fast_tier(state, ctx) {
            return Some(hit);
        }

        let label = normalize_label(&state.label);
        let observed: BTreeSet<Direction> = state.exits.iter().cloned().collect();
        let key = MatchKey::new(&label, &observed, ctx);

        if let Some(mut cached) = self.cache.get(&key) {
            cached.tier = MatchTier::Cached;
            tracing::trace!("Cache hit for '{}' -> {}", label, cached.room);
            return Some(cached);
        }

        let result = self.full_tier(&label, &observed, ctx)?;
        self.cache.insert(key, result.clone());
        Some(result)
    }

    /// Entries currently held in the match cache.
    pub fn cached_matches(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn fast_tier(&self, state: &RoomState, ctx: &NavigationContext) -> Option<RoomMatchResult> {
        let expected = ctx.expected_room?;
        let node = self.graph.node(expected)?;
        let similarity = label_similarity(&state.label, &node.label);
        if similarity < self.config.near_exact_similarity {
            return None;
        }
        tracing::trace!("Fast tier matched expected room {}", expected);
        Some(RoomMatchResult {
            room: expected,
            confidence: self.config.fast_tier_confidence,
            tier: MatchTier::Fast,
            alternatives: Vec::new(),
        })
    }

    fn candidates(&self, label: &str) -> Vec<RoomId> {
        let exact = self.graph.nodes_with_label(label);
        if !exact.is_empty() {
            return exact.to_vec();
        }
        let mut fuzzy: Vec<RoomId> = self
            .graph
            .labels()
            .filter(|(known, _)| {
                normalized_similarity(label, known) >= self.config.candidate_similarity
            })
            .flat_map(|(_, rooms)| rooms.iter().copied())
            .collect();
        fuzzy.sort_unstable();
        fuzzy
    }

    fn full_tier(
        &self,
        label: &str,
        observed: &BTreeSet<Direction>,
        ctx: &NavigationContext,
    ) -> Option<RoomMatchResult> {
        let candidates = self.candidates(label);
        if candidates.is_empty() {
            tracing::debug!("No candidate rooms for '{}'", label);
            return None;
        }

        let signals: Vec<(RoomId, SignalScores)> = candidates
            .into_iter()
            .filter_map(|room| {
                let node = self.graph.node(room)?;
                let scores = SignalScores {
                    name: normalized_similarity(label, &normalize_label(&node.label)),
                    exits: exit_score(observed, &visible_exits(&self.graph, room)),
                    path: path_score(room, ctx),
                    context: context_score(&self.graph, room, ctx),
                };
                Some((room, scores))
            })
            .collect();

        let weights = if signals
            .iter()
            .any(|(_, s)| s.path.is_some_and(|p| p > PATH_LED_THRESHOLD))
        {
            Weights::PATH_LED
        } else {
            Weights::BASELINE
        };

        let mut ranked: Vec<MatchCandidate> = signals
            .iter()
            .map(|(room, s)| MatchCandidate {
                room: *room,
                score: s.blend(&weights),
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.room.cmp(&b.room)));

        let mut ranked = ranked.into_iter();
        let best = ranked.next()?;
        if best.score < self.config.min_confidence {
            tracing::debug!(
                "Best match for '{}' is {} at {:.2}, below {:.2}",
                label,
                best.room,
                best.score,
                self.config.min_confidence
            );
            return None;
        }

        let alternatives: Vec<MatchCandidate> = ranked.take(MAX_ALTERNATIVES).collect();
        tracing::debug!(
            "Identified '{}' as {} ({:.2}, {} alternatives)",
            label,
            best.room,
            best.score,
            alternatives.len()
        );
        Some(RoomMatchResult {
            room: best.room,
            confidence: best.score,
            tier: MatchTier::Full,
            alternatives,
        })
    }
}
