//! A* route planner over the room graph.
//!
//! Search states are keyed by the graph's dense node index. Under a
//! `max_path_length` the key also carries the step count, so a cheap but
//! long arrival cannot shadow a shorter one that still fits the limit; a
//! state is skipped once another arrival at the same room was expanded with
//! no more steps and no more cost. The open set is a `BinaryHeap` with
//! reversed ordering so the lowest f-score pops first; ties prefer fewer
//! steps, then lower index, so results are deterministic.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use super::constraints::NavigationConstraints;
use crate::config::PlannerConfig;
use crate::graph::{Graph, RoomEdge, RoomId, RoomNode};
use crate::types::{NavigationPath, NavigationStep};

/// Costs closer than this are treated as equal for tie-breaking.
const COST_EPSILON: f32 = 1e-4;

/// What the search optimizes.
enum SearchPolicy<'a> {
    /// Movement cost plus danger penalty, honoring hard constraints
    Constrained(&'a NavigationConstraints),
    /// Step count only, everything allowed
    Distance,
}

/// Search state: dense node index and step layer. The layer is the step
/// count under a step limit and always 0 otherwise.
type StateKey = (usize, usize);

/// Best known arrival at a search state.
#[derive(Clone, Copy)]
struct Label {
    g: f32,
    steps: usize,
    /// (previous state, position in its node's outgoing list)
    came_from: Option<(StateKey, usize)>,
}

/// Entry in the open set (min-heap via reversed ordering).
struct OpenEntry {
    node: usize,
    layer: usize,
    f_score: f32,
    g: f32,
    steps: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score is "greatest".
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.steps.cmp(&self.steps))
            .then_with(|| other.node.cmp(&self.node))
            .then_with(|| other.layer.cmp(&self.layer))
    }
}

/// Route planner. Cheap to clone; shares the graph.
#[derive(Clone)]
pub struct PathPlanner {
    graph: Arc<Graph>,
    config: PlannerConfig,
}

impl PathPlanner {
    /// Create a planner over `graph`.
    pub fn new(graph: Arc<Graph>, config: PlannerConfig) -> Self {
        Self { graph, config }
    }

    /// Create a planner with default configuration.
    pub fn with_defaults(graph: Arc<Graph>) -> Self {
        Self::new(graph, PlannerConfig::default())
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Plan a constrained route from `from` to `to`.
    ///
    /// Returns an invalid path with a reason when no route satisfies the
    /// constraints or the search budget runs out.
    pub fn plan(
        &self,
        from: RoomId,
        to: RoomId,
        constraints: &NavigationConstraints,
    ) -> NavigationPath {
        if let Some(goal) = self.graph.node(to)
            && from != to
            && constraints.should_avoid_room(goal)
        {
            return NavigationPath::failed(format!(
                "destination {} violates route constraints",
                to
            ));
        }
        let path = self.search(from, to, &SearchPolicy::Constrained(constraints));
        if path.is_valid {
            tracing::debug!(
                "Planned {} -> {}: {} steps, cost {:.1}",
                from,
                to,
                path.step_count(),
                path.total_cost
            );
        } else {
            tracing::warn!(
                "No route {} -> {}: {}",
                from,
                to,
                path.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
        path
    }

    /// Fewest-steps route with every constraint disabled.
    ///
    /// Used to report true distances; never the route actually walked.
    pub fn shortest_path_unconstrained(&self, from: RoomId, to: RoomId) -> NavigationPath {
        self.search(from, to, &SearchPolicy::Distance)
    }

    /// Unconstrained step distance, if the rooms are connected.
    pub fn distance(&self, from: RoomId, to: RoomId) -> Option<usize> {
        let path = self.shortest_path_unconstrained(from, to);
        path.is_valid.then(|| path.step_count())
    }

    fn search(&self, from: RoomId, to: RoomId, policy: &SearchPolicy<'_>) -> NavigationPath {
        let (Some(start), Some(goal)) = (self.graph.dense_index(from), self.graph.dense_index(to))
        else {
            let unknown = if self.graph.node(from).is_none() { from } else { to };
            return NavigationPath::failed(format!("unknown room {}", unknown));
        };
        if start == goal {
            return NavigationPath::found(Vec::new(), 0.0);
        }

        let goal_node = self.graph.node_at(goal);
        let max_steps = match policy {
            SearchPolicy::Constrained(c) => c.max_path_length,
            SearchPolicy::Distance => None,
        };
        // With a step limit a room reached in fewer steps is a different
        // state from the same room reached more cheaply but later.
        let layer = |steps: usize| if max_steps.is_some() { steps } else { 0 };

        let start_key = (start, 0);
        let mut labels: HashMap<StateKey, Label> = HashMap::new();
        // (steps, g) of expanded states per node, for dominance checks
        let mut settled: Vec<Vec<(usize, f32)>> = vec![Vec::new(); self.graph.node_count()];

        labels.insert(
            start_key,
            Label {
                g: 0.0,
                steps: 0,
                came_from: None,
            },
        );

        let mut open = BinaryHeap::new();
        open.push(OpenEntry {
            node: start,
            layer: 0,
            f_score: self.heuristic(policy, self.graph.node_at(start), goal_node),
            g: 0.0,
            steps: 0,
        });

        let mut expansions = 0usize;
        let mut pruned_by_length = false;

        while let Some(current) = open.pop() {
            let key = (current.node, current.layer);
            let Some(&Label {
                g: current_g,
                steps: current_steps,
                ..
            }) = labels.get(&key)
            else {
                continue;
            };
            // Stale entry; a state whose cost improved is expanded again
            if current.g > current_g + COST_EPSILON || current.steps > current_steps {
                continue;
            }
            if current.node == goal {
                return self.reconstruct(&labels, start_key, key, current_g);
            }

            let ci = current.node;
            if max_steps.is_some() {
                let dominated = settled[ci]
                    .iter()
                    .any(|&(s, g)| s <= current_steps && g <= current_g + COST_EPSILON);
                if dominated {
                    continue;
                }
                settled[ci].push((current_steps, current_g));
            }

            expansions += 1;
            if expansions > self.config.max_expansions {
                return NavigationPath::failed(format!(
                    "search exceeded {} expansions",
                    self.config.max_expansions
                ));
            }

            for (pos, edge) in self.graph.outgoing_at(ci).iter().enumerate() {
                let Some(ni) = self.graph.dense_index(edge.to) else {
                    continue;
                };
                let tentative_steps = current_steps + 1;
                let next_key = (ni, layer(tentative_steps));
                let target = self.graph.node_at(ni);
                let Some(weight) = self.edge_weight(policy, edge, target) else {
                    continue;
                };
                if max_steps.is_some_and(|max| tentative_steps > max) {
                    pruned_by_length = true;
                    continue;
                }
                let tentative_g = current_g + weight;

                let better = match labels.get(&next_key) {
                    None => true,
                    Some(known) => {
                        tentative_g < known.g - COST_EPSILON
                            || ((tentative_g - known.g).abs() <= COST_EPSILON
                                && tentative_steps < known.steps)
                    }
                };
                if better {
                    labels.insert(
                        next_key,
                        Label {
                            g: tentative_g,
                            steps: tentative_steps,
                            came_from: Some((key, pos)),
                        },
                    );
                    open.push(OpenEntry {
                        node: ni,
                        layer: next_key.1,
                        f_score: tentative_g + self.heuristic(policy, target, goal_node),
                        g: tentative_g,
                        steps: tentative_steps,
                    });
                }
            }
        }

        if pruned_by_length {
            NavigationPath::failed(format!(
                "no route within {} steps",
                max_steps.unwrap_or_default()
            ))
        } else {
            NavigationPath::failed("no route satisfies the constraints")
        }
    }

    /// Traversal weight, or `None` when the move is excluded.
    fn edge_weight(
        &self,
        policy: &SearchPolicy<'_>,
        edge: &RoomEdge,
        target: &RoomNode,
    ) -> Option<f32> {
        match policy {
            SearchPolicy::Distance => Some(1.0),
            SearchPolicy::Constrained(c) => {
                if c.should_avoid_edge(edge) || c.should_avoid_room(target) {
                    return None;
                }
                let mut penalty = self.config.danger_weight * target.danger_level() as f32;
                if c.is_preferred(target) {
                    penalty *= 0.5;
                }
                Some(edge.movement_cost() as f32 + penalty)
            }
        }
    }

    /// Coordinate distance scaled by the graph's cheapest cost per unit,
    /// zero for step counting.
    ///
    /// With `heuristic_scale` at 1.0 this is a lower bound on the cost of
    /// any route that stays inside the goal's region, so those routes come
    /// out optimal. Larger scales trade optimality for fewer expansions.
    #[inline]
    fn heuristic(&self, policy: &SearchPolicy<'_>, from: &RoomNode, goal: &RoomNode) -> f32 {
        match policy {
            SearchPolicy::Constrained(_) => {
                self.config.heuristic_scale * self.graph.cost_per_distance() * from.distance_to(goal)
            }
            SearchPolicy::Distance => 0.0,
        }
    }

    /// Rebuild the step list from came-from data.
    fn reconstruct(
        &self,
        labels: &HashMap<StateKey, Label>,
        start: StateKey,
        goal: StateKey,
        total_cost: f32,
    ) -> NavigationPath {
        let mut steps = Vec::new();
        let mut current = goal;

        while current != start {
            let Some((prev, pos)) = labels.get(&current).and_then(|l| l.came_from) else {
                break;
            };
            let edge = &self.graph.outgoing_at(prev.0)[pos];
            steps.push(NavigationStep {
                from: edge.from,
                to: edge.to,
                direction: edge.direction.clone(),
                requires_door: edge.requires_door,
                is_hidden: edge.is_hidden,
                estimated_delay: self.estimated_delay(edge),
            });
            current = prev;
        }

        steps.reverse();
        NavigationPath::found(steps, total_cost)
    }

    fn estimated_delay(&self, edge: &RoomEdge) -> Duration {
        let mut ms = self.config.step_delay_ms;
        if edge.requires_door {
            ms += self.config.door_delay_ms;
        }
        if edge.is_hidden {
            ms += self.config.hidden_delay_ms;
        }
        Duration::from_millis(ms)
    }
}
