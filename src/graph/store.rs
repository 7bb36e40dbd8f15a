//! Immutable room graph loaded once from a JSON snapshot.
//!
//! Nodes live in a `Vec` with an id → index map for O(1) lookup; outgoing
//! edges are grouped per source node. Nothing mutates the graph after
//! construction, so `Arc<Graph>` is shared across threads without locks.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::model::{Direction, RoomEdge, RoomId, RoomNode};
use crate::error::{NavError, Result};
use crate::utils::normalize_label;

/// On-disk snapshot layout.
#[derive(Debug, Deserialize)]
struct Snapshot {
    rooms: Vec<RoomNode>,
    #[serde(default, alias = "edges")]
    exits: Vec<RoomEdge>,
}

/// Read-only room graph.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<RoomNode>,
    index: HashMap<RoomId, usize>,
    /// Outgoing edges per node, indexed like `nodes`
    adjacency: Vec<Vec<RoomEdge>>,
    /// Normalized label → rooms carrying it
    labels: HashMap<String, Vec<RoomId>>,
    edge_count: usize,
    /// Lowest movement cost per coordinate unit over same-region exits
    cost_per_distance: f32,
}

impl Graph {
    /// Load a graph snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NavError::Load(format!("Failed to read snapshot {:?}: {}", path, e))
        })?;
        let graph = Self::from_json_str(&content)?;
        tracing::info!(
            "Loaded room graph from {:?}: {} rooms, {} exits, {} distinct labels",
            path,
            graph.node_count(),
            graph.edge_count(),
            graph.labels.len()
        );
        Ok(graph)
    }

    /// Parse a graph snapshot from JSON text.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(content)?;
        Self::from_parts(snapshot.rooms, snapshot.exits)
    }

    /// Build a graph from rooms and exits, validating references.
    pub fn from_parts(nodes: Vec<RoomNode>, edges: Vec<RoomEdge>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(NavError::Load("Snapshot contains no rooms".to_string()));
        }

        let mut index = HashMap::with_capacity(nodes.len());
        let mut labels: HashMap<String, Vec<RoomId>> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if node.id == RoomId::UNKNOWN {
                return Err(NavError::Load(format!(
                    "Room id {} is reserved",
                    node.id
                )));
            }
            if index.insert(node.id, i).is_some() {
                return Err(NavError::Load(format!("Duplicate room id {}", node.id)));
            }
            labels
                .entry(normalize_label(&node.label))
                .or_default()
                .push(node.id);
        }

        let mut adjacency = vec![Vec::new(); nodes.len()];
        let edge_count = edges.len();
        let mut cost_per_distance = f32::INFINITY;
        for edge in edges {
            let Some(&source) = index.get(&edge.from) else {
                return Err(NavError::Load(format!(
                    "Exit references unknown source room {}",
                    edge.from
                )));
            };
            let Some(&target) = index.get(&edge.to) else {
                return Err(NavError::Load(format!(
                    "Exit {} -{}-> references unknown target room {}",
                    edge.from, edge.direction, edge.to
                )));
            };
            let distance = nodes[source].distance_to(&nodes[target]);
            if distance > 0.0 {
                cost_per_distance = cost_per_distance.min(edge.movement_cost() as f32 / distance);
            }
            adjacency[source].push(edge);
        }
        if !cost_per_distance.is_finite() {
            cost_per_distance = 0.0;
        }

        Ok(Self {
            nodes,
            index,
            adjacency,
            labels,
            edge_count,
            cost_per_distance,
        })
    }

    /// Get a room by id.
    pub fn node(&self, id: RoomId) -> Option<&RoomNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Outgoing exits of a room; empty if the id is unknown.
    pub fn outgoing(&self, id: RoomId) -> &[RoomEdge] {
        match self.index.get(&id) {
            Some(&i) => &self.adjacency[i],
            None => &[],
        }
    }

    /// Rooms matching a predicate, in snapshot order, up to `limit`.
    pub fn find_nodes<P>(&self, predicate: P, limit: usize) -> Vec<&RoomNode>
    where
        P: Fn(&RoomNode) -> bool,
    {
        self.nodes
            .iter()
            .filter(|n| predicate(n))
            .take(limit)
            .collect()
    }

    /// Rooms whose normalized label equals the normalized `label`.
    pub fn nodes_with_label(&self, label: &str) -> &[RoomId] {
        self.labels
            .get(&normalize_label(label))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterate distinct normalized labels with their rooms.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &[RoomId])> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// The exit leaving `from` in `direction`, if any.
    pub fn edge_between(&self, from: RoomId, direction: &Direction) -> Option<&RoomEdge> {
        self.outgoing(from).iter().find(|e| &e.direction == direction)
    }

    /// Every exit leading directly from `from` to `to`.
    pub fn edges_between(&self, from: RoomId, to: RoomId) -> impl Iterator<Item = &RoomEdge> {
        self.outgoing(from).iter().filter(move |e| e.to == to)
    }

    /// Whether any exit connects `from` directly to `to`.
    pub fn is_adjacent(&self, from: RoomId, to: RoomId) -> bool {
        self.outgoing(from).iter().any(|e| e.to == to)
    }

    /// All rooms in snapshot order.
    pub fn nodes(&self) -> &[RoomNode] {
        &self.nodes
    }

    /// Dense index of a room, for planner score tables.
    pub(crate) fn dense_index(&self, id: RoomId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Room at a dense index.
    pub(crate) fn node_at(&self, idx: usize) -> &RoomNode {
        &self.nodes[idx]
    }

    /// Outgoing exits at a dense index.
    pub(crate) fn outgoing_at(&self, idx: usize) -> &[RoomEdge] {
        &self.adjacency[idx]
    }

    /// Number of rooms.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of exits.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Lower bound on movement cost per unit of coordinate distance.
    ///
    /// Taken over exits whose endpoints share a region and sit at distinct
    /// coordinates; 0 when there are none. Scaling coordinate distance by
    /// this never overestimates the cost of a route inside one region.
    pub fn cost_per_distance(&self) -> f32 {
        self.cost_per_distance
    }
}
