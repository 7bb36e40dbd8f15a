//! Route planning over the room graph.
//!
//! This module provides:
//! - Per-request navigation constraints (hard exclusions + soft preferences)
//! - A* planner for constrained routes and unconstrained step distances

mod astar;
mod constraints;

pub use astar::PathPlanner;
pub use constraints::NavigationConstraints;
