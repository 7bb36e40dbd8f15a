//! Per-request route constraints.

use std::collections::HashSet;

use crate::graph::{RoomEdge, RoomId, RoomNode};

/// Route restrictions supplied with each planning request.
///
/// Hard rules (`should_avoid_room` / `should_avoid_edge`) exclude rooms and
/// exits from the search entirely; `preferred_tags` only softens penalties.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NavigationConstraints {
    pub avoid_dangerous_rooms: bool,
    pub avoid_traps: bool,
    pub avoid_hidden_exits: bool,
    pub avoid_doors: bool,
    /// Longest route accepted, in steps
    pub max_path_length: Option<usize>,
    /// Highest room danger level allowed on the route
    pub max_danger_level: Option<u32>,
    /// Regions whose danger penalty is halved
    pub preferred_tags: Vec<String>,
    pub forbidden_room_ids: HashSet<RoomId>,
}

impl NavigationConstraints {
    /// No restrictions at all.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Avoid traps and dangerous rooms; the usual choice for travel.
    pub fn cautious() -> Self {
        Self {
            avoid_dangerous_rooms: true,
            avoid_traps: true,
            ..Self::default()
        }
    }

    pub fn should_avoid_room(&self, room: &RoomNode) -> bool {
        if self.forbidden_room_ids.contains(&room.id) {
            return true;
        }
        if self.avoid_traps && room.has_trap {
            return true;
        }
        if self.avoid_dangerous_rooms && room.is_dangerous() {
            return true;
        }
        matches!(self.max_danger_level, Some(max) if room.danger_level() > max)
    }

    pub fn should_avoid_edge(&self, edge: &RoomEdge) -> bool {
        (self.avoid_doors && edge.requires_door) || (self.avoid_hidden_exits && edge.is_hidden)
    }

    pub fn is_preferred(&self, room: &RoomNode) -> bool {
        !room.region.is_empty() && self.preferred_tags.iter().any(|t| t == &room.region)
    }

    /// Route danger limit once this request's explicit allowance is applied.
    /// An allowance can raise `default_limit` but never lower it.
    pub fn safety_limit(&self, default_limit: u32) -> u32 {
        self.max_danger_level
            .map_or(default_limit, |m| m.max(default_limit))
    }

    pub fn exceeds_safety_limit(&self, danger: u32, default_limit: u32) -> bool {
        danger > self.safety_limit(default_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Direction;

    #[test]
    fn test_unrestricted_avoids_nothing() {
        let c = NavigationConstraints::unrestricted();
        let mut room = RoomNode::new(1, "Pit", 0, 0);
        room.has_trap = true;
        room.spawn_pressure = 20;
        assert!(!c.should_avoid_room(&room));
        let mut edge = RoomEdge::new(1, 2, Direction::Down);
        edge.is_hidden = true;
        edge.requires_door = true;
        assert!(!c.should_avoid_edge(&edge));
    }

    #[test]
    fn test_hard_room_rules() {
        let mut room = RoomNode::new(4, "Lair", 0, 0);
        room.spawn_pressure = 6;

        assert!(NavigationConstraints::cautious().should_avoid_room(&room));

        let c = NavigationConstraints {
            max_danger_level: Some(6),
            ..Default::default()
        };
        assert!(!c.should_avoid_room(&room));

        let mut c = NavigationConstraints::default();
        c.forbidden_room_ids.insert(RoomId(4));
        assert!(c.should_avoid_room(&room));
    }

    #[test]
    fn test_edge_rules() {
        let c = NavigationConstraints {
            avoid_doors: true,
            ..Default::default()
        };
        let mut edge = RoomEdge::new(1, 2, Direction::North);
        assert!(!c.should_avoid_edge(&edge));
        edge.requires_door = true;
        assert!(c.should_avoid_edge(&edge));
    }

    #[test]
    fn test_safety_limit_allowance() {
        let c = NavigationConstraints::default();
        assert!(c.exceeds_safety_limit(9, 8));
        let allow = NavigationConstraints {
            max_danger_level: Some(12),
            ..Default::default()
        };
        assert!(!allow.exceeds_safety_limit(9, 8));
        assert_eq!(allow.safety_limit(8), 12);
        // A stricter request never loosens the default limit check
        let strict = NavigationConstraints {
            max_danger_level: Some(2),
            ..Default::default()
        };
        assert!(!strict.exceeds_safety_limit(5, 8));
    }
}
