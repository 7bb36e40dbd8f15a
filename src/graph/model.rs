//! Room graph value types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Danger level at or above which a room counts as dangerous.
pub const DANGEROUS_LEVEL: u32 = 5;

/// Extra danger contributed by a trapped room.
const TRAP_DANGER: u32 = 3;

/// Stable identifier of a room in the snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u32);

impl RoomId {
    /// Reserved as the "no room" marker in shared atomics; never a real room.
    pub const UNKNOWN: RoomId = RoomId(u32::MAX);
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Exit direction. Named exits ("enter portal", "climb rope") are `Special`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    Up,
    Down,
    In,
    Out,
    Special(String),
}

impl Direction {
    /// Parse a direction from long or short form, case-insensitive.
    /// Anything unrecognized becomes a `Special` exit.
    pub fn parse(text: &str) -> Self {
        let lowered = text.trim().to_lowercase();
        match lowered.as_str() {
            "n" | "north" => Direction::North,
            "ne" | "northeast" | "north-east" => Direction::NorthEast,
            "e" | "east" => Direction::East,
            "se" | "southeast" | "south-east" => Direction::SouthEast,
            "s" | "south" => Direction::South,
            "sw" | "southwest" | "south-west" => Direction::SouthWest,
            "w" | "west" => Direction::West,
            "nw" | "northwest" | "north-west" => Direction::NorthWest,
            "u" | "up" => Direction::Up,
            "d" | "down" => Direction::Down,
            "in" | "enter" => Direction::In,
            "out" | "exit" | "leave" => Direction::Out,
            _ => Direction::Special(lowered),
        }
    }

    /// Command text sent to the world for this direction.
    pub fn command(&self) -> &str {
        match self {
            Direction::North => "n",
            Direction::NorthEast => "ne",
            Direction::East => "e",
            Direction::SouthEast => "se",
            Direction::South => "s",
            Direction::SouthWest => "sw",
            Direction::West => "w",
            Direction::NorthWest => "nw",
            Direction::Up => "u",
            Direction::Down => "d",
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Special(text) => text,
        }
    }

    /// Reverse direction, if one is defined.
    pub fn opposite(&self) -> Option<Direction> {
        let opposite = match self {
            Direction::North => Direction::South,
            Direction::NorthEast => Direction::SouthWest,
            Direction::East => Direction::West,
            Direction::SouthEast => Direction::NorthWest,
            Direction::South => Direction::North,
            Direction::SouthWest => Direction::NorthEast,
            Direction::West => Direction::East,
            Direction::NorthWest => Direction::SouthEast,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
            Direction::Special(_) => return None,
        };
        Some(opposite)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

impl Serialize for Direction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.command())
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Direction::parse(&text))
    }
}

/// A location in the room graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomNode {
    pub id: RoomId,
    pub label: String,
    /// Area/zone tag, matched against `preferred_tags`
    #[serde(default)]
    pub region: String,
    /// Map coordinate used by the A* heuristic
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub peaceful: bool,
    #[serde(default)]
    pub has_trap: bool,
    #[serde(default)]
    pub is_store: bool,
    #[serde(default)]
    pub is_tavern: bool,
    #[serde(default)]
    pub is_trainer: bool,
    /// Likelihood of hostile spawns; feeds danger level
    #[serde(default)]
    pub spawn_pressure: u32,
}

impl RoomNode {
    /// Create a plain room with no flags set.
    pub fn new(id: u32, label: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            id: RoomId(id),
            label: label.into(),
            region: String::new(),
            x,
            y,
            peaceful: false,
            has_trap: false,
            is_store: false,
            is_tavern: false,
            is_trainer: false,
            spawn_pressure: 0,
        }
    }

    /// Danger score: zero for peaceful rooms, otherwise spawn pressure plus
    /// a fixed surcharge for traps.
    pub fn danger_level(&self) -> u32 {
        if self.peaceful {
            return 0;
        }
        let trap = if self.has_trap { TRAP_DANGER } else { 0 };
        self.spawn_pressure.saturating_add(trap)
    }

    /// Whether the room is dangerous enough to avoid on request.
    pub fn is_dangerous(&self) -> bool {
        self.danger_level() >= DANGEROUS_LEVEL
    }

    /// Euclidean distance between coordinates. Rooms in different regions
    /// do not share a coordinate frame, so the distance is zero.
    pub fn distance_to(&self, other: &RoomNode) -> f32 {
        if self.region != other.region {
            return 0.0;
        }
        let dx = (other.x - self.x) as f32;
        let dy = (other.y - self.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A directed exit between two rooms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomEdge {
    pub from: RoomId,
    pub to: RoomId,
    pub direction: Direction,
    #[serde(default, alias = "door")]
    pub requires_door: bool,
    #[serde(default, alias = "hidden")]
    pub is_hidden: bool,
}

impl RoomEdge {
    pub fn new(from: u32, to: u32, direction: Direction) -> Self {
        Self {
            from: RoomId(from),
            to: RoomId(to),
            direction,
            requires_door: false,
            is_hidden: false,
        }
    }

    /// Base traversal cost: doors and hidden exits take extra effort.
    pub fn movement_cost(&self) -> u32 {
        1 + u32::from(self.requires_door) + 2 * u32::from(self.is_hidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parse_and_opposite() {
        assert_eq!(Direction::parse("North"), Direction::North);
        assert_eq!(Direction::parse("se"), Direction::SouthEast);
        assert_eq!(Direction::parse(" UP "), Direction::Up);
        assert_eq!(
            Direction::parse("climb rope"),
            Direction::Special("climb rope".to_string())
        );
        assert_eq!(Direction::East.opposite(), Some(Direction::West));
        assert_eq!(Direction::In.opposite(), Some(Direction::Out));
        assert_eq!(Direction::Special("pray".into()).opposite(), None);
    }

    #[test]
    fn test_movement_cost() {
        let mut edge = RoomEdge::new(1, 2, Direction::North);
        assert_eq!(edge.movement_cost(), 1);
        edge.requires_door = true;
        assert_eq!(edge.movement_cost(), 2);
        edge.is_hidden = true;
        assert_eq!(edge.movement_cost(), 4);
    }

    #[test]
    fn test_danger_level() {
        let mut room = RoomNode::new(1, "Crypt", 0, 0);
        room.spawn_pressure = 3;
        assert_eq!(room.danger_level(), 3);
        assert!(!room.is_dangerous());
        room.has_trap = true;
        assert_eq!(room.danger_level(), 6);
        assert!(room.is_dangerous());
        room.peaceful = true;
        assert_eq!(room.danger_level(), 0);
    }

    #[test]
    fn test_distance_ignores_other_regions() {
        let a = RoomNode::new(1, "A", 0, 0);
        let b = RoomNode::new(2, "B", 3, 4);
        assert_eq!(a.distance_to(&b), 5.0);
        let mut c = RoomNode::new(3, "C", 30, 40);
        c.region = "underdark".into();
        assert_eq!(a.distance_to(&c), 0.0);
    }

    #[test]
    fn test_direction_serde_roundtrip_uses_command_text() {
        let json = serde_json::to_string(&Direction::NorthWest).unwrap();
        assert_eq!(json, "\"nw\"");
        let parsed: Direction = serde_json::from_str("\"northwest\"").unwrap();
        assert_eq!(parsed, Direction::NorthWest);
    }
}
