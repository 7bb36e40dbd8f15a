//! Inbound world events and outbound navigation notifications.

use crate::types::{NavigationState, RoomState};

/// Input from the protocol/parser side, drained in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum WorldEvent {
    /// A room description was parsed
    RoomChanged(RoomState),
    HealthChanged { hp: u32, max_hp: u32 },
    /// Combat started or ended; informational only
    CombatActive(bool),
}

/// Notifications for the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub enum NavigationEvent {
    /// Non-fatal condition worth surfacing (low confidence, stalled command, safety pause)
    Alert(String),
    /// Destination reached
    Completed(String),
    StateChanged(NavigationState),
}
