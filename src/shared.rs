//! Shared state primitives for the multi-threaded engine.
//!
//! Provides lock-free cells read by:
//! - Coordinator event thread (position, confidence, context updates)
//! - Safety thread (health, telemetry)
//! - Caller threads (status snapshots, suggestions)

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::graph::RoomId;
use crate::types::NavigationContext;

/// Atomic wrapper for f32 values.
/// Uses AtomicU32 with bit reinterpretation.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(val: f32) -> Self {
        Self(AtomicU32::new(val.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    pub fn store(&self, val: f32, order: Ordering) {
        self.0.store(val.to_bits(), order);
    }
}

/// Atomic `Option<RoomId>`; `RoomId::UNKNOWN` encodes "unknown".
#[derive(Debug)]
pub struct AtomicRoom(AtomicU32);

const NO_ROOM: u32 = RoomId::UNKNOWN.0;

impl AtomicRoom {
    pub fn new(room: Option<RoomId>) -> Self {
        Self(AtomicU32::new(room.map_or(NO_ROOM, |r| r.0)))
    }

    pub fn load(&self, order: Ordering) -> Option<RoomId> {
        match self.0.load(order) {
            NO_ROOM => None,
            id => Some(RoomId(id)),
        }
    }

    pub fn store(&self, room: Option<RoomId>, order: Ordering) {
        self.0.store(room.map_or(NO_ROOM, |r| r.0), order);
    }
}

/// Copy-on-write holder for the current navigation context.
///
/// Readers clone the `Arc` and work on an immutable snapshot; writers build
/// a fresh context and swap the pointer. The lock is held only for the
/// pointer exchange.
#[derive(Debug, Default)]
pub struct ContextCell(RwLock<Arc<NavigationContext>>);

impl ContextCell {
    pub fn new(ctx: NavigationContext) -> Self {
        Self(RwLock::new(Arc::new(ctx)))
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<NavigationContext> {
        Arc::clone(&self.0.read())
    }

    /// Replace the snapshot.
    pub fn replace(&self, ctx: NavigationContext) {
        let fresh = Arc::new(ctx);
        *self.0.write() = fresh;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_f32() {
        let v = AtomicF32::new(0.25);
        assert_eq!(v.load(Ordering::Relaxed), 0.25);
        v.store(-3.5, Ordering::Relaxed);
        assert_eq!(v.load(Ordering::Relaxed), -3.5);
    }

    #[test]
    fn test_atomic_room() {
        let room = AtomicRoom::new(None);
        assert_eq!(room.load(Ordering::Relaxed), None);
        room.store(Some(RoomId(42)), Ordering::Relaxed);
        assert_eq!(room.load(Ordering::Relaxed), Some(RoomId(42)));
    }

    #[test]
    fn test_context_snapshot_is_stable() {
        let cell = ContextCell::new(NavigationContext::resting_in(Some(RoomId(1))));
        let before = cell.snapshot();
        cell.replace(NavigationContext::resting_in(Some(RoomId(2))));
        assert_eq!(before.previous_room, Some(RoomId(1)));
        assert_eq!(cell.snapshot().previous_room, Some(RoomId(2)));
    }
}
