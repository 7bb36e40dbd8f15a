//! Room identification: which graph node does the observed text describe?
//!
//! - Fast tier: trust the expected room when its label matches
//! - Full tier: score every same-label candidate on name, exits, path and context
//! - Sharded cache of full-tier results keyed by observation and context

mod cache;
mod identifier;
mod scoring;

pub use cache::ShardedCache;
pub use identifier::{MatchCandidate, MatchTier, RoomIdentifier, RoomMatchResult};
