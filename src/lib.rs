//! # MargaNav: Room-Graph Navigation for Text Worlds
//!
//! Autonomous navigation over a pre-mapped room graph. Given a parsed room
//! description after every move, MargaNav works out where the player is,
//! plans a route to a destination and issues one movement command at a
//! time, replanning when the player drifts off the route.
//!
//! ## Architecture
//!
//! - [`graph`]: Immutable room graph loaded from a JSON snapshot
//! - [`planning`]: A* route planning under safety constraints
//! - [`identify`]: Room identification (fast tier, full scoring, cache)
//! - [`executor`]: Command pacing per movement mode
//! - [`coordinator`]: Event-driven navigation state machine and safety loop
//! - [`query`]: Room search and destination suggestions
//! - [`world`]: In-process world simulation
//!
//! ## Data Flow
//!
//! ```text
//!   parser ──RoomState──▶ ┌──────────────────┐
//!                         │   Coordinator    │──▶ NavigationEvent
//!                         │  (event thread)  │
//!                         └───┬─────────┬────┘
//!                  resolve()  │         │ enqueue()/confirm()
//!                             ▼         ▼
//!                   ┌──────────────┐  ┌──────────────┐
//!                   │  Identifier  │  │   Executor   │──▶ "n", "e", ...
//!                   └──────────────┘  └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use marga_nav::{Destination, Graph, MargaConfig, NavigationConstraints, NavigationCoordinator, RoomId};
//!
//! let graph = Arc::new(Graph::load(std::path::Path::new("world.json"))?);
//! let (commands_tx, commands_rx) = crossbeam_channel::unbounded::<String>();
//! let (nav, events) = NavigationCoordinator::new(graph, &MargaConfig::default(), Arc::new(commands_tx))?;
//!
//! nav.set_position(RoomId(1))?;
//! nav.start_to(&"Town Square".parse::<Destination>()?, NavigationConstraints::default())?;
//! # let _ = (commands_rx, events);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod graph;
pub mod identify;
pub mod planning;
pub mod query;
pub mod shared;
pub mod types;
pub mod utils;
pub mod world;

pub use config::MargaConfig;
pub use coordinator::{NavigationCoordinator, NavigationEvent, NavigationStatus, WorldEvent};
pub use error::{NavError, Result};
pub use executor::{CommandSink, MovementExecutor};
pub use graph::{Direction, Graph, RoomEdge, RoomId, RoomNode};
pub use identify::{RoomIdentifier, RoomMatchResult};
pub use planning::{NavigationConstraints, PathPlanner};
pub use query::{Destination, RoomQuery, Suggestion};
pub use types::{
    MovementMode, NavigationContext, NavigationPath, NavigationState, NavigationStep, PauseReason,
    RoomState,
};
pub use world::{SimulatedWorld, WorldConfig};
