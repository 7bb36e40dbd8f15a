//! MargaNav command line: route planning, room search and offline
//! navigation runs against a simulated world.
//!
//! ```text
//! marga-nav --graph world.json route 1 "Town Square"
//! marga-nav --graph world.json find tavern
//! marga-nav --graph world.json suggest "twn sqr" --from 1
//! marga-nav --graph world.json simulate 1 42 --mode fast
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use tracing::{error, info, warn};

use marga_nav::{
    Destination, Graph, MargaConfig, MovementMode, NavError, NavigationConstraints,
    NavigationCoordinator, NavigationEvent, NavigationState, PathPlanner, Result, RoomId,
    RoomQuery, SimulatedWorld, WorldConfig,
};
use marga_nav::shared::AtomicRoom;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Room graph snapshot (JSON)
    #[arg(short, long)]
    graph: PathBuf,

    /// Engine configuration (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Avoid traps and dangerous rooms
    #[arg(long)]
    cautious: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan a route and print its steps
    Route { from: String, to: String },

    /// List rooms whose label contains the text
    Find {
        text: String,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Rank destination suggestions for partial input
    Suggest {
        text: String,
        /// Reference room for distances
        #[arg(long)]
        from: Option<String>,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Navigate through a simulated world
    Simulate {
        from: String,
        to: String,
        #[arg(short, long, default_value = "reliable")]
        mode: MovementMode,
        /// Simulated server latency in ms
        #[arg(long, default_value = "50")]
        latency_ms: u64,
        /// Give up after this many seconds
        #[arg(long, default_value = "120")]
        timeout_secs: u64,
    },
}

fn main() -> Result<()> {
    let directive = "marga_nav=info"
        .parse::<tracing_subscriber::filter::Directive>()
        .map_err(|e| NavError::Config(format!("Invalid log directive: {}", e)))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            MargaConfig::load(path)?
        }
        None if Path::new("marga.toml").exists() => {
            info!("Loading configuration from marga.toml");
            MargaConfig::load(Path::new("marga.toml"))?
        }
        None => MargaConfig::default(),
    };

    let graph = Arc::new(Graph::load(&args.graph)?);
    info!(
        "MargaNav v{}: {} rooms, {} exits",
        env!("CARGO_PKG_VERSION"),
        graph.node_count(),
        graph.edge_count()
    );

    let constraints = if args.cautious {
        NavigationConstraints::cautious()
    } else {
        NavigationConstraints::default()
    };

    let planner = PathPlanner::new(Arc::clone(&graph), config.planner.clone());
    let query = RoomQuery::new(
        Arc::clone(&graph),
        planner.clone(),
        Arc::new(AtomicRoom::new(None)),
    );

    match args.command {
        Command::Route { from, to } => {
            let from = resolve(&query, &from)?;
            let to = resolve(&query, &to)?;
            print_route(&graph, &planner, from, to, &constraints)
        }
        Command::Find { text, limit } => {
            for node in query.find_rooms_by_text(&text, limit) {
                println!("{:>8}  {:<40} {}", node.id.to_string(), node.label, node.region);
            }
            Ok(())
        }
        Command::Suggest { text, from, limit } => {
            let from = from.map(|f| resolve(&query, &f)).transpose()?;
            for s in query.suggest_from(&text, from, limit) {
                let distance = s
                    .distance
                    .map(|d| format!("{} steps", d))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>8}  {:<40} {:<16} {:.2}  {}",
                    s.room_id.to_string(),
                    s.label,
                    s.region,
                    s.score,
                    distance
                );
            }
            Ok(())
        }
        Command::Simulate {
            from,
            to,
            mode,
            latency_ms,
            timeout_secs,
        } => {
            let from = resolve(&query, &from)?;
            let to = resolve(&query, &to)?;
            let world = WorldConfig {
                latency: Duration::from_millis(latency_ms),
                ..WorldConfig::default()
            };
            simulate(
                graph,
                &config,
                (from, to),
                constraints,
                mode,
                world,
                Duration::from_secs(timeout_secs),
            )
        }
    }
}

fn resolve(query: &RoomQuery, text: &str) -> Result<RoomId> {
    let Ok(destination) = text.parse::<Destination>();
    query.resolve_destination(&destination)
}

fn print_route(
    graph: &Graph,
    planner: &PathPlanner,
    from: RoomId,
    to: RoomId,
    constraints: &NavigationConstraints,
) -> Result<()> {
    let path = planner.plan(from, to, constraints);
    if !path.is_valid {
        return Err(NavError::Planning(
            path.failure_reason
                .unwrap_or_else(|| "no route".to_string()),
        ));
    }

    println!(
        "{} -> {}: {} steps, cost {:.1}",
        from,
        to,
        path.step_count(),
        path.total_cost
    );
    for (i, step) in path.steps.iter().enumerate() {
        let label = graph.node(step.to).map_or("?", |n| n.label.as_str());
        let mut notes = Vec::new();
        if step.requires_door {
            notes.push("door");
        }
        if step.is_hidden {
            notes.push("hidden");
        }
        println!(
            "{:>4}. {:<4} {:>8}  {}{}",
            i + 1,
            step.direction.command(),
            step.to.to_string(),
            label,
            if notes.is_empty() {
                String::new()
            } else {
                format!(" ({})", notes.join(", "))
            }
        );
    }
    if let Some(shortest) = planner.distance(from, to)
        && shortest < path.step_count()
    {
        println!("Unconstrained distance: {} steps", shortest);
    }
    Ok(())
}

fn simulate(
    graph: Arc<Graph>,
    config: &MargaConfig,
    (from, to): (RoomId, RoomId),
    constraints: NavigationConstraints,
    mode: MovementMode,
    world_config: WorldConfig,
    timeout: Duration,
) -> Result<()> {
    let (commands_tx, commands_rx) = crossbeam_channel::unbounded::<String>();
    let (nav, events) =
        NavigationCoordinator::new(Arc::clone(&graph), config, Arc::new(commands_tx))?;
    let world = SimulatedWorld::spawn(graph, from, commands_rx, nav.inbound(), world_config)?;

    nav.set_mode(mode);
    nav.set_position(from)?;
    let path = nav.start_to(&Destination::Id(to), constraints)?;
    info!("Walking {} steps in {} mode", path.step_count(), mode);

    let deadline = Instant::now() + timeout;
    let outcome = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(NavigationEvent::Completed(message)) => break Ok(message),
            Ok(NavigationEvent::StateChanged(NavigationState::Error(e))) => {
                break Err(NavError::Planning(e));
            }
            Ok(NavigationEvent::StateChanged(state)) => info!("State: {}", state),
            Ok(NavigationEvent::Alert(alert)) => warn!("{}", alert),
            Err(RecvTimeoutError::Timeout) => {
                break Err(NavError::Thread(format!(
                    "Navigation did not finish within {:?}",
                    timeout
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                break Err(NavError::Thread("Coordinator stopped".to_string()));
            }
        }
    };

    let status = nav.status();
    nav.stop();
    match &outcome {
        Ok(message) => info!(
            "{} ({} commands, {} moves, now in {})",
            message,
            status.commands_sent,
            world.moves(),
            world.position().map_or("?".to_string(), |r| r.to_string())
        ),
        Err(e) => error!("Navigation failed: {}", e),
    }
    outcome.map(|_| ())
}
