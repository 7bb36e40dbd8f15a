//! End-to-end navigation tests through the public coordinator API.

mod common;

use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use approx::assert_relative_eq;
use common::*;
use crossbeam_channel::{Sender, unbounded};
use marga_nav::{
    CommandSink, Destination, NavError, NavigationConstraints, NavigationCoordinator,
    NavigationEvent, NavigationState, PauseReason, Result, RoomId, RoomState, SimulatedWorld,
    WorldConfig,
};

fn is_completed(event: &NavigationEvent) -> bool {
    matches!(event, NavigationEvent::Completed(_))
}

fn is_state(state: NavigationState) -> impl Fn(&NavigationEvent) -> bool {
    move |event| matches!(event, NavigationEvent::StateChanged(s) if *s == state)
}

fn is_alert(fragment: &'static str) -> impl Fn(&NavigationEvent) -> bool {
    move |event| matches!(event, NavigationEvent::Alert(text) if text.contains(fragment))
}

// ============================================================================
// Full routes
// ============================================================================

#[test]
fn test_walks_line_to_destination() {
    let h = Harness::new(line_graph(5), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();

    let path = h
        .nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();
    assert_eq!(path.step_count(), 4);
    assert_eq!(h.nav.status().state, NavigationState::Navigating);

    for room in 2..=5 {
        assert_eq!(h.next_command(), "e");
        h.arrive(room);
    }

    let done = h.wait_for(is_completed).expect("completion event");
    assert_eq!(done, NavigationEvent::Completed("Room 5 (#5)".to_string()));

    let status = h.nav.status();
    assert_eq!(status.state, NavigationState::Completed);
    assert_eq!(status.step_index, 4);
    assert_eq!(status.total_steps, 4);
    assert_eq!(status.current_room, Some(RoomId(5)));
    assert_eq!(status.commands_sent, 4);
    h.assert_quiet(Duration::from_millis(150));
}

#[test]
fn test_destination_by_name() {
    let h = Harness::new(line_graph(5), &test_config());
    h.nav.set_position(RoomId(4)).unwrap();

    let path = h
        .nav
        .start_to(
            &"room 2".parse::<Destination>().unwrap(),
            NavigationConstraints::default(),
        )
        .unwrap();
    assert_eq!(path.destination(), Some(RoomId(2)));
    assert_eq!(h.next_command(), "w");
}

#[test]
fn test_one_command_per_confirmed_step() {
    let h = Harness::new(line_graph(5), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();

    assert_eq!(h.next_command(), "e");
    // Reliable mode holds the next step until arrival is reported
    h.assert_quiet(Duration::from_millis(200));

    h.arrive(2);
    assert_eq!(h.next_command(), "e");
    assert_eq!(h.nav.status().step_index, 1);
}

#[test]
fn test_already_there_completes_immediately() {
    let h = Harness::new(line_graph(3), &test_config());
    h.nav.set_position(RoomId(2)).unwrap();

    let path = h
        .nav
        .start_to(&Destination::Id(RoomId(2)), NavigationConstraints::default())
        .unwrap();
    assert!(path.steps.is_empty());
    assert!(h.wait_for(is_completed).is_some());
    assert_eq!(h.nav.status().state, NavigationState::Completed);
    h.assert_quiet(Duration::from_millis(100));
}

#[test]
fn test_completed_returns_to_idle_after_grace() {
    let mut config = test_config();
    config.coordinator.completion_grace_ms = 50;
    let h = Harness::new(line_graph(2), &config);
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(2)), NavigationConstraints::default())
        .unwrap();

    assert_eq!(h.next_command(), "e");
    h.arrive(2);
    assert!(h.wait_for(is_completed).is_some());
    assert!(h.wait_for(is_state(NavigationState::Idle)).is_some());
    assert_eq!(h.nav.status().destination, None);
}

// ============================================================================
// Preconditions
// ============================================================================

#[test]
fn test_start_requires_known_position() {
    let h = Harness::new(line_graph(3), &test_config());

    let err = h
        .nav
        .start_to(&Destination::Id(RoomId(3)), NavigationConstraints::default())
        .unwrap_err();
    assert!(matches!(err, NavError::PositionUnknown { .. }));
    assert_eq!(h.nav.status().state, NavigationState::Idle);
}

#[test]
fn test_unknown_destination_rejected() {
    let h = Harness::new(line_graph(3), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();

    let err = h
        .nav
        .start_to(
            &Destination::Name("Moon Base".to_string()),
            NavigationConstraints::default(),
        )
        .unwrap_err();
    assert!(matches!(err, NavError::UnknownDestination(_)));
}

#[test]
fn test_route_through_lair_is_a_safety_violation() {
    let h = Harness::new(lair_graph(), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();

    let err = h
        .nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap_err();
    match err {
        NavError::SafetyViolation {
            room,
            danger,
            limit,
        } => {
            assert_eq!(room, RoomId(3));
            assert_eq!(danger, 12);
            assert_eq!(limit, 8);
        }
        other => panic!("expected safety violation, got {:?}", other),
    }
    h.assert_quiet(Duration::from_millis(100));

    // An explicit higher limit lets the route through
    let constraints = NavigationConstraints {
        max_danger_level: Some(15),
        ..NavigationConstraints::default()
    };
    h.nav
        .start_to(&Destination::Id(RoomId(5)), constraints)
        .unwrap();
    assert_eq!(h.next_command(), "e");
}

// ============================================================================
// Control operations
// ============================================================================

#[test]
fn test_stop_halts_commands() {
    let h = Harness::new(line_graph(5), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();
    assert_eq!(h.next_command(), "e");

    h.nav.stop();
    let status = h.nav.status();
    assert_eq!(status.state, NavigationState::Idle);
    assert_eq!(status.destination, None);
    assert!(h.wait_for(is_state(NavigationState::Idle)).is_some());

    // A late arrival updates position but does not move on
    h.arrive(2);
    h.assert_quiet(Duration::from_millis(200));
    assert_eq!(h.nav.status().current_room, Some(RoomId(2)));
}

#[test]
fn test_user_pause_and_resume() {
    let h = Harness::new(line_graph(5), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();
    assert_eq!(h.next_command(), "e");
    h.arrive(2);
    assert_eq!(h.next_command(), "e");

    h.nav.pause("shopping").unwrap();
    assert_eq!(
        h.nav.status().state,
        NavigationState::Paused(PauseReason::User("shopping".to_string()))
    );
    // Already paused by the caller
    assert!(matches!(h.nav.pause("again"), Err(NavError::NotNavigating)));

    h.nav.resume().unwrap();
    assert_eq!(h.nav.status().state, NavigationState::Navigating);
    // The interrupted step is sent again
    assert_eq!(h.next_command(), "e");
    assert!(matches!(h.nav.resume(), Err(NavError::NotNavigating)));
}

#[test]
fn test_pause_requires_navigation() {
    let h = Harness::new(line_graph(3), &test_config());
    assert!(matches!(h.nav.pause("nope"), Err(NavError::NotNavigating)));
    assert!(matches!(h.nav.resume(), Err(NavError::NotNavigating)));
}

#[test]
fn test_low_health_pauses_and_recovers() {
    let h = Harness::new(line_graph(5), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();
    assert_eq!(h.next_command(), "e");

    h.nav.on_health_changed(10, 100);
    assert!(
        h.wait_for(is_state(NavigationState::Paused(PauseReason::LowHealth)))
            .is_some()
    );
    assert_relative_eq!(h.nav.status().health_percent, 10.0);

    h.nav.on_health_changed(80, 100);
    assert!(h.wait_for(is_state(NavigationState::Navigating)).is_some());
    assert_eq!(h.next_command(), "e");
}

#[test]
fn test_low_health_alert_is_raised() {
    let h = Harness::new(line_graph(5), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();

    h.nav.on_health_changed(5, 100);
    let alert = h
        .wait_for(|e| matches!(e, NavigationEvent::Alert(_)))
        .expect("health alert");
    match alert {
        NavigationEvent::Alert(text) => assert!(text.contains("Health at 5%")),
        _ => unreachable!(),
    }
}

#[test]
fn test_user_pause_survives_health_recovery() {
    let h = Harness::new(line_graph(5), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();

    h.nav.on_health_changed(10, 100);
    assert!(
        h.wait_for(is_state(NavigationState::Paused(PauseReason::LowHealth)))
            .is_some()
    );
    h.nav.pause("waiting for heal").unwrap();

    h.nav.on_health_changed(100, 100);
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(
        h.nav.status().state,
        NavigationState::Paused(PauseReason::User("waiting for heal".to_string()))
    );
}

#[test]
fn test_combat_flag_is_informational() {
    let h = Harness::new(line_graph(3), &test_config());
    h.nav.on_combat_active(true);
    std::thread::sleep(Duration::from_millis(100));
    let status = h.nav.status();
    assert!(status.combat_active);
    assert_eq!(status.state, NavigationState::Idle);
}

#[test]
fn test_start_while_navigating_replaces_attempt() {
    let h = Harness::new(line_graph(5), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();
    assert_eq!(h.next_command(), "e");
    h.arrive(2);
    assert_eq!(h.next_command(), "e");

    // Turn back before reaching room 3
    let path = h
        .nav
        .start_to(&Destination::Id(RoomId(1)), NavigationConstraints::default())
        .unwrap();
    assert_eq!(path.step_count(), 1);
    assert_eq!(h.next_command(), "w");
    let status = h.nav.status();
    assert_eq!(status.destination, Some(RoomId(1)));
    assert_eq!(status.total_steps, 1);
    assert_eq!(status.step_index, 0);

    h.arrive(1);
    let done = h.wait_for(is_completed).expect("completion event");
    assert_eq!(done, NavigationEvent::Completed("Room 1 (#1)".to_string()));
    // Nothing left over from the first route
    h.assert_quiet(Duration::from_millis(200));
}

#[test]
fn test_stalled_command_raises_alert() {
    let mut config = test_config();
    config.executor.reliable_timeout_ms = 60_000;
    config.coordinator.command_timeout_ms = 100;
    let h = Harness::new(line_graph(5), &config);
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();
    assert_eq!(h.next_command(), "e");

    assert!(h.wait_for(is_alert("No arrival confirmed")).is_some());
    // Alert only; the attempt carries on
    assert_eq!(h.nav.status().state, NavigationState::Navigating);
    // One alert for the stretch
    assert!(wait_for_event(&h.events, is_alert("No arrival confirmed"), Duration::from_millis(300)).is_none());
}

#[test]
fn test_stall_alert_spans_timed_out_steps() {
    // Each step times out well before the stall threshold, so the route keeps
    // emitting commands while nothing is ever confirmed.
    let mut config = test_config();
    config.executor.reliable_timeout_ms = 60;
    config.coordinator.command_timeout_ms = 300;
    let h = Harness::new(line_graph(40), &config);
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(40)), NavigationConstraints::default())
        .unwrap();

    assert!(
        wait_for_event(&h.events, is_alert("No arrival confirmed"), Duration::from_millis(1500))
            .is_some()
    );
    assert!(h.nav.status().commands_sent < 39);
}

/// Command sink that queries the coordinator while a command is going out.
struct StatusCheckingSink {
    nav: OnceLock<Weak<NavigationCoordinator>>,
    forward: Sender<String>,
}

impl CommandSink for StatusCheckingSink {
    fn send_command(&self, command: &str) -> Result<()> {
        thread::sleep(Duration::from_millis(150));
        if let Some(nav) = self.nav.get().and_then(Weak::upgrade) {
            let _ = nav.status();
        }
        self.forward.send_command(command)
    }
}

#[test]
fn test_stop_during_slow_send() {
    let (forward, commands) = unbounded::<String>();
    let sink = Arc::new(StatusCheckingSink {
        nav: OnceLock::new(),
        forward,
    });
    let (nav, _events) = NavigationCoordinator::new(
        line_graph(5),
        &test_config(),
        Arc::clone(&sink) as Arc<dyn CommandSink>,
    )
    .unwrap();
    let nav = Arc::new(nav);
    assert!(sink.nav.set(Arc::downgrade(&nav)).is_ok());

    nav.set_position(RoomId(1)).unwrap();
    nav.start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    let (stopped_tx, stopped_rx) = unbounded();
    let stopper = {
        let nav = Arc::clone(&nav);
        thread::spawn(move || {
            nav.stop();
            let _ = stopped_tx.send(());
        })
    };
    assert!(stopped_rx.recv_timeout(RECV_WAIT).is_ok(), "stop blocked on the send");
    stopper.join().unwrap();

    // The send already under way completes; nothing follows it
    assert_eq!(commands.recv_timeout(RECV_WAIT).unwrap(), "e");
    assert!(commands.recv_timeout(Duration::from_millis(300)).is_err());
    assert_eq!(nav.status().state, NavigationState::Idle);
}

// ============================================================================
// Off-route handling
// ============================================================================

#[test]
fn test_off_route_replans() {
    let h = Harness::new(branch_graph(), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();
    assert_eq!(h.next_command(), "e");

    // Somewhere unexpected
    h.arrive(6);
    let alert = h
        .wait_for(|e| matches!(e, NavigationEvent::Alert(text) if text.contains("Off route")))
        .expect("replan alert");
    assert!(matches!(alert, NavigationEvent::Alert(_)));
    assert_eq!(h.next_command(), "s");
    assert_eq!(h.nav.status().total_steps, 4);

    h.arrive(2);
    assert_eq!(h.next_command(), "e");
    assert_eq!(h.nav.status().state, NavigationState::Navigating);
}

#[test]
fn test_replan_budget_exhausted_enters_error() {
    let mut config = test_config();
    config.coordinator.max_replans = 1;
    let h = Harness::new(branch_graph(), &config);
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();
    assert_eq!(h.next_command(), "e");

    h.arrive(6);
    assert!(h.wait_for(is_alert("Off route")).is_some());
    assert_eq!(h.next_command(), "s");

    // Off route a second time with a budget of one
    h.arrive(1);
    let failed = h
        .wait_for(|e| matches!(e, NavigationEvent::StateChanged(NavigationState::Error(_))))
        .expect("error state");
    match failed {
        NavigationEvent::StateChanged(NavigationState::Error(reason)) => {
            assert!(reason.contains("1 replans"), "{}", reason);
        }
        _ => unreachable!(),
    }
    assert!(matches!(h.nav.status().state, NavigationState::Error(_)));
    h.assert_quiet(Duration::from_millis(200));
}

#[test]
fn test_skipped_rooms_advance_the_route() {
    let h = Harness::new(line_graph(5), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();
    h.nav
        .start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();
    assert_eq!(h.next_command(), "e");

    // Arrival at room 2 was never reported
    h.arrive(3);
    assert_eq!(h.next_command(), "e");
    assert_eq!(h.nav.status().step_index, 2);
}

#[test]
fn test_unrecognized_room_raises_alert() {
    let h = Harness::new(line_graph(3), &test_config());
    h.nav.set_position(RoomId(1)).unwrap();

    h.nav
        .on_room_changed(RoomState::with_exit_names("Zzyzx Observatory", &["up"]));
    assert!(
        h.wait_for(|e| matches!(e, NavigationEvent::Alert(text) if text.contains("Could not identify")))
            .is_some()
    );
    assert_relative_eq!(h.nav.status().confidence, 0.0);
}

// ============================================================================
// Simulated world
// ============================================================================

#[test]
fn test_simulated_world_round_trip() {
    let graph = line_graph(5);
    let (commands_tx, commands_rx) = unbounded::<String>();
    let (nav, events) =
        NavigationCoordinator::new(Arc::clone(&graph), &test_config(), Arc::new(commands_tx))
            .unwrap();
    let world = SimulatedWorld::spawn(
        graph,
        RoomId(1),
        commands_rx,
        nav.inbound(),
        WorldConfig {
            latency: Duration::from_millis(5),
            ..WorldConfig::default()
        },
    )
    .unwrap();

    nav.set_position(RoomId(1)).unwrap();
    nav.start_to(&Destination::Id(RoomId(5)), NavigationConstraints::default())
        .unwrap();

    assert!(wait_for_event(&events, is_completed, Duration::from_secs(5)).is_some());
    assert_eq!(world.position(), Some(RoomId(5)));
    assert_eq!(world.moves(), 4);
    assert_eq!(nav.status().current_room, Some(RoomId(5)));
}
