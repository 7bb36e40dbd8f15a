//! Movement execution: one direction command per path step.
//!
//! A dedicated worker thread drains a crossbeam control channel and emits
//! commands through a [`CommandSink`]. Advancement depends on the active
//! [`MovementMode`]:
//!
//! | Mode     | Advances on                                        |
//! |----------|----------------------------------------------------|
//! | Reliable | confirmation, or `reliable_timeout` as a fallback  |
//! | Balanced | confirmation or `balanced_delay`, whichever first  |
//! | Fast     | confirmation or `fast_delay` plus surcharges       |
//! | Timed    | the step's `estimated_delay`; confirmation ignored |
//!
//! `stop` bumps an atomic epoch under the emit gate. The worker checks the
//! epoch under the same gate before each send, so no step queued before the
//! stop starts its send afterwards. The sink itself runs with no lock held
//! and may call back into the executor; a send already under way when
//! `stop` returns still completes, and its step is discarded.

mod movement;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;

use crate::config::ExecutorConfig;
use crate::error::{NavError, Result};
use crate::types::{MovementMode, NavigationStep};
use crate::utils::millis_since;
use movement::{Control, Worker};

/// Outbound command channel to the world.
pub trait CommandSink: Send + Sync {
    fn send_command(&self, command: &str) -> Result<()>;
}

impl CommandSink for Sender<String> {
    fn send_command(&self, command: &str) -> Result<()> {
        self.send(command.to_string())
            .map_err(|_| NavError::Thread("command channel closed".to_string()))
    }
}

/// Executor lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Running,
    Paused(String),
}

/// Lock-free executor counters.
#[derive(Debug)]
pub struct ExecutorTelemetry {
    origin: Instant,
    commands_sent: AtomicU64,
    pending: AtomicUsize,
    /// Millis since `origin` plus one; zero means never
    last_sent_ms: AtomicU64,
    /// Stamp of the oldest command sent since the last confirmation; zero
    /// when nothing is outstanding
    unconfirmed_since_ms: AtomicU64,
}

impl ExecutorTelemetry {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            commands_sent: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            last_sent_ms: AtomicU64::new(0),
            unconfirmed_since_ms: AtomicU64::new(0),
        }
    }

    fn stamp(&self) -> u64 {
        millis_since(self.origin).saturating_add(1)
    }

    fn record_sent(&self) {
        let stamp = self.stamp();
        self.last_sent_ms.store(stamp, Ordering::Release);
        // Only the first send opens an outstanding stretch
        let _ = self.unconfirmed_since_ms.compare_exchange(
            0,
            stamp,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.commands_sent.fetch_add(1, Ordering::AcqRel);
    }

    fn record_confirm(&self) {
        self.clear_unconfirmed();
    }

    fn clear_unconfirmed(&self) {
        self.unconfirmed_since_ms.store(0, Ordering::Release);
    }

    /// Total commands emitted.
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent.load(Ordering::Acquire)
    }

    /// Steps still queued, including the one in flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Time since the last command, if one was ever sent.
    pub fn since_last_command(&self) -> Option<Duration> {
        match self.last_sent_ms.load(Ordering::Acquire) {
            0 => None,
            sent => Some(Duration::from_millis(self.stamp().saturating_sub(sent))),
        }
    }

    /// Whether a command has gone out since the last confirmation.
    pub fn awaiting_confirmation(&self) -> bool {
        self.unconfirmed_since_ms.load(Ordering::Acquire) != 0
    }

    /// Executor-clock stamp opening the current unconfirmed stretch.
    /// Stays put while timed-out steps give way to further commands.
    pub fn unconfirmed_since(&self) -> Option<u64> {
        match self.unconfirmed_since_ms.load(Ordering::Acquire) {
            0 => None,
            stamp => Some(stamp),
        }
    }

    /// How long commands have gone without any confirmation.
    pub fn unconfirmed_for(&self) -> Option<Duration> {
        self.unconfirmed_since()
            .map(|since| Duration::from_millis(self.stamp().saturating_sub(since)))
    }
}

/// State shared between the handle and the worker.
struct ExecutorShared {
    epoch: AtomicU64,
    mode: AtomicU8,
    state: Mutex<ExecutorState>,
    /// Serializes the pre-send epoch check and state publication against
    /// epoch bumps; never held across a sink call
    gate: Mutex<()>,
    shutdown: AtomicBool,
    telemetry: ExecutorTelemetry,
}

/// Handle to the executor worker thread. Dropping it stops the worker.
pub struct MovementExecutor {
    shared: Arc<ExecutorShared>,
    control_tx: Sender<Control>,
    worker: Option<JoinHandle<()>>,
}

impl MovementExecutor {
    /// Spawn the worker thread.
    pub fn spawn(config: ExecutorConfig, sink: Arc<dyn CommandSink>) -> Result<Self> {
        let shared = Arc::new(ExecutorShared {
            epoch: AtomicU64::new(0),
            mode: AtomicU8::new(config.mode.as_u8()),
            state: Mutex::new(ExecutorState::Idle),
            gate: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            telemetry: ExecutorTelemetry::new(),
        });

        let (control_tx, control_rx) = unbounded();
        let worker = Worker::new(Arc::clone(&shared), control_rx, sink, config);
        let handle = thread::Builder::new()
            .name("executor".into())
            .spawn(move || worker.run())
            .map_err(|e| NavError::Thread(format!("Failed to spawn executor thread: {}", e)))?;

        Ok(Self {
            shared,
            control_tx,
            worker: Some(handle),
        })
    }

    fn send(&self, control: Control) {
        if self.control_tx.send(control).is_err() {
            tracing::warn!("Executor worker is gone; control message dropped");
        }
    }

    /// Append steps to the queue. `first_index` is the path index of the
    /// first step, used to match confirmations.
    pub fn enqueue(&self, steps: Vec<NavigationStep>, first_index: usize) {
        if steps.is_empty() {
            return;
        }
        let epoch = self.shared.epoch.load(Ordering::Acquire);
        self.send(Control::Enqueue {
            epoch,
            steps,
            first_index,
        });
    }

    /// Discard the queue and load `steps` in its place. A pause in effect
    /// stays in effect.
    pub fn replace(&self, steps: Vec<NavigationStep>, first_index: usize) {
        let epoch = {
            let _gate = self.shared.gate.lock();
            self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1
        };
        self.shared.telemetry.clear_unconfirmed();
        self.send(Control::Replace {
            epoch,
            steps,
            first_index,
        });
    }

    /// Hold the queue; the in-flight step is re-sent on resume unless it is
    /// confirmed meanwhile.
    pub fn pause(&self, reason: impl Into<String>) {
        self.send(Control::Pause(reason.into()));
    }

    pub fn resume(&self) {
        self.send(Control::Resume);
    }

    /// Drop every queued step. Returns with the executor already `Idle`.
    pub fn stop(&self, reason: &str) {
        let epoch = {
            let _gate = self.shared.gate.lock();
            let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            *self.shared.state.lock() = ExecutorState::Idle;
            self.shared.telemetry.pending.store(0, Ordering::Release);
            self.shared.telemetry.clear_unconfirmed();
            epoch
        };
        tracing::debug!("Executor stopped: {}", reason);
        self.send(Control::Stop { epoch });
    }

    /// Arrival confirmed for path step `step_index`.
    pub fn confirm(&self, step_index: usize) {
        self.send(Control::Confirm(step_index));
    }

    /// Switch mode; applies from the next command sent.
    pub fn set_mode(&self, mode: MovementMode) {
        self.shared.mode.store(mode.as_u8(), Ordering::Release);
    }

    pub fn mode(&self) -> MovementMode {
        MovementMode::from_u8(self.shared.mode.load(Ordering::Acquire))
    }

    pub fn state(&self) -> ExecutorState {
        self.shared.state.lock().clone()
    }

    pub fn telemetry(&self) -> &ExecutorTelemetry {
        &self.shared.telemetry
    }
}

impl Drop for MovementExecutor {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let _ = self.control_tx.send(Control::Shutdown);
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            tracing::error!("Executor thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Direction, RoomId};
    use crossbeam_channel::Receiver;
    use std::sync::{OnceLock, Weak};

    const WAIT: Duration = Duration::from_secs(2);
    const QUIET: Duration = Duration::from_millis(150);

    fn step(from: u32, to: u32, direction: Direction) -> NavigationStep {
        NavigationStep {
            from: RoomId(from),
            to: RoomId(to),
            direction,
            requires_door: false,
            is_hidden: false,
            estimated_delay: Duration::from_millis(300),
        }
    }

    fn three_steps() -> Vec<NavigationStep> {
        vec![
            step(1, 2, Direction::East),
            step(2, 3, Direction::North),
            step(3, 4, Direction::Up),
        ]
    }

    fn executor(config: ExecutorConfig) -> (MovementExecutor, Receiver<String>) {
        let (tx, rx) = unbounded();
        let exec = MovementExecutor::spawn(config, Arc::new(tx)).unwrap();
        (exec, rx)
    }

    fn wait_for_state(exec: &MovementExecutor, want: &ExecutorState) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if &exec.state() == want {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_reliable_waits_for_confirmation() {
        let (exec, rx) = executor(ExecutorConfig::default());
        exec.enqueue(three_steps(), 0);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");
        // No second command without an advance signal
        assert!(rx.recv_timeout(QUIET).is_err());

        exec.confirm(0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "n");
        exec.confirm(1);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "u");
        exec.confirm(2);

        assert!(wait_for_state(&exec, &ExecutorState::Idle));
        assert_eq!(exec.telemetry().commands_sent(), 3);
        assert!(!exec.telemetry().awaiting_confirmation());
    }

    #[test]
    fn test_stale_confirmation_ignored() {
        let (exec, rx) = executor(ExecutorConfig::default());
        exec.enqueue(three_steps(), 5);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");
        exec.confirm(3);
        assert!(rx.recv_timeout(QUIET).is_err());
        exec.confirm(5);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "n");
    }

    #[test]
    fn test_stop_clears_queue_immediately() {
        let (exec, rx) = executor(ExecutorConfig::default());
        exec.enqueue(three_steps(), 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");

        exec.stop("user abort");
        assert_eq!(exec.state(), ExecutorState::Idle);
        assert_eq!(exec.telemetry().pending(), 0);

        exec.confirm(0);
        assert!(rx.recv_timeout(QUIET).is_err());

        // Usable again after a stop
        exec.enqueue(vec![step(1, 2, Direction::West)], 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "w");
    }

    #[test]
    fn test_pause_resends_unconfirmed_step() {
        let (exec, rx) = executor(ExecutorConfig::default());
        exec.enqueue(three_steps(), 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");

        exec.pause("user");
        assert!(wait_for_state(
            &exec,
            &ExecutorState::Paused("user".to_string())
        ));
        exec.resume();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");
        exec.confirm(0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "n");
    }

    #[test]
    fn test_confirmation_while_paused_retires_step() {
        let (exec, rx) = executor(ExecutorConfig::default());
        exec.enqueue(three_steps(), 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");

        exec.pause("low health");
        exec.confirm(0);
        assert!(rx.recv_timeout(QUIET).is_err());
        exec.resume();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "n");
    }

    #[test]
    fn test_fast_mode_does_not_wait() {
        let config = ExecutorConfig {
            mode: MovementMode::Fast,
            fast_delay_ms: 10,
            ..ExecutorConfig::default()
        };
        let (exec, rx) = executor(config);
        exec.enqueue(three_steps(), 0);
        for expected in ["e", "n", "u"] {
            assert_eq!(rx.recv_timeout(WAIT).unwrap(), expected);
        }
        assert!(wait_for_state(&exec, &ExecutorState::Idle));
    }

    #[test]
    fn test_reliable_timeout_advances_without_retry() {
        let config = ExecutorConfig {
            reliable_timeout_ms: 50,
            ..ExecutorConfig::default()
        };
        let (exec, rx) = executor(config);
        exec.enqueue(three_steps(), 0);
        for expected in ["e", "n", "u"] {
            assert_eq!(rx.recv_timeout(WAIT).unwrap(), expected);
        }
        assert!(rx.recv_timeout(QUIET).is_err());
        assert_eq!(exec.telemetry().commands_sent(), 3);
        assert!(exec.telemetry().awaiting_confirmation());
    }

    #[test]
    fn test_timed_mode_ignores_confirmation() {
        let (exec, rx) = executor(ExecutorConfig::default());
        exec.set_mode(MovementMode::Timed);
        exec.enqueue(three_steps(), 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");
        exec.confirm(0);
        // The step's 300 ms estimate still governs
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "n");
    }

    #[test]
    fn test_mode_switch_applies_to_next_step() {
        let (exec, rx) = executor(ExecutorConfig {
            fast_delay_ms: 10,
            ..ExecutorConfig::default()
        });
        exec.enqueue(three_steps(), 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");
        exec.set_mode(MovementMode::Fast);
        // First step went out in reliable mode and still needs confirming
        assert!(rx.recv_timeout(QUIET).is_err());
        exec.confirm(0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "n");
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "u");
        assert_eq!(exec.mode(), MovementMode::Fast);
    }

    #[test]
    fn test_replace_keeps_pause() {
        let (exec, rx) = executor(ExecutorConfig::default());
        exec.enqueue(three_steps(), 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");
        exec.pause("user");
        exec.replace(vec![step(7, 8, Direction::Down)], 0);
        assert!(rx.recv_timeout(QUIET).is_err());
        exec.resume();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "d");
    }

    #[test]
    fn test_balanced_confirmation_advances_early() {
        let (exec, rx) = executor(ExecutorConfig {
            mode: MovementMode::Balanced,
            balanced_delay_ms: 5_000,
            ..ExecutorConfig::default()
        });
        exec.enqueue(three_steps(), 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");
        exec.confirm(0);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "n");
    }

    #[test]
    fn test_balanced_advances_after_delay() {
        let (exec, rx) = executor(ExecutorConfig {
            mode: MovementMode::Balanced,
            balanced_delay_ms: 300,
            ..ExecutorConfig::default()
        });
        exec.enqueue(three_steps(), 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");
        let sent = Instant::now();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "n");
        assert!(sent.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn test_unconfirmed_stretch_spans_timeouts() {
        let (exec, rx) = executor(ExecutorConfig {
            reliable_timeout_ms: 50,
            ..ExecutorConfig::default()
        });
        assert_eq!(exec.telemetry().unconfirmed_for(), None);
        exec.enqueue(three_steps(), 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");
        let opened = exec.telemetry().unconfirmed_since();
        assert!(opened.is_some());

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "n");
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "u");
        thread::sleep(Duration::from_millis(20));
        let telemetry = exec.telemetry();
        assert_eq!(telemetry.unconfirmed_since(), opened);
        assert!(telemetry.unconfirmed_for().unwrap() > telemetry.since_last_command().unwrap());

        exec.confirm(2);
        let deadline = Instant::now() + WAIT;
        while exec.telemetry().awaiting_confirmation() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(exec.telemetry().unconfirmed_for(), None);
    }

    #[test]
    fn test_stop_ends_unconfirmed_stretch() {
        let (exec, rx) = executor(ExecutorConfig::default());
        exec.enqueue(three_steps(), 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");
        assert!(exec.telemetry().awaiting_confirmation());
        exec.stop("test");
        assert!(!exec.telemetry().awaiting_confirmation());
    }

    /// Forwards commands, then stops the executor from inside the send.
    struct StoppingSink {
        exec: OnceLock<Weak<MovementExecutor>>,
        commands: Sender<String>,
        done: Sender<ExecutorState>,
    }

    impl CommandSink for StoppingSink {
        fn send_command(&self, command: &str) -> Result<()> {
            self.commands.send_command(command)?;
            if let Some(exec) = self.exec.get().and_then(Weak::upgrade) {
                exec.stop("stopped by sink");
                let state = exec.state();
                drop(exec);
                let _ = self.done.send(state);
            }
            Ok(())
        }
    }

    #[test]
    fn test_sink_may_call_back_into_executor() {
        let (commands, rx) = unbounded();
        let (done, done_rx) = unbounded();
        let sink = Arc::new(StoppingSink {
            exec: OnceLock::new(),
            commands,
            done,
        });
        let exec = Arc::new(
            MovementExecutor::spawn(ExecutorConfig::default(), Arc::clone(&sink) as Arc<dyn CommandSink>)
                .unwrap(),
        );
        assert!(sink.exec.set(Arc::downgrade(&exec)).is_ok());

        exec.enqueue(three_steps(), 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "e");
        assert_eq!(done_rx.recv_timeout(WAIT).unwrap(), ExecutorState::Idle);

        // The stop issued mid-send wins; nothing further goes out
        assert!(rx.recv_timeout(QUIET).is_err());
        assert!(wait_for_state(&exec, &ExecutorState::Idle));
        assert_eq!(exec.telemetry().pending(), 0);
    }
}
