//! Executor worker: emits one command per step and waits for the
//! mode-dependent advance signal.
//!
//! The worker owns the step queue. Every interaction arrives as a `Control`
//! message so queue mutation is single-threaded; callers only touch the
//! atomics in `ExecutorShared`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, select};

use super::{CommandSink, ExecutorShared, ExecutorState};
use crate::config::ExecutorConfig;
use crate::types::{MovementMode, NavigationStep};

/// Wait used when nothing is in flight, so shutdown is noticed promptly.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Messages from the public handle to the worker.
#[derive(Debug)]
pub(super) enum Control {
    /// Append steps; `first_index` is the path index of `steps[0]`
    Enqueue {
        epoch: u64,
        steps: Vec<NavigationStep>,
        first_index: usize,
    },
    /// Drop the queue and load `steps`, keeping any pause in effect
    Replace {
        epoch: u64,
        steps: Vec<NavigationStep>,
        first_index: usize,
    },
    Pause(String),
    Resume,
    Stop { epoch: u64 },
    Confirm(usize),
    Shutdown,
}

/// Lifecycle of one queued step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StepPhase {
    Pending,
    Sent,
    Confirmed,
    TimedOut,
    /// In flight when paused; re-sent on resume
    Aborted,
}

#[derive(Debug)]
struct QueuedStep {
    index: usize,
    step: NavigationStep,
    phase: StepPhase,
    /// Set once sent: when to advance without confirmation, and under
    /// which mode the step went out
    deadline: Option<(Instant, MovementMode)>,
}

impl QueuedStep {
    fn new(index: usize, step: NavigationStep) -> Self {
        Self {
            index,
            step,
            phase: StepPhase::Pending,
            deadline: None,
        }
    }
}

/// How long a step may run before the executor moves on without
/// confirmation.
fn advance_delay(
    mode: MovementMode,
    step: &NavigationStep,
    config: &ExecutorConfig,
) -> Duration {
    match mode {
        MovementMode::Reliable => config.reliable_timeout(),
        MovementMode::Balanced => config.balanced_delay(),
        MovementMode::Fast => {
            let mut ms = config.fast_delay_ms;
            if step.requires_door {
                ms += config.fast_door_surcharge_ms;
            }
            if step.is_hidden {
                ms += config.fast_hidden_surcharge_ms;
            }
            Duration::from_millis(ms)
        }
        MovementMode::Timed => step.estimated_delay,
    }
}

pub(super) struct Worker {
    shared: Arc<ExecutorShared>,
    control_rx: Receiver<Control>,
    sink: Arc<dyn CommandSink>,
    config: ExecutorConfig,
    queue: VecDeque<QueuedStep>,
    /// Epoch the current queue belongs to
    epoch: u64,
    paused: Option<String>,
}

impl Worker {
    pub(super) fn new(
        shared: Arc<ExecutorShared>,
        control_rx: Receiver<Control>,
        sink: Arc<dyn CommandSink>,
        config: ExecutorConfig,
    ) -> Self {
        let epoch = shared.epoch.load(Ordering::Acquire);
        Self {
            shared,
            control_rx,
            sink,
            config,
            queue: VecDeque::new(),
            epoch,
            paused: None,
        }
    }

    pub(super) fn run(mut self) {
        tracing::info!("Executor thread started");
        let control_rx = self.control_rx.clone();

        loop {
            if self.shared.shutdown.load(Ordering::Acquire) {
                break;
            }

            let wait = self.drive();

            select! {
                recv(control_rx) -> msg => match msg {
                    Ok(Control::Shutdown) | Err(_) => break,
                    Ok(control) => self.handle(control),
                },
                default(wait) => self.check_deadline(),
            }

            self.publish();
        }

        tracing::info!("Executor thread shutting down");
    }

    /// Emit the front step if it is due; return how long to wait for the
    /// next event.
    fn drive(&mut self) -> Duration {
        if self.paused.is_some() {
            return IDLE_POLL;
        }
        let Some(front) = self.queue.front() else {
            return IDLE_POLL;
        };
        match (front.phase, front.deadline) {
            (StepPhase::Sent, Some((deadline, _))) => {
                deadline.saturating_duration_since(Instant::now())
            }
            (StepPhase::Pending, _) => self.emit_front(),
            _ => IDLE_POLL,
        }
    }

    fn emit_front(&mut self) -> Duration {
        let mode = MovementMode::from_u8(self.shared.mode.load(Ordering::Acquire));
        let due = {
            let _gate = self.shared.gate.lock();
            if self.shared.epoch.load(Ordering::Acquire) != self.epoch {
                // Superseded by stop/replace; the control message is on its way
                None
            } else {
                self.queue
                    .front()
                    .map(|front| (front.index, front.step.direction.command().to_string()))
            }
        };
        let Some((index, command)) = due else {
            return IDLE_POLL;
        };

        // No lock held: the sink may call stop or replace
        if let Err(e) = self.sink.send_command(&command) {
            tracing::error!("Failed to send command for step {}: {}", index, e);
            self.queue.clear();
            return IDLE_POLL;
        }
        if self.shared.epoch.load(Ordering::Acquire) != self.epoch {
            tracing::debug!("Step {} sent as its route was stopped", index);
            return IDLE_POLL;
        }

        self.shared.telemetry.record_sent();
        let Some(front) = self.queue.front_mut() else {
            return IDLE_POLL;
        };
        let delay = advance_delay(mode, &front.step, &self.config);
        front.phase = StepPhase::Sent;
        front.deadline = Some((Instant::now() + delay, mode));
        tracing::debug!(
            "Step {}: sent '{}' ({} mode, advance after {:?})",
            front.index,
            front.step.direction,
            mode,
            delay
        );
        delay
    }

    fn handle(&mut self, control: Control) {
        match control {
            Control::Enqueue {
                epoch,
                steps,
                first_index,
            } => {
                if epoch != self.epoch {
                    tracing::debug!("Dropping stale enqueue from epoch {}", epoch);
                    return;
                }
                self.load(steps, first_index);
            }
            Control::Replace {
                epoch,
                steps,
                first_index,
            } => {
                self.epoch = epoch;
                self.queue.clear();
                if epoch == self.shared.epoch.load(Ordering::Acquire) {
                    self.load(steps, first_index);
                }
            }
            Control::Pause(reason) => {
                if let Some(front) = self.queue.front_mut()
                    && front.phase == StepPhase::Sent
                {
                    front.phase = StepPhase::Aborted;
                    front.deadline = None;
                }
                tracing::debug!("Executor paused: {}", reason);
                self.paused = Some(reason);
            }
            Control::Resume => {
                if self.paused.take().is_some() {
                    if let Some(front) = self.queue.front_mut()
                        && front.phase == StepPhase::Aborted
                    {
                        tracing::debug!("Re-sending aborted step {}", front.index);
                        front.phase = StepPhase::Pending;
                    }
                    tracing::debug!("Executor resumed");
                }
            }
            Control::Stop { epoch } => {
                if let Some(front) = self.queue.front()
                    && front.phase == StepPhase::Sent
                {
                    tracing::debug!("Abandoning in-flight step {}", front.index);
                }
                self.queue.clear();
                self.paused = None;
                self.epoch = epoch;
            }
            Control::Confirm(index) => self.confirm(index),
            Control::Shutdown => {}
        }
    }

    fn load(&mut self, steps: Vec<NavigationStep>, first_index: usize) {
        let count = steps.len();
        self.queue.extend(
            steps
                .into_iter()
                .enumerate()
                .map(|(i, step)| QueuedStep::new(first_index + i, step)),
        );
        tracing::debug!(
            "Queued {} steps from index {} ({} pending)",
            count,
            first_index,
            self.queue.len()
        );
    }

    fn confirm(&mut self, index: usize) {
        self.shared.telemetry.record_confirm();

        let Some(front) = self.queue.front() else {
            return;
        };
        if index < front.index {
            tracing::trace!("Ignoring stale confirmation for step {}", index);
            return;
        }
        if self.paused.is_none()
            && front.phase == StepPhase::Sent
            && matches!(front.deadline, Some((_, MovementMode::Timed)))
        {
            // Timed mode advances on its own schedule
            return;
        }

        while let Some(front) = self.queue.front_mut() {
            if front.index > index {
                break;
            }
            front.phase = StepPhase::Confirmed;
            tracing::debug!("Step {} confirmed", front.index);
            self.queue.pop_front();
        }
    }

    fn check_deadline(&mut self) {
        if self.paused.is_some() {
            return;
        }
        let Some(front) = self.queue.front_mut() else {
            return;
        };
        let Some((deadline, mode)) = front.deadline else {
            return;
        };
        if front.phase != StepPhase::Sent || Instant::now() < deadline {
            return;
        }
        front.phase = StepPhase::TimedOut;
        if mode == MovementMode::Reliable {
            tracing::warn!(
                "Step {} ('{}') timed out waiting for confirmation",
                front.index,
                front.step.direction
            );
        } else {
            tracing::trace!("Step {} advanced by {} delay", front.index, mode);
        }
        self.queue.pop_front();
    }

    /// Mirror queue state into the shared atomics, unless a newer epoch
    /// has already taken over.
    fn publish(&self) {
        let _gate = self.shared.gate.lock();
        if self.shared.epoch.load(Ordering::Acquire) != self.epoch {
            return;
        }
        let state = match (&self.paused, self.queue.is_empty()) {
            (Some(reason), _) => ExecutorState::Paused(reason.clone()),
            (None, true) => ExecutorState::Idle,
            (None, false) => ExecutorState::Running,
        };
        *self.shared.state.lock() = state;
        self.shared
            .telemetry
            .pending
            .store(self.queue.len(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Direction, RoomId};

    fn step(door: bool, hidden: bool) -> NavigationStep {
        NavigationStep {
            from: RoomId(1),
            to: RoomId(2),
            direction: Direction::North,
            requires_door: door,
            is_hidden: hidden,
            estimated_delay: Duration::from_millis(1600),
        }
    }

    #[test]
    fn test_advance_delay_by_mode() {
        let config = ExecutorConfig::default();
        assert_eq!(
            advance_delay(MovementMode::Reliable, &step(false, false), &config),
            Duration::from_secs(8)
        );
        assert_eq!(
            advance_delay(MovementMode::Balanced, &step(true, true), &config),
            Duration::from_millis(200)
        );
        assert_eq!(
            advance_delay(MovementMode::Fast, &step(false, false), &config),
            Duration::from_millis(50)
        );
        assert_eq!(
            advance_delay(MovementMode::Fast, &step(true, true), &config),
            Duration::from_millis(550)
        );
        assert_eq!(
            advance_delay(MovementMode::Timed, &step(false, false), &config),
            Duration::from_millis(1600)
        );
    }
}
