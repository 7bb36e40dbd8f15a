//! Periodic safety checks, independent of room events.
//!
//! - Low health while navigating pauses with `PauseReason::LowHealth`
//! - Recovered health resumes a low-health pause (never a user pause)
//! - Commands left unconfirmed past `command_timeout` raise one alert per
//!   unconfirmed stretch, however many timed-out steps it spans

use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::navigator::CoordinatorCore;
use crate::types::{NavigationState, PauseReason};

pub(super) struct SafetyMonitor {
    core: Arc<CoordinatorCore>,
    /// Unconfirmed stretch the last stall alert was raised for
    alerted_since: Option<u64>,
}

impl SafetyMonitor {
    pub(super) fn new(core: Arc<CoordinatorCore>) -> Self {
        Self {
            core,
            alerted_since: None,
        }
    }

    /// Tick until `shutdown` disconnects.
    pub(super) fn run(mut self, shutdown: Receiver<()>) {
        let interval = self.core.config.safety_interval();
        tracing::info!("Safety thread started ({:?} interval)", interval);

        loop {
            match shutdown.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => self.tick(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!("Safety thread shutting down");
    }

    fn tick(&mut self) {
        let (state, attempt) = self.core.state_and_attempt();
        let health = self.core.health_percent();
        let min_health = self.core.config.min_health_percent;
        let resume_health = self.core.config.resume_health_percent;

        match &state {
            NavigationState::Navigating if health < min_health => {
                if self
                    .core
                    .pause(Some(attempt), PauseReason::LowHealth)
                    .is_ok()
                {
                    self.core.alert(format!(
                        "Health at {:.0}% (minimum {:.0}%); navigation paused",
                        health, min_health
                    ));
                }
            }
            NavigationState::Paused(PauseReason::LowHealth)
                if health >= resume_health =>
            {
                if self.core.resume(Some(attempt), true).is_ok() {
                    tracing::info!("Health recovered to {:.0}%; resuming", health);
                }
            }
            NavigationState::Navigating => self.check_stalled(),
            _ => {}
        }
    }

    fn check_stalled(&mut self) {
        let telemetry = self.core.executor.telemetry();
        let (Some(since), Some(elapsed)) = (telemetry.unconfirmed_since(), telemetry.unconfirmed_for())
        else {
            return;
        };
        if self.alerted_since == Some(since) || elapsed < self.core.config.command_timeout() {
            return;
        }
        self.alerted_since = Some(since);
        self.core.alert(format!(
            "No arrival confirmed for {:.1}s ({} commands sent)",
            elapsed.as_secs_f32(),
            telemetry.commands_sent()
        ));
    }
}
