use std::sync::Arc;
use std::time::Duration;

use crate::device::DeviceId;
use crate::policies::{ReconnectContext, ReconnectDecision, ReconnectPolicy};

use super::ConnectMode;

/// Result of driving the reconnect loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStep {
    /// The loop is not running.
    Idle,
    /// Running, nothing to do yet.
    Waiting,
    /// Issue connect attempt `n` (one-based) now.
    Attempt(u32),
    /// The policy gave up; the loop has stopped.
    Exhausted,
}

/// Timed retry loop started by a rogue disconnect of an initialized device.
pub struct ReconnectCoordinator {
    device: DeviceId,
    policy: Arc<dyn ReconnectPolicy>,
    running: bool,
    attempts: u32,
    since_last: Duration,
    total: Duration,
    wait: Duration,
    in_flight: bool,
}

impl ReconnectCoordinator {
    pub fn new(device: DeviceId, policy: Arc<dyn ReconnectPolicy>) -> Self {
        Self {
            device,
            policy,
            running: false,
            attempts: 0,
            since_last: Duration::ZERO,
            total: Duration::ZERO,
            wait: Duration::ZERO,
            in_flight: false,
        }
    }

    /// Takes effect from the next decision.
    pub fn set_policy(&mut self, policy: Arc<dyn ReconnectPolicy>) {
        self.policy = policy;
    }

    /// Starts the loop if the device had been fully initialized and the
    /// disconnect was not explicit. Returns `true` if it is now running.
    pub fn start(&mut self, was_initialized: bool, explicit: bool) -> bool {
        if self.running {
            return true;
        }
        if !was_initialized || explicit {
            return false;
        }
        self.attempts = 0;
        self.since_last = Duration::ZERO;
        self.total = Duration::ZERO;
        self.in_flight = false;
        match self.ask() {
            ReconnectDecision::Retry(wait) => {
                self.wait = wait;
                self.running = true;
                true
            }
            ReconnectDecision::Stop => false,
        }
    }

    /// Advances the loop clock.
    ///
    /// Time between attempts only accrues while no attempt is in flight.
    pub fn update(&mut self, elapsed: Duration) -> ReconnectStep {
        if !self.running {
            return ReconnectStep::Idle;
        }
        self.total += elapsed;
        if self.in_flight {
            return ReconnectStep::Waiting;
        }
        self.since_last += elapsed;
        if self.since_last < self.wait {
            return ReconnectStep::Waiting;
        }
        self.since_last = Duration::ZERO;
        self.attempts += 1;
        self.in_flight = true;
        ReconnectStep::Attempt(self.attempts)
    }

    /// The in-flight attempt failed; schedules the next one or gives up.
    pub fn on_attempt_failed(&mut self) -> ReconnectStep {
        if !self.running {
            return ReconnectStep::Idle;
        }
        self.in_flight = false;
        self.since_last = Duration::ZERO;
        match self.ask() {
            ReconnectDecision::Retry(wait) => {
                self.wait = wait;
                ReconnectStep::Waiting
            }
            ReconnectDecision::Stop => {
                self.stop();
                ReconnectStep::Exhausted
            }
        }
    }

    /// The in-flight attempt was pre-empted without stopping the loop.
    ///
    /// The next attempt waits a full interval and keeps its attempt index.
    /// Returns `true` if an attempt was in flight.
    pub fn on_attempt_cancelled(&mut self) -> bool {
        let was = self.running && self.in_flight;
        if was {
            self.in_flight = false;
            self.since_last = Duration::ZERO;
        }
        was
    }

    /// Halts the loop. Returns `true` if it was running.
    pub fn stop(&mut self) -> bool {
        let was = self.running;
        self.running = false;
        self.in_flight = false;
        was
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Attempts issued since the loop started.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Time since the loop started.
    pub fn total_elapsed(&self) -> Duration {
        self.total
    }

    pub fn mode(&self) -> ConnectMode {
        if self.running {
            ConnectMode::Reconnecting
        } else {
            ConnectMode::Direct
        }
    }

    fn ask(&self) -> ReconnectDecision {
        self.policy.next(&ReconnectContext {
            device: self.device.clone(),
            attempt: self.attempts,
            total_elapsed: self.total,
        })
    }
}
