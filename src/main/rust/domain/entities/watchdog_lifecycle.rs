use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::domain::errors::{DomainError, Result};
use crate::domain::value_objects::{Trigger, WatchdogState};

/// Transitions kept for inspection; older entries are dropped
const HISTORY_LIMIT: usize = 64;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: WatchdogState,
    pub to: WatchdogState,
    pub trigger: Trigger,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// Position in the backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackoffState {
    /// Index of the delay used for the next failure, clamped to the last entry
    pub index: usize,
    /// Failures since the last steady state
    pub consecutive_failures: u32,
}

/// Domain entity: the retry watchdog state machine
///
/// `Idle → Starting → Running → (Backoff → Starting)* → Stopped`
#[derive(Debug)]
pub struct WatchdogLifecycle {
    current_state: WatchdogState,
    backoff: BackoffState,
    schedule_len: usize,
    auto_retry: bool,
    history: VecDeque<StateTransition>,
    transitions: u64,
    running_since: Option<Instant>,
}

impl WatchdogLifecycle {
    pub fn new(schedule_len: usize, auto_retry: bool) -> Self {
        Self {
            current_state: WatchdogState::Idle,
            backoff: BackoffState::default(),
            schedule_len: schedule_len.max(1),
            auto_retry,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            transitions: 0,
            running_since: None,
        }
    }

    pub fn current_state(&self) -> &WatchdogState {
        &self.current_state
    }

    pub fn backoff(&self) -> BackoffState {
        self.backoff
    }

    pub fn auto_retry(&self) -> bool {
        self.auto_retry
    }

    /// Time since the publisher last confirmed, while running
    pub fn uptime(&self) -> Option<Duration> {
        self.running_since.map(|start| start.elapsed())
    }

    pub fn running_since(&self) -> Option<Instant> {
        self.running_since
    }

    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.history.iter()
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.history.back()
    }

    /// `Idle | Backoff → Starting`
    pub fn start_attempt(&mut self) -> Result<WatchdogState> {
        match self.current_state {
            WatchdogState::Idle | WatchdogState::Backoff { .. } => {
                Ok(self.record_transition(WatchdogState::Starting, Trigger::Start, None))
            }
            from => Err(DomainError::InvalidTransition {
                from,
                trigger: Trigger::Start,
            }),
        }
    }

    /// `Starting → Running`; resets the backoff position
    pub fn mark_steady(&mut self) -> Result<WatchdogState> {
        match self.current_state {
            WatchdogState::Starting => {
                self.backoff = BackoffState::default();
                self.running_since = Some(Instant::now());
                Ok(self.record_transition(WatchdogState::Running, Trigger::Steady, None))
            }
            from => Err(DomainError::InvalidTransition {
                from,
                trigger: Trigger::Steady,
            }),
        }
    }

    /// `Starting | Running → Backoff`, or `→ Stopped` when auto-retry is off.
    ///
    /// The returned backoff state carries the schedule index to sleep on; the
    /// stored index advances by one, clamped to the last schedule entry.
    pub fn record_failure(&mut self, reason: impl Into<String>) -> Result<WatchdogState> {
        match self.current_state {
            WatchdogState::Starting | WatchdogState::Running => {
                self.running_since = None;
                let reason = Some(reason.into());

                if !self.auto_retry {
                    return Ok(self.record_transition(WatchdogState::Stopped, Trigger::Failed, reason));
                }

                let delay_index = self.backoff.index;
                self.backoff.index = (self.backoff.index + 1).min(self.schedule_len - 1);
                self.backoff.consecutive_failures = self.backoff.consecutive_failures.saturating_add(1);

                let next = WatchdogState::Backoff {
                    attempt: self.backoff.consecutive_failures,
                    delay_index,
                };
                Ok(self.record_transition(next, Trigger::Failed, reason))
            }
            from => Err(DomainError::InvalidTransition {
                from,
                trigger: Trigger::Failed,
            }),
        }
    }

    /// Any state `→ Stopped`; idempotent once stopped
    pub fn stop(&mut self, reason: Option<String>) -> WatchdogState {
        if self.current_state.is_stopped() {
            return self.current_state;
        }
        self.running_since = None;
        self.record_transition(WatchdogState::Stopped, Trigger::Cancel, reason)
    }

    fn record_transition(
        &mut self,
        new_state: WatchdogState,
        trigger: Trigger,
        reason: Option<String>,
    ) -> WatchdogState {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from: self.current_state,
            to: new_state,
            trigger,
            timestamp: Instant::now(),
            reason,
        });
        self.transitions += 1;
        self.current_state = new_state;
        new_state
    }
}
