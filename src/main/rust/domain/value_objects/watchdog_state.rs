use std::fmt;

/// Retry watchdog states (pure domain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchdogState {
    /// Not started yet
    #[default]
    Idle,
    /// Pipeline spawned, waiting for the publisher to confirm
    Starting,
    /// Publisher confirmed the outbound stream
    Running,
    /// Attempt failed, sleeping before the next one
    Backoff { attempt: u32, delay_index: usize },
    /// Terminal; the watchdog never restarts from here
    Stopped,
}

/// Events that drive the watchdog state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start,
    Steady,
    Failed,
    Cancel,
}

impl fmt::Display for WatchdogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Starting => write!(f, "STARTING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Backoff { attempt, .. } => write!(f, "BACKOFF (attempt {})", attempt),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Steady => "steady",
            Self::Failed => "failed",
            Self::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

impl WatchdogState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Starting => 1.0,
            Self::Running => 2.0,
            Self::Backoff { .. } => 3.0,
            Self::Stopped => 4.0,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Terminal result of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    CompletedCleanly,
    FailedWithError(String),
    Cancelled,
}

impl RunOutcome {
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::FailedWithError(detail.into())
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailedWithError(_))
    }
}
