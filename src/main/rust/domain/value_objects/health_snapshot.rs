use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Publish state as exposed to monitors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishState {
    #[default]
    Down,
    Starting,
    Up,
}

impl PublishState {
    pub fn as_metric(&self) -> i64 {
        match self {
            Self::Down => 0,
            Self::Starting => 1,
            Self::Up => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Complete health state; always replaced as a whole, never patched in place
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    camera_alive: bool,
    publish: PublishState,
    up_since: Option<Instant>,
    last_error: Option<String>,
    taken_at: SystemTime,
}

/// Wire form served on `/health`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub camera: bool,
    pub publish: PublishState,
    pub uptime_seconds: f64,
    pub last_error: Option<String>,
    pub timestamp: u64,
}

impl HealthSnapshot {
    /// State before any attempt has run
    pub fn initial() -> Self {
        Self {
            camera_alive: false,
            publish: PublishState::Down,
            up_since: None,
            last_error: None,
            taken_at: SystemTime::now(),
        }
    }

    /// Stages spawned, publisher not yet confirmed
    pub fn starting(&self) -> Self {
        Self {
            camera_alive: true,
            publish: PublishState::Starting,
            up_since: None,
            last_error: self.last_error.clone(),
            taken_at: SystemTime::now(),
        }
    }

    /// Publisher confirmed; uptime counts from `since`
    pub fn up(&self, since: Instant) -> Self {
        Self {
            camera_alive: true,
            publish: PublishState::Up,
            up_since: Some(since),
            last_error: self.last_error.clone(),
            taken_at: SystemTime::now(),
        }
    }

    /// Pipeline gone; keep the previous error unless a new one is given
    pub fn down(&self, error: Option<String>) -> Self {
        Self {
            camera_alive: false,
            publish: PublishState::Down,
            up_since: None,
            last_error: error.or_else(|| self.last_error.clone()),
            taken_at: SystemTime::now(),
        }
    }

    pub fn camera_alive(&self) -> bool {
        self.camera_alive
    }

    pub fn publish(&self) -> PublishState {
        self.publish
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn taken_at(&self) -> SystemTime {
        self.taken_at
    }

    pub fn is_healthy(&self) -> bool {
        self.camera_alive && self.publish == PublishState::Up
    }

    /// Uptime measured at call time, zero unless the publisher is up
    pub fn uptime_seconds(&self) -> f64 {
        self.up_since
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            status: if self.is_healthy() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            camera: self.camera_alive,
            publish: self.publish,
            uptime_seconds: self.uptime_seconds(),
            last_error: self.last_error.clone(),
            timestamp: self
                .taken_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self::initial()
    }
}
