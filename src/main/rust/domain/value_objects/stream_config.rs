use std::time::Duration;

use super::{BackoffSchedule, CaptureSource, Destination, DiagnosticMarkers};
use crate::domain::errors::{DomainError, Result};

/// Executables used to build pipeline stages
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub capture: String,
    pub ffmpeg: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            capture: "rpicam-vid".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

/// Validated streamer configuration, immutable once loaded
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    source: CaptureSource,
    destination: Destination,
    health_port: u16,
    backoff: BackoffSchedule,
    auto_retry: bool,
    stop_grace: Duration,
    tools: ToolPaths,
    markers: DiagnosticMarkers,
}

impl StreamConfig {
    pub fn new(source: CaptureSource, destination: Destination, health_port: u16) -> Result<Self> {
        if health_port == 0 {
            return Err(DomainError::InvalidPort);
        }

        Ok(Self {
            source,
            destination,
            health_port,
            backoff: BackoffSchedule::default(),
            auto_retry: true,
            stop_grace: Duration::from_secs(5),
            tools: ToolPaths::default(),
            markers: DiagnosticMarkers::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_auto_retry(mut self, enabled: bool) -> Self {
        self.auto_retry = enabled;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_markers(mut self, markers: DiagnosticMarkers) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn source(&self) -> &CaptureSource {
        &self.source
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn health_port(&self) -> u16 {
        self.health_port
    }

    pub fn backoff(&self) -> &BackoffSchedule {
        &self.backoff
    }

    pub fn auto_retry(&self) -> bool {
        self.auto_retry
    }

    pub fn stop_grace(&self) -> Duration {
        self.stop_grace
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    pub fn markers(&self) -> &DiagnosticMarkers {
        &self.markers
    }
}
