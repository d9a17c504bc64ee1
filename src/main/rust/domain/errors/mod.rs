use thiserror::Error;

use crate::domain::value_objects::{Trigger, WatchdogState};

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Unknown camera mode: {0} (expected 'csi' or 'usb')")]
    UnknownDeviceKind(String),

    #[error("Unknown publish protocol: {0} (expected 'rtmp' or 'rtp')")]
    UnknownProtocol(String),

    #[error("Invalid resolution: {0} (expected WIDTHxHEIGHT)")]
    InvalidResolution(String),

    #[error("Invalid {0}: must be greater than zero")]
    ZeroValue(&'static str),

    #[error("Invalid destination URL for {protocol}: {url}")]
    InvalidDestination { protocol: &'static str, url: String },

    #[error("Invalid port: port cannot be zero")]
    InvalidPort,

    #[error("Backoff schedule cannot be empty")]
    EmptyBackoffSchedule,

    #[error("Backoff schedule entry {index} must be between 0 and 86400 seconds, got {value}")]
    InvalidBackoffEntry { index: usize, value: f64 },

    #[error("Invalid watchdog transition from {from} on {trigger}")]
    InvalidTransition { from: WatchdogState, trigger: Trigger },
}

pub type Result<T> = std::result::Result<T, DomainError>;
