pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{HealthStore, RetryWatchdog};
pub use config::{Config, FileConfig, LogFormat, Settings};
pub use domain::entities::{BackoffState, StateTransition, WatchdogLifecycle};
pub use domain::errors::{DomainError, Result};
pub use domain::ports::{MetricsReporter, PipelineEvent, PipelineRunner};
pub use domain::services::PipelineSpecBuilder;
pub use domain::value_objects::{
    BackoffSchedule, CaptureSource, Destination, DestinationProtocol, DeviceKind,
    DiagnosticMarkers, HealthReport, HealthSnapshot, HealthStatus, LineClass, PipelineSpec,
    ProcessSpec, PublishState, Resolution, RunOutcome, StageRole, StreamConfig, ToolPaths,
    Trigger, WatchdogState,
};
pub use infrastructure::metrics::PrometheusReporter;
pub use infrastructure::process::{ProcessPipeline, StageRecord};
