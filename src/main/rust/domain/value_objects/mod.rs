mod backoff_schedule;
mod capture_source;
mod destination;
mod diagnostic_markers;
mod health_snapshot;
mod pipeline_spec;
mod stream_config;
mod watchdog_state;

pub use backoff_schedule::{BackoffSchedule, JITTER_FRACTION};
pub use capture_source::{CaptureSource, DeviceKind, Resolution};
pub use destination::{Destination, DestinationProtocol};
pub use diagnostic_markers::{DiagnosticMarkers, LineClass};
pub use health_snapshot::{HealthReport, HealthSnapshot, HealthStatus, PublishState};
pub use pipeline_spec::{PipelineSpec, ProcessSpec, StageRole};
pub use stream_config::{StreamConfig, ToolPaths};
pub use watchdog_state::{RunOutcome, Trigger, WatchdogState};
