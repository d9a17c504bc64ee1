mod metrics_reporter;
mod pipeline_runner;

pub use metrics_reporter::MetricsReporter;
pub use pipeline_runner::{PipelineEvent, PipelineRunner};
