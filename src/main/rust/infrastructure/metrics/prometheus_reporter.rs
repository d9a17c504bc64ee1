use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{HealthSnapshot, WatchdogState};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Watchdog state (0=Idle, 1=Starting, 2=Running, 3=Backoff, 4=Stopped)
    pub static ref WATCHDOG_STATE: Gauge = Gauge::new(
        "camera_push_watchdog_state",
        "Current retry watchdog state"
    ).expect("metric can be created");

    pub static ref PIPELINE_ATTEMPTS: IntCounter = IntCounter::new(
        "pipeline_attempts_total",
        "Total number of pipeline attempts"
    ).expect("metric can be created");

    pub static ref PIPELINE_FAILURES: IntCounter = IntCounter::new(
        "pipeline_failures_total",
        "Total number of failed pipeline attempts"
    ).expect("metric can be created");

    // Last backoff delay in seconds
    pub static ref BACKOFF_SECONDS: Gauge = Gauge::new(
        "pipeline_backoff_seconds",
        "Last retry backoff delay"
    ).expect("metric can be created");

    pub static ref UPTIME_SECONDS: Gauge = Gauge::new(
        "pipeline_uptime_seconds",
        "Time since the publisher confirmed the stream, at last update"
    ).expect("metric can be created");

    // Publish state (0=down, 1=starting, 2=up)
    pub static ref PUBLISH_STATE: IntGauge = IntGauge::new(
        "camera_push_publish_state",
        "Publish state of the outgoing stream"
    ).expect("metric can be created");

    pub static ref CAMERA_ALIVE: IntGauge = IntGauge::new(
        "camera_push_camera_alive",
        "Whether the capture stage is running"
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(WATCHDOG_STATE.clone()))?;
        REGISTRY.register(Box::new(PIPELINE_ATTEMPTS.clone()))?;
        REGISTRY.register(Box::new(PIPELINE_FAILURES.clone()))?;
        REGISTRY.register(Box::new(BACKOFF_SECONDS.clone()))?;
        REGISTRY.register(Box::new(UPTIME_SECONDS.clone()))?;
        REGISTRY.register(Box::new(PUBLISH_STATE.clone()))?;
        REGISTRY.register(Box::new(CAMERA_ALIVE.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_state_change(&self, state: &WatchdogState) {
        WATCHDOG_STATE.set(state.as_metric());
    }

    fn report_attempt(&self) {
        PIPELINE_ATTEMPTS.inc();
    }

    fn report_failure(&self, _reason: &str) {
        PIPELINE_FAILURES.inc();
    }

    fn report_backoff(&self, delay_secs: f64) {
        BACKOFF_SECONDS.set(delay_secs);
    }

    fn report_snapshot(&self, snapshot: &HealthSnapshot) {
        PUBLISH_STATE.set(snapshot.publish().as_metric());
        CAMERA_ALIVE.set(if snapshot.camera_alive() { 1 } else { 0 });
        UPTIME_SECONDS.set(snapshot.uptime_seconds());
    }
}
