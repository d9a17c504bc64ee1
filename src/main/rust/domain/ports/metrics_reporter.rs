use crate::domain::value_objects::{HealthSnapshot, WatchdogState};

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_state_change(&self, state: &WatchdogState);
    fn report_attempt(&self);
    fn report_failure(&self, reason: &str);
    fn report_backoff(&self, delay_secs: f64);
    fn report_snapshot(&self, snapshot: &HealthSnapshot);
}
