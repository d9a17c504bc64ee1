mod health_store;
mod retry_watchdog;

pub use health_store::HealthStore;
pub use retry_watchdog::RetryWatchdog;
