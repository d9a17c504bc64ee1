mod watchdog_lifecycle;

pub use watchdog_lifecycle::{BackoffState, StateTransition, WatchdogLifecycle};
