use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::HealthStore;
use crate::domain::entities::WatchdogLifecycle;
use crate::domain::ports::{MetricsReporter, PipelineEvent, PipelineRunner};
use crate::domain::services::PipelineSpecBuilder;
use crate::domain::value_objects::{
    HealthSnapshot, PipelineSpec, RunOutcome, StreamConfig, WatchdogState, JITTER_FRACTION,
};

/// Application service: keeps the pipeline alive with bounded, jittered retries.
///
/// Runs strictly sequentially, so at most one attempt is ever alive. The
/// watchdog is the only writer of the health snapshot.
pub struct RetryWatchdog {
    runner: Box<dyn PipelineRunner>,
    config: StreamConfig,
    lifecycle: WatchdogLifecycle,
    health: HealthStore,
    metrics: Arc<dyn MetricsReporter>,
    cancel: CancellationToken,
}

impl RetryWatchdog {
    pub fn new(
        runner: Box<dyn PipelineRunner>,
        config: StreamConfig,
        health: HealthStore,
        metrics: Arc<dyn MetricsReporter>,
        cancel: CancellationToken,
    ) -> Self {
        let lifecycle = WatchdogLifecycle::new(config.backoff().len(), config.auto_retry());
        Self {
            runner,
            config,
            lifecycle,
            health,
            metrics,
            cancel,
        }
    }

    pub fn current_state(&self) -> WatchdogState {
        *self.lifecycle.current_state()
    }

    pub fn lifecycle(&self) -> &WatchdogLifecycle {
        &self.lifecycle
    }

    pub fn health(&self) -> &HealthStore {
        &self.health
    }

    /// Drive attempts until cancelled, or until a failure with auto-retry off
    pub async fn run(&mut self) -> WatchdogState {
        tracing::info!(
            event = "watchdog_started",
            auto_retry = self.config.auto_retry(),
            schedule = ?self.config.backoff().delays(),
            "Retry watchdog starting"
        );

        while !self.cancel.is_cancelled() {
            if let Err(e) = self.lifecycle.start_attempt() {
                tracing::error!("Watchdog cannot start a new attempt: {}", e);
                break;
            }
            self.metrics.report_state_change(self.lifecycle.current_state());
            self.metrics.report_attempt();

            // Rebuilt every attempt from the same immutable config
            let spec = PipelineSpecBuilder::build(&self.config);
            tracing::info!(
                event = "pipeline_started",
                attempt = self.lifecycle.backoff().consecutive_failures + 1,
                stages = spec.stage_count(),
                destination = %self.config.destination().url(),
                "Starting pipeline"
            );

            let reason = match self.run_attempt(&spec).await {
                RunOutcome::Cancelled => break,
                // A stream that ends is retried on the same schedule as a crash
                RunOutcome::CompletedCleanly if self.lifecycle.current_state().is_running() => {
                    tracing::info!(event = "pipeline_completed", "Pipeline completed cleanly");
                    "pipeline ended while streaming".to_string()
                }
                RunOutcome::CompletedCleanly => {
                    "pipeline exited before reaching steady state".to_string()
                }
                RunOutcome::FailedWithError(reason) => reason,
            };

            if self.cancel.is_cancelled() {
                break;
            }

            let uptime = self.lifecycle.uptime().map(|up| up.as_secs_f64()).unwrap_or(0.0);
            tracing::error!(
                event = "pipeline_failed",
                reason = %reason,
                uptime_seconds = uptime,
                "Pipeline failed"
            );
            self.metrics.report_failure(&reason);
            self.publish(self.health.snapshot().down(Some(reason.clone())));

            let next = match self.lifecycle.record_failure(reason) {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!("Watchdog state machine rejected failure: {}", e);
                    break;
                }
            };
            self.metrics.report_state_change(&next);

            match next {
                WatchdogState::Backoff { attempt, delay_index } => {
                    let delay = self.config.backoff().jittered_delay(delay_index, jitter());
                    tracing::info!(
                        event = "backoff_sleep",
                        seconds = delay.as_secs_f64(),
                        attempt,
                        "Retrying in {:.1}s",
                        delay.as_secs_f64()
                    );
                    self.metrics.report_backoff(delay.as_secs_f64());

                    if !sleep_or_cancel(&self.cancel, delay).await {
                        break;
                    }
                }
                _ => {
                    tracing::warn!("Auto-retry disabled, not restarting the pipeline");
                    break;
                }
            }
        }

        if self.cancel.is_cancelled() {
            tracing::info!(
                event = "shutdown_requested",
                state = %self.lifecycle.current_state(),
                "Watchdog cancelled"
            );
        }

        let reason = self.cancel.is_cancelled().then(|| "shutdown requested".to_string());
        let final_state = self.lifecycle.stop(reason);
        self.metrics.report_state_change(&final_state);
        self.publish(self.health.snapshot().down(None));

        tracing::debug!(
            recent = ?self.lifecycle.history().map(|t| t.to).collect::<Vec<_>>(),
            "Recent watchdog transitions"
        );
        tracing::info!(
            event = "watchdog_stopped",
            transitions = self.lifecycle.transition_count(),
            "Retry watchdog stopped"
        );
        final_state
    }

    /// One pipeline run, translating runner events into state and snapshot updates
    async fn run_attempt(&mut self, spec: &PipelineSpec) -> RunOutcome {
        let Self {
            runner,
            lifecycle,
            health,
            metrics,
            cancel,
            ..
        } = self;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let run = runner.run(spec, events_tx, cancel.child_token());
        tokio::pin!(run);

        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                Some(event) = events_rx.recv() => {
                    Self::handle_event(event, lifecycle, health, metrics.as_ref());
                }
            }
        };

        // Events sent just before the run returned still count
        while let Ok(event) = events_rx.try_recv() {
            Self::handle_event(event, lifecycle, health, metrics.as_ref());
        }

        outcome
    }

    fn handle_event(
        event: PipelineEvent,
        lifecycle: &mut WatchdogLifecycle,
        health: &HealthStore,
        metrics: &dyn MetricsReporter,
    ) {
        match event {
            PipelineEvent::Spawned { pids } => {
                tracing::debug!(?pids, "Pipeline stages spawned");
                let snapshot = health.snapshot().starting();
                metrics.report_snapshot(&snapshot);
                health.publish(snapshot);
            }
            PipelineEvent::Steady => match lifecycle.mark_steady() {
                Ok(state) => {
                    tracing::info!(event = "pipeline_steady", "Pipeline reached steady state");
                    metrics.report_state_change(&state);
                    let since = lifecycle.running_since().unwrap_or_else(Instant::now);
                    let snapshot = health.snapshot().up(since);
                    metrics.report_snapshot(&snapshot);
                    health.publish(snapshot);
                }
                Err(e) => tracing::debug!("Ignoring steady signal: {}", e),
            },
        }
    }

    fn publish(&self, snapshot: HealthSnapshot) {
        self.metrics.report_snapshot(&snapshot);
        self.health.publish(snapshot);
    }
}

/// Returns false when woken by cancellation
async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn jitter() -> f64 {
    rand::rng().random_range(-JITTER_FRACTION..=JITTER_FRACTION)
}
