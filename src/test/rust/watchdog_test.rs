use std::collections::VecDeque;
use std::os::unix::fs::PermissionsExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use pipeline_camera_push::{
    BackoffSchedule, CaptureSource, Destination, DestinationProtocol, DeviceKind,
    DiagnosticMarkers, HealthSnapshot, HealthStore, MetricsReporter, PipelineEvent,
    PipelineRunner, PipelineSpec, ProcessPipeline, PublishState, Resolution, RetryWatchdog,
    RunOutcome, StreamConfig, ToolPaths, WatchdogState,
};

#[derive(Debug, Clone, Copy)]
enum Step {
    Fail,
    CompleteWithoutSteady,
    SteadyThenFail,
    SteadyThenComplete,
    SteadyUntilCancelled,
}

/// Plays back a fixed sequence of runs, then waits for cancellation silently
struct ScriptedRunner {
    steps: VecDeque<Step>,
    calls: Arc<Mutex<Vec<Instant>>>,
}

impl ScriptedRunner {
    fn new(steps: &[Step]) -> (Self, Arc<Mutex<Vec<Instant>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = Self {
            steps: steps.iter().copied().collect(),
            calls: calls.clone(),
        };
        (runner, calls)
    }
}

#[async_trait]
impl PipelineRunner for ScriptedRunner {
    async fn run(
        &mut self,
        _spec: &PipelineSpec,
        events: mpsc::UnboundedSender<PipelineEvent>,
        cancel: CancellationToken,
    ) -> RunOutcome {
        self.calls.lock().unwrap().push(Instant::now());

        let Some(step) = self.steps.pop_front() else {
            cancel.cancelled().await;
            return RunOutcome::Cancelled;
        };

        match step {
            Step::Fail => RunOutcome::failed("boom"),
            Step::CompleteWithoutSteady => {
                let _ = events.send(PipelineEvent::Spawned { pids: vec![1] });
                RunOutcome::CompletedCleanly
            }
            Step::SteadyThenFail | Step::SteadyThenComplete | Step::SteadyUntilCancelled => {
                let _ = events.send(PipelineEvent::Spawned { pids: vec![1] });
                let _ = events.send(PipelineEvent::Steady);
                match step {
                    Step::SteadyThenFail => RunOutcome::failed("stream dropped"),
                    Step::SteadyThenComplete => RunOutcome::CompletedCleanly,
                    _ => {
                        cancel.cancelled().await;
                        RunOutcome::Cancelled
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct RecordingMetrics {
    states: Mutex<Vec<WatchdogState>>,
    backoffs: Mutex<Vec<f64>>,
    snapshots: Mutex<Vec<HealthSnapshot>>,
    failures: Mutex<Vec<String>>,
}

impl MetricsReporter for RecordingMetrics {
    fn report_state_change(&self, state: &WatchdogState) {
        self.states.lock().unwrap().push(*state);
    }

    fn report_attempt(&self) {}

    fn report_failure(&self, reason: &str) {
        self.failures.lock().unwrap().push(reason.to_string());
    }

    fn report_backoff(&self, delay_secs: f64) {
        self.backoffs.lock().unwrap().push(delay_secs);
    }

    fn report_snapshot(&self, snapshot: &HealthSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}

fn stream_config(backoff: &[f64], auto_retry: bool) -> StreamConfig {
    let source = CaptureSource::new(
        DeviceKind::VideoDevice,
        Resolution::new(640, 480).unwrap(),
        15,
        500,
        30,
    )
    .unwrap();
    let destination =
        Destination::new(DestinationProtocol::RelayPush, "rtmp://127.0.0.1/live/cam".to_string())
            .unwrap();

    StreamConfig::new(source, destination, 8080)
        .unwrap()
        .with_backoff(BackoffSchedule::from_secs(backoff).unwrap())
        .with_auto_retry(auto_retry)
}

struct Harness {
    handle: tokio::task::JoinHandle<WatchdogState>,
    health: HealthStore,
    metrics: Arc<RecordingMetrics>,
    cancel: CancellationToken,
}

fn start(runner: Box<dyn PipelineRunner>, config: StreamConfig) -> Harness {
    let health = HealthStore::new();
    let metrics = Arc::new(RecordingMetrics::default());
    let cancel = CancellationToken::new();

    let mut watchdog =
        RetryWatchdog::new(runner, config, health.clone(), metrics.clone(), cancel.clone());
    let handle = tokio::spawn(async move { watchdog.run().await });

    Harness {
        handle,
        health,
        metrics,
        cancel,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(120), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition should become true");
}

fn assert_within_jitter(actual: f64, expected: f64) {
    let tolerance = expected * 0.1 + 1e-3;
    assert!(
        (actual - expected).abs() <= tolerance,
        "delay {} not within 10% of {}",
        actual,
        expected
    );
}

#[tokio::test(start_paused = true)]
async fn test_failures_follow_schedule_and_clamp() {
    let (runner, calls) = ScriptedRunner::new(&[Step::Fail; 5]);
    let harness = start(Box::new(runner), stream_config(&[1.0, 2.0, 5.0], true));

    wait_until(|| calls.lock().unwrap().len() == 6).await;

    let backoffs = harness.metrics.backoffs.lock().unwrap().clone();
    assert_eq!(backoffs.len(), 5);
    for (actual, expected) in backoffs.iter().zip([1.0, 2.0, 5.0, 5.0, 5.0]) {
        assert_within_jitter(*actual, expected);
    }

    // Attempts are separated by exactly the sleep that preceded them
    let calls = calls.lock().unwrap().clone();
    for (pair, expected) in calls.windows(2).zip([1.0, 2.0, 5.0, 5.0, 5.0]) {
        assert_within_jitter((pair[1] - pair[0]).as_secs_f64(), expected);
    }

    // Nothing ever spawned, so the stream was never reported as up
    let snapshot = harness.health.snapshot();
    assert_eq!(snapshot.publish(), PublishState::Down);
    assert_eq!(snapshot.last_error(), Some("boom"));
    assert!(harness
        .metrics
        .snapshots
        .lock()
        .unwrap()
        .iter()
        .all(|s| s.publish() == PublishState::Down));
    assert_eq!(harness.metrics.failures.lock().unwrap().len(), 5);

    harness.cancel.cancel();
    assert_eq!(harness.handle.await.unwrap(), WatchdogState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_steady_state_resets_backoff() {
    let (runner, calls) =
        ScriptedRunner::new(&[Step::Fail, Step::Fail, Step::SteadyThenFail, Step::Fail]);
    let harness = start(Box::new(runner), stream_config(&[1.0, 2.0, 5.0], true));

    wait_until(|| calls.lock().unwrap().len() == 5).await;

    let backoffs = harness.metrics.backoffs.lock().unwrap().clone();
    assert_eq!(backoffs.len(), 4);
    for (actual, expected) in backoffs.iter().zip([1.0, 2.0, 1.0, 2.0]) {
        assert_within_jitter(*actual, expected);
    }
    assert_eq!(harness.health.snapshot().last_error(), Some("boom"));

    harness.cancel.cancel();
    harness.handle.await.unwrap();
}

#[tokio::test]
async fn test_steady_run_reports_up_with_growing_uptime() {
    let (runner, _calls) = ScriptedRunner::new(&[Step::SteadyUntilCancelled]);
    let harness = start(Box::new(runner), stream_config(&[1.0], true));

    let health = harness.health.clone();
    wait_until(|| health.snapshot().publish() == PublishState::Up).await;

    let first = harness.health.snapshot();
    assert!(first.camera_alive());
    assert!(first.is_healthy());
    assert!(first.last_error().is_none());
    let before = first.uptime_seconds();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.health.snapshot().uptime_seconds() > before);

    let published: Vec<PublishState> = harness
        .metrics
        .snapshots
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.publish())
        .collect();
    assert_eq!(published, vec![PublishState::Starting, PublishState::Up]);

    harness.cancel.cancel();
    assert_eq!(harness.handle.await.unwrap(), WatchdogState::Stopped);

    let last = harness.health.snapshot();
    assert_eq!(last.publish(), PublishState::Down);
    assert!(!last.camera_alive());
}

#[tokio::test]
async fn test_cancellation_interrupts_backoff_sleep() {
    let (runner, calls) = ScriptedRunner::new(&[Step::Fail]);
    let harness = start(Box::new(runner), stream_config(&[30.0], true));

    let metrics = harness.metrics.clone();
    wait_until(|| !metrics.backoffs.lock().unwrap().is_empty()).await;

    let cancelled_at = std::time::Instant::now();
    harness.cancel.cancel();
    let state = tokio::time::timeout(Duration::from_secs(2), harness.handle)
        .await
        .expect("watchdog should stop promptly")
        .unwrap();

    assert_eq!(state, WatchdogState::Stopped);
    assert!(cancelled_at.elapsed() < Duration::from_secs(1));
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failure_without_auto_retry_stops() {
    let (runner, calls) = ScriptedRunner::new(&[Step::Fail]);
    let harness = start(Box::new(runner), stream_config(&[1.0], false));

    let state = tokio::time::timeout(Duration::from_secs(2), harness.handle)
        .await
        .expect("watchdog should stop on its own")
        .unwrap();

    assert_eq!(state, WatchdogState::Stopped);
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert!(harness.metrics.backoffs.lock().unwrap().is_empty());
    assert_eq!(harness.health.snapshot().last_error(), Some("boom"));
}

#[tokio::test(start_paused = true)]
async fn test_completion_after_steady_still_backs_off() {
    let (runner, calls) = ScriptedRunner::new(&[Step::SteadyThenComplete]);
    let harness = start(Box::new(runner), stream_config(&[5.0], true));

    wait_until(|| calls.lock().unwrap().len() == 2).await;

    let calls = calls.lock().unwrap().clone();
    assert_within_jitter((calls[1] - calls[0]).as_secs_f64(), 5.0);
    let backoffs = harness.metrics.backoffs.lock().unwrap().clone();
    assert_eq!(backoffs.len(), 1);
    assert_within_jitter(backoffs[0], 5.0);
    assert!(!harness
        .metrics
        .states
        .lock()
        .unwrap()
        .contains(&WatchdogState::Idle));
    let error = harness.health.snapshot().last_error().map(str::to_string);
    assert_eq!(error.as_deref(), Some("pipeline ended while streaming"));

    harness.cancel.cancel();
    harness.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_completion_without_auto_retry_stops() {
    let (runner, calls) = ScriptedRunner::new(&[Step::SteadyThenComplete]);
    let harness = start(Box::new(runner), stream_config(&[1.0], false));

    let state = tokio::time::timeout(Duration::from_secs(2), harness.handle)
        .await
        .expect("watchdog should stop on its own")
        .unwrap();

    assert_eq!(state, WatchdogState::Stopped);
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert!(harness.metrics.backoffs.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_completion_before_steady_counts_as_failure() {
    let (runner, calls) = ScriptedRunner::new(&[Step::CompleteWithoutSteady]);
    let harness = start(Box::new(runner), stream_config(&[3.0], true));

    wait_until(|| calls.lock().unwrap().len() == 2).await;

    let backoffs = harness.metrics.backoffs.lock().unwrap().clone();
    assert_eq!(backoffs.len(), 1);
    assert_within_jitter(backoffs[0], 3.0);
    let error = harness.health.snapshot().last_error().map(str::to_string);
    assert_eq!(error.as_deref(), Some("pipeline exited before reaching steady state"));

    harness.cancel.cancel();
    harness.handle.await.unwrap();
}

/// Wraps the real process pipeline and checks that runs never overlap
struct NonOverlappingRunner {
    inner: ProcessPipeline,
    in_flight: Arc<AtomicBool>,
    intervals: Arc<Mutex<Vec<(Instant, Instant)>>>,
    all_reaped: Arc<AtomicBool>,
}

#[async_trait]
impl PipelineRunner for NonOverlappingRunner {
    async fn run(
        &mut self,
        spec: &PipelineSpec,
        events: mpsc::UnboundedSender<PipelineEvent>,
        cancel: CancellationToken,
    ) -> RunOutcome {
        assert!(!self.in_flight.swap(true, Ordering::SeqCst), "attempts overlapped");
        let started = Instant::now();

        let outcome = self.inner.run(spec, events, cancel).await;

        if self.inner.stage_records().iter().any(|r| r.exit.is_none()) {
            self.all_reaped.store(false, Ordering::SeqCst);
        }
        self.intervals.lock().unwrap().push((started, Instant::now()));
        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }
}

#[tokio::test]
async fn test_real_failing_processes_never_overlap() {
    let intervals = Arc::new(Mutex::new(Vec::new()));
    let all_reaped = Arc::new(AtomicBool::new(true));
    let runner = NonOverlappingRunner {
        inner: ProcessPipeline::new(DiagnosticMarkers::default(), Duration::from_secs(1)),
        in_flight: Arc::new(AtomicBool::new(false)),
        intervals: intervals.clone(),
        all_reaped: all_reaped.clone(),
    };
    // `false` ignores its arguments and exits 1 straight away
    let config = stream_config(&[0.05], true).with_tools(ToolPaths {
        capture: "false".to_string(),
        ffmpeg: "false".to_string(),
    });
    let harness = start(Box::new(runner), config);

    let observed = intervals.clone();
    wait_until(|| observed.lock().unwrap().len() >= 4).await;
    harness.cancel.cancel();
    assert_eq!(harness.handle.await.unwrap(), WatchdogState::Stopped);

    let intervals = intervals.lock().unwrap().clone();
    for pair in intervals.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "attempt started before the previous one ended");
    }
    assert!(all_reaped.load(Ordering::SeqCst));
    assert!(harness
        .health
        .snapshot()
        .last_error()
        .is_some_and(|e| e.contains("exited with code 1")));
}

#[tokio::test]
async fn test_publisher_exiting_cleanly_is_throttled() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-ffmpeg");
    std::fs::write(
        &script,
        "#!/bin/sh\necho progress=continue >&2\nsleep 0.1\nexit 0\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let (runner, calls) = CountingRunner::new(ProcessPipeline::new(
        DiagnosticMarkers::default(),
        Duration::from_secs(1),
    ));
    let config = stream_config(&[5.0], true).with_tools(ToolPaths {
        capture: "false".to_string(),
        ffmpeg: script.to_string_lossy().into_owned(),
    });
    let harness = start(Box::new(runner), config);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.metrics.backoffs.lock().unwrap().len(), 1);

    harness.cancel.cancel();
    assert_eq!(harness.handle.await.unwrap(), WatchdogState::Stopped);
}

struct CountingRunner {
    inner: ProcessPipeline,
    calls: Arc<AtomicUsize>,
}

impl CountingRunner {
    fn new(inner: ProcessPipeline) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl PipelineRunner for CountingRunner {
    async fn run(
        &mut self,
        spec: &PipelineSpec,
        events: mpsc::UnboundedSender<PipelineEvent>,
        cancel: CancellationToken,
    ) -> RunOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.run(spec, events, cancel).await
    }
}
