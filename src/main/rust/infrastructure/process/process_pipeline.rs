use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::stage::{send_sigterm, spawn_stderr_reader, RunningStage, StageRecord, StderrLine};
use crate::domain::ports::{PipelineEvent, PipelineRunner};
use crate::domain::value_objects::{DiagnosticMarkers, LineClass, PipelineSpec, RunOutcome};

/// Interval for reaping exited stages (100ms keeps shutdown responsive)
const EXIT_POLL_INTERVAL_MS: u64 = 100;

/// Stderr lines buffered between the reader tasks and the supervisor
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Runs a pipeline spec as chained OS processes
pub struct ProcessPipeline {
    markers: DiagnosticMarkers,
    grace: Duration,
    records: Vec<StageRecord>,
}

impl ProcessPipeline {
    pub fn new(markers: DiagnosticMarkers, grace: Duration) -> Self {
        Self {
            markers,
            grace,
            records: Vec::new(),
        }
    }

    /// Stages of the most recent run, in spawn order
    pub fn stage_records(&self) -> &[StageRecord] {
        &self.records
    }

    /// Spawn every stage in order, wiring piped stdout into the next stdin.
    ///
    /// On error the stages spawned so far are handed back with the detail so
    /// they can be terminated.
    fn spawn_all(
        spec: &PipelineSpec,
        lines: &mpsc::Sender<StderrLine>,
    ) -> Result<Vec<RunningStage>, (Vec<RunningStage>, String)> {
        let mut stages: Vec<RunningStage> = Vec::with_capacity(spec.stage_count());

        for (index, process) in spec.stages().iter().enumerate() {
            let upstream = stages.last_mut().and_then(|prev| prev.child.stdout.take());
            let stdin = match upstream {
                Some(stdout) => {
                    let piped: std::io::Result<Stdio> = stdout.try_into();
                    match piped {
                        Ok(stdio) => stdio,
                        Err(e) => {
                            let detail = format!("failed to pipe into {}: {}", process.program(), e);
                            return Err((stages, detail));
                        }
                    }
                }
                None => Stdio::null(),
            };
            let stdout = if process.pipe_to_next() {
                Stdio::piped()
            } else {
                Stdio::null()
            };

            let mut command = Command::new(process.program());
            command
                .args(process.args())
                .stdin(stdin)
                .stdout(stdout)
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    return Err((stages, format!("failed to spawn {}: {}", process.program(), e)));
                }
            };
            drop(command);

            let stderr = child.stderr.take();
            let mut stage = RunningStage::new(process.role(), process.program(), child);
            stage.reader = stderr.map(|stderr| spawn_stderr_reader(index, stderr, lines.clone()));

            tracing::info!(
                event = "stage_spawned",
                role = %stage.role,
                pid = stage.pid,
                command = %process.command_line(),
                "Stage spawned"
            );
            stages.push(stage);
        }

        Ok(stages)
    }

    /// Classify one stderr line; returns an outcome when the line is fatal
    fn handle_line(
        &self,
        line: StderrLine,
        stages: &mut [RunningStage],
        steady_sent: &mut bool,
        events: &mpsc::UnboundedSender<PipelineEvent>,
    ) -> Option<RunOutcome> {
        let stage = stages.get_mut(line.stage)?;
        let class = self.markers.classify(&line.text);

        match class {
            LineClass::Steady => {
                if stage.role.publishes() && !*steady_sent {
                    *steady_sent = true;
                    tracing::debug!(role = %stage.role, "Steady marker seen: {}", line.text);
                    let _ = events.send(PipelineEvent::Steady);
                }
            }
            LineClass::Fatal => {
                tracing::error!(role = %stage.role, program = %stage.program, "{}", line.text);
                let detail = format!("{}: {}", stage.program, line.text);
                stage.last_line = Some(line.text);
                return Some(RunOutcome::failed(detail));
            }
            LineClass::Warning => {
                tracing::warn!(
                    event = "stage_warning",
                    role = %stage.role,
                    program = %stage.program,
                    "{}",
                    line.text
                );
            }
            LineClass::Info => {
                tracing::debug!(role = %stage.role, program = %stage.program, "{}", line.text);
            }
        }

        // Progress lines carry no diagnostic value for failure details
        if class != LineClass::Steady {
            stage.last_line = Some(line.text);
        }
        None
    }

    /// Reap what has exited and decide whether the run is over
    fn check_exits(
        &self,
        stages: &mut [RunningStage],
        drain_deadline: &mut Option<Instant>,
    ) -> Option<RunOutcome> {
        for stage in stages.iter_mut() {
            if let Err(e) = stage.poll_exit() {
                return Some(RunOutcome::failed(format!(
                    "failed to poll {}: {}",
                    stage.program, e
                )));
            }
        }

        for stage in stages.iter() {
            if let Some(status) = stage.exit {
                if !status.success() {
                    return Some(RunOutcome::failed(stage.failure_detail(&status)));
                }
            }
        }

        let (last, upstream) = stages.split_last()?;
        if last.exit.is_some() {
            // Clean only once every stage has ended
            if let Some(alive) = upstream.iter().find(|stage| stage.is_alive()) {
                return Some(RunOutcome::failed(format!(
                    "{} exited while upstream {} was still running",
                    last.program, alive.program
                )));
            }
            return Some(RunOutcome::CompletedCleanly);
        }

        // An upstream stage ended cleanly: downstream gets one grace period to drain
        if upstream.iter().any(|stage| !stage.is_alive()) {
            let deadline = *drain_deadline.get_or_insert_with(|| Instant::now() + self.grace);
            if Instant::now() >= deadline {
                return Some(RunOutcome::failed(format!(
                    "{} did not finish after its input ended",
                    last.program
                )));
            }
        }

        None
    }

    async fn supervise(
        &self,
        stages: &mut [RunningStage],
        lines: &mut mpsc::Receiver<StderrLine>,
        events: &mpsc::UnboundedSender<PipelineEvent>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let mut poll = tokio::time::interval(Duration::from_millis(EXIT_POLL_INTERVAL_MS));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut steady_sent = false;
        let mut drain_deadline = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Cancellation requested, stopping pipeline");
                    return RunOutcome::Cancelled;
                }
                Some(line) = lines.recv() => {
                    if let Some(outcome) = self.handle_line(line, stages, &mut steady_sent, events) {
                        return outcome;
                    }
                }
                _ = poll.tick() => {
                    // Lines already read say more about an exit than the status alone
                    while let Ok(line) = lines.try_recv() {
                        if let Some(outcome) = self.handle_line(line, stages, &mut steady_sent, events) {
                            return outcome;
                        }
                    }
                    if let Some(outcome) = self.check_exits(stages, &mut drain_deadline) {
                        return outcome;
                    }
                }
            }
        }
    }

    /// SIGTERM live stages in reverse spawn order, wait out one shared grace
    /// deadline, SIGKILL stragglers. Every stage is reaped on return.
    async fn terminate(&self, stages: &mut [RunningStage]) {
        for stage in stages.iter_mut().rev() {
            if let Err(e) = stage.poll_exit() {
                tracing::debug!(pid = stage.pid, "Failed to poll stage before stopping: {}", e);
            }
            if stage.is_alive() && !send_sigterm(stage.pid) {
                tracing::debug!(pid = stage.pid, "SIGTERM not delivered");
            }
        }

        let deadline = Instant::now() + self.grace;
        for stage in stages.iter_mut().rev() {
            if !stage.is_alive() {
                continue;
            }
            match tokio::time::timeout_at(deadline, stage.child.wait()).await {
                Ok(Ok(status)) => stage.mark_exited(status),
                Ok(Err(e)) => tracing::warn!(pid = stage.pid, "Failed to wait for stage: {}", e),
                Err(_) => {
                    tracing::warn!(
                        role = %stage.role,
                        pid = stage.pid,
                        "Stage ignored SIGTERM for {:?}, killing",
                        self.grace
                    );
                    if let Err(e) = stage.child.start_kill() {
                        tracing::debug!(pid = stage.pid, "SIGKILL failed: {}", e);
                    }
                    match stage.child.wait().await {
                        Ok(status) => stage.mark_exited(status),
                        Err(e) => tracing::warn!(pid = stage.pid, "Failed to reap stage: {}", e),
                    }
                }
            }
        }

        for stage in stages.iter_mut() {
            stage.abort_reader();
        }
    }
}

#[async_trait]
impl PipelineRunner for ProcessPipeline {
    async fn run(
        &mut self,
        spec: &PipelineSpec,
        events: mpsc::UnboundedSender<PipelineEvent>,
        cancel: CancellationToken,
    ) -> RunOutcome {
        self.records.clear();
        if spec.is_empty() {
            return RunOutcome::failed("pipeline has no stages");
        }
        if cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        let (line_tx, mut line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let mut stages = match Self::spawn_all(spec, &line_tx) {
            Ok(stages) => stages,
            Err((mut spawned, detail)) => {
                tracing::error!("{}", detail);
                self.terminate(&mut spawned).await;
                self.records = spawned.iter().map(RunningStage::record).collect();
                return RunOutcome::failed(detail);
            }
        };
        drop(line_tx);

        let pids = stages.iter().map(|stage| stage.pid).collect();
        let _ = events.send(PipelineEvent::Spawned { pids });

        let outcome = self.supervise(&mut stages, &mut line_rx, &events, &cancel).await;

        self.terminate(&mut stages).await;
        self.records = stages.iter().map(RunningStage::record).collect();
        outcome
    }
}
