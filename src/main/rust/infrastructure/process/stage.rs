use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::value_objects::StageRole;

/// One stderr line, tagged with the stage that wrote it
#[derive(Debug)]
pub(crate) struct StderrLine {
    pub stage: usize,
    pub text: String,
}

/// What is left of a stage after its run, exposed for inspection
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub role: StageRole,
    pub program: String,
    pub pid: u32,
    pub spawned_at: Instant,
    pub exited_at: Option<Instant>,
    pub exit: Option<ExitStatus>,
}

/// A spawned stage owned by the pipeline for the duration of one run
pub(crate) struct RunningStage {
    pub role: StageRole,
    pub program: String,
    pub pid: u32,
    pub child: Child,
    pub spawned_at: Instant,
    pub exited_at: Option<Instant>,
    pub exit: Option<ExitStatus>,
    pub last_line: Option<String>,
    pub reader: Option<JoinHandle<()>>,
}

impl RunningStage {
    pub fn new(role: StageRole, program: &str, child: Child) -> Self {
        Self {
            role,
            program: program.to_string(),
            pid: child.id().unwrap_or_default(),
            child,
            spawned_at: Instant::now(),
            exited_at: None,
            exit: None,
            last_line: None,
            reader: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.exit.is_none()
    }

    pub fn mark_exited(&mut self, status: ExitStatus) {
        if self.exit.is_some() {
            return;
        }
        self.exit = Some(status);
        self.exited_at = Some(Instant::now());
        tracing::info!(
            event = "stage_exited",
            role = %self.role,
            program = %self.program,
            pid = self.pid,
            status = %describe_exit(&status),
            "Stage exited"
        );
    }

    /// Non-blocking reap; records the exit status if the stage is gone
    pub fn poll_exit(&mut self) -> std::io::Result<()> {
        if self.is_alive() {
            if let Some(status) = self.child.try_wait()? {
                self.mark_exited(status);
            }
        }
        Ok(())
    }

    /// Failure detail for an abnormal exit, with the last thing the stage said
    pub fn failure_detail(&self, status: &ExitStatus) -> String {
        match &self.last_line {
            Some(line) => format!("{} {}: {}", self.program, describe_exit(status), line),
            None => format!("{} {}", self.program, describe_exit(status)),
        }
    }

    pub fn record(&self) -> StageRecord {
        StageRecord {
            role: self.role,
            program: self.program.clone(),
            pid: self.pid,
            spawned_at: self.spawned_at,
            exited_at: self.exited_at,
            exit: self.exit,
        }
    }

    pub fn abort_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

pub(crate) fn describe_exit(status: &ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exited with code {}", code),
        (None, Some(signal)) => format!("killed by signal {}", signal),
        (None, None) => "exited".to_string(),
    }
}

/// Forward stderr lines until EOF; invalid UTF-8 is replaced, not fatal
pub(crate) fn spawn_stderr_reader(
    stage: usize,
    stderr: ChildStderr,
    lines: mpsc::Sender<StderrLine>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf).trim_end().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    if lines.send(StderrLine { stage, text }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(stage, "Stopped reading stderr: {}", e);
                    break;
                }
            }
        }
    })
}

/// Ask a child to stop; false if the signal could not be delivered
pub(crate) fn send_sigterm(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: kill(2) takes plain integers and touches no memory. Callers only
    // pass the pid of a child they own and have not reaped, so it cannot have
    // been recycled for an unrelated process.
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}
