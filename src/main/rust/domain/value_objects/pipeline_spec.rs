use std::fmt;

/// What a stage does within a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRole {
    /// Emits an encoded elementary stream on stdout
    Capture,
    /// Muxes stdin and transmits to the destination
    Publish,
    /// Captures, encodes, muxes and transmits in one process
    CaptureAndPublish,
}

impl StageRole {
    /// Whether this stage's output confirms the outbound connection
    pub fn publishes(&self) -> bool {
        matches!(self, Self::Publish | Self::CaptureAndPublish)
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => write!(f, "capture"),
            Self::Publish => write!(f, "publish"),
            Self::CaptureAndPublish => write!(f, "capture+publish"),
        }
    }
}

/// One OS process of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    role: StageRole,
    program: String,
    args: Vec<String>,
    pipe_to_next: bool,
}

impl ProcessSpec {
    pub fn new(role: StageRole, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            role,
            program: program.into(),
            args,
            pipe_to_next: false,
        }
    }

    pub fn piped_to_next(mut self) -> Self {
        self.pipe_to_next = true;
        self
    }

    pub fn role(&self) -> StageRole {
        self.role
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn pipe_to_next(&self) -> bool {
        self.pipe_to_next
    }

    /// Shell-like rendering for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Ordered stages for one attempt; built fresh per attempt, never mutated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    stages: Vec<ProcessSpec>,
}

impl PipelineSpec {
    /// A trailing `pipe_to_next` flag has nothing to feed and is cleared
    pub fn new(mut stages: Vec<ProcessSpec>) -> Self {
        if let Some(last) = stages.last_mut() {
            last.pipe_to_next = false;
        }
        Self { stages }
    }

    pub fn stages(&self) -> &[ProcessSpec] {
        &self.stages
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
