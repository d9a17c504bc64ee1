use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::value_objects::{PipelineSpec, RunOutcome};

/// Progress reported by a runner while a run is in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Every stage has been spawned
    Spawned { pids: Vec<u32> },
    /// The publishing stage confirmed an established stream
    Steady,
}

/// Port for pipeline runner implementations
#[async_trait]
pub trait PipelineRunner: Send {
    /// Run the pipeline once until it ends, fails or is cancelled.
    ///
    /// Implementations must not return while any stage of this run is still
    /// alive, and must never retry on their own.
    async fn run(
        &mut self,
        spec: &PipelineSpec,
        events: mpsc::UnboundedSender<PipelineEvent>,
        cancel: CancellationToken,
    ) -> RunOutcome;
}
