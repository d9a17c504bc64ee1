mod process_pipeline;
mod stage;

pub use process_pipeline::ProcessPipeline;
pub use stage::StageRecord;
