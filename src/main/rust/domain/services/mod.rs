mod pipeline_spec_builder;

pub use pipeline_spec_builder::PipelineSpecBuilder;
