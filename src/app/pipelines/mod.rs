pub mod tracker_pipeline;

pub use tracker_pipeline::TrackerPipeline;
