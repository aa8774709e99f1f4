pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod report;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use adapters::LocalStorage;
pub use app::pipelines::TrackerPipeline;
pub use config::TrackerConfig;
pub use core::etl::EtlEngine;
pub use utils::error::{EtlError, Result};
