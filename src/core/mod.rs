pub mod brjp;
pub mod classify;
pub mod dedupe;
pub mod etl;

pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
