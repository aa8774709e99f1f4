// Report layer: HTML page plus optional CSV/JSON exports.

pub mod export;
pub mod format;
pub mod html;

pub use html::render_report;
