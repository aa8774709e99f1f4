// Adapters layer: concrete implementations for external systems.

pub mod ckan;
pub mod storage;

pub use ckan::CkanClient;
pub use storage::LocalStorage;
