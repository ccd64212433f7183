pub mod cache;
pub mod dataset;
pub mod snapshot;
pub mod tables;
pub mod zip_guard;
