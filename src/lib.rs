pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod query;
pub mod server;
pub mod timestamp;
