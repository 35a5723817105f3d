pub mod api;
pub mod config;
pub mod content;
pub mod database;
pub mod flags;
pub mod metrics;
pub mod router;
pub mod server;
pub mod usage;

// Shared with the integration tests under tests/, so compiled into the library
pub mod utils;
