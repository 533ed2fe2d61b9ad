pub mod config;
pub mod error;
pub mod logging;
pub mod slot_backend;
