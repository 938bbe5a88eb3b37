pub mod config;
pub mod contracts;
pub mod log;
pub mod tracking;
