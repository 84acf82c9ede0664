//! Core utilities shared by every Ember crate.
//!
//! This crate provides:
//! - Error types and result aliases
//! - Logging initialization
//! - The game timer used to drive per-frame constants
//! - TOML-backed engine configuration

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use logging::{init_logging, init_logging_with};
pub use timer::GameTimer;
