//! Core utilities shared by every lumen crate.
//!
//! This crate provides:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Render settings loaded from TOML

mod config;
mod error;
mod logging;
mod timer;

pub use config::RenderSettings;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameStats, Timer};
