//! # joinwatch Common Library
//!
//! Shared code for the joinwatch crates:
//! - Error type and result alias
//! - Bootstrap configuration (TOML file, environment, root folder)
//! - Atomic file writes
//! - Tracing initialisation
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod fs;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
