//! Screenwatch Common - shared configuration, logging, errors and validation.
//!
//! This crate provides:
//! - Configuration types and loading (JSON file + environment overrides)
//! - Logging setup with structured output
//! - The unified error type used at the service boundary
//! - Ticker and request validation helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    BatchConfig, Config, DstRule, ObservabilityConfig, RetryPolicy, SchedulerConfig,
    UpstreamConfig, WatchlistConfig,
};
pub use error::{Error, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, RetryPolicy, SchedulerConfig};
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::normalize_ticker;
}
