//! Engine Core - Foundation for the checkpoint persistence engine
//!
//! Provides shared types, error handling, configuration, and logging
//! utilities for the checkpoint storage and retention system.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{StoreConfig, VerifyMode};
pub use error::{Error, Result};
pub use types::*;
