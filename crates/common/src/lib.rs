//! Multiwall Common Utilities
//!
//! Shared infrastructure for all Multiwall crates:
//! - Error taxonomy and result alias
//! - Reset modes and key actions (the vocabulary shared by config and controller)
//! - Retry backoff for capture streams
//! - Tracing/logging initialization
//! - Configuration loading

pub mod action;
pub mod backoff;
pub mod config;
pub mod error;
pub mod logging;

pub use action::*;
pub use backoff::*;
pub use config::*;
pub use error::*;
