//! Multiwall Input Tracker
//!
//! Rescales raw pointer motion while sensitivity scaling is enabled. The
//! interception loop runs on its own thread against a platform
//! [`PointerTap`](multiwall_platform_core::PointerTap); the coordinator only
//! starts, stops, and retunes it.
//!
//! - **Accumulator:** per-axis fractional carry so no motion is dropped
//! - **Scaler:** tap lifecycle, enable flag, and the worker thread

pub mod accumulator;
pub mod scaler;

pub use accumulator::*;
pub use scaler::*;
