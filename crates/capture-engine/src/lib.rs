//! Multiwall Capture Engine
//!
//! Keeps one capture stream per tracked instance and drives each through its
//! lifecycle. Opening and closing happen in spawned tasks; their completions
//! come back as [`StreamNotice`]s which the owner feeds into
//! [`CaptureStreamManager::handle_notice`] on the coordination task.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │               CaptureStreamManager                │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐          │
//! │  │ Stream#0 │ │ Stream#1 │ │ Stream#2 │  ...     │
//! │  └────┬─────┘ └────┬─────┘ └────┬─────┘          │
//! │       │ open/close tasks (tokio::spawn)          │
//! │       ▼                                          │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │      CaptureSource (external capability)   │  │
//! │  └────────────────────────────────────────────┘  │
//! │       │ StreamNotice (opened / failed / retry)   │
//! │       ▼                                          │
//! │  handle_notice() ──► StreamEvent (drained)       │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod classify;
pub mod manager;
pub mod stream;

pub use classify::*;
pub use manager::*;
pub use stream::*;
