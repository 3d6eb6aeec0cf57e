//! Multiwall Controller
//!
//! Turns hotkeys into instance and stream changes:
//! - **Bindings:** key chords to [`KeyAction`](multiwall_common::KeyAction)s
//! - **Reset:** the per-mode action table ([`ResetModeController`])
//! - **Coordinator:** the single task that owns every piece of mutable wall
//!   state and applies keys, window enumerations, stream completions, and
//!   configuration changes strictly one at a time
//!
//! # Architecture
//!
//! ```text
//!  hotkeys ─┐   discovery ─┐   capture callbacks ─┐
//!           ▼              ▼                      ▼
//!  ┌───────────────────────────────────────────────────┐
//!  │ Coordinator task (mpsc commands + stream notices) │
//!  │  ResetModeController ─► InstanceRegistry          │
//!  │                     └─► CaptureStreamManager      │
//!  │  LayoutPulse   MouseSensitivityScaler (own thread)│
//!  └───────────────────────┬───────────────────────────┘
//!                          ▼
//!              broadcast::Sender<WallEvent>
//! ```

pub mod bindings;
pub mod coordinator;
pub mod events;
pub mod reset;

pub use bindings::*;
pub use coordinator::*;
pub use events::*;
pub use reset::*;
