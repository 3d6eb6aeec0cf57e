//! Multiwall platform core contracts.
//!
//! The wall core never talks to the OS directly. Window discovery, capture,
//! permission checks, and raw pointer interception are consumed through the
//! traits in this crate; OS backends and the in-memory [`simulated`] platform
//! implement them.

pub mod simulated;

use std::fmt;

use async_trait::async_trait;
use multiwall_common::error::WallResult;
use serde::{Deserialize, Serialize};

/// Opaque reference to a game window, as produced by window discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window:{:#x}", self.0)
    }
}

/// Opaque reference to an open capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamHandle(pub u64);

/// Numeric failure code reported by the capture capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureCode(pub i64);

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mod loader / game version information read from a running instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstanceMetadata {
    /// Mod loader name, if any (e.g. "fabric").
    pub loader: Option<String>,
    /// Game version string (e.g. "1.16.1").
    pub game_version: Option<String>,
}

/// Kind of raw pointer event seen by the interception tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerEventKind {
    Move,
    Drag,
    /// Buttons, scroll, and anything else the scaler passes through untouched.
    Other,
}

/// A raw pointer event with integer deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub dx: i64,
    pub dy: i64,
}

impl PointerEvent {
    pub fn motion(dx: i64, dy: i64) -> Self {
        Self {
            kind: PointerEventKind::Move,
            dx,
            dy,
        }
    }

    pub fn drag(dx: i64, dy: i64) -> Self {
        Self {
            kind: PointerEventKind::Drag,
            dx,
            dy,
        }
    }

    /// Whether the sensitivity scaler should rewrite this event.
    pub fn is_scalable(&self) -> bool {
        matches!(self.kind, PointerEventKind::Move | PointerEventKind::Drag)
            && (self.dx != 0 || self.dy != 0)
    }
}

/// Enumerates candidate game windows.
pub trait WindowSource: Send + Sync {
    /// Current candidate windows, in discovery order.
    fn enumerate(&self) -> WallResult<Vec<WindowHandle>>;

    /// Read mod/version information for a window. Called lazily, at most
    /// once per instance.
    fn describe(&self, _window: WindowHandle) -> Option<InstanceMetadata> {
        None
    }
}

/// Opens and closes per-window capture streams.
///
/// Frame delivery happens inside the implementation; the wall core only sees
/// whether a stream opened, failed, or later errored.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Open a capture stream on `window`.
    async fn open(&self, window: WindowHandle) -> Result<StreamHandle, FailureCode>;

    /// Close a previously opened stream.
    async fn close(&self, stream: StreamHandle);
}

/// Reports whether the OS granted the permissions the wall needs.
pub trait PermissionGateway: Send + Sync {
    /// Screen / window capture permission.
    fn capture_permitted(&self) -> bool;

    /// Raw input interception permission (accessibility / input monitoring).
    fn input_permitted(&self) -> bool;
}

/// An installed raw pointer interception tap.
///
/// The tap is driven from a dedicated thread: every event returned by
/// [`PointerTap::poll`] must be handed back through [`PointerTap::post`],
/// rewritten or not.
pub trait PointerTap: Send {
    /// Next intercepted event, or `None` when nothing is pending.
    fn poll(&mut self) -> WallResult<Option<PointerEvent>>;

    /// Release an event (possibly rewritten) to the rest of the system.
    fn post(&mut self, event: PointerEvent) -> WallResult<()>;

    /// Tap name for logging.
    fn name(&self) -> &str;
}

/// Installs pointer taps.
pub trait PointerTapProvider: Send + Sync {
    fn install(&self) -> WallResult<Box<dyn PointerTap>>;
}
