//! The per-instance capture stream state machine.
//!
//! ```text
//!   Idle ──start──► Starting ──opened──► Active
//!    ▲                 │                   │
//!    │               failed            frame error
//!    │                 ▼                   │
//!    └──────stop──── Errored ◄─────────────┘
//!                      │
//!                    retry ──► Starting
//! ```
//!
//! Every transition into `Starting` bumps a generation counter, and so does
//! every stop. An open completion carries the generation it was issued under;
//! a mismatch means the request was superseded and the result is stale.

use multiwall_platform_core::{StreamHandle, WindowHandle};
use serde::{Deserialize, Serialize};

use crate::classify::StreamErrorKind;

/// Lifecycle state of a capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamState {
    Idle,
    Starting,
    Active,
    Errored,
}

/// Result of delivering an open completion to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The stream is now active.
    Activated,
    /// The request was superseded; the caller must close this handle.
    Stale(StreamHandle),
}

/// One instance's capture stream.
#[derive(Debug, Clone)]
pub struct CaptureStream {
    window: WindowHandle,
    state: StreamState,
    handle: Option<StreamHandle>,
    generation: u64,
    last_error: Option<StreamErrorKind>,
    failed_attempts: u32,
}

impl CaptureStream {
    pub fn new(window: WindowHandle) -> Self {
        Self {
            window,
            state: StreamState::Idle,
            handle: None,
            generation: 0,
            last_error: None,
            failed_attempts: 0,
        }
    }

    pub fn window(&self) -> WindowHandle {
        self.window
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_error(&self) -> Option<StreamErrorKind> {
        self.last_error
    }

    /// Handle of the open stream, while active.
    pub fn handle(&self) -> Option<StreamHandle> {
        self.handle
    }

    /// Consecutive failures since the stream was last active or manually retried.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// `Idle -> Starting`. Returns the generation of the new open request,
    /// or `None` when the stream is not idle.
    pub fn start(&mut self) -> Option<u64> {
        if self.state != StreamState::Idle {
            return None;
        }
        Some(self.enter_starting())
    }

    /// `Errored -> Starting`. Returns `None` when the stream is not errored.
    pub fn retry(&mut self) -> Option<u64> {
        if self.state != StreamState::Errored {
            return None;
        }
        Some(self.enter_starting())
    }

    /// Forget previous failures so automatic retries get a fresh budget.
    pub fn reset_attempts(&mut self) {
        self.failed_attempts = 0;
    }

    fn enter_starting(&mut self) -> u64 {
        self.generation += 1;
        self.state = StreamState::Starting;
        self.generation
    }

    /// Deliver a successful open issued under `generation`.
    pub fn opened(&mut self, generation: u64, handle: StreamHandle) -> OpenOutcome {
        if generation != self.generation || self.state != StreamState::Starting {
            return OpenOutcome::Stale(handle);
        }
        self.state = StreamState::Active;
        self.handle = Some(handle);
        self.last_error = None;
        self.failed_attempts = 0;
        OpenOutcome::Activated
    }

    /// Deliver a failed open issued under `generation`. Returns `false` when
    /// the completion is stale and was ignored.
    pub fn open_failed(&mut self, generation: u64, kind: StreamErrorKind) -> bool {
        if generation != self.generation || self.state != StreamState::Starting {
            return false;
        }
        self.fail(kind);
        true
    }

    /// `Active -> Errored` on a delivery error reported for `stream`.
    /// Returns the handle that must be closed, or `None` when the stream was
    /// not active or the report names a handle that has since been replaced.
    pub fn frame_error(
        &mut self,
        stream: StreamHandle,
        kind: StreamErrorKind,
    ) -> Option<StreamHandle> {
        if self.state != StreamState::Active || self.handle != Some(stream) {
            return None;
        }
        let handle = self.handle.take();
        self.fail(kind);
        handle
    }

    fn fail(&mut self, kind: StreamErrorKind) {
        self.state = StreamState::Errored;
        self.last_error = Some(kind);
        self.failed_attempts = self.failed_attempts.saturating_add(1);
    }

    /// Go to `Idle` from any state, invalidating an in-flight open.
    /// Returns `None` if already idle, otherwise the handle to close (if any).
    pub fn stop(&mut self) -> Option<Option<StreamHandle>> {
        if self.state == StreamState::Idle {
            return None;
        }
        self.generation += 1;
        self.state = StreamState::Idle;
        self.last_error = None;
        Some(self.handle.take())
    }
}
