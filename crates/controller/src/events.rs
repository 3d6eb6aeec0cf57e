//! Notifications published by the coordinator.

use multiwall_capture_engine::StreamState;
use multiwall_common::action::{KeyAction, ResetMode};
use multiwall_input_tracker::ScalerStatus;
use multiwall_instance_model::InstanceId;
use serde::Serialize;

/// A standing condition the user should see. Conditions are reported, not
/// fatal: the coordinator keeps running.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "condition")]
pub enum Condition {
    /// Screen capture permission missing; streams stay idle.
    CapturePermissionDenied { instance: Option<InstanceId> },
    /// Input interception permission missing; scaling stays off.
    InputPermissionDenied,
    /// A stream gave up retrying and needs a manual retry or reset.
    RetriesExhausted { instance: InstanceId, code: i64 },
    /// The captured game process ended; the instance was dropped.
    TargetClosed { instance: InstanceId },
    /// A reconfigure was rejected; the previous settings stay in effect.
    InvalidConfig { message: String },
}

/// Change notification broadcast to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum WallEvent {
    InstancesChanged {
        added: Vec<InstanceId>,
        removed: Vec<InstanceId>,
        total: usize,
    },
    FocusChanged { focused: Option<InstanceId> },
    LockChanged { instance: InstanceId, locked: bool },
    StreamStatus { instance: InstanceId, state: StreamState },
    Condition(Condition),
    SensitivityChanged(ScalerStatus),
    ModeChanged { mode: ResetMode },
    /// The action has no meaning in the current mode.
    ActionIgnored { action: KeyAction, mode: ResetMode },
}
