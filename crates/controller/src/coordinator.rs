//! The single-writer coordination task.
//!
//! Everything mutable about the wall (registry, streams, mode, scaler) is
//! owned by one [`Coordinator`] running on one tokio task. Other tasks talk
//! to it through a [`CoordinatorHandle`]; capture completions come back as
//! [`StreamNotice`]s on a second channel. Each command runs to completion
//! before the next is looked at, so a key action always sees a consistent
//! registry.

use std::sync::Arc;
use std::time::Duration;

use multiwall_capture_engine::{CaptureStreamManager, StreamEvent, StreamNotice, StreamState};
use multiwall_common::action::{KeyAction, ResetMode};
use multiwall_common::config::WallConfig;
use multiwall_common::error::{WallError, WallResult};
use multiwall_input_tracker::{MouseSensitivityScaler, ScalerStatus};
use multiwall_instance_model::{InstanceId, InstanceRegistry};
use multiwall_layout_engine::{LayoutPulse, PulseTiming};
use multiwall_platform_core::{
    CaptureSource, FailureCode, InstanceMetadata, PermissionGateway, PointerTapProvider,
    StreamHandle, WindowHandle, WindowSource,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::bindings::{KeyBindingResolver, KeyBindingTable, KeyChord};
use crate::events::{Condition, WallEvent};
use crate::reset::{ActionOutcome, ControllerOptions, HoverTarget, ResetModeController};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

/// The platform capabilities the wall runs on.
#[derive(Clone)]
pub struct Platform {
    pub windows: Arc<dyn WindowSource>,
    pub capture: Arc<dyn CaptureSource>,
    pub permissions: Arc<dyn PermissionGateway>,
    pub pointer: Arc<dyn PointerTapProvider>,
}

/// Requests handled by the coordination task.
#[derive(Debug)]
pub enum Command {
    Key {
        action: KeyAction,
        hover: Option<HoverTarget>,
    },
    /// A raw chord, resolved through the configured bindings.
    Chord {
        chord: KeyChord,
        hover: Option<HoverTarget>,
    },
    /// A fresh window enumeration.
    Windows(Vec<WindowHandle>),
    /// The wall application gained or lost OS focus.
    AppFocus(bool),
    Reconfigure(Box<WallConfig>),
    /// Manual retry of an errored stream.
    Retry(InstanceId),
    /// An error the capture capability reported on one stream.
    FrameError {
        instance: InstanceId,
        stream: StreamHandle,
        code: FailureCode,
    },
    Metadata {
        instance: InstanceId,
        reply: oneshot::Sender<WallResult<Option<InstanceMetadata>>>,
    },
    Snapshot(oneshot::Sender<WallSnapshot>),
    Shutdown,
}

/// One instance as seen in a [`WallSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceView {
    pub id: InstanceId,
    pub window: WindowHandle,
    pub locked: bool,
    pub focused: bool,
    pub stream: Option<StreamState>,
    /// Open capture stream, while active.
    pub capture: Option<StreamHandle>,
    /// Why the stream is errored, while it is.
    pub last_error: Option<String>,
    /// Only present once metadata has been requested for this instance.
    pub metadata: Option<InstanceMetadata>,
}

/// Point-in-time copy of the wall state, in registry order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WallSnapshot {
    pub mode: ResetMode,
    pub sections: usize,
    pub app_focused: bool,
    pub layout_animating: bool,
    pub sensitivity: ScalerStatus,
    pub instances: Vec<InstanceView>,
}

impl WallSnapshot {
    pub fn focused(&self) -> Option<InstanceId> {
        self.instances.iter().find(|i| i.focused).map(|i| i.id)
    }

    pub fn locked(&self) -> Vec<InstanceId> {
        self.instances
            .iter()
            .filter(|i| i.locked)
            .map(|i| i.id)
            .collect()
    }

    pub fn ids(&self) -> Vec<InstanceId> {
        self.instances.iter().map(|i| i.id).collect()
    }

    pub fn stream(&self, id: InstanceId) -> Option<StreamState> {
        self.instances
            .iter()
            .find(|i| i.id == id)
            .and_then(|i| i.stream)
    }
}

/// Owns all mutable wall state.
pub struct Coordinator {
    config: WallConfig,
    platform: Platform,
    bindings: KeyBindingTable,
    registry: InstanceRegistry,
    streams: CaptureStreamManager,
    notices: mpsc::UnboundedReceiver<StreamNotice>,
    controller: ResetModeController,
    pulse: LayoutPulse,
    scaler: MouseSensitivityScaler,
    sensitivity: ScalerStatus,
    app_focused: bool,
    events: broadcast::Sender<WallEvent>,
}

impl Coordinator {
    /// Build a coordinator. Fails when the configuration is invalid.
    pub fn new(config: WallConfig, platform: Platform) -> WallResult<Self> {
        config.validate()?;
        let bindings = KeyBindingTable::from_config(&config.keybindings)?;
        if bindings.is_empty() {
            tracing::warn!("No key bindings configured; only direct key actions will work");
        } else {
            tracing::debug!(bindings = bindings.len(), "Key bindings loaded");
        }
        let (streams, notices) = CaptureStreamManager::new(
            platform.capture.clone(),
            platform.permissions.clone(),
            config.capture.retry_policy(),
        );
        let controller = ResetModeController::new(config.reset_mode, options_for(&config));
        let pulse = LayoutPulse::new(PulseTiming::from(&config.layout));
        let scaler = MouseSensitivityScaler::new(
            platform.pointer.clone(),
            platform.permissions.clone(),
            config.sensitivity.enabled,
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            config,
            platform,
            bindings,
            registry: InstanceRegistry::new(),
            streams,
            notices,
            controller,
            pulse,
            scaler,
            sensitivity: ScalerStatus::Disabled,
            app_focused: true,
            events,
        })
    }

    /// Run on a new tokio task.
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<WallResult<()>>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = CoordinatorHandle {
            commands: tx,
            events: self.events.clone(),
            layout: self.pulse.subscribe(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    /// Process commands and stream notices until shutdown or until every
    /// handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> WallResult<()> {
        tracing::info!(mode = %self.config.reset_mode, "Coordinator started");
        let initial = self
            .scaler
            .set_factor(self.config.sensitivity.factor, None);
        self.record_scaler(initial);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(notice) = self.notices.recv() => {
                    self.streams.handle_notice(notice);
                    self.flush_stream_events();
                }
            }
        }

        self.streams.stop_all();
        self.scaler.stop();
        tracing::info!("Coordinator stopped");
        Ok(())
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Key { action, hover } => self.on_key(action, hover),
            Command::Chord { chord, hover } => match self.bindings.resolve(&chord) {
                Some(action) => self.on_key(action, hover),
                None => tracing::trace!(%chord, "Unbound chord"),
            },
            Command::Windows(windows) => self.on_windows(&windows),
            Command::AppFocus(focused) => self.on_app_focus(focused),
            Command::Reconfigure(config) => self.on_reconfigure(*config),
            Command::Retry(instance) => {
                if let Err(e) = self.streams.retry(instance) {
                    tracing::warn!(%instance, error = %e, "Manual retry failed");
                }
                self.flush_stream_events();
            }
            Command::FrameError {
                instance,
                stream,
                code,
            } => {
                self.streams.handle_notice(StreamNotice::FrameError {
                    instance,
                    stream,
                    code,
                });
                self.flush_stream_events();
            }
            Command::Metadata { instance, reply } => {
                let windows = self.platform.windows.clone();
                let metadata = self
                    .registry
                    .ensure_metadata(instance, |window| windows.describe(window))
                    .map(|m| m.cloned());
                let _ = reply.send(metadata);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            // Handled by the run loop.
            Command::Shutdown => {}
        }
    }

    fn on_key(&mut self, action: KeyAction, hover: Option<HoverTarget>) {
        let outcome = self
            .controller
            .apply(action, hover, &mut self.registry, &mut self.streams);

        match outcome {
            ActionOutcome::Applied(effects) => {
                if let Some(focused) = effects.focus {
                    self.emit(WallEvent::FocusChanged { focused });
                }
                for (instance, locked) in effects.locks {
                    self.emit(WallEvent::LockChanged { instance, locked });
                }
                for failure in &effects.failures {
                    if failure.is_standing() {
                        tracing::warn!(%action, error = %failure, "Key action blocked by standing condition");
                    } else {
                        tracing::debug!(%action, error = %failure, "Key action partially applied");
                    }
                }
            }
            ActionOutcome::ToggleSensitivity => {
                let status = self.scaler.toggle();
                self.record_scaler(status);
            }
            ActionOutcome::Ignored => {
                let mode = self.controller.mode();
                tracing::debug!(%action, %mode, "Action ignored in this mode");
                self.emit(WallEvent::ActionIgnored { action, mode });
            }
            ActionOutcome::Dropped => {}
        }
        self.flush_stream_events();
    }

    fn on_windows(&mut self, windows: &[WindowHandle]) {
        let previous_focus = self.registry.focused();
        let streams = &mut self.streams;
        let delta = self
            .registry
            .reconcile(windows, |instance| streams.teardown(instance.id()));
        if delta.is_empty() {
            return;
        }

        for &id in &delta.added {
            if let Some(instance) = self.registry.get(id) {
                self.streams.track(id, instance.window());
            }
        }
        if self.should_stream_wall() {
            for &id in &delta.added {
                if let Err(e) = self.streams.start(id) {
                    tracing::warn!(instance = %id, error = %e, "Stream not started");
                }
            }
        }

        let total = self.registry.len();
        tracing::info!(
            added = delta.added.len(),
            removed = delta.removed.len(),
            total,
            "Instance set changed"
        );
        self.emit(WallEvent::InstancesChanged {
            added: delta.added,
            removed: delta.removed,
            total,
        });
        self.after_membership_change(previous_focus);
        self.flush_stream_events();
    }

    fn on_app_focus(&mut self, focused: bool) {
        if focused == self.app_focused {
            return;
        }
        self.app_focused = focused;
        tracing::info!(focused, "Application focus changed");

        if !focused {
            if self.config.capture.stop_on_focus_loss {
                self.streams.stop_all();
            }
        } else {
            let resumed = match self.registry.focused() {
                Some(playing) if self.config.capture.pause_unfocused => {
                    self.streams.start(playing)
                }
                _ => self.streams.resume_all(),
            };
            if let Err(e) = resumed {
                tracing::warn!(error = %e, "Streams not resumed");
            }
        }
        self.flush_stream_events();
    }

    fn on_reconfigure(&mut self, config: WallConfig) {
        let bindings = match config
            .validate()
            .and_then(|()| KeyBindingTable::from_config(&config.keybindings))
        {
            Ok(bindings) => bindings,
            Err(e) => {
                tracing::error!(error = %e, "Rejected configuration");
                self.emit(WallEvent::Condition(Condition::InvalidConfig {
                    message: e.to_string(),
                }));
                return;
            }
        };

        self.bindings = bindings;
        if config.reset_mode != self.config.reset_mode {
            tracing::info!(from = %self.config.reset_mode, to = %config.reset_mode, "Reset mode changed");
            self.controller.set_mode(config.reset_mode);
            self.emit(WallEvent::ModeChanged {
                mode: config.reset_mode,
            });
        }
        self.controller.set_options(options_for(&config));
        self.streams.set_retry_policy(config.capture.retry_policy());
        self.pulse.set_timing(PulseTiming::from(&config.layout));

        let sensitivity_changed = config.sensitivity != self.config.sensitivity;
        self.config = config;
        if sensitivity_changed {
            let status = self.scaler.configure(
                self.config.sensitivity.enabled,
                self.config.sensitivity.factor,
            );
            self.record_scaler(status);
        }
        tracing::debug!("Configuration applied");
    }

    /// Follow-up shared by enumeration and target-closed removal.
    fn after_membership_change(&mut self, previous_focus: Option<InstanceId>) {
        let focused = self.registry.focused();
        if focused != previous_focus {
            self.emit(WallEvent::FocusChanged { focused });
        }
        // The played instance vanished; the paused wall comes back.
        if previous_focus.is_some()
            && focused.is_none()
            && self.config.capture.pause_unfocused
            && self.should_stream_wall()
        {
            tracing::info!("Focused instance gone; resuming wall streams");
            if let Err(e) = self.streams.resume_all() {
                tracing::warn!(error = %e, "Streams not resumed");
            }
        }
        self.pulse.observe(self.registry.len());
    }

    fn flush_stream_events(&mut self) {
        loop {
            let events = self.streams.drain_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                self.on_stream_event(event);
            }
        }
    }

    fn on_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::StatusChanged { instance, state } => {
                self.emit(WallEvent::StreamStatus { instance, state });
            }
            StreamEvent::TargetClosed { instance } => {
                let previous_focus = self.registry.focused();
                let streams = &mut self.streams;
                if self
                    .registry
                    .remove(instance, |_| streams.teardown(instance))
                    .is_err()
                {
                    return;
                }
                self.emit(WallEvent::Condition(Condition::TargetClosed { instance }));
                self.emit(WallEvent::InstancesChanged {
                    added: Vec::new(),
                    removed: vec![instance],
                    total: self.registry.len(),
                });
                self.after_membership_change(previous_focus);
            }
            StreamEvent::RetryScheduled { .. } => {}
            StreamEvent::RetriesExhausted { instance, code } => {
                self.emit(WallEvent::Condition(Condition::RetriesExhausted {
                    instance,
                    code,
                }));
            }
            StreamEvent::PermissionDenied { instance } => {
                self.emit(WallEvent::Condition(Condition::CapturePermissionDenied {
                    instance: Some(instance),
                }));
            }
        }
    }

    fn record_scaler(&mut self, result: WallResult<ScalerStatus>) {
        match result {
            Ok(status) => {
                self.sensitivity = status;
                self.emit(WallEvent::SensitivityChanged(status));
            }
            Err(WallError::PermissionDenied { .. }) => {
                self.sensitivity = ScalerStatus::Disabled;
                self.emit(WallEvent::Condition(Condition::InputPermissionDenied));
            }
            Err(e) => {
                tracing::error!(error = %e, "Sensitivity scaler failed");
                self.sensitivity = ScalerStatus::Disabled;
            }
        }
    }

    /// Whether every instance's stream should be running right now.
    fn should_stream_wall(&self) -> bool {
        let paused_for_play =
            self.config.capture.pause_unfocused && self.registry.focused().is_some();
        let paused_for_app = !self.app_focused && self.config.capture.stop_on_focus_loss;
        !paused_for_play && !paused_for_app
    }

    fn snapshot(&self) -> WallSnapshot {
        WallSnapshot {
            mode: self.controller.mode(),
            sections: self.config.layout.sections,
            app_focused: self.app_focused,
            layout_animating: self.pulse.is_active(),
            sensitivity: self.sensitivity,
            instances: self
                .registry
                .iter()
                .map(|instance| InstanceView {
                    id: instance.id(),
                    window: instance.window(),
                    locked: instance.is_locked(),
                    focused: instance.is_focused(),
                    stream: self.streams.state(instance.id()),
                    capture: self.streams.handle(instance.id()),
                    last_error: self.stream_error(instance.id()),
                    metadata: instance.metadata().cloned(),
                })
                .collect(),
        }
    }

    fn stream_error(&self, id: InstanceId) -> Option<String> {
        if self.streams.state(id) != Some(StreamState::Errored) {
            return None;
        }
        self.streams
            .last_error(id)
            .map(|kind| kind.into_error(id).to_string())
    }

    fn emit(&self, event: WallEvent) {
        tracing::trace!(?event, "Wall event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn options_for(config: &WallConfig) -> ControllerOptions {
    ControllerOptions {
        sections: config.layout.sections,
        pause_unfocused: config.capture.pause_unfocused,
    }
}

/// Cloneable sender side of a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<WallEvent>,
    layout: watch::Receiver<bool>,
}

impl CoordinatorHandle {
    async fn send(&self, command: Command) -> WallResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| WallError::ChannelClosed)
    }

    pub async fn key(&self, action: KeyAction, hover: Option<HoverTarget>) -> WallResult<()> {
        self.send(Command::Key { action, hover }).await
    }

    pub async fn chord(&self, chord: KeyChord, hover: Option<HoverTarget>) -> WallResult<()> {
        self.send(Command::Chord { chord, hover }).await
    }

    pub async fn windows(&self, windows: Vec<WindowHandle>) -> WallResult<()> {
        self.send(Command::Windows(windows)).await
    }

    pub async fn app_focus(&self, focused: bool) -> WallResult<()> {
        self.send(Command::AppFocus(focused)).await
    }

    pub async fn reconfigure(&self, config: WallConfig) -> WallResult<()> {
        self.send(Command::Reconfigure(Box::new(config))).await
    }

    pub async fn retry(&self, instance: InstanceId) -> WallResult<()> {
        self.send(Command::Retry(instance)).await
    }

    /// Forward an error the capture capability reported on `stream`.
    /// Reports for a stream the instance no longer uses are ignored.
    pub async fn report_frame_error(
        &self,
        instance: InstanceId,
        stream: StreamHandle,
        code: FailureCode,
    ) -> WallResult<()> {
        self.send(Command::FrameError {
            instance,
            stream,
            code,
        })
        .await
    }

    /// Instance metadata, probed on the first request and cached after.
    pub async fn metadata(&self, instance: InstanceId) -> WallResult<Option<InstanceMetadata>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Metadata { instance, reply }).await?;
        rx.await.map_err(|_| WallError::ChannelClosed)?
    }

    pub async fn snapshot(&self) -> WallResult<WallSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| WallError::ChannelClosed)
    }

    pub async fn shutdown(&self) -> WallResult<()> {
        self.send(Command::Shutdown).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WallEvent> {
        self.events.subscribe()
    }

    /// The layout-animation flag.
    pub fn layout_pulse(&self) -> watch::Receiver<bool> {
        self.layout.clone()
    }
}

/// Poll `windows` every `interval` and hand changed enumerations to the
/// coordinator. Ends when the coordinator goes away.
pub fn spawn_discovery(
    windows: Arc<dyn WindowSource>,
    handle: CoordinatorHandle,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut last: Option<Vec<WindowHandle>> = None;
        loop {
            ticker.tick().await;
            let found = match windows.enumerate() {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(error = %e, "Window enumeration failed");
                    continue;
                }
            };
            if last.as_ref() == Some(&found) {
                continue;
            }
            last = Some(found.clone());
            if handle.windows(found).await.is_err() {
                tracing::debug!("Coordinator gone; discovery stopping");
                break;
            }
        }
    })
}
