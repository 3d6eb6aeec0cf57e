//! The reset-mode action table.
//!
//! | Mode  | Run | ResetOne | ResetOthers | ResetGlobal | ResetAll | Lock |
//! |-------|-----|----------|-------------|-------------|----------|------|
//! | Wall  | play hovered | reset focused | reset all but focused | back to wall | reset all | lock hovered |
//! | Lock  | play first locked, else as Wall | reset focused, play next locked | as Wall | as Wall | as Wall | toggle hovered/focused |
//! | Multi | ignored | reset focused, play next | as Wall | ignored | as Wall | ignored |
//!
//! In Wall mode a reset also unlocks the instance. In Lock mode the locked
//! set is what `ResetOne` cycles through, so resets leave it alone.

use multiwall_capture_engine::CaptureStreamManager;
use multiwall_common::action::{KeyAction, ResetMode};
use multiwall_common::error::{WallError, WallResult};
use multiwall_instance_model::{InstanceId, InstanceRegistry};
use multiwall_layout_engine::grid;

/// What the pointer is over when a key is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverTarget {
    Instance(InstanceId),
    /// A grid cell, resolved through the current sectioning.
    Cell { section: usize, slot: usize },
}

/// The stream operations the controller issues.
pub trait StreamControl {
    fn start(&mut self, instance: InstanceId) -> WallResult<()>;
    fn reset_and_restart(&mut self, instance: InstanceId) -> WallResult<()>;
    fn resume_all(&mut self) -> WallResult<()>;
    fn stop_all_except(&mut self, keep: InstanceId);
}

impl StreamControl for CaptureStreamManager {
    fn start(&mut self, instance: InstanceId) -> WallResult<()> {
        CaptureStreamManager::start(self, instance)
    }

    fn reset_and_restart(&mut self, instance: InstanceId) -> WallResult<()> {
        CaptureStreamManager::reset_and_restart(self, instance)
    }

    fn resume_all(&mut self) -> WallResult<()> {
        CaptureStreamManager::resume_all(self)
    }

    fn stop_all_except(&mut self, keep: InstanceId) {
        CaptureStreamManager::stop_all_except(self, keep)
    }
}

/// Options that shape the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Grid sections, for resolving [`HoverTarget::Cell`].
    pub sections: usize,
    /// Stop other streams while an instance is played.
    pub pause_unfocused: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            sections: 1,
            pause_unfocused: false,
        }
    }
}

/// Changes made by one applied action.
#[derive(Debug, Default)]
pub struct ActionEffects {
    /// Instances restarted, in the order they were reset.
    pub reset: Vec<InstanceId>,
    /// Set when focus moved; the inner value is the new focus.
    pub focus: Option<Option<InstanceId>>,
    /// Lock flags that actually changed.
    pub locks: Vec<(InstanceId, bool)>,
    /// Stream operations that failed; the rest of the action still applied.
    pub failures: Vec<WallError>,
}

/// Result of feeding one action to the controller.
#[derive(Debug)]
pub enum ActionOutcome {
    Applied(ActionEffects),
    /// The caller owns the scaler and must flip it.
    ToggleSensitivity,
    /// The action means nothing in the current mode.
    Ignored,
    /// No usable target: nothing hovered or focused, or it vanished.
    Dropped,
}

/// Interprets key actions against the current mode.
#[derive(Debug, Clone)]
pub struct ResetModeController {
    mode: ResetMode,
    options: ControllerOptions,
}

impl ResetModeController {
    pub fn new(mode: ResetMode, options: ControllerOptions) -> Self {
        Self { mode, options }
    }

    pub fn mode(&self) -> ResetMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ResetMode) {
        self.mode = mode;
    }

    pub fn set_options(&mut self, options: ControllerOptions) {
        self.options = options;
    }

    /// Apply one action. Runs to completion against the registry snapshot
    /// it is given.
    pub fn apply(
        &self,
        action: KeyAction,
        hover: Option<HoverTarget>,
        registry: &mut InstanceRegistry,
        streams: &mut dyn StreamControl,
    ) -> ActionOutcome {
        use KeyAction as A;
        use ResetMode as M;

        tracing::debug!(mode = ?self.mode, %action, ?hover, "Applying key action");
        let mut run = ActionRun {
            registry,
            streams,
            effects: ActionEffects::default(),
            options: self.options,
            unlock_on_reset: self.mode == M::Wall,
        };

        let applied = match (self.mode, action) {
            (_, A::ToggleSensitivityScaling) => return ActionOutcome::ToggleSensitivity,

            (M::Multi, A::Run | A::ResetGlobal | A::Lock) => return ActionOutcome::Ignored,

            (M::Wall, A::Run) => run.play_hovered(hover),
            (M::Lock, A::Run) => match run.registry.locked().first().copied() {
                Some(first) => run.play(first),
                None => run.play_hovered(hover),
            },

            (M::Wall, A::ResetOne) => run.reset_focused(),
            (M::Lock, A::ResetOne) => run.reset_focused_then_next(true),
            (M::Multi, A::ResetOne) => run.reset_focused_then_next(false),

            (_, A::ResetOthers) => run.reset_others(),
            (_, A::ResetAll) => run.reset_all(),

            (M::Wall | M::Lock, A::ResetGlobal) => run.back_to_wall(),

            (M::Wall, A::Lock) => match run.resolve(hover) {
                Some(target) => run.set_lock(target, true),
                None => false,
            },
            (M::Lock, A::Lock) => match run.resolve(hover).or(run.registry.focused()) {
                Some(target) => run.toggle_lock(target),
                None => false,
            },
        };

        if applied {
            ActionOutcome::Applied(run.effects)
        } else {
            tracing::debug!(%action, "Key action dropped: no target");
            ActionOutcome::Dropped
        }
    }
}

/// Working state for a single `apply` call. Each step returns whether it
/// found its target.
struct ActionRun<'a> {
    registry: &'a mut InstanceRegistry,
    streams: &'a mut dyn StreamControl,
    effects: ActionEffects,
    options: ControllerOptions,
    unlock_on_reset: bool,
}

impl ActionRun<'_> {
    fn resolve(&self, hover: Option<HoverTarget>) -> Option<InstanceId> {
        match hover? {
            HoverTarget::Instance(id) => self.registry.contains(id).then_some(id),
            HoverTarget::Cell { section, slot } => {
                match grid::cell_index(self.registry.len(), self.options.sections, section, slot) {
                    Ok(index) => index.and_then(|i| self.registry.at(i)),
                    Err(e) => {
                        tracing::error!(error = %e, "Cannot resolve grid cell");
                        None
                    }
                }
            }
        }
    }

    fn record<T>(&mut self, result: WallResult<T>) {
        if let Err(e) = result {
            tracing::warn!(error = %e, "Stream operation failed during key action");
            self.effects.failures.push(e);
        }
    }

    fn play_hovered(&mut self, hover: Option<HoverTarget>) -> bool {
        match self.resolve(hover) {
            Some(target) => self.play(target),
            None => false,
        }
    }

    fn play(&mut self, target: InstanceId) -> bool {
        if self.registry.focus(target).is_err() {
            return false;
        }
        self.effects.focus = Some(Some(target));
        let started = self.streams.start(target);
        self.record(started);
        if self.options.pause_unfocused {
            self.streams.stop_all_except(target);
        }
        true
    }

    fn reset(&mut self, target: InstanceId) {
        let restarted = self.streams.reset_and_restart(target);
        self.record(restarted);
        self.effects.reset.push(target);
        if self.unlock_on_reset && matches!(self.registry.set_locked(target, false), Ok(true)) {
            self.effects.locks.push((target, false));
        }
    }

    fn reset_focused(&mut self) -> bool {
        match self.registry.focused() {
            Some(focused) => {
                self.reset(focused);
                true
            }
            None => false,
        }
    }

    fn reset_focused_then_next(&mut self, locked_only: bool) -> bool {
        let Some(focused) = self.registry.focused() else {
            // Multi has no wall to pick from; start cycling at the first instance.
            if !locked_only {
                if let Some(first) = self.registry.at(0) {
                    return self.play(first);
                }
            }
            return false;
        };

        self.reset(focused);
        let next = self
            .registry
            .next_after(focused, |i| !locked_only || i.is_locked());
        if let Some(next) = next.filter(|next| *next != focused) {
            self.play(next);
        }
        true
    }

    fn reset_others(&mut self) -> bool {
        let focused = self.registry.focused();
        for id in self.registry.ids() {
            if Some(id) != focused {
                self.reset(id);
            }
        }
        true
    }

    fn reset_all(&mut self) -> bool {
        for id in self.registry.ids() {
            self.reset(id);
        }
        true
    }

    fn back_to_wall(&mut self) -> bool {
        if self.registry.clear_focus().is_some() {
            self.effects.focus = Some(None);
        }
        let resumed = self.streams.resume_all();
        self.record(resumed);
        true
    }

    fn set_lock(&mut self, target: InstanceId, locked: bool) -> bool {
        match self.registry.set_locked(target, locked) {
            Ok(changed) => {
                if changed {
                    self.effects.locks.push((target, locked));
                }
                true
            }
            Err(_) => false,
        }
    }

    fn toggle_lock(&mut self, target: InstanceId) -> bool {
        match self.registry.toggle_locked(target) {
            Ok(locked) => {
                self.effects.locks.push((target, locked));
                true
            }
            Err(_) => false,
        }
    }
}
