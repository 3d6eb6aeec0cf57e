//! The ordered instance registry.
//!
//! Registry order is discovery order: new instances are appended, surviving
//! instances never move, and ids are never renumbered. "Next instance" in the
//! reset modes always walks this order.

use std::collections::HashSet;

use multiwall_common::error::{WallError, WallResult};
use multiwall_platform_core::{InstanceMetadata, WindowHandle};

use crate::instance::{InstanceId, TrackedInstance};

/// What changed during a [`InstanceRegistry::reconcile`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileDelta {
    /// Newly tracked instances, in enumeration order.
    pub added: Vec<InstanceId>,
    /// Instances whose window vanished, in former registry order.
    pub removed: Vec<InstanceId>,
}

impl ReconcileDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Owns every tracked instance.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: Vec<TrackedInstance>,
    next_id: u32,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a fresh window enumeration against the tracked instances.
    ///
    /// `teardown` is called with each vanished instance before it is
    /// dropped, so whatever the instance owns (its capture stream) is
    /// released while the instance still exists.
    pub fn reconcile(
        &mut self,
        discovered: &[WindowHandle],
        mut teardown: impl FnMut(&TrackedInstance),
    ) -> ReconcileDelta {
        let present: HashSet<WindowHandle> = discovered.iter().copied().collect();
        let mut delta = ReconcileDelta::default();

        let mut kept = Vec::with_capacity(self.instances.len());
        for instance in self.instances.drain(..) {
            if present.contains(&instance.window()) {
                kept.push(instance);
            } else {
                tracing::info!(instance = %instance.id(), window = %instance.window(), "Instance window vanished");
                teardown(&instance);
                delta.removed.push(instance.id());
            }
        }
        self.instances = kept;

        let mut tracked: HashSet<WindowHandle> =
            self.instances.iter().map(|i| i.window()).collect();
        for &window in discovered {
            if !tracked.insert(window) {
                continue;
            }
            let id = InstanceId(self.next_id);
            self.next_id += 1;
            tracing::info!(instance = %id, %window, "Tracking new instance");
            self.instances.push(TrackedInstance::new(id, window));
            delta.added.push(id);
        }

        delta
    }

    /// Drop a single instance outside a reconcile pass (its process ended).
    /// `teardown` runs before the instance is dropped, as in reconcile.
    pub fn remove(
        &mut self,
        id: InstanceId,
        teardown: impl FnOnce(&TrackedInstance),
    ) -> WallResult<()> {
        let position = self
            .position(id)
            .ok_or_else(|| WallError::not_found(id.get()))?;
        let instance = self.instances.remove(position);
        teardown(&instance);
        tracing::info!(instance = %id, "Instance removed");
        Ok(())
    }

    /// Focus `id` and clear focus everywhere else.
    pub fn focus(&mut self, id: InstanceId) -> WallResult<()> {
        if !self.contains(id) {
            return Err(WallError::not_found(id.get()));
        }
        for instance in &mut self.instances {
            instance.focused = instance.id() == id;
        }
        Ok(())
    }

    /// Clear focus. Returns the previously focused instance.
    pub fn clear_focus(&mut self) -> Option<InstanceId> {
        let previous = self.focused();
        for instance in &mut self.instances {
            instance.focused = false;
        }
        previous
    }

    /// Set the lock flag. Returns whether it changed.
    pub fn set_locked(&mut self, id: InstanceId, locked: bool) -> WallResult<bool> {
        let instance = self.get_mut(id)?;
        let changed = instance.locked != locked;
        instance.locked = locked;
        Ok(changed)
    }

    /// Flip the lock flag. Returns the new value.
    pub fn toggle_locked(&mut self, id: InstanceId) -> WallResult<bool> {
        let instance = self.get_mut(id)?;
        instance.locked = !instance.locked;
        Ok(instance.locked)
    }

    /// Fetch and cache metadata on first use; later calls return the cache
    /// without probing again, even if the first probe found nothing.
    pub fn ensure_metadata(
        &mut self,
        id: InstanceId,
        probe: impl FnOnce(WindowHandle) -> Option<InstanceMetadata>,
    ) -> WallResult<Option<&InstanceMetadata>> {
        let instance = self.get_mut(id)?;
        if !instance.metadata_fetched {
            instance.metadata = probe(instance.window());
            instance.metadata_fetched = true;
        }
        Ok(instance.metadata.as_ref())
    }

    pub fn get(&self, id: InstanceId) -> Option<&TrackedInstance> {
        self.instances.iter().find(|i| i.id() == id)
    }

    fn get_mut(&mut self, id: InstanceId) -> WallResult<&mut TrackedInstance> {
        self.instances
            .iter_mut()
            .find(|i| i.id() == id)
            .ok_or_else(|| WallError::not_found(id.get()))
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.get(id).is_some()
    }

    /// The focused instance, if any.
    pub fn focused(&self) -> Option<InstanceId> {
        self.instances.iter().find(|i| i.is_focused()).map(|i| i.id())
    }

    /// Locked instances in registry order.
    pub fn locked(&self) -> Vec<InstanceId> {
        self.instances
            .iter()
            .filter(|i| i.is_locked())
            .map(|i| i.id())
            .collect()
    }

    /// All ids in registry order.
    pub fn ids(&self) -> Vec<InstanceId> {
        self.instances.iter().map(|i| i.id()).collect()
    }

    /// Registry position of `id`.
    pub fn position(&self, id: InstanceId) -> Option<usize> {
        self.instances.iter().position(|i| i.id() == id)
    }

    /// Instance at registry position `index`.
    pub fn at(&self, index: usize) -> Option<InstanceId> {
        self.instances.get(index).map(|i| i.id())
    }

    /// The first instance after `from` in registry order (wrapping) that
    /// matches `pred`. `from` itself is considered last.
    pub fn next_after(
        &self,
        from: InstanceId,
        pred: impl Fn(&TrackedInstance) -> bool,
    ) -> Option<InstanceId> {
        let start = self.position(from)?;
        let len = self.instances.len();
        (1..=len)
            .map(|step| &self.instances[(start + step) % len])
            .find(|instance| pred(instance))
            .map(|i| i.id())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedInstance> {
        self.instances.iter()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
