//! A single tracked game instance.

use std::fmt;

use multiwall_platform_core::{InstanceMetadata, WindowHandle};
use serde::{Deserialize, Serialize};

/// Session-unique ordinal assigned when an instance is first discovered.
///
/// Ordinals only grow; an id is never reused after its instance disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub u32);

impl InstanceId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A game instance tracked by the wall.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedInstance {
    id: InstanceId,
    window: WindowHandle,
    pub(crate) locked: bool,
    pub(crate) focused: bool,
    pub(crate) metadata: Option<InstanceMetadata>,
    pub(crate) metadata_fetched: bool,
}

impl TrackedInstance {
    pub(crate) fn new(id: InstanceId, window: WindowHandle) -> Self {
        Self {
            id,
            window,
            locked: false,
            focused: false,
            metadata: None,
            metadata_fetched: false,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// The window this instance was discovered on.
    pub fn window(&self) -> WindowHandle {
        self.window
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Cached metadata; `None` until fetched or when the window had none.
    pub fn metadata(&self) -> Option<&InstanceMetadata> {
        self.metadata.as_ref()
    }
}
