//! Layout animation pulse.
//!
//! When the number of instances changes the wall re-flows, and the renderer
//! animates that for `count * step + base`. The pulse is the boolean the
//! renderer watches: raised on every count change and lowered once the delay
//! for the latest change has elapsed. A new change while a clear is pending
//! cancels that clear and starts a new one, so a pulse is only ever lowered
//! once, by the most recent trigger.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use multiwall_common::config::LayoutConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Animation timing constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTiming {
    /// Per-instance share (`k`).
    pub step: Duration,
    /// Fixed part (`k0`).
    pub base: Duration,
}

impl PulseTiming {
    pub fn delay_for(&self, count: usize) -> Duration {
        self.step
            .saturating_mul(u32::try_from(count).unwrap_or(u32::MAX))
            .saturating_add(self.base)
    }
}

impl From<&LayoutConfig> for PulseTiming {
    fn from(config: &LayoutConfig) -> Self {
        Self {
            step: Duration::from_millis(config.animation_step_ms),
            base: Duration::from_millis(config.animation_base_ms),
        }
    }
}

#[derive(Debug, Default)]
struct PulseShared {
    generation: u64,
    clears: u64,
}

/// Raises and lowers the layout-animation flag.
pub struct LayoutPulse {
    timing: PulseTiming,
    state: Arc<watch::Sender<bool>>,
    shared: Arc<Mutex<PulseShared>>,
    pending: Option<JoinHandle<()>>,
    last_count: usize,
}

impl LayoutPulse {
    pub fn new(timing: PulseTiming) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            timing,
            state: Arc::new(tx),
            shared: Arc::new(Mutex::new(PulseShared::default())),
            pending: None,
            last_count: 0,
        }
    }

    pub fn set_timing(&mut self, timing: PulseTiming) {
        self.timing = timing;
    }

    /// Whether the layout is currently animating.
    pub fn is_active(&self) -> bool {
        *self.state.borrow()
    }

    /// Receive every raise and lower.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Number of times the pulse has been lowered.
    pub fn clears(&self) -> u64 {
        self.lock_shared().clears
    }

    /// Feed the current instance count. Triggers when it differs from the
    /// previous count; returns whether it did.
    ///
    /// Must be called inside a tokio runtime.
    pub fn observe(&mut self, count: usize) -> bool {
        if count == self.last_count {
            return false;
        }
        self.last_count = count;
        self.trigger(count);
        true
    }

    fn trigger(&mut self, count: usize) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }

        let generation = {
            let mut shared = self.lock_shared();
            shared.generation += 1;
            self.state.send_replace(true);
            shared.generation
        };

        let delay = self.timing.delay_for(count);
        tracing::debug!(count, ?delay, "Layout pulse raised");

        let state = self.state.clone();
        let shared = self.shared.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut shared = shared.lock().unwrap_or_else(|p| p.into_inner());
            if shared.generation == generation {
                shared.clears += 1;
                state.send_replace(false);
            }
        }));
    }

    fn lock_shared(&self) -> std::sync::MutexGuard<'_, PulseShared> {
        self.shared.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for LayoutPulse {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing() -> PulseTiming {
        PulseTiming {
            step: Duration::from_millis(10),
            base: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_delay_is_linear_in_count() {
        assert_eq!(timing().delay_for(0), Duration::from_millis(100));
        assert_eq!(timing().delay_for(5), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_raises_then_clears_once() {
        let mut pulse = LayoutPulse::new(timing());
        assert!(!pulse.observe(0));
        assert!(pulse.observe(4));
        assert!(pulse.is_active());

        tokio::time::sleep(Duration::from_millis(139)).await;
        assert!(pulse.is_active());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!pulse.is_active());
        assert_eq!(pulse.clears(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrigger_restarts_the_clear() {
        let mut pulse = LayoutPulse::new(timing());
        pulse.observe(2); // clears at 120ms
        tokio::time::sleep(Duration::from_millis(100)).await;
        pulse.observe(3); // clears at 100 + 130ms

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pulse.is_active());
        assert_eq!(pulse.clears(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pulse.is_active());
        assert_eq!(pulse.clears(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_count_does_not_trigger() {
        let mut pulse = LayoutPulse::new(timing());
        pulse.observe(3);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!pulse.observe(3));
        assert!(!pulse.is_active());
        assert_eq!(pulse.clears(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_both_edges() {
        let mut pulse = LayoutPulse::new(timing());
        let mut rx = pulse.subscribe();
        pulse.observe(1);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
    }
}
