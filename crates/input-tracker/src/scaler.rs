//! Pointer sensitivity scaler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use multiwall_common::config::clamp_sensitivity;
use multiwall_common::error::{WallError, WallResult};
use multiwall_platform_core::{PermissionGateway, PointerEvent, PointerTap, PointerTapProvider};
use serde::Serialize;

use crate::accumulator::DeltaAccumulator;

/// What the scaler is doing after a configuration call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ScalerStatus {
    /// Scaling is switched off; no tap installed.
    Disabled,
    /// Factor is exactly 1.0; no tap needed.
    Passthrough,
    /// A tap is installed and rescaling motion.
    Running { factor: f64 },
}

struct ScalerWorker {
    stop_flag: Arc<AtomicBool>,
    handle: thread::JoinHandle<WallResult<u64>>,
}

/// Owns the pointer tap and its worker thread.
pub struct MouseSensitivityScaler {
    provider: Arc<dyn PointerTapProvider>,
    permissions: Arc<dyn PermissionGateway>,
    enabled: bool,
    factor: f64,
    worker: Option<ScalerWorker>,
}

impl MouseSensitivityScaler {
    pub fn new(
        provider: Arc<dyn PointerTapProvider>,
        permissions: Arc<dyn PermissionGateway>,
        enabled: bool,
    ) -> Self {
        Self {
            provider,
            permissions,
            enabled,
            factor: 1.0,
            worker: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Current (clamped) factor.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Apply a new factor, restarting the tap with empty remainders.
    ///
    /// `enabled_override` replaces the stored enable flag for this call only.
    pub fn set_factor(
        &mut self,
        factor: f64,
        enabled_override: Option<bool>,
    ) -> WallResult<ScalerStatus> {
        self.factor = clamp_sensitivity(factor);
        self.stop();

        if !enabled_override.unwrap_or(self.enabled) {
            tracing::info!(factor = self.factor, "Sensitivity scaling disabled; tap not installed");
            return Ok(ScalerStatus::Disabled);
        }
        if self.factor == 1.0 {
            tracing::debug!("Sensitivity factor is 1.0; tap not installed");
            return Ok(ScalerStatus::Passthrough);
        }
        if !self.permissions.input_permitted() {
            tracing::warn!("Input monitoring permission not granted; tap not installed");
            return Err(WallError::permission_denied("pointer interception not permitted"));
        }

        let tap = self.provider.install()?;
        let stop_flag = Arc::new(AtomicBool::new(false));
        let worker_flag = stop_flag.clone();
        let factor = self.factor;
        let handle = thread::Builder::new()
            .name("pointer-scaler".to_string())
            .spawn(move || run_tap(tap, factor, worker_flag))
            .map_err(|e| WallError::input_interception(format!("Failed to spawn scaler thread: {e}")))?;

        tracing::info!(factor, "Sensitivity scaling started");
        self.worker = Some(ScalerWorker { stop_flag, handle });
        Ok(ScalerStatus::Running { factor })
    }

    /// Re-apply the current factor with `enabled`. The flag is only stored
    /// when that succeeds.
    pub fn set_enabled(&mut self, enabled: bool) -> WallResult<ScalerStatus> {
        let status = self.set_factor(self.factor, Some(enabled))?;
        self.enabled = enabled;
        Ok(status)
    }

    /// Flip the enable flag.
    pub fn toggle(&mut self) -> WallResult<ScalerStatus> {
        self.set_enabled(!self.enabled)
    }

    /// Replace both the enable flag and the factor.
    pub fn configure(&mut self, enabled: bool, factor: f64) -> WallResult<ScalerStatus> {
        let status = self.set_factor(factor, Some(enabled))?;
        self.enabled = enabled;
        Ok(status)
    }

    /// Remove the tap and wait for the worker to exit. Idempotent.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.stop_flag.store(true, Ordering::SeqCst);
        match worker.handle.join() {
            Ok(Ok(scaled)) => tracing::info!(scaled, "Sensitivity scaling stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Scaler exited with error"),
            Err(_) => tracing::warn!("Scaler thread panicked"),
        }
    }
}

impl Drop for MouseSensitivityScaler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Interception loop. Owns the accumulator; nothing else touches it.
fn run_tap(mut tap: Box<dyn PointerTap>, factor: f64, stop: Arc<AtomicBool>) -> WallResult<u64> {
    tracing::debug!(tap = %tap.name(), factor, "Pointer tap loop started");
    let mut accumulator = DeltaAccumulator::new(factor);
    let mut scaled = 0u64;

    while !stop.load(Ordering::Relaxed) {
        match tap.poll() {
            Ok(Some(event)) => {
                let out = if event.is_scalable() {
                    let (dx, dy) = accumulator.scale(event.dx, event.dy);
                    scaled += 1;
                    PointerEvent { dx, dy, ..event }
                } else {
                    event
                };
                if let Err(e) = tap.post(out) {
                    tracing::warn!(error = %e, "Failed to release pointer event");
                }
            }
            Ok(None) => thread::sleep(Duration::from_millis(1)),
            Err(e) => {
                tracing::warn!(error = %e, "Pointer tap error");
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    Ok(scaled)
}
