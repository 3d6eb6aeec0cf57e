//! In-memory platform used by tests and the `simulate` CLI command.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use multiwall_common::error::WallResult;

use crate::{
    CaptureSource, FailureCode, InstanceMetadata, PermissionGateway, PointerEvent, PointerTap,
    PointerTapProvider, StreamHandle, WindowHandle, WindowSource,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mutable list of fake game windows.
#[derive(Debug, Default)]
pub struct SimulatedWindows {
    windows: Mutex<Vec<(WindowHandle, InstanceMetadata)>>,
    next_handle: AtomicU64,
    describe_calls: AtomicUsize,
}

impl SimulatedWindows {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(0x100),
            ..Self::default()
        }
    }

    /// Open a new window and return its handle.
    pub fn spawn(&self) -> WindowHandle {
        self.spawn_with(InstanceMetadata {
            loader: Some("fabric".to_string()),
            game_version: Some("1.16.1".to_string()),
        })
    }

    pub fn spawn_with(&self, metadata: InstanceMetadata) -> WindowHandle {
        let handle = WindowHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        lock(&self.windows).push((handle, metadata));
        handle
    }

    /// Close a window; later enumerations no longer report it.
    pub fn close(&self, handle: WindowHandle) {
        lock(&self.windows).retain(|(h, _)| *h != handle);
    }

    /// Number of `describe` calls served so far.
    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }
}

impl WindowSource for SimulatedWindows {
    fn enumerate(&self) -> WallResult<Vec<WindowHandle>> {
        Ok(lock(&self.windows).iter().map(|(h, _)| *h).collect())
    }

    fn describe(&self, window: WindowHandle) -> Option<InstanceMetadata> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.windows)
            .iter()
            .find(|(h, _)| *h == window)
            .map(|(_, meta)| meta.clone())
    }
}

/// Capture capability with scripted failures and open/close accounting.
#[derive(Debug, Default)]
pub struct SimulatedCapture {
    failures: Mutex<HashMap<WindowHandle, VecDeque<FailureCode>>>,
    live: Mutex<HashSet<StreamHandle>>,
    next_stream: AtomicU64,
    opens: AtomicUsize,
    closes: AtomicUsize,
    open_delay_ms: AtomicU64,
}

impl SimulatedCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` on `window` fail with `code`. Calls queue up.
    pub fn fail_next(&self, window: WindowHandle, code: i64) {
        lock(&self.failures)
            .entry(window)
            .or_default()
            .push_back(FailureCode(code));
    }

    /// Delay every `open` by `delay` before it completes.
    pub fn set_open_delay(&self, delay: Duration) {
        self.open_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Streams opened and not yet closed.
    pub fn live_streams(&self) -> usize {
        lock(&self.live).len()
    }

    /// Successful opens so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSource for SimulatedCapture {
    async fn open(&self, window: WindowHandle) -> Result<StreamHandle, FailureCode> {
        let delay = self.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let scripted = lock(&self.failures)
            .get_mut(&window)
            .and_then(|queue| queue.pop_front());
        if let Some(code) = scripted {
            tracing::debug!(%window, %code, "Simulated capture open failed");
            return Err(code);
        }

        let stream = StreamHandle(self.next_stream.fetch_add(1, Ordering::SeqCst));
        lock(&self.live).insert(stream);
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(stream)
    }

    async fn close(&self, stream: StreamHandle) {
        if lock(&self.live).remove(&stream) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Permission gateway with switchable answers.
#[derive(Debug)]
pub struct StaticPermissions {
    capture: AtomicBool,
    input: AtomicBool,
}

impl StaticPermissions {
    pub fn granted() -> Self {
        Self::new(true, true)
    }

    pub fn new(capture: bool, input: bool) -> Self {
        Self {
            capture: AtomicBool::new(capture),
            input: AtomicBool::new(input),
        }
    }

    pub fn set_capture(&self, granted: bool) {
        self.capture.store(granted, Ordering::SeqCst);
    }

    pub fn set_input(&self, granted: bool) {
        self.input.store(granted, Ordering::SeqCst);
    }
}

impl PermissionGateway for StaticPermissions {
    fn capture_permitted(&self) -> bool {
        self.capture.load(Ordering::SeqCst)
    }

    fn input_permitted(&self) -> bool {
        self.input.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct TapState {
    pending: VecDeque<PointerEvent>,
    posted: Vec<PointerEvent>,
    installs: usize,
    active_taps: usize,
}

/// Pointer tap provider fed from a queue of scripted events.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPointerTap {
    state: Arc<Mutex<TapState>>,
}

impl ScriptedPointerTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw events for the installed tap to intercept.
    pub fn push(&self, events: impl IntoIterator<Item = PointerEvent>) {
        lock(&self.state).pending.extend(events);
    }

    /// Events released by the tap so far.
    pub fn posted(&self) -> Vec<PointerEvent> {
        lock(&self.state).posted.clone()
    }

    /// Raw events not yet intercepted.
    pub fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn installs(&self) -> usize {
        lock(&self.state).installs
    }

    /// Taps currently installed (installed and not yet dropped).
    pub fn active_taps(&self) -> usize {
        lock(&self.state).active_taps
    }
}

impl PointerTapProvider for ScriptedPointerTap {
    fn install(&self) -> WallResult<Box<dyn PointerTap>> {
        let mut state = lock(&self.state);
        state.installs += 1;
        state.active_taps += 1;
        Ok(Box::new(ScriptedTap {
            state: self.state.clone(),
        }))
    }
}

struct ScriptedTap {
    state: Arc<Mutex<TapState>>,
}

impl PointerTap for ScriptedTap {
    fn poll(&mut self) -> WallResult<Option<PointerEvent>> {
        Ok(lock(&self.state).pending.pop_front())
    }

    fn post(&mut self, event: PointerEvent) -> WallResult<()> {
        lock(&self.state).posted.push(event);
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

impl Drop for ScriptedTap {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.active_taps = state.active_taps.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failure_is_consumed_once() {
        let capture = SimulatedCapture::new();
        let window = WindowHandle(1);
        capture.fail_next(window, -3815);

        assert_eq!(capture.open(window).await, Err(FailureCode(-3815)));
        let stream = capture.open(window).await.unwrap();
        assert_eq!(capture.live_streams(), 1);

        capture.close(stream).await;
        capture.close(stream).await;
        assert_eq!(capture.live_streams(), 0);
        assert_eq!(capture.closes(), 1);
    }

    #[test]
    fn test_closed_windows_disappear_from_enumeration() {
        let windows = SimulatedWindows::new();
        let a = windows.spawn();
        let b = windows.spawn();
        windows.close(a);
        assert_eq!(windows.enumerate().unwrap(), vec![b]);
        assert!(windows.describe(b).is_some());
        assert_eq!(windows.describe_calls(), 1);
    }
}
