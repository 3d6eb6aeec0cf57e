//! Stream lifecycle management across all tracked instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use multiwall_common::backoff::RetryPolicy;
use multiwall_common::error::{WallError, WallResult};
use multiwall_instance_model::InstanceId;
use multiwall_platform_core::{
    CaptureSource, FailureCode, PermissionGateway, StreamHandle, WindowHandle,
};
use tokio::sync::mpsc;

use crate::classify::{classify, StreamErrorKind};
use crate::stream::{CaptureStream, OpenOutcome, StreamState};

/// Asynchronous input to the manager, delivered on the coordination task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamNotice {
    /// An open request issued under `generation` completed.
    Opened {
        instance: InstanceId,
        generation: u64,
        result: Result<StreamHandle, FailureCode>,
    },
    /// The capture capability reported an error on the stream `stream`.
    FrameError {
        instance: InstanceId,
        stream: StreamHandle,
        code: FailureCode,
    },
    /// A scheduled automatic retry is due.
    RetryDue {
        instance: InstanceId,
        generation: u64,
    },
}

/// Externally visible stream changes, drained by the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    StatusChanged {
        instance: InstanceId,
        state: StreamState,
    },
    /// The captured process ended; the instance should be removed.
    TargetClosed { instance: InstanceId },
    RetryScheduled {
        instance: InstanceId,
        attempt: u32,
        delay: Duration,
    },
    /// Automatic retries are used up; the stream stays errored until a
    /// manual retry or reset.
    RetriesExhausted { instance: InstanceId, code: i64 },
    /// Capture permission is missing; nothing was started.
    PermissionDenied { instance: InstanceId },
}

/// Owns one [`CaptureStream`] per tracked instance.
///
/// All methods must be called from the single coordination task. Stream
/// opens and closes run in spawned tokio tasks, so a runtime must be active.
pub struct CaptureStreamManager {
    source: Arc<dyn CaptureSource>,
    permissions: Arc<dyn PermissionGateway>,
    policy: RetryPolicy,
    streams: HashMap<InstanceId, CaptureStream>,
    notices: mpsc::UnboundedSender<StreamNotice>,
    events: Vec<StreamEvent>,
}

impl CaptureStreamManager {
    /// Create a manager. The returned receiver yields the notices that must
    /// be passed back into [`Self::handle_notice`].
    pub fn new(
        source: Arc<dyn CaptureSource>,
        permissions: Arc<dyn PermissionGateway>,
        policy: RetryPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<StreamNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Self {
            source,
            permissions,
            policy,
            streams: HashMap::new(),
            notices: tx,
            events: Vec::new(),
        };
        (manager, rx)
    }

    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    /// Register an idle stream for a newly tracked instance.
    pub fn track(&mut self, instance: InstanceId, window: WindowHandle) {
        self.streams
            .entry(instance)
            .or_insert_with(|| CaptureStream::new(window));
    }

    /// Stop and forget an instance's stream.
    pub fn teardown(&mut self, instance: InstanceId) {
        if self.streams.contains_key(&instance) {
            self.stop_inner(instance);
            self.streams.remove(&instance);
            tracing::debug!(%instance, "Stream torn down");
        }
    }

    pub fn state(&self, instance: InstanceId) -> Option<StreamState> {
        self.streams.get(&instance).map(|s| s.state())
    }

    pub fn last_error(&self, instance: InstanceId) -> Option<StreamErrorKind> {
        self.streams.get(&instance).and_then(|s| s.last_error())
    }

    /// Handle of the instance's open stream, while active.
    pub fn handle(&self, instance: InstanceId) -> Option<StreamHandle> {
        self.streams.get(&instance).and_then(|s| s.handle())
    }

    pub fn is_tracked(&self, instance: InstanceId) -> bool {
        self.streams.contains_key(&instance)
    }

    /// Begin opening the stream. No-op unless the stream is idle.
    pub fn start(&mut self, instance: InstanceId) -> WallResult<()> {
        let stream = self
            .streams
            .get(&instance)
            .ok_or_else(|| WallError::not_found(instance.get()))?;
        if stream.state() != StreamState::Idle {
            return Ok(());
        }
        self.ensure_permission(instance)?;

        let stream = self
            .streams
            .get_mut(&instance)
            .ok_or_else(|| WallError::not_found(instance.get()))?;
        if let Some(generation) = stream.start() {
            let window = stream.window();
            self.spawn_open(instance, window, generation);
        }
        Ok(())
    }

    /// Stop the stream. Takes effect immediately, even with an open in flight.
    pub fn stop(&mut self, instance: InstanceId) -> WallResult<()> {
        if !self.streams.contains_key(&instance) {
            return Err(WallError::not_found(instance.get()));
        }
        self.stop_inner(instance);
        Ok(())
    }

    /// Manually retry an errored stream with a fresh retry budget.
    pub fn retry(&mut self, instance: InstanceId) -> WallResult<()> {
        let stream = self
            .streams
            .get_mut(&instance)
            .ok_or_else(|| WallError::not_found(instance.get()))?;
        if stream.state() != StreamState::Errored {
            return Ok(());
        }
        stream.reset_attempts();
        self.retry_inner(instance)
    }

    /// Stop then start.
    pub fn reset_and_restart(&mut self, instance: InstanceId) -> WallResult<()> {
        self.stop(instance)?;
        if let Some(stream) = self.streams.get_mut(&instance) {
            stream.reset_attempts();
        }
        self.start(instance)
    }

    /// Start every idle stream. Errored streams are left for retry.
    pub fn resume_all(&mut self) -> WallResult<()> {
        for instance in self.sorted_ids() {
            self.start(instance)?;
        }
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for instance in self.sorted_ids() {
            self.stop_inner(instance);
        }
    }

    /// Stop every stream except `keep`.
    pub fn stop_all_except(&mut self, keep: InstanceId) {
        for instance in self.sorted_ids() {
            if instance != keep {
                self.stop_inner(instance);
            }
        }
    }

    /// Apply an asynchronous completion or report.
    pub fn handle_notice(&mut self, notice: StreamNotice) {
        match notice {
            StreamNotice::Opened {
                instance,
                generation,
                result,
            } => self.on_opened(instance, generation, result),
            StreamNotice::FrameError {
                instance,
                stream,
                code,
            } => self.on_frame_error(instance, stream, code),
            StreamNotice::RetryDue {
                instance,
                generation,
            } => self.on_retry_due(instance, generation),
        }
    }

    /// Take the events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.events)
    }

    fn on_opened(
        &mut self,
        instance: InstanceId,
        generation: u64,
        result: Result<StreamHandle, FailureCode>,
    ) {
        let Some(stream) = self.streams.get_mut(&instance) else {
            // Instance torn down while the open was in flight.
            if let Ok(handle) = result {
                tracing::debug!(%instance, "Closing stream opened for a removed instance");
                self.spawn_close(handle);
            }
            return;
        };

        match result {
            Ok(handle) => match stream.opened(generation, handle) {
                OpenOutcome::Activated => {
                    tracing::info!(%instance, "Capture stream active");
                    self.emit_status(instance, StreamState::Active);
                }
                OpenOutcome::Stale(handle) => {
                    tracing::debug!(%instance, generation, "Discarding stale stream open");
                    self.spawn_close(handle);
                }
            },
            Err(code) => {
                let kind = classify(code);
                if stream.open_failed(generation, kind) {
                    tracing::warn!(%instance, %code, "Capture stream failed to open");
                    self.after_failure(instance, kind);
                }
            }
        }
    }

    fn on_frame_error(&mut self, instance: InstanceId, reported: StreamHandle, code: FailureCode) {
        let Some(stream) = self.streams.get_mut(&instance) else {
            return;
        };
        let kind = classify(code);
        let Some(handle) = stream.frame_error(reported, kind) else {
            tracing::debug!(%instance, %code, stream = reported.0, "Ignoring error from a stream no longer in use");
            return;
        };
        tracing::warn!(%instance, %code, "Capture stream errored");
        self.spawn_close(handle);
        self.after_failure(instance, kind);
    }

    fn on_retry_due(&mut self, instance: InstanceId, generation: u64) {
        let current = self
            .streams
            .get(&instance)
            .map(|s| (s.state(), s.generation()));
        if current != Some((StreamState::Errored, generation)) {
            return;
        }
        tracing::info!(%instance, "Retrying capture stream");
        if let Err(e) = self.retry_inner(instance) {
            tracing::warn!(%instance, error = %e, "Automatic retry not started");
        }
    }

    fn after_failure(&mut self, instance: InstanceId, kind: StreamErrorKind) {
        self.emit_status(instance, StreamState::Errored);
        let Some(stream) = self.streams.get(&instance) else {
            return;
        };
        let (generation, failures) = (stream.generation(), stream.failed_attempts());

        match kind {
            StreamErrorKind::TargetClosed => {
                tracing::info!(%instance, "Capture target closed");
                self.events.push(StreamEvent::TargetClosed { instance });
            }
            StreamErrorKind::Unknown(code) => {
                let attempt = failures.saturating_sub(1);
                match self.policy.delay_for(attempt) {
                    Some(delay) => {
                        tracing::info!(%instance, attempt, ?delay, "Scheduling stream retry");
                        self.events.push(StreamEvent::RetryScheduled {
                            instance,
                            attempt: attempt + 1,
                            delay,
                        });
                        self.spawn_retry(instance, generation, delay);
                    }
                    None => {
                        tracing::warn!(%instance, code, "Stream retries exhausted");
                        self.events
                            .push(StreamEvent::RetriesExhausted { instance, code });
                    }
                }
            }
        }
    }

    fn retry_inner(&mut self, instance: InstanceId) -> WallResult<()> {
        self.ensure_permission(instance)?;
        let stream = self
            .streams
            .get_mut(&instance)
            .ok_or_else(|| WallError::not_found(instance.get()))?;
        if let Some(generation) = stream.retry() {
            let window = stream.window();
            self.spawn_open(instance, window, generation);
        }
        Ok(())
    }

    fn stop_inner(&mut self, instance: InstanceId) {
        let Some(stream) = self.streams.get_mut(&instance) else {
            return;
        };
        if let Some(handle) = stream.stop() {
            tracing::debug!(%instance, "Capture stream stopped");
            if let Some(handle) = handle {
                self.spawn_close(handle);
            }
            self.emit_status(instance, StreamState::Idle);
        }
    }

    fn ensure_permission(&mut self, instance: InstanceId) -> WallResult<()> {
        if self.permissions.capture_permitted() {
            return Ok(());
        }
        tracing::warn!(%instance, "Capture permission not granted; stream not started");
        self.events.push(StreamEvent::PermissionDenied { instance });
        Err(WallError::permission_denied("screen capture not permitted"))
    }

    fn emit_status(&mut self, instance: InstanceId, state: StreamState) {
        self.events
            .push(StreamEvent::StatusChanged { instance, state });
    }

    fn sorted_ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self.streams.keys().copied().collect();
        ids.sort();
        ids
    }

    fn spawn_open(&mut self, instance: InstanceId, window: WindowHandle, generation: u64) {
        self.emit_status(instance, StreamState::Starting);
        let source = self.source.clone();
        let tx = self.notices.clone();
        tokio::spawn(async move {
            let result = source.open(window).await;
            // Receiver gone means the coordinator shut down.
            let _ = tx.send(StreamNotice::Opened {
                instance,
                generation,
                result,
            });
        });
    }

    fn spawn_close(&self, handle: StreamHandle) {
        let source = self.source.clone();
        tokio::spawn(async move {
            source.close(handle).await;
        });
    }

    fn spawn_retry(&self, instance: InstanceId, generation: u64, delay: Duration) {
        let tx = self.notices.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(StreamNotice::RetryDue {
                instance,
                generation,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiwall_platform_core::simulated::{SimulatedCapture, StaticPermissions};

    struct Harness {
        manager: CaptureStreamManager,
        notices: mpsc::UnboundedReceiver<StreamNotice>,
        capture: Arc<SimulatedCapture>,
        permissions: Arc<StaticPermissions>,
    }

    impl Harness {
        fn new(policy: RetryPolicy) -> Self {
            let capture = Arc::new(SimulatedCapture::new());
            let permissions = Arc::new(StaticPermissions::granted());
            let (manager, notices) =
                CaptureStreamManager::new(capture.clone(), permissions.clone(), policy);
            Self {
                manager,
                notices,
                capture,
                permissions,
            }
        }

        async fn pump(&mut self) {
            let notice = self.notices.recv().await.expect("notice");
            self.manager.handle_notice(notice);
        }

        /// Let spawned close tasks run.
        async fn settle(&self) {
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
        }
    }

    const A: InstanceId = InstanceId(0);
    const WINDOW: WindowHandle = WindowHandle(0x100);

    #[tokio::test]
    async fn test_start_opens_and_activates() {
        let mut h = Harness::new(RetryPolicy::default());
        h.manager.track(A, WINDOW);
        h.manager.start(A).unwrap();
        assert_eq!(h.manager.state(A), Some(StreamState::Starting));
        h.manager.start(A).unwrap();

        h.pump().await;
        assert_eq!(h.manager.state(A), Some(StreamState::Active));
        assert_eq!(h.capture.opens(), 1);
        assert_eq!(
            h.manager.drain_events(),
            vec![
                StreamEvent::StatusChanged {
                    instance: A,
                    state: StreamState::Starting
                },
                StreamEvent::StatusChanged {
                    instance: A,
                    state: StreamState::Active
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_idle_is_silent() {
        let mut h = Harness::new(RetryPolicy::default());
        h.manager.track(A, WINDOW);
        h.manager.stop(A).unwrap();
        h.manager.stop(A).unwrap();
        assert_eq!(h.manager.state(A), Some(StreamState::Idle));
        assert!(h.manager.drain_events().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_instance_is_not_found() {
        let mut h = Harness::new(RetryPolicy::default());
        assert!(matches!(
            h.manager.start(InstanceId(7)),
            Err(WallError::NotFound { instance: 7 })
        ));
    }

    #[tokio::test]
    async fn test_stop_during_open_closes_late_stream() {
        let mut h = Harness::new(RetryPolicy::default());
        h.manager.track(A, WINDOW);
        h.manager.start(A).unwrap();
        h.manager.stop(A).unwrap();
        assert_eq!(h.manager.state(A), Some(StreamState::Idle));

        h.pump().await;
        h.settle().await;
        assert_eq!(h.manager.state(A), Some(StreamState::Idle));
        assert_eq!(h.capture.opens(), 1);
        assert_eq!(h.capture.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_teardown_closes_active_stream() {
        let mut h = Harness::new(RetryPolicy::default());
        h.manager.track(A, WINDOW);
        h.manager.start(A).unwrap();
        h.pump().await;
        assert_eq!(h.capture.live_streams(), 1);

        h.manager.teardown(A);
        h.settle().await;
        assert!(!h.manager.is_tracked(A));
        assert_eq!(h.capture.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_target_closed_is_not_retried() {
        let mut h = Harness::new(RetryPolicy::default());
        h.manager.track(A, WINDOW);
        h.capture.fail_next(WINDOW, -3815);
        h.manager.start(A).unwrap();
        h.pump().await;

        assert_eq!(h.manager.state(A), Some(StreamState::Errored));
        assert_eq!(h.manager.last_error(A), Some(StreamErrorKind::TargetClosed));
        let events = h.manager.drain_events();
        assert!(events.contains(&StreamEvent::TargetClosed { instance: A }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, StreamEvent::RetryScheduled { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_then_recovers() {
        let mut h = Harness::new(RetryPolicy::new(
            3,
            Duration::from_millis(100),
            Duration::from_secs(1),
        ));
        h.manager.track(A, WINDOW);
        h.capture.fail_next(WINDOW, -3801);
        h.manager.start(A).unwrap();

        h.pump().await; // failed open
        assert_eq!(h.manager.state(A), Some(StreamState::Errored));
        h.pump().await; // retry due
        assert_eq!(h.manager.state(A), Some(StreamState::Starting));
        h.pump().await; // successful open
        assert_eq!(h.manager.state(A), Some(StreamState::Active));

        let events = h.manager.drain_events();
        assert!(events.contains(&StreamEvent::RetryScheduled {
            instance: A,
            attempt: 1,
            delay: Duration::from_millis(100),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let mut h = Harness::new(RetryPolicy::new(
            2,
            Duration::from_millis(10),
            Duration::from_millis(10),
        ));
        h.manager.track(A, WINDOW);
        for _ in 0..3 {
            h.capture.fail_next(WINDOW, -1);
        }
        h.manager.start(A).unwrap();

        // fail, retry, fail, retry, fail
        for _ in 0..5 {
            h.pump().await;
        }
        assert_eq!(h.manager.state(A), Some(StreamState::Errored));
        let events = h.manager.drain_events();
        assert!(events.contains(&StreamEvent::RetriesExhausted {
            instance: A,
            code: -1
        }));

        // Nothing else is scheduled.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(h.notices.try_recv().is_err());

        // A manual retry gets through.
        h.manager.retry(A).unwrap();
        h.pump().await;
        assert_eq!(h.manager.state(A), Some(StreamState::Active));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_retry() {
        let mut h = Harness::new(RetryPolicy::new(
            3,
            Duration::from_millis(50),
            Duration::from_millis(50),
        ));
        h.manager.track(A, WINDOW);
        h.capture.fail_next(WINDOW, -1);
        h.manager.start(A).unwrap();
        h.pump().await;
        h.manager.stop(A).unwrap();

        h.pump().await; // stale retry
        assert_eq!(h.manager.state(A), Some(StreamState::Idle));
        assert_eq!(h.capture.opens(), 0);
    }

    #[tokio::test]
    async fn test_frame_error_moves_active_to_errored() {
        let mut h = Harness::new(RetryPolicy::never());
        h.manager.track(A, WINDOW);
        h.manager.start(A).unwrap();
        h.pump().await;
        h.manager.drain_events();

        let stream = h.manager.handle(A).unwrap();
        h.manager.handle_notice(StreamNotice::FrameError {
            instance: A,
            stream,
            code: FailureCode(-3821),
        });
        h.settle().await;
        assert_eq!(h.manager.state(A), Some(StreamState::Errored));
        assert_eq!(h.capture.live_streams(), 0);
        assert!(h
            .manager
            .drain_events()
            .contains(&StreamEvent::RetriesExhausted {
                instance: A,
                code: -3821
            }));

        h.manager.reset_and_restart(A).unwrap();
        h.pump().await;
        assert_eq!(h.manager.state(A), Some(StreamState::Active));
    }

    #[tokio::test]
    async fn test_late_error_from_closed_stream_spares_restarted_one() {
        let mut h = Harness::new(RetryPolicy::default());
        h.manager.track(A, WINDOW);
        h.manager.start(A).unwrap();
        h.pump().await;
        let old = h.manager.handle(A).unwrap();

        h.manager.reset_and_restart(A).unwrap();
        h.pump().await;
        let fresh = h.manager.handle(A).unwrap();
        assert_ne!(old, fresh);
        h.manager.drain_events();

        h.manager.handle_notice(StreamNotice::FrameError {
            instance: A,
            stream: old,
            code: FailureCode(-1),
        });
        h.settle().await;
        assert_eq!(h.manager.state(A), Some(StreamState::Active));
        assert_eq!(h.manager.handle(A), Some(fresh));
        assert_eq!(h.capture.live_streams(), 1);
        assert!(h.manager.drain_events().is_empty());
        assert!(h.notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_permission_blocks_start() {
        let mut h = Harness::new(RetryPolicy::default());
        h.manager.track(A, WINDOW);
        h.permissions.set_capture(false);

        assert!(matches!(
            h.manager.start(A),
            Err(WallError::PermissionDenied { .. })
        ));
        assert_eq!(h.manager.state(A), Some(StreamState::Idle));
        assert_eq!(
            h.manager.drain_events(),
            vec![StreamEvent::PermissionDenied { instance: A }]
        );
    }

    #[tokio::test]
    async fn test_stop_all_except_keeps_one() {
        let mut h = Harness::new(RetryPolicy::default());
        let b = InstanceId(1);
        h.manager.track(A, WINDOW);
        h.manager.track(b, WindowHandle(0x101));
        h.manager.resume_all().unwrap();
        h.pump().await;
        h.pump().await;

        h.manager.stop_all_except(b);
        assert_eq!(h.manager.state(A), Some(StreamState::Idle));
        assert_eq!(h.manager.state(b), Some(StreamState::Active));

        h.manager.stop_all();
        assert_eq!(h.manager.state(b), Some(StreamState::Idle));
    }
}
