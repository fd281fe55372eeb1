//! Engine session: the lifecycle controller and the surface registry composed into one state
//! machine.
//!
//! Rendering runs if and only if the lifecycle is [`LifecycleState::Running`] *and* the surface
//! is [`SurfaceState::Valid`]. Two locks order the work:
//!
//! - the *transition gate* is held for the whole of every entry point, including the join of a
//!   render thread it stopped, so no call returns while another call's teardown is in flight;
//! - the *state mutex* guards [`SessionState`] and is only held for bookkeeping, never across a
//!   join, so [`EngineSession::snapshot`] stays responsive and a render thread finishing its
//!   last frame never waits on a caller that is waiting on it.
//!
//! Lock order is gate, state, backend. A render thread only takes the backend lock while
//! drawing; after a frame error it competes for the gate to tear its own session down.

use crate::config::SessionConfig;
use crate::engine::events::{DestroyReason, SessionEvent};
use crate::engine::host_event::HostEvent;
use crate::engine::lifecycle::LifecycleState;
use crate::engine::render_thread::{RenderThread, RenderThreadArgs};
use crate::engine::surface::{HostContext, SurfaceHandle, SurfaceRegistry, SurfaceState};
use crate::engine::{lock, SessionError};
use crate::render::backend::{RenderBackend, SurfaceSize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

/// How long a failed render thread waits before retrying the transition gate.
const GATE_RETRY: Duration = Duration::from_millis(1);

/// A unique identifier for an [`EngineSession`], used to tell sessions apart in logs when the
/// host recreates its activity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new unique `SessionId` using a random UUID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// State guarded by the session mutex.
#[derive(Default)]
pub(crate) struct SessionState {
    pub(crate) lifecycle: LifecycleState,
    pub(crate) host: Option<HostContext>,
    pub(crate) surface: SurfaceRegistry,
    pub(crate) resources_allocated: bool,
    pub(crate) attached: Option<SurfaceHandle>,
    pub(crate) render_thread: Option<RenderThread>,
}

/// Work that has to happen after the state mutex is released: joining a stopped render
/// thread, then detaching its surface and, on destroy, releasing engine resources.
#[must_use]
#[derive(Default)]
pub(crate) struct Teardown {
    thread: Option<RenderThread>,
    detach: Option<SurfaceHandle>,
    release: bool,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub lifecycle: LifecycleState,
    pub surface: SurfaceState,
    /// Target size, present only while the surface is valid
    pub size: Option<SurfaceSize>,
    /// Is a render thread currently owned by the session
    pub render_active: bool,
    pub resources_allocated: bool,
    /// Frames rendered over the whole lifetime of the session
    pub frames_rendered: u64,
}

/// The part of a session its render thread shares.
pub(crate) struct SessionShared {
    pub(crate) id: SessionId,
    transitions: Mutex<()>,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) backend: Mutex<Box<dyn RenderBackend + Send>>,
    pub(crate) frames_total: AtomicU64,
    fault: Mutex<Option<String>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionShared {
    pub(crate) fn new(backend: Box<dyn RenderBackend + Send>, event_capacity: usize) -> Self {
        let (event_tx, _first_rx) = broadcast::channel(event_capacity.max(1));

        Self {
            id: SessionId::new(),
            transitions: Mutex::new(()),
            state: Mutex::new(SessionState::default()),
            backend: Mutex::new(backend),
            frames_total: AtomicU64::new(0),
            fault: Mutex::new(None),
            event_tx,
        }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }

    /// Keeps the first failure reported since the last reap.
    pub(crate) fn record_fault(&self, reason: String) {
        lock(&self.fault).get_or_insert(reason);
    }

    /// Turns a recorded fault into the fatal transition. Must be called with the gate held.
    pub(crate) fn reap_fault(&self) {
        let fault = lock(&self.fault).take();
        if let Some(reason) = fault {
            self.fatal_destroy(SessionError::RenderFailed(reason).to_string());
        }
    }

    /// Called by a render thread whose frame failed. Takes the gate and tears the session
    /// down, unless a caller has already signalled this thread to stop: that caller joins it
    /// and reaps the fault itself.
    pub(crate) fn fail_from_render_thread(&self, stop: &AtomicBool) {
        loop {
            if stop.load(Ordering::Acquire) {
                return;
            }

            let _transition = match self.transitions.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    thread::park_timeout(GATE_RETRY);
                    continue;
                }
            };

            self.reap_fault();
            return;
        }
    }

    /// Fatal path: an engine failure leaves the session unusable, so it is torn down as if the
    /// host had called `destroy`. Must be called with the gate held.
    pub(crate) fn fatal_destroy(&self, reason: String) {
        let mut teardown = {
            let mut state = lock(&self.state);
            if state.lifecycle == LifecycleState::Destroyed {
                return;
            }
            self.enter_destroyed(&mut state)
        };

        // A render thread tearing down its own session cannot join itself. Dropping the
        // handle detaches it; it exits right after this returns.
        teardown.thread = teardown.thread.filter(|thread| !thread.is_current());

        self.complete(teardown);
        log::error!("Session {:?}: destroyed after fatal engine failure: {}", self.id, reason);
        self.emit(SessionEvent::Destroyed {
            reason: DestroyReason::Fatal(reason),
        });
    }

    /// Signals the render thread to stop and hands it over for joining. Must be called with
    /// the state locked; the returned teardown must be completed after unlocking.
    pub(crate) fn stop_render(&self, state: &mut SessionState) -> Teardown {
        let thread = state.render_thread.take();
        if let Some(thread) = &thread {
            thread.signal_stop();
        }

        Teardown {
            thread,
            detach: state.attached.take(),
            release: false,
        }
    }

    /// Moves to `Destroyed` and collects everything that must be torn down.
    pub(crate) fn enter_destroyed(&self, state: &mut SessionState) -> Teardown {
        state.lifecycle = LifecycleState::Destroyed;
        state.host = None;

        let mut teardown = self.stop_render(state);
        teardown.release = std::mem::take(&mut state.resources_allocated);

        if state.surface.state() == SurfaceState::Valid {
            state.surface.lose();
        }
        teardown
    }

    /// Joins, detaches and releases. Must be called with the gate held and the state lock
    /// released. A joined thread may have failed after the caller's entry checks, so its
    /// fault is reaped last.
    pub(crate) fn complete(&self, teardown: Teardown) {
        let joined = teardown.thread.is_some();

        if let Some(thread) = teardown.thread {
            match thread.join() {
                Ok(frames) => {
                    log::info!("Session {:?}: render thread stopped after {} frames", self.id, frames);
                    self.emit(SessionEvent::RenderStopped { frames });
                }
                Err(panic) => {
                    log::error!("Session {:?}: render thread panicked: {}", self.id, panic);
                    self.record_fault(panic);
                }
            }
        }

        if teardown.detach.is_some() || teardown.release {
            let mut backend = lock(&self.backend);
            if let Some(surface) = teardown.detach {
                log::debug!("Session {:?}: detaching {:?}", self.id, surface);
                backend.detach_surface(&surface);
            }
            if teardown.release {
                backend.release();
                log::info!("Session {:?}: {} released engine resources", self.id, backend.name());
                self.emit(SessionEvent::ResourcesReleased {
                    backend: backend.name().to_string(),
                });
            }
        }

        if joined {
            self.reap_fault();
        }
    }
}

/// Internally synchronized lifecycle and surface state machine for one loaded engine.
///
/// All entry points take `&self` and may be called from any thread. They never panic on
/// host misuse: ordering anomalies are clamped and reported, invalid arguments are rejected
/// with an error and leave the state untouched.
pub struct EngineSession {
    config: SessionConfig,
    pub(crate) shared: Arc<SessionShared>,
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("id", &self.shared.id)
            .field("config", &self.config)
            .field("backend", &"Mutex<Box<dyn RenderBackend>>")
            .finish()
    }
}

impl EngineSession {
    /// Creates an uninitialized session driving `backend`.
    pub fn new(config: SessionConfig, backend: Box<dyn RenderBackend + Send>) -> Self {
        let shared = Arc::new(SessionShared::new(backend, config.event_capacity));
        Self { config, shared }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to session telemetry.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = lock(&self.shared.state);

        SessionSnapshot {
            lifecycle: state.lifecycle,
            surface: state.surface.state(),
            size: state.surface.size(),
            render_active: state.render_thread.is_some(),
            resources_allocated: state.resources_allocated,
            frames_rendered: self.shared.frames_total.load(Ordering::Relaxed),
        }
    }

    /// Routes a generic host lifecycle notification to the matching entry point.
    pub fn dispatch_host_event(&self, event: HostEvent) -> Result<(), SessionError> {
        match event {
            HostEvent::EnteredBackground | HostEvent::Paused | HostEvent::WindowMinimized => self.pause(),
            HostEvent::WillEnterForeground | HostEvent::Resumed | HostEvent::WindowRestored => self.resume(),
            HostEvent::Destroyed | HostEvent::WindowWillClose => self.destroy(),
            HostEvent::SurfaceLost => self.surface_lost(),
            HostEvent::MemoryWarning => {
                log::warn!("Session {:?}: host reported memory pressure", self.shared.id);
                self.shared.emit(SessionEvent::MemoryWarning);
                Ok(())
            }
            HostEvent::SurfaceRecreated | HostEvent::WindowMoved | HostEvent::WindowResized => {
                log::debug!("Session {:?}: {:?} carries no surface data, ignored", self.shared.id, event);
                Ok(())
            }
        }
    }

    /// Enters a transition. Waits for any other entry point (and its joins) to finish, then
    /// picks up a fault reported since the last call.
    pub(crate) fn begin(&self) -> MutexGuard<'_, ()> {
        let transition = lock(&self.shared.transitions);
        self.shared.reap_fault();
        transition
    }

    /// Logs and reports a clamped ordering anomaly.
    pub(crate) fn anomaly(&self, operation: &'static str, detail: &str) {
        log::warn!("Session {:?}: ordering anomaly in {}: {}", self.shared.id, operation, detail);
        self.shared.emit(SessionEvent::OrderingAnomaly {
            operation,
            detail: detail.to_string(),
        });
    }

    /// Logs and reports a rejected call, handing the error back to the caller.
    pub(crate) fn reject(&self, operation: &'static str, error: SessionError) -> SessionError {
        log::warn!("Session {:?}: {} rejected: {}", self.shared.id, operation, error);
        self.shared.emit(SessionEvent::CallRejected {
            operation,
            error: error.to_string(),
        });
        error
    }

    /// Turns fatal errors into the fatal-to-destroyed transition. Must be called with the gate
    /// held and the state lock released.
    pub(crate) fn escalate(&self, result: Result<(), SessionError>) -> Result<(), SessionError> {
        if let Err(e) = &result {
            if e.is_fatal() {
                self.shared.fatal_destroy(e.to_string());
            }
        }
        result
    }

    /// Starts a render thread if the session is running with a valid surface and none is
    /// active. Allocates engine resources on first use. Must be called with the state locked.
    pub(crate) fn start_render_if_ready(&self, state: &mut SessionState) -> Result<(), SessionError> {
        if state.lifecycle != LifecycleState::Running || state.render_thread.is_some() {
            return Ok(());
        }
        let (Some(host), Some(surface), Some(size)) = (state.host, state.surface.handle(), state.surface.size()) else {
            return Ok(());
        };

        {
            let mut backend = lock(&self.shared.backend);

            if !state.resources_allocated {
                backend
                    .allocate(&host, &surface, size)
                    .map_err(|e| SessionError::ResourceAllocation(format!("{e:#}")))?;
                state.resources_allocated = true;
                log::info!("Session {:?}: {} allocated engine resources", self.shared.id, backend.name());
                self.shared.emit(SessionEvent::ResourcesAllocated {
                    backend: backend.name().to_string(),
                });
            }

            backend
                .attach_surface(&surface, size)
                .map_err(|e| SessionError::ResourceAllocation(format!("{e:#}")))?;
            state.attached = Some(surface);
        }

        let thread = RenderThread::spawn(RenderThreadArgs {
            session: self.shared.clone(),
            name: self.config.render_thread_name.clone(),
            surface,
            size: state.surface.shared_size(),
            frame_interval: self.config.frame_interval(),
        })?;

        state.render_thread = Some(thread);
        log::info!("Session {:?}: rendering into {:?} at {}", self.shared.id, surface, size);
        self.shared.emit(SessionEvent::RenderStarted);
        Ok(())
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        // A session dropped without an explicit destroy must still join its thread and
        // release the backend.
        let _ = self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::null::{NullBackend, NullBackendStats};
    use std::ffi::c_void;

    fn host() -> HostContext {
        HostContext::from_ptr(0x10 as *mut c_void).unwrap()
    }

    fn surface(addr: usize) -> SurfaceHandle {
        SurfaceHandle::from_ptr(addr as *mut c_void).unwrap()
    }

    fn session() -> (EngineSession, Arc<NullBackendStats>) {
        let backend = NullBackend::new();
        let stats = backend.stats();
        let config = SessionConfig {
            target_fps: 1000,
            ..SessionConfig::default()
        };
        (EngineSession::new(config, Box::new(backend)), stats)
    }

    fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        for _ in 0..5000 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("timed out waiting for {what}");
    }

    fn assert_render_gate(s: &EngineSession) {
        let snap = s.snapshot();
        let expected = snap.lifecycle == LifecycleState::Running && snap.surface == SurfaceState::Valid;
        assert_eq!(snap.render_active, expected, "render gate violated: {snap:?}");
    }

    #[test]
    fn render_thread_only_runs_while_running_with_valid_surface() {
        let (s, stats) = session();

        s.init(host()).unwrap();
        assert_render_gate(&s);
        s.resume().unwrap();
        assert_render_gate(&s);
        s.surface_created(surface(0x1000), 1920, 1080).unwrap();
        assert_render_gate(&s);
        assert!(s.snapshot().render_active);

        wait_until("first frames", || stats.frames() >= 2);

        s.pause().unwrap();
        assert_render_gate(&s);
        s.pause().unwrap();
        assert_render_gate(&s);
        s.resume().unwrap();
        assert_render_gate(&s);
        s.surface_lost().unwrap();
        assert_render_gate(&s);
        s.surface_created(surface(0x2000), 1080, 1920).unwrap();
        assert_render_gate(&s);
        s.destroy().unwrap();
        assert_render_gate(&s);
    }

    #[test]
    fn no_frame_reads_a_surface_after_its_loss_returns() {
        let (s, stats) = session();
        s.init(host()).unwrap();
        s.resume().unwrap();
        s.surface_created(surface(0x1000), 640, 480).unwrap();
        wait_until("frames", || stats.frames() >= 3);

        s.surface_lost().unwrap();
        // The host frees the window as soon as the loss call returns.
        stats.revoke_surface(0x1000 as *mut c_void);
        let frames_at_loss = stats.frames();

        thread::sleep(Duration::from_millis(20));
        assert_eq!(stats.stale_reads(), 0);
        assert_eq!(stats.frames(), frames_at_loss);
        assert_eq!(stats.detaches(), 1);
    }

    #[test]
    fn allocations_match_releases_across_full_cycle() {
        let (s, stats) = session();

        s.init(host()).unwrap();
        s.resume().unwrap();
        s.surface_created(surface(0x1000), 1920, 1080).unwrap();
        wait_until("frames", || stats.frames() >= 1);
        s.pause().unwrap();
        s.resume().unwrap();
        s.surface_lost().unwrap();
        s.surface_created(surface(0x2000), 1920, 1080).unwrap();
        s.destroy().unwrap();

        assert_eq!(stats.allocations(), 1);
        assert_eq!(stats.releases(), 1);
        assert_eq!(stats.attaches(), stats.detaches());
        assert!(!s.snapshot().resources_allocated);
    }

    #[test]
    fn invalid_geometry_never_starts_rendering() {
        let (s, stats) = session();

        s.init(host()).unwrap();
        assert!(matches!(
            s.surface_created(surface(0x1000), 0, 0),
            Err(SessionError::InvalidGeometry { width: 0, height: 0 })
        ));
        s.resume().unwrap();

        let snap = s.snapshot();
        assert_eq!(snap.lifecycle, LifecycleState::Running);
        assert_eq!(snap.surface, SurfaceState::Absent);
        assert!(!snap.render_active);
        assert_eq!(stats.allocations(), 0);
    }

    #[test]
    fn destroy_after_loss_completes_and_releases() {
        let (s, stats) = session();

        s.init(host()).unwrap();
        s.resume().unwrap();
        s.surface_created(surface(0x1000), 1920, 1080).unwrap();
        assert!(s.snapshot().render_active);
        wait_until("frames", || stats.frames() >= 1);

        s.surface_lost().unwrap();
        s.destroy().unwrap();

        assert_eq!(s.snapshot().lifecycle, LifecycleState::Destroyed);
        assert_eq!(stats.allocations(), stats.releases());
    }

    #[test]
    fn rapid_rotation_before_resume_waits_for_resume() {
        let (s, stats) = session();

        s.init(host()).unwrap();
        s.surface_created(surface(0x1000), 1080, 1920).unwrap();
        s.surface_lost().unwrap();
        s.surface_created(surface(0x2000), 1920, 1080).unwrap();

        assert!(!s.snapshot().render_active);
        assert_eq!(stats.allocations(), 0);

        s.resume().unwrap();
        assert!(s.snapshot().render_active);
        wait_until("frames", || stats.frames() >= 1);
        assert_eq!(stats.last_size(), Some(SurfaceSize { width: 1920, height: 1080 }));
    }

    #[test]
    fn second_create_without_loss_swaps_surfaces() {
        let (s, stats) = session();

        s.init(host()).unwrap();
        s.resume().unwrap();
        s.surface_created(surface(0x1000), 800, 600).unwrap();
        wait_until("frames", || stats.frames() >= 1);

        s.surface_created(surface(0x2000), 600, 800).unwrap();
        stats.revoke_surface(0x1000 as *mut c_void);
        let frames = stats.frames();
        wait_until("frames on new surface", || stats.frames() > frames);

        assert_eq!(stats.stale_reads(), 0);
        assert_eq!(stats.attaches(), 2);
        assert_eq!(stats.detaches(), 1);
        assert_eq!(stats.allocations(), 1);
        assert!(s.snapshot().render_active);
    }

    #[test]
    fn allocation_failure_is_fatal() {
        let (s, stats) = session();
        stats.fail_allocation();

        s.init(host()).unwrap();
        s.surface_created(surface(0x1000), 1920, 1080).unwrap();
        assert!(matches!(s.resume(), Err(SessionError::ResourceAllocation(_))));

        let snap = s.snapshot();
        assert_eq!(snap.lifecycle, LifecycleState::Destroyed);
        assert!(!snap.render_active);

        // Terminal: nothing restarts the engine.
        s.resume().unwrap();
        s.surface_created(surface(0x2000), 1920, 1080).unwrap();
        assert_eq!(stats.allocations(), 0);
        assert_eq!(stats.releases(), 0);
    }

    #[test]
    fn frame_failure_destroys_without_further_calls() {
        let (s, stats) = session();
        let mut rx = s.subscribe();
        stats.fail_frames_after(1);

        s.init(host()).unwrap();
        s.resume().unwrap();
        s.surface_created(surface(0x1000), 320, 240).unwrap();

        wait_until("fatal transition", || s.snapshot().lifecycle == LifecycleState::Destroyed);

        let snap = s.snapshot();
        assert!(!snap.render_active);
        assert!(!snap.resources_allocated);
        assert_eq!(snap.surface, SurfaceState::Lost);
        assert_eq!(stats.allocations(), 1);
        assert_eq!(stats.releases(), 1);
        assert_eq!(stats.attaches(), stats.detaches());

        let mut saw_failure = false;
        let mut reason = None;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                SessionEvent::RenderFailed { .. } => saw_failure = true,
                SessionEvent::Destroyed { reason: r } => reason = Some(r),
                _ => {}
            }
        }
        assert!(saw_failure);
        assert!(matches!(reason, Some(DestroyReason::Fatal(msg)) if msg.contains("injected frame failure")));

        // Terminal afterwards.
        s.pause().unwrap();
        s.resume().unwrap();
        assert_eq!(s.snapshot().lifecycle, LifecycleState::Destroyed);
        assert_eq!(stats.releases(), 1);
    }

    #[derive(Debug, Default)]
    struct SlowFrames {
        in_frame: AtomicBool,
        detached: AtomicBool,
    }

    /// Backend whose frames take long enough for host calls to overlap them.
    struct SlowBackend {
        frames: Arc<SlowFrames>,
        frame_time: Duration,
    }

    impl RenderBackend for SlowBackend {
        fn name(&self) -> &str {
            "SlowBackend"
        }

        fn allocate(&mut self, _host: &HostContext, _surface: &SurfaceHandle, _size: SurfaceSize) -> anyhow::Result<()> {
            Ok(())
        }

        fn detach_surface(&mut self, _surface: &SurfaceHandle) {
            self.frames.detached.store(true, Ordering::SeqCst);
        }

        fn render_frame(&mut self, _surface: &SurfaceHandle, _size: SurfaceSize) -> anyhow::Result<()> {
            self.frames.in_frame.store(true, Ordering::SeqCst);
            thread::sleep(self.frame_time);
            self.frames.in_frame.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn release(&mut self) {}
    }

    fn slow_session() -> (Arc<EngineSession>, Arc<SlowFrames>) {
        let frames = Arc::new(SlowFrames::default());
        let backend = SlowBackend {
            frames: frames.clone(),
            frame_time: Duration::from_millis(300),
        };
        let s = Arc::new(EngineSession::new(SessionConfig::default(), Box::new(backend)));

        s.init(host()).unwrap();
        s.resume().unwrap();
        s.surface_created(surface(0x1000), 640, 480).unwrap();
        wait_until("frame in flight", || frames.in_frame.load(Ordering::SeqCst));
        (s, frames)
    }

    #[test]
    fn surface_lost_waits_for_a_concurrent_pause_to_finish_its_join() {
        let (s, frames) = slow_session();

        let pausing = {
            let s = s.clone();
            thread::spawn(move || s.pause().unwrap())
        };
        thread::sleep(Duration::from_millis(30));
        s.surface_lost().unwrap();

        assert!(!frames.in_frame.load(Ordering::SeqCst));
        assert!(frames.detached.load(Ordering::SeqCst));
        pausing.join().unwrap();
        assert!(!s.snapshot().render_active);
    }

    #[test]
    fn pause_waits_for_a_concurrent_surface_loss_to_finish_its_join() {
        let (s, frames) = slow_session();

        let losing = {
            let s = s.clone();
            thread::spawn(move || s.surface_lost().unwrap())
        };
        thread::sleep(Duration::from_millis(30));
        s.pause().unwrap();

        assert!(!frames.in_frame.load(Ordering::SeqCst));
        assert!(frames.detached.load(Ordering::SeqCst));
        losing.join().unwrap();
        assert_eq!(s.snapshot().lifecycle, LifecycleState::Paused);
    }

    #[test]
    fn dropping_a_live_session_joins_and_releases() {
        let (s, stats) = session();
        s.init(host()).unwrap();
        s.resume().unwrap();
        s.surface_created(surface(0x1000), 320, 240).unwrap();
        wait_until("frames", || stats.frames() >= 1);

        drop(s);
        assert_eq!(stats.releases(), 1);
        assert_eq!(stats.attaches(), stats.detaches());
    }

    #[test]
    fn host_events_drive_lifecycle() {
        let (s, _stats) = session();
        s.init(host()).unwrap();

        s.dispatch_host_event(HostEvent::from_id(3).unwrap()).unwrap();
        assert_eq!(s.snapshot().lifecycle, LifecycleState::Running);
        s.dispatch_host_event(HostEvent::EnteredBackground).unwrap();
        assert_eq!(s.snapshot().lifecycle, LifecycleState::Paused);
        s.dispatch_host_event(HostEvent::MemoryWarning).unwrap();
        s.dispatch_host_event(HostEvent::SurfaceRecreated).unwrap();
        assert_eq!(s.snapshot().lifecycle, LifecycleState::Paused);
        s.dispatch_host_event(HostEvent::Destroyed).unwrap();
        assert_eq!(s.snapshot().lifecycle, LifecycleState::Destroyed);
    }

    #[test]
    fn lifecycle_and_surface_threads_race_safely() {
        let (s, stats) = session();
        let s = Arc::new(s);
        s.init(host()).unwrap();

        let control = {
            let s = s.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    s.resume().unwrap();
                    thread::sleep(Duration::from_micros(300));
                    s.pause().unwrap();
                }
            })
        };

        let callbacks = {
            let s = s.clone();
            let stats = stats.clone();
            thread::spawn(move || {
                for i in 0..50usize {
                    let addr = 0x1000 + i * 0x100;
                    s.surface_created(surface(addr), 640, 480).unwrap();
                    thread::sleep(Duration::from_micros(200));
                    s.surface_lost().unwrap();
                    stats.revoke_surface(addr as *mut c_void);
                }
            })
        };

        control.join().unwrap();
        callbacks.join().unwrap();
        s.destroy().unwrap();

        assert_eq!(stats.stale_reads(), 0);
        assert!(stats.allocations() <= 1);
        assert_eq!(stats.allocations(), stats.releases());
        assert_eq!(stats.attaches(), stats.detaches());
    }

    #[tokio::test]
    async fn telemetry_follows_transitions_in_order() {
        let (s, stats) = session();
        let mut rx = s.subscribe();

        s.init(host()).unwrap();
        s.resume().unwrap();
        s.surface_created(surface(0x1000), 1920, 1080).unwrap();
        wait_until("frames", || stats.frames() >= 1);
        s.surface_lost().unwrap();
        s.destroy().unwrap();

        let size = SurfaceSize { width: 1920, height: 1080 };
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Initialized);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Resumed);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::SurfaceCreated { size });
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::ResourcesAllocated { .. }));
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::RenderStarted);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::SurfaceLost);
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::RenderStopped { frames } if frames >= 1));
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::ResourcesReleased { .. }));
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::Destroyed {
                reason: DestroyReason::HostRequest
            }
        );
    }
}
