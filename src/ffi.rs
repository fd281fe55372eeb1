//! C ABI boundary used by the host shim.
//!
//! The host loads one instance of this library, so there is exactly one session slot per
//! process. `aurea_init` fills it, `aurea_on_destroy` tears the session down and empties it;
//! every other entry point forwards to whatever session is in the slot, or does nothing.
//! Nothing here returns an error or unwinds into the host: failures are logged and absorbed.

use crate::config::SessionConfig;
use crate::engine::{EngineSession, HostContext, HostEvent, LifecycleState, SessionError, SurfaceHandle};
use crate::engine::lock;
use crate::logging::init_logging;
use crate::render::backend::RenderBackend;
use crate::render::backends::null::NullBackend;
use lazy_static::lazy_static;
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

lazy_static! {
    static ref SESSION: Mutex<Option<Arc<EngineSession>>> = Mutex::new(None);
    static ref PENDING_BACKEND: Mutex<Option<Box<dyn RenderBackend + Send>>> = Mutex::new(None);
}

/// Installs the backend the next `aurea_init` will hand to its session. Without one, a
/// [`NullBackend`] is used.
pub fn register_backend(backend: Box<dyn RenderBackend + Send>) {
    log::debug!("Registered render backend {}", backend.name());
    *lock(&PENDING_BACKEND) = Some(backend);
}

/// The session currently in the process-wide slot, if any. Engines use this to subscribe to
/// telemetry.
pub fn current_session() -> Option<Arc<EngineSession>> {
    lock(&SESSION).clone()
}

/// Runs `f` and keeps any panic on this side of the boundary.
fn guard(operation: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::error!("{} panicked; panic contained at the host boundary", operation);
    }
}

/// Forwards to the current session. The slot lock is released before `f` runs, so a call that
/// joins the render thread never blocks other entry points on the slot.
fn with_session(operation: &'static str, f: impl FnOnce(&EngineSession) -> Result<(), SessionError>) {
    guard(operation, || {
        let Some(session) = current_session() else {
            log::debug!("{} without a session, ignored", operation);
            return;
        };

        if let Err(e) = f(&session) {
            log::debug!("{} failed: {}", operation, e);
        }
    });
}

fn init_session(activity: *mut c_void, config: SessionConfig) {
    init_logging(config.log_level);

    let host = match HostContext::from_ptr(activity) {
        Ok(host) => host,
        Err(e) => {
            log::warn!("aurea_init rejected: {}", e);
            return;
        }
    };

    let mut slot = lock(&SESSION);
    if let Some(session) = slot.as_ref() {
        if session.snapshot().lifecycle != LifecycleState::Destroyed {
            if let Err(e) = session.init(host) {
                log::debug!("aurea_init failed: {}", e);
            }
            return;
        }
    }

    let backend = lock(&PENDING_BACKEND)
        .take()
        .unwrap_or_else(|| Box::new(NullBackend::new()));
    let session = Arc::new(EngineSession::new(config, backend));

    match session.init(host) {
        Ok(()) => *slot = Some(session),
        Err(e) => log::error!("aurea_init failed: {}", e),
    }
}

/// Creates the session for `activity` with the default configuration.
#[no_mangle]
pub extern "C" fn aurea_init(activity: *mut c_void) {
    guard("aurea_init", || init_session(activity, SessionConfig::default()));
}

/// Creates the session for `activity` with a JSON configuration. Invalid or missing
/// configuration falls back to the defaults.
///
/// # Safety
///
/// `config_json` must be null or point to a NUL-terminated string that stays valid for the
/// duration of the call.
#[no_mangle]
pub unsafe extern "C" fn aurea_init_with_config(activity: *mut c_void, config_json: *const c_char) {
    let config = if config_json.is_null() {
        SessionConfig::default()
    } else {
        let raw = unsafe { CStr::from_ptr(config_json) };
        let parsed = raw
            .to_str()
            .map_err(|e| e.to_string())
            .and_then(|json| SessionConfig::from_json(json).map_err(|e| e.to_string()));

        match parsed {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring session config: {}", e);
                SessionConfig::default()
            }
        }
    };

    guard("aurea_init_with_config", || init_session(activity, config));
}

#[no_mangle]
pub extern "C" fn aurea_on_pause() {
    with_session("aurea_on_pause", EngineSession::pause);
}

#[no_mangle]
pub extern "C" fn aurea_on_resume() {
    with_session("aurea_on_resume", EngineSession::resume);
}

/// Destroys the session and empties the slot. Returns after the render thread has been
/// joined and engine resources released.
#[no_mangle]
pub extern "C" fn aurea_on_destroy() {
    guard("aurea_on_destroy", || {
        let Some(session) = lock(&SESSION).take() else {
            log::debug!("aurea_on_destroy without a session, ignored");
            return;
        };

        if let Err(e) = session.destroy() {
            log::debug!("aurea_on_destroy failed: {}", e);
        }
    });
}

#[no_mangle]
pub extern "C" fn aurea_on_surface_created(window: *mut c_void, width: i32, height: i32) {
    with_session("aurea_on_surface_created", |session| {
        let surface = SurfaceHandle::from_ptr(window)?;
        session.surface_created(surface, width, height)
    });
}

#[no_mangle]
pub extern "C" fn aurea_on_surface_changed(width: i32, height: i32) {
    with_session("aurea_on_surface_changed", |session| session.surface_changed(width, height));
}

#[no_mangle]
pub extern "C" fn aurea_on_surface_lost() {
    with_session("aurea_on_surface_lost", EngineSession::surface_lost);
}

/// Generic lifecycle callback taking a numeric host event id.
#[no_mangle]
pub extern "C" fn aurea_on_lifecycle_event(event_id: u32) {
    let Some(event) = HostEvent::from_id(event_id) else {
        log::warn!("Unknown host lifecycle event id {}", event_id);
        return;
    };

    if matches!(event, HostEvent::Destroyed | HostEvent::WindowWillClose) {
        aurea_on_destroy();
        return;
    }

    with_session("aurea_on_lifecycle_event", |session| session.dispatch_host_event(event));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::null::NullBackendStats;
    use std::ffi::CString;
    use std::thread;
    use std::time::Duration;

    // The session slot is process-wide; tests touching it must not overlap.
    lazy_static! {
        static ref TEST_LOCK: Mutex<()> = Mutex::new(());
    }

    fn reset() {
        aurea_on_destroy();
        lock(&PENDING_BACKEND).take();
    }

    fn null_backend() -> Arc<NullBackendStats> {
        let backend = NullBackend::new();
        let stats = backend.stats();
        register_backend(Box::new(backend));
        stats
    }

    fn activity() -> *mut c_void {
        0x10 as *mut c_void
    }

    #[test]
    fn full_cycle_through_c_entry_points() {
        let _serial = lock(&TEST_LOCK);
        reset();
        let stats = null_backend();

        aurea_init(activity());
        aurea_on_resume();
        aurea_on_surface_created(0x1000 as *mut c_void, 1920, 1080);
        for _ in 0..5000 {
            if stats.frames() > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert!(stats.frames() > 0);

        aurea_on_surface_changed(1080, 1920);
        aurea_on_pause();
        aurea_on_resume();
        aurea_on_surface_lost();
        aurea_on_destroy();

        assert!(current_session().is_none());
        assert_eq!(stats.allocations(), 1);
        assert_eq!(stats.releases(), 1);
    }

    #[test]
    fn null_pointers_and_missing_session_are_ignored() {
        let _serial = lock(&TEST_LOCK);
        reset();

        aurea_on_pause();
        aurea_on_resume();
        aurea_on_surface_lost();
        aurea_on_surface_changed(10, 10);
        aurea_on_destroy();

        aurea_init(std::ptr::null_mut());
        assert!(current_session().is_none());

        aurea_init(activity());
        aurea_on_surface_created(std::ptr::null_mut(), 10, 10);
        let snap = current_session().unwrap().snapshot();
        assert_eq!(snap.surface, crate::engine::SurfaceState::Absent);

        reset();
    }

    #[test]
    fn init_twice_keeps_the_session() {
        let _serial = lock(&TEST_LOCK);
        reset();

        aurea_init(activity());
        let first = current_session().unwrap().id();
        aurea_init(activity());
        assert_eq!(current_session().unwrap().id(), first);

        reset();
    }

    #[test]
    fn init_after_destroy_builds_a_fresh_session() {
        let _serial = lock(&TEST_LOCK);
        reset();

        aurea_init(activity());
        let first = current_session().unwrap().id();
        aurea_on_destroy();
        assert!(current_session().is_none());

        aurea_init(activity());
        let second = current_session().unwrap();
        assert_ne!(second.id(), first);
        assert_eq!(second.snapshot().lifecycle, LifecycleState::Paused);

        reset();
    }

    #[test]
    fn init_with_config_applies_json() {
        let _serial = lock(&TEST_LOCK);
        reset();

        let json = CString::new(r#"{ "target_fps": 24, "render_thread_name": "test-render" }"#).unwrap();
        unsafe { aurea_init_with_config(activity(), json.as_ptr()) };
        let session = current_session().unwrap();
        assert_eq!(session.config().target_fps, 24);
        assert_eq!(session.config().render_thread_name, "test-render");

        reset();

        let broken = CString::new("{ nope").unwrap();
        unsafe { aurea_init_with_config(activity(), broken.as_ptr()) };
        assert_eq!(current_session().unwrap().config(), &SessionConfig::default());

        reset();
    }

    #[test]
    fn lifecycle_event_ids_drive_the_session() {
        let _serial = lock(&TEST_LOCK);
        reset();

        aurea_init(activity());
        aurea_on_lifecycle_event(3);
        assert_eq!(current_session().unwrap().snapshot().lifecycle, LifecycleState::Running);
        aurea_on_lifecycle_event(2);
        assert_eq!(current_session().unwrap().snapshot().lifecycle, LifecycleState::Paused);
        aurea_on_lifecycle_event(99);
        assert_eq!(current_session().unwrap().snapshot().lifecycle, LifecycleState::Paused);
        aurea_on_lifecycle_event(4);
        assert!(current_session().is_none());

        reset();
    }

    #[test]
    fn window_will_close_empties_the_slot() {
        let _serial = lock(&TEST_LOCK);
        reset();

        aurea_init(activity());
        let first = current_session().unwrap();
        aurea_on_lifecycle_event(5);

        assert!(current_session().is_none());
        assert_eq!(first.snapshot().lifecycle, LifecycleState::Destroyed);

        aurea_init(activity());
        assert_ne!(current_session().unwrap().id(), first.id());

        reset();
    }
}
