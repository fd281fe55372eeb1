//! Host-owned drawing surface bookkeeping.
//!
//! The host hands us an opaque native window pointer when its surface is created and revokes
//! it when the surface is lost. The session never owns the window: [`SurfaceHandle`] is a
//! borrowed token that is only given to the backend while the registry reports
//! [`SurfaceState::Valid`].

use crate::engine::events::SessionEvent;
use crate::engine::lifecycle::LifecycleState;
use crate::engine::session::EngineSession;
use crate::engine::{lock, SessionError};
use crate::render::backend::SurfaceSize;
use raw_window_handle::{AndroidNdkWindowHandle, RawWindowHandle};
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque reference to the host activity, recorded at init and handed to the backend when
/// engine resources are allocated.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HostContext(NonNull<c_void>);

// SAFETY: the pointer is an opaque token that the session never dereferences.
unsafe impl Send for HostContext {}
unsafe impl Sync for HostContext {}

impl HostContext {
    pub fn from_ptr(ptr: *mut c_void) -> Result<Self, SessionError> {
        NonNull::new(ptr).map(Self).ok_or(SessionError::NullHostContext)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HostContext({:p})", self.0)
    }
}

/// Opaque reference to the host's native window (`ANativeWindow` on Android).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHandle(NonNull<c_void>);

// SAFETY: the session hands the handle to exactly one render thread at a time and joins that
// thread before the host is allowed to destroy the window.
unsafe impl Send for SurfaceHandle {}
unsafe impl Sync for SurfaceHandle {}

impl SurfaceHandle {
    pub fn from_ptr(ptr: *mut c_void) -> Result<Self, SessionError> {
        NonNull::new(ptr).map(Self).ok_or(SessionError::NullSurface)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// The handle in the form GPU APIs consume it.
    pub fn raw_window_handle(&self) -> RawWindowHandle {
        RawWindowHandle::AndroidNdk(AndroidNdkWindowHandle::new(self.0))
    }
}

impl std::fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SurfaceHandle({:p})", self.0)
    }
}

/// Validity of the host surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceState {
    /// No surface has been created yet.
    #[default]
    Absent,
    /// A surface exists and may be drawn into.
    Valid,
    /// The last surface was destroyed by the host. Waiting for a new one.
    Lost,
}

/// Target size shared between the registry and the render thread. Packed into a single atomic
/// so the render loop can pick up resizes without taking the session lock.
#[derive(Debug, Default)]
pub(crate) struct SharedSize(AtomicU64);

impl SharedSize {
    pub(crate) fn store(&self, size: SurfaceSize) {
        let packed = ((size.width as u64) << 32) | size.height as u64;
        self.0.store(packed, Ordering::Release);
    }

    pub(crate) fn load(&self) -> Option<SurfaceSize> {
        let packed = self.0.load(Ordering::Acquire);
        if packed == 0 {
            return None;
        }

        Some(SurfaceSize {
            width: (packed >> 32) as u32,
            height: packed as u32,
        })
    }

    pub(crate) fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// Current surface, its validity and geometry. Only ever touched under the session lock.
#[derive(Debug, Default)]
pub(crate) struct SurfaceRegistry {
    state: SurfaceState,
    handle: Option<SurfaceHandle>,
    size: Arc<SharedSize>,
}

impl SurfaceRegistry {
    pub(crate) fn state(&self) -> SurfaceState {
        self.state
    }

    /// The handle, present only while the surface is valid.
    pub(crate) fn handle(&self) -> Option<SurfaceHandle> {
        match self.state {
            SurfaceState::Valid => self.handle,
            _ => None,
        }
    }

    pub(crate) fn size(&self) -> Option<SurfaceSize> {
        match self.state {
            SurfaceState::Valid => self.size.load(),
            _ => None,
        }
    }

    pub(crate) fn shared_size(&self) -> Arc<SharedSize> {
        self.size.clone()
    }

    pub(crate) fn create(&mut self, handle: SurfaceHandle, size: SurfaceSize) {
        self.size.store(size);
        self.handle = Some(handle);
        self.state = SurfaceState::Valid;
    }

    /// Updates geometry. Returns `false` when there is no valid surface to resize.
    pub(crate) fn change(&mut self, size: SurfaceSize) -> bool {
        if self.state != SurfaceState::Valid {
            return false;
        }

        self.size.store(size);
        true
    }

    /// Marks the surface lost and forgets the handle, returning it if there was one.
    pub(crate) fn lose(&mut self) -> Option<SurfaceHandle> {
        self.state = SurfaceState::Lost;
        self.size.clear();
        self.handle.take()
    }
}

impl EngineSession {
    /// Records a new host surface. Starts rendering if the session is running.
    ///
    /// A second creation without an intervening loss is treated as loss followed by creation:
    /// the old surface is fully released before the new one is used.
    pub fn surface_created(&self, surface: SurfaceHandle, width: i32, height: i32) -> Result<(), SessionError> {
        let _transition = self.begin();

        let (size, teardown) = {
            let mut state = lock(&self.shared.state);
            let lifecycle = state.lifecycle;
            match lifecycle {
                LifecycleState::Destroyed => return Ok(()),
                LifecycleState::Uninitialized => {
                    drop(state);
                    return Err(self.reject(
                        "surface_created",
                        SessionError::NotInitialized { operation: "surface_created" },
                    ));
                }
                _ => {}
            }

            let size = match SurfaceSize::new(width, height) {
                Ok(size) => size,
                Err(e) => {
                    drop(state);
                    return Err(self.reject("surface_created", e));
                }
            };

            // Implicit loss of a surface the host never reported lost.
            if state.surface.state() == SurfaceState::Valid {
                let teardown = self.shared.stop_render(&mut state);
                state.surface.lose();
                (size, Some(teardown))
            } else {
                (size, None)
            }
        };

        if let Some(teardown) = teardown {
            self.anomaly("surface_created", "surface created twice without a loss, treating as loss");
            self.shared.complete(teardown);
        }

        let result = {
            let mut state = lock(&self.shared.state);
            if state.lifecycle == LifecycleState::Destroyed {
                return Ok(());
            }

            state.surface.create(surface, size);
            log::info!("Session {:?}: surface {:?} created at {}", self.shared.id, surface, size);
            self.shared.emit(SessionEvent::SurfaceCreated { size });
            self.start_render_if_ready(&mut state)
        };

        self.escalate(result)
    }

    /// Updates the target geometry. An active render thread keeps running and picks up the
    /// new size on its next frame.
    pub fn surface_changed(&self, width: i32, height: i32) -> Result<(), SessionError> {
        let _transition = self.begin();

        let mut state = lock(&self.shared.state);
        let lifecycle = state.lifecycle;
        match lifecycle {
            LifecycleState::Destroyed => return Ok(()),
            LifecycleState::Uninitialized => {
                drop(state);
                return Err(self.reject(
                    "surface_changed",
                    SessionError::NotInitialized { operation: "surface_changed" },
                ));
            }
            _ => {}
        }

        let size = match SurfaceSize::new(width, height) {
            Ok(size) => size,
            Err(e) => {
                drop(state);
                return Err(self.reject("surface_changed", e));
            }
        };

        if !state.surface.change(size) {
            let current = state.surface.state();
            drop(state);
            self.anomaly("surface_changed", &format!("no valid surface ({current:?})"));
            return Ok(());
        }

        log::debug!("Session {:?}: surface resized to {}", self.shared.id, size);
        self.shared.emit(SessionEvent::SurfaceChanged { size });
        Ok(())
    }

    /// Revokes the current surface. Returns only after the render thread, if any, has been
    /// joined, so the host may free the window immediately afterwards. Always authoritative,
    /// including redundant losses.
    pub fn surface_lost(&self) -> Result<(), SessionError> {
        let _transition = self.begin();

        let teardown = {
            let mut state = lock(&self.shared.state);
            let lifecycle = state.lifecycle;
            match lifecycle {
                LifecycleState::Destroyed => return Ok(()),
                LifecycleState::Uninitialized => {
                    drop(state);
                    return Err(self.reject(
                        "surface_lost",
                        SessionError::NotInitialized { operation: "surface_lost" },
                    ));
                }
                _ => {}
            }

            let teardown = self.shared.stop_render(&mut state);
            if state.surface.lose().is_none() {
                log::debug!("Session {:?}: redundant surface loss", self.shared.id);
            } else {
                log::info!("Session {:?}: surface lost", self.shared.id);
            }
            self.shared.emit(SessionEvent::SurfaceLost);
            teardown
        };

        self.shared.complete(teardown);
        Ok(())
    }
}
