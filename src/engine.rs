//! Native lifecycle and surface bridge.
//!
//! The [`EngineSession`] composes two halves: the lifecycle controller (`init`, `pause`,
//! `resume`, `destroy`) driven by the host activity, and the surface registry
//! (`surface_created`, `surface_changed`, `surface_lost`) driven by the host's surface
//! callbacks. A render thread runs exactly while both halves agree.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod errors;
pub mod events;
pub mod host_event;
pub mod lifecycle;
pub mod session;
pub mod surface;

mod render_thread;

pub use errors::SessionError;
pub use events::{DestroyReason, SessionEvent};
pub use host_event::HostEvent;
pub use lifecycle::LifecycleState;
pub use session::{EngineSession, SessionId, SessionSnapshot};
pub use surface::{HostContext, SurfaceHandle, SurfaceState};

/// Default capacity of the session telemetry channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Locks `mutex`, recovering the guard if a panicking thread poisoned it. Every transition is
/// applied within a single critical section, so a poisoned guard still holds consistent state.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
