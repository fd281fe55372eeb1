//! Session telemetry events.
//!
//! Entry points into the session are fire-and-forget from the host's point of view, so every
//! transition, rejected call and failure is also published on the session's broadcast channel.
//! Subscribe with [`EngineSession::subscribe`](crate::engine::EngineSession::subscribe).
//!
//! # Main Types
//!
//! - [`SessionEvent`]: everything the session reports about itself.
//! - [`DestroyReason`]: why a session ended up in the terminal state.

use crate::render::backend::SurfaceSize;
use std::fmt::Display;

/// Why a session was destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyReason {
    /// The host called `destroy`.
    HostRequest,
    /// An engine failure made the session unrecoverable.
    Fatal(String),
}

impl Display for DestroyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestroyReason::HostRequest => write!(f, "host request"),
            DestroyReason::Fatal(reason) => write!(f, "fatal: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    // ****************************************
    // ** Lifecycle
    /// Session bookkeeping created, now paused
    Initialized,
    /// Host resumed the activity
    Resumed,
    /// Host paused the activity; rendering is quiesced
    Paused,
    /// Session reached its terminal state
    Destroyed { reason: DestroyReason },

    // ****************************************
    // ** Surface
    /// Host surface became available
    SurfaceCreated { size: SurfaceSize },
    /// Host surface geometry changed
    SurfaceChanged { size: SurfaceSize },
    /// Host surface was revoked
    SurfaceLost,

    // ****************************************
    // ** Engine
    /// Engine resources were allocated by the backend
    ResourcesAllocated { backend: String },
    /// Engine resources were released by the backend
    ResourcesReleased { backend: String },
    /// Render thread started drawing
    RenderStarted,
    /// Render thread was stopped and joined
    RenderStopped { frames: u64 },
    /// A frame failed; the session will be torn down on the next entry point
    RenderFailed { error: String },

    // ****************************************
    // ** Diagnostics
    /// A call arrived in an order the host contract forbids and was clamped
    OrderingAnomaly { operation: &'static str, detail: String },
    /// A call was rejected because of its arguments or because the session was not initialized
    CallRejected { operation: &'static str, error: String },
    /// The host reported memory pressure
    MemoryWarning,
}
