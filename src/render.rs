pub mod backend;

/// Rendering backends for the bridge.
pub mod backends {
    /// Backend that draws nothing, used by default and in tests
    pub mod null;
}

pub use backend::{RenderBackend, SurfaceSize};
