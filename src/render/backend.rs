use crate::engine::surface::{HostContext, SurfaceHandle};
use crate::engine::SessionError;

/// Size of a surface in pixels. Only strictly positive geometry can be represented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    /// Validates host-provided geometry. Hosts pass signed integers, so zero and negative
    /// values are rejected here rather than wrapped.
    pub fn new(width: i32, height: i32) -> Result<Self, SessionError> {
        if width <= 0 || height <= 0 {
            return Err(SessionError::InvalidGeometry { width, height });
        }

        Ok(Self {
            width: width as u32,
            height: height as u32,
        })
    }
}

impl std::fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Lifecycle interface of the rendering engine.
///
/// The session decides *when* each call happens; the backend decides what it means for its
/// GPU API. Calls are serialized through the session's backend lock, but may come from the
/// host control thread, the surface callback thread, or the render thread.
pub trait RenderBackend {
    /// Human readable name, used in logs.
    fn name(&self) -> &str;

    /// Allocate engine resources (device, context, pipelines). Called once per session, on the
    /// first transition into running with a valid surface.
    fn allocate(&mut self, host: &HostContext, surface: &SurfaceHandle, size: SurfaceSize) -> anyhow::Result<()>;

    /// Bind a surface before a render thread starts drawing into it.
    fn attach_surface(&mut self, _surface: &SurfaceHandle, _size: SurfaceSize) -> anyhow::Result<()> {
        Ok(())
    }

    /// Unbind `surface`. Called after the render thread drawing into it has been joined and
    /// before the call that stopped it returns to the host.
    fn detach_surface(&mut self, _surface: &SurfaceHandle) {}

    /// Render a single frame. Runs on the render thread.
    fn render_frame(&mut self, surface: &SurfaceHandle, size: SurfaceSize) -> anyhow::Result<()>;

    /// Release everything `allocate` created. Called exactly once for a successful `allocate`.
    fn release(&mut self);
}
