use crate::engine::surface::{HostContext, SurfaceHandle};
use crate::render::backend::{RenderBackend, SurfaceSize};
use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Counters shared between a [`NullBackend`] and whoever wants to observe it.
///
/// Besides counting, the stats double as a fault injector (`fail_allocation`,
/// `fail_frames_after`) and as a liveness probe: a surface marked with
/// [`revoke_surface`](Self::revoke_surface) is treated as freed memory, and any frame that
/// still targets it is counted as a stale read.
#[derive(Debug, Default)]
pub struct NullBackendStats {
    allocations: AtomicU64,
    releases: AtomicU64,
    attaches: AtomicU64,
    detaches: AtomicU64,
    frames: AtomicU64,
    stale_reads: AtomicU64,
    fail_allocation: AtomicBool,
    fail_frames_after: AtomicU64,
    revoked: Mutex<HashSet<usize>>,
    last_size: Mutex<Option<SurfaceSize>>,
}

impl NullBackendStats {
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn attaches(&self) -> u64 {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detaches(&self) -> u64 {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Frames that targeted a surface after it was revoked.
    pub fn stale_reads(&self) -> u64 {
        self.stale_reads.load(Ordering::SeqCst)
    }

    /// Size used by the most recent frame.
    pub fn last_size(&self) -> Option<SurfaceSize> {
        *self.last_size.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `allocate` fail.
    pub fn fail_allocation(&self) {
        self.fail_allocation.store(true, Ordering::SeqCst);
    }

    /// Make every frame fail once `frames` frames have been rendered successfully.
    pub fn fail_frames_after(&self, frames: u64) {
        self.fail_frames_after.store(frames, Ordering::SeqCst);
    }

    /// Marks the surface behind `ptr` as freed by the host.
    pub fn revoke_surface(&self, ptr: *mut std::ffi::c_void) {
        self.revoked.lock().unwrap_or_else(|e| e.into_inner()).insert(ptr as usize);
    }

    fn is_revoked(&self, surface: &SurfaceHandle) -> bool {
        self.revoked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(surface.as_ptr() as usize))
    }
}

/// Null backend renderer that does not perform any rendering.
#[derive(Debug, Default)]
pub struct NullBackend {
    stats: Arc<NullBackendStats>,
    allocated: bool,
    attached: HashSet<usize>,
}

impl NullBackend {
    /// Creates a new instance of the null backend.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<NullBackendStats> {
        self.stats.clone()
    }
}

impl RenderBackend for NullBackend {
    fn name(&self) -> &str {
        "NullBackend"
    }

    fn allocate(&mut self, _host: &HostContext, _surface: &SurfaceHandle, _size: SurfaceSize) -> Result<()> {
        if self.stats.fail_allocation.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("injected allocation failure"));
        }
        if self.allocated {
            return Err(anyhow!("NullBackend resources allocated twice"));
        }

        self.allocated = true;
        self.stats.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn attach_surface(&mut self, surface: &SurfaceHandle, _size: SurfaceSize) -> Result<()> {
        self.attached.insert(surface.as_ptr() as usize);
        self.stats.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach_surface(&mut self, surface: &SurfaceHandle) {
        if self.attached.remove(&(surface.as_ptr() as usize)) {
            self.stats.detaches.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn render_frame(&mut self, surface: &SurfaceHandle, size: SurfaceSize) -> Result<()> {
        if !self.allocated {
            return Err(anyhow!("NullBackend used before allocation"));
        }
        if self.stats.is_revoked(surface) {
            self.stats.stale_reads.fetch_add(1, Ordering::SeqCst);
        }

        let limit = self.stats.fail_frames_after.load(Ordering::SeqCst);
        if limit > 0 && self.stats.frames() >= limit {
            return Err(anyhow!("injected frame failure"));
        }

        *self.stats.last_size.lock().unwrap_or_else(|e| e.into_inner()) = Some(size);
        self.stats.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        if self.allocated {
            self.allocated = false;
            self.stats.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
