use crate::engine::events::SessionEvent;
use crate::engine::lock;
use crate::engine::session::SessionShared;
use crate::engine::surface::{SharedSize, SurfaceHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Everything a render thread needs. The thread reaches the session state only to tear its
/// session down after a frame error.
pub(crate) struct RenderThreadArgs {
    pub session: Arc<SessionShared>,
    pub name: String,
    pub surface: SurfaceHandle,
    pub size: Arc<SharedSize>,
    pub frame_interval: Duration,
}

/// A running frame loop. Stopping is split in two: [`signal_stop`](Self::signal_stop) is
/// cheap and done under the session lock, [`join`](Self::join) blocks and must not be.
pub(crate) struct RenderThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<u64>,
}

impl RenderThread {
    pub(crate) fn spawn(args: RenderThreadArgs) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let handle = thread::Builder::new()
            .name(args.name.clone())
            .spawn(move || run_frames(args, thread_stop))?;

        Ok(Self { stop, handle })
    }

    pub(crate) fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.handle.thread().unpark();
    }

    /// Is this the thread currently executing.
    pub(crate) fn is_current(&self) -> bool {
        self.handle.thread().id() == thread::current().id()
    }

    /// Waits for the thread to exit and returns the number of frames it rendered.
    pub(crate) fn join(self) -> Result<u64, String> {
        self.signal_stop();
        self.handle.join().map_err(|payload| {
            if let Some(msg) = payload.downcast_ref::<&str>() {
                msg.to_string()
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                msg.clone()
            } else {
                "render thread panicked".to_string()
            }
        })
    }
}

fn run_frames(args: RenderThreadArgs, stop: Arc<AtomicBool>) -> u64 {
    let session = &args.session;
    log::debug!("Session {:?}: render thread started on {:?}", session.id, args.surface);

    let mut frames = 0u64;
    let mut failure = None;

    loop {
        {
            let mut backend = lock(&session.backend);

            // Checked under the backend lock: once a stopper has seen the flag set and taken
            // the lock, no further frame can start.
            if stop.load(Ordering::Acquire) {
                break;
            }

            if let Some(size) = args.size.load() {
                if let Err(e) = backend.render_frame(&args.surface, size) {
                    failure = Some(format!("{e:#}"));
                    break;
                }

                frames += 1;
                session.frames_total.fetch_add(1, Ordering::Relaxed);
                log::trace!("Session {:?}: frame {} at {}", session.id, frames, size);
            }
        }

        thread::park_timeout(args.frame_interval);
    }

    if let Some(error) = failure {
        log::error!("Session {:?}: frame {} failed: {}", session.id, frames, error);
        session.record_fault(error.clone());
        session.emit(SessionEvent::RenderFailed { error });
        session.fail_from_render_thread(&stop);
    }

    log::debug!("Session {:?}: render thread exiting after {} frames", session.id, frames);
    frames
}
