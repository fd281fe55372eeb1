//! Lifecycle controller: the activity-driven half of the session.
//!
//! These entry points are called in program order from the host's control thread. Each one
//! returns only after any render thread it stopped has been joined, so the host may move on
//! to its next lifecycle step (backgrounding, process exit) as soon as the call returns.

use crate::engine::events::{DestroyReason, SessionEvent};
use crate::engine::session::EngineSession;
use crate::engine::surface::{HostContext, SurfaceState};
use crate::engine::{lock, SessionError};

/// Activity-level state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// `init` has not been called yet.
    #[default]
    Uninitialized,
    /// The activity is in the foreground; rendering runs whenever a surface is valid.
    Running,
    /// The activity is paused; nothing renders.
    Paused,
    /// Terminal. Every further call is ignored.
    Destroyed,
}

impl EngineSession {
    /// Records the host context and moves to `Paused`. Engine resources are not allocated
    /// here since there may not be a surface yet.
    pub fn init(&self, host: HostContext) -> Result<(), SessionError> {
        let _transition = self.begin();
        let mut state = lock(&self.shared.state);

        let lifecycle = state.lifecycle;
        match lifecycle {
            LifecycleState::Uninitialized => {}
            LifecycleState::Destroyed => {
                log::trace!("Session {:?}: init after destroy ignored", self.shared.id);
                return Ok(());
            }
            _ => {
                drop(state);
                return Err(self.reject("init", SessionError::AlreadyInitialized));
            }
        }

        state.host = Some(host);
        state.lifecycle = LifecycleState::Paused;
        log::info!("Session {:?}: initialized with {:?}", self.shared.id, host);
        self.shared.emit(SessionEvent::Initialized);
        Ok(())
    }

    /// Stops and joins the render thread if running, then moves to `Paused`. Idempotent.
    pub fn pause(&self) -> Result<(), SessionError> {
        let _transition = self.begin();

        let teardown = {
            let mut state = lock(&self.shared.state);

            let lifecycle = state.lifecycle;
            match lifecycle {
                LifecycleState::Running => {}
                LifecycleState::Paused => {
                    log::debug!("Session {:?}: already paused", self.shared.id);
                    return Ok(());
                }
                LifecycleState::Destroyed => return Ok(()),
                LifecycleState::Uninitialized => {
                    drop(state);
                    return Err(self.reject("pause", SessionError::NotInitialized { operation: "pause" }));
                }
            }

            state.lifecycle = LifecycleState::Paused;
            log::info!("Session {:?}: paused", self.shared.id);
            self.shared.emit(SessionEvent::Paused);
            self.shared.stop_render(&mut state)
        };

        self.shared.complete(teardown);
        Ok(())
    }

    /// Moves to `Running`. Starts rendering right away when a surface is valid, otherwise the
    /// start is deferred until `surface_created`.
    pub fn resume(&self) -> Result<(), SessionError> {
        let _transition = self.begin();

        let result = {
            let mut state = lock(&self.shared.state);

            let lifecycle = state.lifecycle;
            match lifecycle {
                LifecycleState::Paused => {}
                LifecycleState::Running => {
                    drop(state);
                    self.anomaly("resume", "resume while already running");
                    return Ok(());
                }
                LifecycleState::Destroyed => return Ok(()),
                LifecycleState::Uninitialized => {
                    drop(state);
                    return Err(self.reject("resume", SessionError::NotInitialized { operation: "resume" }));
                }
            }

            state.lifecycle = LifecycleState::Running;
            log::info!("Session {:?}: resumed", self.shared.id);
            self.shared.emit(SessionEvent::Resumed);

            if state.surface.state() != SurfaceState::Valid {
                log::debug!("Session {:?}: no valid surface, render start deferred", self.shared.id);
            }
            self.start_render_if_ready(&mut state)
        };

        self.escalate(result)
    }

    /// Stops rendering, releases engine resources and moves to the terminal state.
    /// Idempotent.
    pub fn destroy(&self) -> Result<(), SessionError> {
        let _transition = self.begin();

        let teardown = {
            let mut state = lock(&self.shared.state);
            if state.lifecycle == LifecycleState::Destroyed {
                log::trace!("Session {:?}: already destroyed", self.shared.id);
                return Ok(());
            }
            self.shared.enter_destroyed(&mut state)
        };

        self.shared.complete(teardown);
        log::info!("Session {:?}: destroyed", self.shared.id);
        self.shared.emit(SessionEvent::Destroyed {
            reason: DestroyReason::HostRequest,
        });
        Ok(())
    }
}
