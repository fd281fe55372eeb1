#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is already initialized")]
    AlreadyInitialized,

    #[error("Session is not initialized (called {operation} before init)")]
    NotInitialized { operation: &'static str },

    #[error("Invalid surface geometry {width}x{height}")]
    InvalidGeometry { width: i32, height: i32 },

    #[error("Surface handle is null")]
    NullSurface,

    #[error("Host context is null")]
    NullHostContext,

    #[error("Engine resource allocation failed: {0}")]
    ResourceAllocation(String),

    #[error("Render thread failed: {0}")]
    RenderFailed(String),

    #[error("Could not spawn render thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("Invalid session config: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

impl SessionError {
    /// Fatal errors force the session into `Destroyed`. Everything else leaves state untouched.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::ResourceAllocation(_) | SessionError::RenderFailed(_) | SessionError::ThreadSpawn(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let e = SessionError::InvalidGeometry { width: 0, height: -4 };
        assert_eq!(e.to_string(), "Invalid surface geometry 0x-4");

        let e = SessionError::NotInitialized { operation: "resume" };
        assert!(e.to_string().contains("resume"));
    }

    #[test]
    fn only_engine_failures_are_fatal() {
        assert!(SessionError::ResourceAllocation("oom".into()).is_fatal());
        assert!(SessionError::RenderFailed("device lost".into()).is_fatal());
        assert!(!SessionError::AlreadyInitialized.is_fatal());
        assert!(!SessionError::NullSurface.is_fatal());
        assert!(!SessionError::InvalidGeometry { width: 0, height: 0 }.is_fatal());
    }
}
