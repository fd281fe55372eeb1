use crate::engine::SessionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_RENDER_THREAD_NAME: &str = "aurea-render";

/// Log verbosity for the bridge's own diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Session configuration. Every field has a default, so a host may pass a partial document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Frames per second the render thread aims for
    pub target_fps: u32,
    /// Capacity of the telemetry broadcast channel
    pub event_capacity: usize,
    /// Name given to the render thread
    pub render_thread_name: String,
    /// Verbosity used when the bridge installs its logger
    pub log_level: LogLevel,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            event_capacity: crate::engine::DEFAULT_CHANNEL_CAPACITY,
            render_thread_name: DEFAULT_RENDER_THREAD_NAME.to_string(),
            log_level: LogLevel::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Time budget of a single frame. A `target_fps` of zero is treated as one.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}
