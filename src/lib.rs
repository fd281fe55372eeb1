pub mod config;
pub mod engine;
pub mod ffi;
pub mod logging;
pub mod render;

pub use config::{LogLevel, SessionConfig};
pub use engine::*;
