use crate::config::LogLevel;

/// Installs `env_logger` as the global logger.
///
/// `RUST_LOG` wins when set; otherwise `level` is used. Safe to call more than once, later
/// calls (and calls after another logger was installed) are ignored.
pub fn init_logging(level: LogLevel) {
    let filter: log::LevelFilter = level.into();
    let env = env_logger::Env::default().default_filter_or(filter.as_str().to_lowercase());

    if env_logger::Builder::from_env(env).format_timestamp_millis().try_init().is_err() {
        log::debug!("Logger already installed, keeping it");
    }
}
