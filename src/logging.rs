//! Log output setup for the binaries.

use std::fs::OpenOptions;

use env_logger::{Builder, Env, Target};

use crate::config::LoggingConfig;
use crate::types::SproxyError;

/// Initialize logging for the console tools. `RUST_LOG` wins; otherwise
/// `info`. Timestamps and module targets are suppressed so diagnostics stay
/// terse.
pub fn init_console() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Initialize daemon logging from the configuration. `RUST_LOG` still takes
/// precedence over the configured level.
pub fn init_daemon(config: &LoggingConfig) -> Result<(), SproxyError> {
    let mut builder =
        Builder::from_env(Env::default().default_filter_or(config.loglevel.as_filter()));
    builder.format_timestamp_millis();

    if let Some(path) = &config.logfile {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}
