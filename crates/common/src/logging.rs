//! Logging and tracing initialization.

use std::fs::OpenOptions;
use std::sync::Mutex;

use crate::config::LoggingConfig;
use crate::error::WallResult;

/// Initialize the tracing subscriber with the given configuration.
///
/// `RUST_LOG` takes precedence over `config.level`. When `config.file` is set
/// logs are appended there instead of stderr. Installing a second global
/// subscriber is silently ignored so tests can call this repeatedly.
pub fn init_logging(config: &LoggingConfig) -> WallResult<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false);

    match (&config.file, config.json) {
        (Some(path), json) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            if json {
                tracing::subscriber::set_global_default(builder.json().finish()).ok();
            } else {
                tracing::subscriber::set_global_default(builder.finish()).ok();
            }
        }
        (None, true) => {
            tracing::subscriber::set_global_default(builder.json().finish()).ok();
        }
        (None, false) => {
            tracing::subscriber::set_global_default(builder.finish()).ok();
        }
    }
    Ok(())
}

/// Initialize logging with defaults (useful for tests and quick scripts).
pub fn init_default_logging() {
    // Default config has no file sink, so this cannot fail.
    let _ = init_logging(&LoggingConfig::default());
}
