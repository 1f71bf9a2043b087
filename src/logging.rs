//! Tracing subscriber setup.
//!
//! The subscriber is installed before config is read so config loading can
//! log too; the configured level is applied afterwards unless `RUST_LOG` is
//! set.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

const DEFAULT_LEVEL: &str = "info";

pub struct LogLevel {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

/// Install a compact stderr subscriber.
pub fn init() -> LogLevel {
    let (filter, from_env) = initial_filter(std::env::var("RUST_LOG").ok());
    let (filter, handle) = reload::Layer::new(filter);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();
    LogLevel { handle, from_env }
}

fn initial_filter(env: Option<String>) -> (EnvFilter, bool) {
    match env.filter(|v| !v.trim().is_empty()) {
        Some(directives) => (EnvFilter::new(directives), true),
        None => (EnvFilter::new(DEFAULT_LEVEL), false),
    }
}

impl LogLevel {
    /// Switch to the configured level. `RUST_LOG` wins when present.
    pub fn apply(&self, level: &str) {
        if self.from_env {
            return;
        }
        if let Err(e) = self.handle.modify(|filter| *filter = EnvFilter::new(level)) {
            tracing::warn!(error = %e, level, "failed to apply log level");
        }
    }
}
