use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::EnvFilter;

/// Parses the configured log level, falling back to `info`.
pub(crate) fn default_log_directive(level: &str) -> Directive {
    let level = level.trim();
    if level.is_empty() {
        return LevelFilter::INFO.into();
    }
    level
        .parse::<Directive>()
        .unwrap_or_else(|_| LevelFilter::INFO.into())
}

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
pub(crate) fn init_tracing(level: &str) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_log_directive(level))
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
