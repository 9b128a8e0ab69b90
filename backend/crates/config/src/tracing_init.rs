use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `LOG_LEVEL`; without either the `default_level` is used
/// with sqlx statement logging turned down to `warn`. Calling this twice is a
/// no-op, which keeps tests that boot the service from panicking.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},sqlx=warn")));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
