//! Tracing setup shared by the binaries

/// Install the fmt subscriber. `RUST_LOG` wins over `default_filter`.
/// Calling it twice is harmless; the second install is ignored.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(false)
        .try_init();
}
