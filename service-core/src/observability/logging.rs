use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the JSON tracing subscriber for a service binary.
///
/// `default_directives` is used when `RUST_LOG` is not set, e.g.
/// `"info,billing_service=debug"`.
pub fn init_tracing(default_directives: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true),
        )
        .init();
}
