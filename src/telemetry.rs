use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

/// Initialize the tracing subscriber for a process.
///
/// Log level is controlled through `RUST_LOG`; defaults to `info` for this
/// crate when unset. Output goes to stderr so piped stdout stays clean.
pub fn init_tracing_subscriber() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quarry=info,warn"));

    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .init();
}
