use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, registry::Registry};

/// Install the global subscriber. `RUST_LOG` overrides the default level.
/// Logs go to stderr so the progress banners on stdout stay readable.
pub fn init(verbose: bool) {
    let default = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let subscriber = Registry::default()
        .with(
            EnvFilter::builder()
                .with_default_directive(default.into())
                .from_env_lossy(),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .with_timer(fmt::time::SystemTime)
                .compact(),
        );
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("logging already initialized: {err}");
    }
}
