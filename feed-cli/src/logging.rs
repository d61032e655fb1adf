use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs go to stderr so command output on stdout stays clean.
pub fn init_logging() {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,feed_client=info,feed_cli=info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    tracing::debug!("Logging initialized");
}
