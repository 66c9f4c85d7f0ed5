use std::fs::OpenOptions;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub fn init_tracing() {
    init_tracing_with_filter("info");
}

/// Install the global subscriber: stderr output filtered by `NOMAD_LOG`
/// (falling back to `default_filter`), plus a DEBUG file layer when
/// `NOMAD_LOG_FILE` names a writable path.
pub fn init_tracing_with_filter(default_filter: &str) {
    let file_logging = std::env::var("NOMAD_LOG_FILE").ok();

    let filter =
        EnvFilter::try_from_env("NOMAD_LOG").unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    let file = file_logging.as_ref().and_then(|log_path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(|e| eprintln!("Could not open log file {}: {}", log_path, e))
            .ok()
    });

    if let Some(file) = file {
        let file_layer = fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG);

        // A subscriber may already be installed (tests, embedding apps)
        let _ = registry.with(file_layer).try_init();
    } else {
        let _ = registry.try_init();
    }
}
