use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Structured logs go to stderr so stdout only carries the run summary.
pub fn init_tracing() {
    let filter = EnvFilter::from_default_env().add_directive(
        "statistics_backfill=info"
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
