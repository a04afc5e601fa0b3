use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` still wins; without it the service
/// logs at info and sqlx query noise stays at warn.
pub fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("importer_service=info".parse().unwrap_or_else(|_| "info".parse().unwrap()))
        .add_directive("sqlx=warn".parse().unwrap_or_else(|_| "warn".parse().unwrap()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
