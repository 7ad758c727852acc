/// Initializes the process-wide `tracing` subscriber. Called once from
/// `main` before anything else logs.
pub fn init() {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
