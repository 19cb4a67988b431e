use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber honoring `RUST_LOG`, defaulting to `info`.
/// Host applications that bring their own subscriber simply skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();
}
