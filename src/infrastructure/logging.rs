use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Installs the fmt subscriber. `RUST_LOG` picks the filter, `info` otherwise.
/// Logs go to stderr; stdout is reserved for the report.
pub fn init() -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("setting default subscriber failed: {e}"))
}
