use eyre::Result;
use tracing::Level;
use tracing_error::ErrorLayer;
use tracing_subscriber::filter::FromEnvError;
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{filter::Directive, EnvFilter};

/// Installs the global subscriber for binaries embedding the orchestrator. `RUST_LOG` overrides
/// the default `info` level.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing_subscriber() -> Result<()> {
    tracing_subscriber::registry()
        .with({
            let layer = Layer::default();
            let filter = env_filter()?;
            layer.with_filter(filter)
        })
        .with({
            let layer = ErrorLayer::default();
            let filter = env_filter()?;
            layer.with_filter(filter)
        })
        .try_init()?;

    Ok(())
}

/// For tests. Output is captured by the test harness, and only the first call installs anything.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(Layer::default().with_test_writer())
        .with(ErrorLayer::default())
        .with(EnvFilter::new("node_drain_orchestrator=trace"))
        .try_init();
}

fn env_filter() -> Result<EnvFilter, FromEnvError> {
    EnvFilter::builder()
        .with_default_directive(Directive::from(Level::INFO))
        .from_env()
}
