//! Tracing support.

use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Initialise tracing with default settings.
///
/// Events are written to stderr in a compact format. The filter is read from `var_name`,
/// e.g. `LIVELINE_LOG=liveline_bridge=debug`, and defaults to `INFO`.
pub fn init_default<S>(var_name: S)
where
    S: Into<String>,
{
    let var_name = var_name.into();
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .with_env_var(var_name)
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();
}
