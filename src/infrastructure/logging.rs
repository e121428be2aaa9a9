//! Logger initialization using tracing.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber.
///
/// Default level is `info`, which carries the per-attempt outcome lines;
/// `verbose` lowers the default to `debug` for per-request logging. An
/// explicit `RUST_LOG` always wins over both.
pub fn init(verbose: bool) -> Result<()> {
    let default_level = if verbose { Level::DEBUG } else { Level::INFO };

    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!("failed to initialize logger: {err}"))
}
