use std::io::IsTerminal as _;

use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset or empty. HTTP client internals stay quiet during cover fetches.
const DEFAULT_DIRECTIVES: &str = "info,reqwest=warn,hyper_util=warn,rustls=warn";

/// Installs the global subscriber: `RUST_LOG`-style filtering, output on stderr so
/// stdout stays clean for `split` and `detect`.
pub fn init() -> anyhow::Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = env_filter(directives.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn env_filter(directives: Option<&str>) -> anyhow::Result<EnvFilter> {
    match directives.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("parse log filter {directives:?}")),
        None => EnvFilter::try_new(DEFAULT_DIRECTIVES).context("build default log filter"),
    }
}
