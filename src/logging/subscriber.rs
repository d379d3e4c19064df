use anyhow::{bail, Context, Result};
use tracing::Subscriber;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::LoggingConfig;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides `config.level` when set. Audit events use the
/// `audit` target, so `RUST_LOG=info,audit=off` silences them separately.
/// Fails if the level or format is invalid, or a global subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(&config.level)?;
    let layer = format_layer(&config.format)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .context("global tracing subscriber already installed")?;

    Ok(())
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level directive: {}", level)),
    }
}

pub(crate) fn format_layer<S>(format: &str) -> Result<BoxedLayer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = match format {
        "json" => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        "pretty" => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
        other => bail!("Unsupported log format: {}. Use 'json' or 'pretty'", other),
    };

    Ok(layer)
}
