use clap::ValueEnum;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError,
};

const DEFAULT_FILTER: &str = "info";

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Minimal single-line output.
    #[default]
    Compact,
    /// Multi-line output with fields and source locations, for development.
    Pretty,
    /// One JSON object per event, for log processors.
    Json,
}

pub fn build_logger(format: LogFormat, filter: EnvFilter) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => fmt::Layer::<Registry>::default()
            .json()
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => fmt::Layer::<Registry>::default()
            .pretty()
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::Layer::<Registry>::default()
            .compact()
            .with_filter(filter)
            .boxed(),
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the default `info`
/// filter.
pub fn init(format: LogFormat) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(build_logger(format, filter))
        .try_init()
}
