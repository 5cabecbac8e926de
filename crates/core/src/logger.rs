//! Process-wide `tracing` subscriber setup.

use std::str::FromStr;

use tracing::{Level, warn};
use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "full" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("invalid log format: {other}")),
        }
    }
}

/// Parses a level name, falling back to `info`.
pub fn parse_level(level: &str) -> (Level, bool) {
    match Level::from_str(level) {
        Ok(level) => (level, true),
        Err(_) => (Level::INFO, false),
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_logger(level: &str, format: LogFormat) -> Result<(), TryInitError> {
    let (parsed, valid) = parse_level(level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(parsed.to_string()));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer()).try_init()?,
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
    }

    if !valid {
        warn!(level, "invalid log level, defaulting to info");
    }
    Ok(())
}
