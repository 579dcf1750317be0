//! Tracing subscriber setup for hosts and the probe binary.

use tracing_subscriber::EnvFilter;

use crate::error::KartridgeError;

/// Directive used when neither `RUST_LOG` nor an explicit filter is set.
pub const DEFAULT_FILTER: &str = "kartridge_core=info";

/// Install a global fmt subscriber.
///
/// `filter` overrides `RUST_LOG`; `json` switches to JSON lines. Nothing
/// changes if the filter doesn't parse or a subscriber is already installed
/// (the host may have its own).
pub fn init_logging(filter: Option<&str>, json: bool) -> Result<(), KartridgeError> {
    let filter = match filter {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|source| KartridgeError::LogFilter {
                filter: directives.to_string(),
                source,
            })?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    let result = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    result.map_err(|_| KartridgeError::LoggingInstalled)
}
