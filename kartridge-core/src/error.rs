//! Error types for the Rust API and status codes for the C ABI surface.

use std::path::PathBuf;

/// Failures of the bridge itself.
///
/// Vendor calls never produce these: the vendor reports failure only through
/// `false` returns, which the session passes on unchanged.
#[derive(Debug, thiserror::Error)]
pub enum KartridgeError {
    #[error("failed to load vendor library {path}: {source}")]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("vendor library is missing symbol {symbol}: {source}")]
    MissingSymbol {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
    #[error("vendor constant {0} is a null pointer")]
    NullConstant(&'static str),
    #[error("string contains an interior NUL byte")]
    InteriorNul(#[from] std::ffi::NulError),
    #[error("can't read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad config file {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("settings are not representable as JSON: {0}")]
    Settings(#[from] serde_json::Error),
    #[error("invalid log filter {filter:?}: {source}")]
    LogFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("a global tracing subscriber is already installed")]
    LoggingInstalled,
}

/// Error codes for the C ABI.
///
/// Every `kartridge_*` function that returns `i32` uses these values.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiResult {
    /// Success.
    Ok = 0,
    /// The handle does not exist in the global handle table.
    InvalidHandle = 1,
    /// A required argument was null or not valid UTF-8.
    InvalidArgument = 2,
    /// An internal error occurred (logged via tracing).
    Internal = 3,
    /// Called from inside an event callback on the same handle.
    Busy = 4,
}
