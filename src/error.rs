//! Error types for groove-vae-rs.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candle tensor/model error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Invalid model hyperparameters.
    #[error("config: {0}")]
    Config(String),

    /// Offset activation literal other than `sigmoid` or `tanh`.
    #[error("{0} for offsets is not supported")]
    UnsupportedActivation(String),

    /// Sampling mode index other than 0 (top-k) or 1 (bernoulli).
    #[error("unsupported sampling mode {0} (expected 0 = top-k, 1 = bernoulli)")]
    UnsupportedSamplingMode(i64),

    /// Bad argument for a single forward/decode/sample call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Model weight loading error.
    #[error("weight loading: {0}")]
    WeightLoad(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
