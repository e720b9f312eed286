/// Result alias that carries the custom [`OverlayError`] type.
pub type Result<T> = std::result::Result<T, OverlayError>;

/// Common error type for the core crate.
///
/// Per-frame and per-tick paths never produce these; they only surface at
/// construction boundaries (starting capture, loading configuration, parsing
/// user supplied names).
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// The external audio capture facility is absent. The engine keeps
    /// rendering an idle visual when this is returned.
    #[error("audio capture unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("unknown visualization mode `{0}`")]
    UnknownMode(String),
    #[error(transparent)]
    Fft(#[from] realfft::FftError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl OverlayError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for OverlayError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for OverlayError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
