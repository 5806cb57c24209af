use thiserror::Error;

/// Local validation failures; checked before any external call and shown
/// inline, they never reach the extractor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Please enter a valid URL")]
    EmptyUrl,
    #[error("Please select a download location")]
    NoDestination,
    #[error("Please select a quality option")]
    NoQuality,
}

/// Failures at the boundary of an extractor invocation (probe or transfer).
/// Converted to a single display string at the worker boundary, never
/// propagated further or retried automatically.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("yt-dlp binary not found (bundle it under assets/ or install it on PATH)")]
    MissingBinary,
    #[error("extractor process error: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("yt-dlp exited with an error: {0}")]
    Failed(String),
    #[error("metadata query timed out")]
    Timeout,
    #[error("could not parse extractor output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("download cancelled")]
    Cancelled,
}
