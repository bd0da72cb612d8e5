use std::path::PathBuf;
use thiserror::Error;

/// Failures while pulling a still frame from the camera. None of these are
/// fatal, the scanner reports them and retries after the configured delay.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Connection refused, timeout, malformed response and friends.
    #[error("request to camera failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The camera answered, but not with a success status.
    #[error("camera responded with status {0}")]
    Status(reqwest::StatusCode),
    #[error("camera responded with an empty body")]
    EmptyBody,
    /// The body could not be decoded as an image.
    #[error("response body of {len} bytes is not a decodable image")]
    Decode { len: usize },
    #[error("failed to prepare frame: {0}")]
    Vision(#[from] opencv::Error),
}

/// Errors raised while building or running the scanner.
#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("could not locate the config file {0:?}")]
    MissingConfig(PathBuf),
    #[error("failed to read config: {0}")]
    Config(#[from] config::ConfigError),
    /// A config value that would make every frame fail.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("failed to build camera http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("vision operation failed: {0}")]
    Vision(#[from] opencv::Error),
}
