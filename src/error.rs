use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or truncated IDX archive.
    #[error("decode error: {0}")]
    Decode(String),
    /// Paired sequences of unequal length, or an incompatible tensor geometry.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// The model rejected a compile/fit/predict call.
    #[error("training failure: {0}")]
    Training(String),
    /// Pixel buffer inconsistent with the requested sample size.
    #[error("capture error: {0}")]
    Capture(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("a training run is already in flight")]
    RunInFlight,
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
