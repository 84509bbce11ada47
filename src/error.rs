//! Crate-wide error type

use thiserror::Error;

/// Errors surfaced by configuration, data loading, checkpointing and sampling.
///
/// The hot math path (forward/backward/update) does not return errors;
/// dimension mismatches there are caller contract violations and panic.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("tag store error: {0}")]
    TagStore(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("sampling error: {0}")]
    Sampling(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("y_dim must be even in split mode".to_string());
        assert!(err.to_string().contains("config error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
