use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers. Transient network failures never appear
/// here; the transport absorbs them and the role engine reads the silence.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] raft_codec::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
