use core::fmt;

#[derive(Debug)]
pub enum Error {
    /// Not enough buffered bytes for a complete frame yet.
    Incomplete,

    InvalidLength(usize),

    UnknownMessageType(String),

    Malformed(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Incomplete => "Incomplete frame".fmt(fmt),
            Error::InvalidLength(len) => write!(fmt, "Invalid frame length {}", len),
            Error::UnknownMessageType(kind) => write!(fmt, "Unknown message type {:?}", kind),
            Error::Malformed(err) => err.fmt(fmt),
        }
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Malformed(err.to_string())
    }
}
