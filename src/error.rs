use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum Error {
    /// Rejected input: empty edge set, out-of-bounds endpoint index, ...
    InvalidInput(String),
    IO(std::io::Error),
    /// On-disk layout inconsistent with the declared format
    Format(String),
    /// A broken build-time invariant; indicates a bug, not bad user input
    Invariant(&'static str),
}
pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidInput(description) => write!(f, "invalid input: {description}"),
            Error::IO(io) => io.fmt(f),
            Error::Format(description) => write!(f, "format error: {description}"),
            Error::Invariant(description) => write!(f, "broken invariant: {description}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::IO(value)
    }
}
