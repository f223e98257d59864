use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("buffer ended unexpectedly: needed {needed} more bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, WireError>;
