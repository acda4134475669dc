use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaftLiteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[source] bincode::Error),

    #[error("Decode error: {0}")]
    Decode(#[source] bincode::Error),

    #[error("Frame of {0} bytes exceeds the maximum frame length")]
    FrameTooLarge(usize),

    #[error("Empty frame received")]
    EmptyFrame,

    #[error("Unexpected response for {method}")]
    UnexpectedResponse { method: &'static str },

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, RaftLiteError>;
