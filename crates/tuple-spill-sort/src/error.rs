use std::num::TryFromIntError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpillSortError>;

#[derive(Debug, Error)]
pub enum SpillSortError {
    #[error("{0}")]
    Message(String),
    #[error("record comparison failed: {0}")]
    Compare(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    TryFromInt(#[from] TryFromIntError),
}

impl SpillSortError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn compare(message: impl Into<String>) -> Self {
        Self::Compare(message.into())
    }
}
