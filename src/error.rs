use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdrelayError {
    #[error("Core error: {0}")]
    Core(#[from] idrelay_core::Error),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type IdrelayResult<T> = Result<T, IdrelayError>;
