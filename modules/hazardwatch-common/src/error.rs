use thiserror::Error;

#[derive(Error, Debug)]
pub enum HazardError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient storage error: {0}")]
    TransientStorage(String),

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("subscriber gone")]
    SubscriberGone,

    #[error(transparent)]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HazardError>;
