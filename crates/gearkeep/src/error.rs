use thiserror::Error;

#[derive(Error, Debug)]
pub enum GearError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt payload in {0}")]
    Corrupt(&'static str),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<fjall::Error> for GearError {
    fn from(err: fjall::Error) -> Self {
        GearError::Store(err.to_string())
    }
}

impl From<confique::Error> for GearError {
    fn from(err: confique::Error) -> Self {
        GearError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GearError>;
