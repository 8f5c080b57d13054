use thiserror::Error;

#[derive(Error, Debug)]
pub enum CourtsideError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}
