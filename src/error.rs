use crate::signer::SignerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Push too large: {len} bytes")]
    PushTooLarge { len: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hex error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("{backend} doesn't support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
