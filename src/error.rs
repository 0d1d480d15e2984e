use thiserror::Error;

use crate::dns::tsig::TsigKeyError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("inventory API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TSIG key error: {0}")]
    Tsig(#[from] TsigKeyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
