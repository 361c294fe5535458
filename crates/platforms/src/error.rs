use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid stream key: {0}")]
    InvalidKey(String),
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    #[error("unexpected api response: {0}")]
    UnexpectedResponse(String),
}
