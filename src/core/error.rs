use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to fetch page: {0}")]
    FetchFailed(#[from] FetchError),

    #[error("failed to parse page: {0}")]
    ParseFailed(String),
}

#[derive(Debug, Error)]
pub enum EmbedDecodeError {
    #[error("unsupported media type: {0:?}")]
    UnsupportedMediaType(String),

    #[error("unsupported oEmbed content type: {0:?}")]
    UnsupportedContentType(String),

    #[error("missing required oEmbed field `{0}`")]
    MissingRequiredField(&'static str),

    #[error("malformed oEmbed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] EmbedDecodeError),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
