/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Target URL could not be parsed or resolved against the base URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Request body could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),
}

impl QueueError {
    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
