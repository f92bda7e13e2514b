#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The completion endpoint answered with a non-success status.
    #[error("LLM API error HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The completion body did not have the expected shape.
    #[error("malformed completion response: {message}")]
    Malformed { message: String },

    #[error(transparent)]
    Tools(#[from] quartermaster_mcp::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn malformed(message: impl std::fmt::Display) -> Self {
        Self::Malformed {
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
