use std::error::Error as StdError;

/// Failures inside the reply path. The pipeline turns every one of these
/// into the generic apology reply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The decider failed or produced nothing usable.
    #[error("decision failed: {message}")]
    Decision {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Sending the reply through the gateway failed.
    #[error("reply dispatch failed: {0}")]
    Dispatch(#[from] quartermaster_channels::Error),
}

impl Error {
    #[must_use]
    pub fn decision(message: impl std::fmt::Display) -> Self {
        Self::Decision {
            message: message.to_string(),
            source: None,
        }
    }

    #[must_use]
    pub fn decision_with(
        message: impl std::fmt::Display,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Decision {
            message: message.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
