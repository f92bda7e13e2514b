use std::{error::Error as StdError, time::Duration};

use quartermaster_common::FromMessage;

/// Why a single request to the tool server did not produce a usable result.
#[derive(Debug, thiserror::Error)]
pub enum InvocationFailure {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("transport closed before a response arrived")]
    Closed,
    #[error("write to tool server failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("server returned error code={code} message={message}")]
    Rpc { code: i64, message: String },
    #[error("response carried no result")]
    MissingResult,
    #[error("malformed result: {0}")]
    Malformed(#[source] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The child could not be spawned or the handshake did not complete.
    #[error("tool server startup failed: {message}")]
    BridgeStartup {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// The session has not been initialized, or was closed.
    #[error("tool session is not initialized")]
    NotInitialized,

    /// Transport-level failure during a single request.
    #[error("tool server request '{method}' failed: {failure}")]
    ToolInvocation {
        method: String,
        #[source]
        failure: InvocationFailure,
    },

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn startup(message: impl Into<String>) -> Self {
        Self::BridgeStartup {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn startup_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::BridgeStartup {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn invocation(method: impl Into<String>, failure: InvocationFailure) -> Self {
        Self::ToolInvocation {
            method: method.into(),
            failure,
        }
    }

    /// Re-label any error raised while bringing the server up as a startup
    /// failure, keeping the original as the source.
    #[must_use]
    pub fn into_startup(self, context: &str) -> Self {
        match self {
            Self::BridgeStartup { .. } => self,
            other => Self::startup_with(context.to_string(), other),
        }
    }

    #[must_use]
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, Self::NotInitialized)
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

quartermaster_common::impl_context!();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_startup_wraps_other_errors() {
        let err = Error::invocation("initialize", InvocationFailure::Closed)
            .into_startup("handshake failed");
        match err {
            Error::BridgeStartup { message, source } => {
                assert_eq!(message, "handshake failed");
                assert!(source.is_some());
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn into_startup_keeps_startup_errors() {
        let err = Error::startup("spawn failed").into_startup("ignored");
        assert_eq!(err.to_string(), "tool server startup failed: spawn failed");
    }

    #[test]
    fn invocation_display_names_method_and_cause() {
        let err = Error::invocation(
            "tools/call",
            InvocationFailure::Timeout(Duration::from_secs(2)),
        );
        assert_eq!(
            err.to_string(),
            "tool server request 'tools/call' failed: no response within 2s"
        );
    }
}
