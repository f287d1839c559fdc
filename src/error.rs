//! Unified error type.

use thiserror::Error;

/// Boxed error returned by external collaborators (session store, credential
/// store, permission resolver). The core never inspects it beyond `Display`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by paydesk's fallible operations.
///
/// Expected request failures (404, 403, login redirects) are expressed as
/// [`Outcome::Terminal`](crate::middleware::Outcome) responses, not as
/// `Error`s. An `Error` that reaches the [`Dispatcher`](crate::Dispatcher)
/// is a system failure: it is logged at critical severity and rendered as a
/// generic 500.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid route `{pattern}`: {reason}")]
    InvalidRoute { pattern: String, reason: String },

    #[error("unknown middleware `{0}`")]
    UnknownMiddleware(String),

    #[error("middleware `{name}`: {reason}")]
    MiddlewareArgument { name: String, reason: String },

    #[error("invalid permission key `{0}`, expected `resource:action`")]
    InvalidPermissionKey(String),

    #[error("session store: {0}")]
    Session(#[source] BoxError),

    #[error("credential store: {0}")]
    Credentials(#[source] BoxError),

    #[error("permission resolver failed for `{key}`: {source}")]
    Permission {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("config: {0}")]
    Config(String),

    /// A handler found state that its middleware should have ruled out.
    #[error("invariant violated: {0}")]
    Invariant(&'static str),
}
