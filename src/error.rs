// Error handling module
// Defines the credential lifecycle error taxonomy

use thiserror::Error;

/// Errors raised by the credential store, the authority client and the manager
#[derive(Error, Debug)]
pub enum AuthError {
    /// Working directory or token file could not be accessed
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON or unusable values, either on disk or from the authority
    #[error("Parse error: {context}")]
    Parse {
        context: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Transport-level failure (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-200 response from register or refresh
    #[error("Authority returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// Non-200 response from verify: the credential was rejected
    #[error("Token validation failed (status {status})")]
    Validation { status: u16 },

    /// Market base URI cannot carry the appliance endpoints
    #[error("Invalid market URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },
}

impl AuthError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AuthError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        let context: String = context.into();
        AuthError::Parse {
            context: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Well-formed JSON carrying a value that cannot be used
    pub(crate) fn invalid(context: impl Into<String>) -> Self {
        AuthError::Parse {
            context: context.into(),
            source: None,
        }
    }

    /// True when the authority rejected the token, as opposed to being unreachable
    pub fn is_validation(&self) -> bool {
        matches!(self, AuthError::Validation { .. })
    }
}

/// Result type alias for credential operations
pub type Result<T> = std::result::Result<T, AuthError>;
