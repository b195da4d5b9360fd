//! Error taxonomy for the RPC client.
//!
//! Every layer returns [`RpcError`]. Faults travel as data
//! ([`crate::value::Fault`]) up to the object and auth services, which turn
//! them into [`RpcError::ProtocolFault`] or [`RpcError::AuthenticationFailed`].

use thiserror::Error;

use crate::value::Fault;

/// Errors surfaced by the client.
///
/// Nothing in this crate retries on any of these; they always propagate to
/// the caller of the operation that hit them.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Network or connection failure.
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Server answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The remote side returned a structured fault.
    #[error("Server fault {code}: {message}")]
    ProtocolFault {
        /// Numeric fault code (0 when the server sent a string code)
        code: i64,
        /// Human-readable fault text
        message: String,
    },

    /// An entry point name outside the fixed set.
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// Login faulted or returned a falsy user id.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Fault code, 0 when the server simply returned a falsy uid
        code: i64,
        /// Reason
        message: String,
    },

    /// Decoded response did not match any recognized list shape.
    #[error("Unexpected response shape: {0}")]
    ShapeNormalization(String),

    /// A value has no XML-RPC representation.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Response body was not a well-formed XML-RPC envelope.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Client configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        RpcError::Transport(err)
    }
}

impl From<Fault> for RpcError {
    fn from(fault: Fault) -> Self {
        RpcError::ProtocolFault {
            code: fault.code,
            message: fault.message,
        }
    }
}

impl From<quick_xml::Error> for RpcError {
    fn from(err: quick_xml::Error) -> Self {
        RpcError::Decode(err.to_string())
    }
}

impl RpcError {
    /// Fault code and message when this error came from the server.
    pub fn fault(&self) -> Option<(i64, &str)> {
        match self {
            RpcError::ProtocolFault { code, message }
            | RpcError::AuthenticationFailed { code, message } => Some((*code, message)),
            _ => None,
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, RpcError>;
