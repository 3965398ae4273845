//! Unified error type.
//!
//! Services return `Result<Response, Error>`. Anything that goes wrong inside
//! a request chain is an `Error`; an enclosing
//! [`ExceptionLayer`](crate::middleware::ExceptionLayer) turns it into a JSON
//! envelope, otherwise the [`View`](crate::View) answers a bare 500.
//!
//! Application code raises [`Failure`]s. A failure may carry an explicit
//! status, code and details; every other variant is an internal error and
//! renders as 500.

use std::fmt;

use http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// The error type returned by plait's fallible operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An application failure raised by a service or collaborator.
    #[error(transparent)]
    Failure(#[from] Failure),

    /// The context has no established data facet.
    #[error("no request context has been established")]
    NoContext,

    #[error("context key `{0}` is not set")]
    MissingKey(String),

    #[error("context key `{key}` does not hold a `{expected}`")]
    WrongType { key: String, expected: &'static str },

    #[error("no request is attached to the context")]
    MissingRequest,

    /// A filterer that needs a prior collection received none.
    #[error("filter pipeline produced no collection")]
    EmptyPipeline,

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The request body could not be read.
    #[error("body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid socket address `{0}`")]
    InvalidAddr(String),

    /// A failure reported by an external collaborator (store, authenticator).
    #[error("collaborator: {0}")]
    Collaborator(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps any collaborator error.
    pub fn collaborator(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Collaborator(Box::new(e))
    }

    /// The explicit status, if this is a [`Failure`] that carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Failure(f) => f.status,
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&Code> {
        match self {
            Self::Failure(f) => f.code.as_ref(),
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Failure(f) => f.details.as_ref(),
            _ => None,
        }
    }
}

// ── Failure ───────────────────────────────────────────────────────────────────

/// An application failure with optional HTTP metadata.
///
/// ```rust
/// use http::StatusCode;
/// use plait::{Error, Failure};
///
/// let err: Error = Failure::new("title already taken")
///     .status(StatusCode::CONFLICT)
///     .code("duplicate_title")
///     .into();
/// assert_eq!(err.status(), Some(StatusCode::CONFLICT));
/// ```
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct Failure {
    message: String,
    status: Option<StatusCode>,
    code: Option<Code>,
    details: Option<Map<String, Value>>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: None, code: None, details: None }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the status from a raw number. Anything outside `100..=999`
    /// becomes `500 Internal Server Error`.
    pub fn with_status_u16(self, status: u16) -> Self {
        self.status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
    }

    pub fn code(mut self, code: impl Into<Code>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// ── Code ──────────────────────────────────────────────────────────────────────

/// The `code` field of an error envelope: a number or a symbolic string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Code {
    Number(i64),
    Text(String),
}

impl From<StatusCode> for Code {
    fn from(s: StatusCode) -> Self {
        Self::Number(i64::from(s.as_u16()))
    }
}

impl From<i64> for Code {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Code {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Code {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_metadata_is_exposed_through_error() {
        let err: Error = Failure::new("nope")
            .status(StatusCode::BAD_REQUEST)
            .code("bad")
            .into();
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.code(), Some(&Code::Text("bad".into())));
        assert!(err.details().is_none());
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn invalid_numeric_status_falls_back_to_500() {
        let err: Error = Failure::new("x").with_status_u16(42).into();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn internal_variants_carry_no_metadata() {
        let err = Error::MissingKey("pk".into());
        assert!(err.status().is_none());
        assert!(err.code().is_none());
    }

    #[test]
    fn code_serializes_untagged() {
        assert_eq!(serde_json::to_value(Code::from(404_i64)).unwrap(), serde_json::json!(404));
        assert_eq!(serde_json::to_value(Code::from("x")).unwrap(), serde_json::json!("x"));
    }
}
