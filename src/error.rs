//! Crate-wide error taxonomy.
//!
//! Every fallible operation in `parchment` resolves to [`Error`]. The
//! variants line up with the wire-level taxonomy in the external protocol:
//! each has both a binary `ERROR` rendering (a free-text message) and a
//! text-dialogue status line (`ERR_4xx`/`ERR_5xx`).

use std::io;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the Directory, Node, and Client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed frame, missing argument, or otherwise unparsable request.
    #[error("Bad payload: {0}")]
    BadRequest(String),

    /// The caller's identity does not hold the permission the operation needs.
    #[error("Access Denied: {0}")]
    Unauthorized(String),

    /// The file, checkpoint, or access request named does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The operation conflicts with in-progress state (a held lock, a
    /// duplicate tag, a duplicate pending request).
    #[error("{0}")]
    Conflict(String),

    /// An unexpected internal failure (I/O, allocation, a Node gone dark).
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Transport-level I/O failure; always surfaces as [`Error::Internal`]
    /// at the protocol boundary.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Error::Conflict(what.into())
    }

    pub fn unauthorized(what: impl Into<String>) -> Self {
        Error::Unauthorized(what.into())
    }

    pub fn bad_request(what: impl Into<String>) -> Self {
        Error::BadRequest(what.into())
    }

    pub fn internal(what: impl Into<String>) -> Self {
        Error::Internal(what.into())
    }

    /// The `ERR_4xx`/`ERR_5xx` token used on the Client↔Node text dialogue.
    pub fn text_code(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "ERR_400",
            Error::Unauthorized(_) => "ERR_403",
            Error::NotFound(_) => "ERR_404",
            Error::Conflict(_) => "ERR_409",
            Error::Internal(_) | Error::Io(_) => "ERR_500",
        }
    }

    /// The single status line sent over the text dialogue: `ERR_4xx message`.
    pub fn text_line(&self) -> String {
        format!("{} {}", self.text_code(), self)
    }
}
