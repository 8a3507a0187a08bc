//! Error types.

use serde_json::{Value, json};
use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
///
/// Every variant is terminal for the request it occurred in. [`Error::status`]
/// gives the HTTP status the gateway should answer with.
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration is missing or unusable. Operator-fixable.
    #[error("{0}")]
    Configuration(String),

    /// The request was malformed (wrong method, empty body, bad token field).
    #[error("Bad data received.")]
    BadRequest,

    /// The identity token failed verification.
    #[error("{kind}: {detail}")]
    Unauthorized {
        /// Short failure class, e.g. `TokenExpiredError`.
        kind: &'static str,
        /// Underlying failure detail.
        detail: String,
    },

    /// A fallback request URL could not be reconstructed.
    #[error("Invalid protocol {0}")]
    Protocol(String),

    /// Unable to fetch, parse, or use a JWKS.
    #[error("JWKS error: {0}")]
    Jwks(String),

    /// The JWKS does not contain a usable key for the token.
    #[error("no suitable key found in JWKS")]
    NoMatchingKey,

    /// An error occurred while performing HTTP requests.
    #[cfg(feature = "fetch-reqwest")]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// jsonwebtoken error.
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn unauthorized(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::Unauthorized {
            kind,
            detail: detail.into(),
        }
    }

    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized { .. } | Self::NoMatchingKey | Self::Jwks(_) | Self::Jwt(_) => 401,
            #[cfg(feature = "fetch-reqwest")]
            Self::Reqwest(_) => 401,
            Self::Configuration(_) | Self::Protocol(_) | Self::Json(_) => 500,
        }
    }

    /// JSON error body.
    ///
    /// Verification failures pass their error object through; everything else
    /// is reported as `{"message": ...}`.
    pub fn body(&self) -> Value {
        match self {
            Self::Unauthorized { kind, detail } => json!({ "name": kind, "message": detail }),
            other => json!({ "message": other.to_string() }),
        }
    }
}
