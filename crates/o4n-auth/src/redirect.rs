//! Redirect destination validation.
//!
//! The same untrusted value ends up both as a URL and as text inside
//! generated script, so there are two passes:
//!
//! - [`RedirectPolicy::validate`] / [`validate`] checks the *shape* of a
//!   destination before it becomes a `Location` header;
//! - [`strip_script_breaking`] removes characters that could terminate a
//!   string literal or a `<script>` element.

use url::{Origin, Url};

/// Shape validation for post-login destinations.
///
/// Accepted: absolute paths (`/docs/foo`) and `http(s)` URLs whose origin is
/// on the allow-list. Everything else becomes the empty string.
#[derive(Debug, Clone, Default)]
pub struct RedirectPolicy {
    allowed_origins: Vec<Origin>,
}

impl RedirectPolicy {
    /// Policy accepting paths only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also accept absolute URLs on the origin of `url`.
    ///
    /// Unparseable URLs are ignored.
    #[must_use]
    pub fn allow_origin_of(mut self, url: &str) -> Self {
        if let Some(origin) = origin_of(url) {
            if !self.allowed_origins.contains(&origin) {
                self.allowed_origins.push(origin);
            }
        }
        self
    }

    /// Validate `candidate`, returning it unchanged or `""`.
    pub fn validate(&self, candidate: &str) -> String {
        if candidate.chars().any(char::is_control) {
            return String::new();
        }

        if candidate.starts_with('/') {
            // `//host` and `/\host` are protocol-relative in browsers.
            if candidate.starts_with("//") || candidate.starts_with("/\\") {
                return String::new();
            }
            return candidate.to_string();
        }

        if candidate.starts_with("http") {
            if let Some(origin) = origin_of(candidate) {
                if self.allowed_origins.contains(&origin) {
                    return candidate.to_string();
                }
            }
        }

        String::new()
    }
}

/// Validate with an empty allow-list: only absolute paths pass.
pub fn validate(candidate: &str) -> String {
    RedirectPolicy::new().validate(candidate)
}

/// Remove characters that can break out of an inline script string.
pub fn strip_script_breaking(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '`' | '<' | '>' | '\\' | '\r' | '\n'))
        .collect()
}

/// Origin of an `http(s)` URL, if it parses.
pub(crate) fn origin_of(url: &str) -> Option<Origin> {
    let parsed = Url::parse(url).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.origin())
}
