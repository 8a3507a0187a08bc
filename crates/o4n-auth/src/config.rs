//! Handler configuration.
//!
//! Every option maps to exactly one `O4N_*` environment variable. The record
//! is built once at startup and shared read-only by all requests.

use std::time::Duration;

use url::{Origin, Url};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "O4N_";

/// Default session cookie name understood by the hosting platform.
pub const DEFAULT_SESSION_COOKIE: &str = "nf_jwt";

/// Default timeout for a single JWKS fetch.
pub const DEFAULT_JWKS_TIMEOUT: Duration = Duration::from_secs(10);

/// Flags that weaken security. Meant for local development only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnsafeFlags {
    /// Render manual links and request dumps instead of auto-navigating.
    pub debug: bool,
    /// Accept identity tokens past their `exp`.
    pub ignore_token_expiration: bool,
    /// Drop `Secure` from every cookie.
    pub insecure_cookies: bool,
}

/// Immutable handler options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// HS256 secret for minted session tokens.
    pub jwt_secret: Option<String>,
    /// IdP login URL; its origin is the expected token issuer.
    pub okta_url: Option<String>,
    /// Base URL of the production deployment.
    pub prod_base_url: Option<String>,
    /// Optional title appended to the login pages.
    pub site_title: Option<String>,
    /// Name of the platform session cookie.
    pub session_cookie_name: String,
    /// Preview origins permitted as relay targets. Empty means any origin
    /// whose callback path matches.
    pub preview_origins: Vec<String>,
    /// Timeout for one JWKS fetch attempt.
    pub jwks_timeout: Duration,
    /// Development-only switches.
    pub unsafe_flags: UnsafeFlags,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            okta_url: None,
            prod_base_url: None,
            site_title: None,
            session_cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            preview_origins: Vec::new(),
            jwks_timeout: DEFAULT_JWKS_TIMEOUT,
            unsafe_flags: UnsafeFlags::default(),
        }
    }
}

impl Options {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by full variable name.
    ///
    /// Present variables replace the current value; absent ones keep it.
    /// Boolean flags follow [`parse_bool`].
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("JWT_SECRET") {
            self.jwt_secret = Some(v);
        }
        if let Some(v) = var("OKTA_URL") {
            self.okta_url = Some(v);
        }
        if let Some(v) = var("PROD_BASE_URL") {
            self.prod_base_url = Some(v);
        }
        if let Some(v) = var("SITE_TITLE") {
            self.site_title = Some(v);
        }
        if let Some(v) = var("SESSION_COOKIE_NAME").filter(|v| !v.trim().is_empty()) {
            self.session_cookie_name = v.trim().to_string();
        }
        if let Some(v) = var("PREVIEW_ORIGINS") {
            self.preview_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(secs) = var("JWKS_TIMEOUT_SECS").and_then(|v| v.trim().parse::<u64>().ok()) {
            self.jwks_timeout = Duration::from_secs(secs);
        }

        let flags = &mut self.unsafe_flags;
        flags.debug = parse_bool(var("UNSAFE_DEBUG").as_deref(), flags.debug);
        flags.ignore_token_expiration = parse_bool(
            var("UNSAFE_IGNORE_TOKEN_EXPIRATION").as_deref(),
            flags.ignore_token_expiration,
        );
        flags.insecure_cookies = parse_bool(
            var("UNSAFE_INSECURE_COOKIES").as_deref(),
            flags.insecure_cookies,
        );

        self
    }

    /// Whether cookies carry `Secure`.
    pub fn secure_cookies(&self) -> bool {
        !self.unsafe_flags.insecure_cookies
    }

    /// Issuer the IdP tokens must carry: the origin of the IdP URL.
    pub fn expected_issuer(&self) -> Option<String> {
        let url = Url::parse(self.okta_url.as_deref()?).ok()?;
        Some(url.origin().ascii_serialization())
    }

    /// Parsed preview allow-list. Entries that are not URLs are skipped.
    pub(crate) fn preview_origin_set(&self) -> Vec<Origin> {
        self.preview_origins
            .iter()
            .filter_map(|o| Url::parse(o).ok())
            .map(|u| u.origin())
            .collect()
    }
}

/// Parse a boolean flag value.
///
/// Trimmed and case-insensitive: `true`, `1` and `yes` are true. An absent or
/// blank value yields `default`; anything else is false.
pub fn parse_bool(value: Option<&str>, default: bool) -> bool {
    let value = value.unwrap_or("").trim().to_lowercase();
    if value.is_empty() {
        return default;
    }
    matches!(value.as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn configured() -> Options {
        Options {
            jwt_secret: Some("secret!".to_string()),
            okta_url: Some("okta!".to_string()),
            prod_base_url: Some("prod!".to_string()),
            site_title: Some("title!".to_string()),
            unsafe_flags: UnsafeFlags {
                debug: true,
                ignore_token_expiration: true,
                insecure_cookies: true,
            },
            ..Options::default()
        }
    }

    #[test]
    fn parse_bool_defaults() {
        assert!(!parse_bool(None, false));
        assert!(parse_bool(None, true));
        assert!(parse_bool(Some("  "), true));
    }

    #[test]
    fn parse_bool_truthy() {
        for v in ["true", "TRUE", "True", "1", "YES", "yes", "Yes", " yes "] {
            assert!(parse_bool(Some(v), false), "{v}");
        }
    }

    #[test]
    fn parse_bool_falsy() {
        for v in ["false", "no", "0", "42", "there is no spoon"] {
            assert!(!parse_bool(Some(v), true), "{v}");
        }
    }

    #[test]
    fn empty_everything() {
        let options = Options::default().with_overrides(|_| None);
        assert_eq!(options, Options::default());
        assert_eq!(options.session_cookie_name, "nf_jwt");
        assert_eq!(options.unsafe_flags, UnsafeFlags::default());
    }

    #[test]
    fn keeps_existing_settings() {
        let options = configured().with_overrides(|_| None);
        assert_eq!(options, configured());
    }

    #[test]
    fn environment_wins() {
        let options = configured().with_overrides(lookup_from(&[
            ("O4N_JWT_SECRET", "secret?"),
            ("O4N_PROD_BASE_URL", "prod?"),
            ("O4N_OKTA_URL", "okta?"),
            ("O4N_SITE_TITLE", "title?"),
            ("O4N_UNSAFE_DEBUG", "yes"),
            ("O4N_UNSAFE_IGNORE_TOKEN_EXPIRATION", "no"),
            ("O4N_UNSAFE_INSECURE_COOKIES", "true"),
        ]));

        assert_ne!(options, configured());
        assert_eq!(options.jwt_secret.as_deref(), Some("secret?"));
        assert_eq!(options.okta_url.as_deref(), Some("okta?"));
        assert_eq!(options.prod_base_url.as_deref(), Some("prod?"));
        assert_eq!(options.site_title.as_deref(), Some("title?"));
        assert_eq!(
            options.unsafe_flags,
            UnsafeFlags {
                debug: true,
                ignore_token_expiration: false,
                insecure_cookies: true,
            }
        );
    }

    #[test]
    fn extended_settings() {
        let options = Options::default().with_overrides(lookup_from(&[
            ("O4N_SESSION_COOKIE_NAME", "my_session"),
            ("O4N_PREVIEW_ORIGINS", "https://a.example, ,https://b.example"),
            ("O4N_JWKS_TIMEOUT_SECS", "3"),
        ]));
        assert_eq!(options.session_cookie_name, "my_session");
        assert_eq!(
            options.preview_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(options.jwks_timeout, Duration::from_secs(3));
    }

    #[test]
    fn expected_issuer_is_idp_origin() {
        let options = Options {
            okta_url: Some("http://localhost:1337/oauth/url/here".to_string()),
            ..Options::default()
        };
        assert_eq!(options.expected_issuer().as_deref(), Some("http://localhost:1337"));
        assert_eq!(Options::default().expected_issuer(), None);
    }
}
