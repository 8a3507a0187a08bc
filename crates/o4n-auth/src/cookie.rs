//! Cookie helpers.
//!
//! The handshake uses three cookies: the `redirect_to` carrier, the session
//! token and the `client_id` identifier, all serialized as
//! `name=value[; HttpOnly][; Secure]; Path=/`.

/// Name of the cookie carrying the pending post-login destination.
pub const REDIRECT_COOKIE: &str = "redirect_to";

/// Name of the client-readable `subject|email` cookie.
pub const CLIENT_ID_COOKIE: &str = "client_id";

/// Options used to build a `Set-Cookie` value.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Cookie name.
    pub name: String,

    /// Cookie path.
    pub path: String,

    /// Send on HTTPS only.
    pub secure: bool,

    /// Not accessible to JS.
    pub http_only: bool,
}

impl CookieOptions {
    /// Cookie with `Path=/`, secure unless told otherwise, readable by script.
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            path: "/".to_string(),
            secure,
            http_only: false,
        }
    }

    /// Same options with `HttpOnly` set.
    #[must_use]
    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// Options for the `redirect_to` carrier.
    ///
    /// Not `HttpOnly`: the login page writes this cookie from script.
    pub fn carrier(secure: bool) -> Self {
        Self::new(REDIRECT_COOKIE, secure)
    }
}

/// Build a `Set-Cookie` header value.
pub fn build_set_cookie(value: &str, opts: &CookieOptions) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("{}={value}", opts.name));

    if opts.http_only {
        parts.push("HttpOnly".to_string());
    }
    if opts.secure {
        parts.push("Secure".to_string());
    }

    parts.push(format!("Path={}", opts.path));

    parts.join("; ")
}

/// Build a `Set-Cookie` header value that clears the cookie.
///
/// Attributes are identical to the ones used when setting it, so the browser
/// overwrites the same cookie.
pub fn build_clear_cookie(opts: &CookieOptions) -> String {
    build_set_cookie("", opts)
}

/// Remove characters that would end a cookie value and start attributes.
///
/// Applied to anything written into `document.cookie` from page script.
pub fn strip_cookie_breaking(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ';' | ',') && !c.is_whitespace() && !c.is_control())
        .collect()
}

/// Find a cookie value in a `Cookie` request header.
///
/// Returns the first value whose name matches exactly. Everything after the
/// first `=` is the value, so values containing `=` survive intact.
pub fn read_cookie<'a>(header: Option<&'a str>, name: &str) -> Option<&'a str> {
    header?
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOISY: &str = "notice_behavior=implied,eu; _rdt_uuid=1122334455667.aaaa; \
        client_id=00000000000000000000|anonymous@example.com; ajs_user_id=\"000\"; \
        nf_jwt=eeEe.eeEe.EeEe; redirect_to=; _mkto_trk=id:000-AAA-000&token:_mch-1; \
        _hp2_ses_props.1234567890={\"ts\":1,\"d\":\"www.example.com\",\"h\":\"/some-page\"}; \
        _dd_s=rum=1&id=1111&created=1234567890123&expire=1234567890124";

    #[test]
    fn secure_cookie_with_http_only() {
        let opts = CookieOptions::new("foo", true).http_only();
        assert_eq!(build_set_cookie("bar", &opts), "foo=bar; HttpOnly; Secure; Path=/");
    }

    #[test]
    fn secure_cookie_without_http_only() {
        let opts = CookieOptions::new("foo", true);
        assert_eq!(build_set_cookie("bar", &opts), "foo=bar; Secure; Path=/");
    }

    #[test]
    fn insecure_cookie_with_http_only() {
        let opts = CookieOptions::new("foo", false).http_only();
        assert_eq!(build_set_cookie("bar", &opts), "foo=bar; HttpOnly; Path=/");
    }

    #[test]
    fn insecure_cookie_without_http_only() {
        let opts = CookieOptions::new("foo", false);
        assert_eq!(build_set_cookie("bar", &opts), "foo=bar; Path=/");
    }

    #[test]
    fn clearing_is_idempotent() {
        let opts = CookieOptions::carrier(true);
        let first = build_clear_cookie(&opts);
        let second = build_clear_cookie(&opts);
        assert_eq!(first, "redirect_to=; Secure; Path=/");
        assert_eq!(first, second);
    }

    #[test]
    fn cookie_breaking_characters_are_removed() {
        assert_eq!(
            strip_cookie_breaking(
                "https://evil.example/.netlify/functions/auth; path=/.netlify/functions/auth; max-age=31536000"
            ),
            "https://evil.example/.netlify/functions/authpath=/.netlify/functions/authmax-age=31536000"
        );
        assert_eq!(strip_cookie_breaking("/docs/a,b\tc d"), "/docs/abcd");
        assert_eq!(strip_cookie_breaking("/docs/foo?a=b&c=d"), "/docs/foo?a=b&c=d");
    }

    #[test]
    fn no_cookie_header() {
        assert_eq!(read_cookie(None, "c"), None);
        assert_eq!(read_cookie(Some(""), "c"), None);
    }

    #[test]
    fn many_cookies_without_the_wanted_one() {
        assert_eq!(read_cookie(Some(NOISY), "c"), None);
    }

    #[test]
    fn many_cookies_with_the_wanted_one() {
        let header = format!("c=foo; {NOISY}");
        assert_eq!(read_cookie(Some(&header), "c"), Some("foo"));
        assert_eq!(read_cookie(Some(&header), "redirect_to"), Some(""));
    }

    #[test]
    fn value_keeps_embedded_equals() {
        let header = format!("{NOISY}; c=foo=bar");
        assert_eq!(read_cookie(Some(&header), "c"), Some("foo=bar"));
        assert_eq!(
            read_cookie(Some(NOISY), "_dd_s"),
            Some("rum=1&id=1111&created=1234567890123&expire=1234567890124")
        );
    }

    #[test]
    fn trailing_separators() {
        assert_eq!(read_cookie(Some("c=foo"), "c"), Some("foo"));
        assert_eq!(read_cookie(Some("c=foo;"), "c"), Some("foo"));
        assert_eq!(read_cookie(Some("c=foo; "), "c"), Some("foo"));
    }

    #[test]
    fn prefix_names_do_not_match() {
        assert_eq!(read_cookie(Some("cc=foo; c_x=bar"), "c"), None);
    }
}
