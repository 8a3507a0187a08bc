//! Request/response model shared with whatever hosts the handlers.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Path of the login handler on every deployment.
pub const LOGIN_PATH: &str = "/.netlify/functions/login";

/// Path of the auth (token exchange) handler on every deployment.
pub const AUTH_PATH: &str = "/.netlify/functions/auth";

/// An inbound request as delivered by the gateway.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GatewayRequest {
    /// HTTP method, upper case.
    pub method: String,
    /// Full request URL, when the gateway knows it.
    pub raw_url: Option<String>,
    /// Header map with lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Decoded query parameters.
    pub query: BTreeMap<String, String>,
    /// Raw request body.
    pub body: Option<String>,
}

impl GatewayRequest {
    /// Header value by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Per-invocation metadata rendered in debug dumps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InvocationContext {
    /// Gateway-assigned request id.
    pub request_id: String,
    /// Receipt time, seconds since the epoch.
    pub received_at: u64,
}

/// Response handed back to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    /// HTTP status.
    pub status: u16,
    /// Single-valued headers.
    pub headers: BTreeMap<String, String>,
    /// `Set-Cookie` values, in order.
    pub cookies: Vec<String>,
    /// Response body.
    pub body: String,
}

impl GatewayResponse {
    /// `text/html` response.
    pub fn html(status: u16, body: String) -> Self {
        Self {
            status,
            headers: BTreeMap::from([("Content-Type".to_string(), "text/html".to_string())]),
            cookies: Vec::new(),
            body,
        }
    }

    /// `application/json` response.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: BTreeMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]),
            cookies: Vec::new(),
            body: body.to_string(),
        }
    }

    /// JSON error response for `err`. Never sets cookies.
    pub fn error(err: &crate::Error) -> Self {
        Self::json(err.status(), &err.body())
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    /// Add a `Set-Cookie` value.
    #[must_use]
    pub fn with_cookie(mut self, cookie: String) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Header value by exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// The `Set-Cookie` value for cookie `name`, if one was set.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.strip_prefix(name).is_some_and(|rest| rest.starts_with('=')))
            .map(String::as_str)
    }
}

/// JSON dump of request and context for debug pages, with markup neutralised.
pub(crate) fn debug_dump(req: &GatewayRequest, ctx: &InvocationContext) -> (String, String) {
    let render = |v: Result<String, serde_json::Error>| escape_html(&v.unwrap_or_default());
    (
        render(serde_json::to_string_pretty(req)),
        render(serde_json::to_string_pretty(ctx)),
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = GatewayRequest {
            headers: BTreeMap::from([("host".to_string(), "example.com".to_string())]),
            ..GatewayRequest::default()
        };
        assert_eq!(req.header("Host"), Some("example.com"));
        assert_eq!(req.header("cookie"), None);
    }

    #[test]
    fn error_response_shape() {
        let resp = GatewayResponse::error(&crate::Error::BadRequest);
        assert_eq!(resp.status, 400);
        assert_eq!(resp.header("Content-Type"), Some("application/json"));
        assert!(resp.cookies.is_empty());
        let body: Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(body, json!({"message": "Bad data received."}));
    }

    #[test]
    fn cookie_lookup_by_name() {
        let resp = GatewayResponse::html(200, String::new())
            .with_cookie("client_id=a|b; Path=/".to_string())
            .with_cookie("c=1; Path=/".to_string());
        assert_eq!(resp.cookie("c"), Some("c=1; Path=/"));
        assert_eq!(resp.cookie("client"), None);
    }

    #[test]
    fn dump_escapes_markup() {
        let req = GatewayRequest {
            body: Some("<script>".to_string()),
            ..GatewayRequest::default()
        };
        let (dump, _) = debug_dump(&req, &InvocationContext::default());
        assert!(dump.contains("&lt;script&gt;"));
        assert!(!dump.contains("<script>"));
    }
}
