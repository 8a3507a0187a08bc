//! Login decision engine.
//!
//! Serves the page that starts the handshake: it records where the user
//! wants to end up in the carrier cookie and sends the browser either to the
//! IdP (production) or to the production login (preview).

use std::sync::Arc;

use tracing::{info, instrument, warn};
use url::Url;

use crate::config::Options;
use crate::cookie::{REDIRECT_COOKIE, strip_cookie_breaking};
use crate::gateway::{GatewayRequest, GatewayResponse, InvocationContext, LOGIN_PATH, debug_dump};
use crate::redirect::strip_script_breaking;
use crate::relay::{page_title, preview_callback_url, relay_login_url};
use crate::{Error, Result};

/// Script expression deferring the destination to the page's own URL.
const CURRENT_PAGE_JS: &str = r#"" + window.location.href + ""#;

/// Which deployment a request hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    /// The configured production host.
    Production,
    /// Any other host.
    Preview,
}

impl Deployment {
    /// Human label of where the browser is sent.
    pub fn target_label(self) -> &'static str {
        match self {
            Deployment::Production => "IdP",
            Deployment::Preview => "production site",
        }
    }
}

/// Value written into the carrier cookie by the login page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarrierValue {
    /// The URL of the page the browser is on.
    CurrentPage,
    /// A literal destination, already stripped for script and cookie
    /// embedding.
    Literal(String),
}

impl CarrierValue {
    fn as_script_fragment(&self) -> &str {
        match self {
            CarrierValue::CurrentPage => CURRENT_PAGE_JS,
            CarrierValue::Literal(v) => v,
        }
    }
}

/// Outcome of the login decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPlan {
    /// Deployment the request hit.
    pub deployment: Deployment,
    /// Where the browser goes next.
    pub target: String,
    /// What the carrier cookie is set to.
    pub carrier: CarrierValue,
}

/// Handler for the login endpoint.
#[derive(Debug, Clone)]
pub struct LoginHandler {
    options: Arc<Options>,
}

impl LoginHandler {
    /// Handler over shared options.
    pub fn new(options: Arc<Options>) -> Self {
        Self { options }
    }

    /// Serve a login request.
    #[instrument(skip_all, fields(request_id = %ctx.request_id))]
    pub fn handle(&self, req: &GatewayRequest, ctx: &InvocationContext) -> GatewayResponse {
        match self.decide(req) {
            Ok(plan) => {
                info!(deployment = ?plan.deployment, "starting login handshake");
                GatewayResponse::html(200, self.render(&plan, req, ctx))
            }
            Err(err) => {
                warn!(error = %err, "login failed");
                GatewayResponse::error(&err)
            }
        }
    }

    /// Decide where to send the browser and what to remember.
    pub fn decide(&self, req: &GatewayRequest) -> Result<LoginPlan> {
        let prod_base = self
            .options
            .prod_base_url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .ok_or_else(|| Error::config("Production URL not configured."))?;

        let effective = effective_url(req, &prod_base)?;
        let deployment = if effective.host_str() == prod_base.host_str() {
            Deployment::Production
        } else {
            Deployment::Preview
        };

        let target = match deployment {
            Deployment::Preview => {
                relay_login_url(&prod_base, &preview_callback_url(&effective)).to_string()
            }
            Deployment::Production => self
                .options
                .okta_url
                .clone()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| Error::config("IdP URL not configured."))?,
        };

        let carrier = match req.query_param("redirect_to").filter(|v| !v.is_empty()) {
            Some(v) => CarrierValue::Literal(strip_cookie_breaking(&strip_script_breaking(v))),
            None => CarrierValue::CurrentPage,
        };

        Ok(LoginPlan {
            deployment,
            target,
            carrier,
        })
    }

    fn render(&self, plan: &LoginPlan, req: &GatewayRequest, ctx: &InvocationContext) -> String {
        let title = page_title(self.options.site_title.as_deref());
        let label = plan.deployment.target_label();
        let target = strip_script_breaking(&plan.target);
        let carrier = plan.carrier.as_script_fragment();

        let action = if self.options.unsafe_flags.debug {
            let (event, context) = debug_dump(req, ctx);
            format!(
                r#"
            <p><a href="{target}">Proceed to {label}</a> (local dev mode)</p>
            <h2>Event</h2>
            <pre>{event}</pre>
            <h2>Context</h2>
            <pre>{context}</pre>
            "#
            )
        } else {
            format!(
                r#"
            <script>
                window.location.href = "{target}";
            </script>
            "#
            )
        };

        format!(
            r#"<!DOCTYPE html>
    <html lang="en">
        <head>
            <title>{title}</title>
        </head>
        <body>
            <p>Redirecting to {label} to login...</p>
            <script>
                document.cookie = "{REDIRECT_COOKIE}={carrier}; path=/";
            </script>
            {action}
        </body>
    </html>"#
        )
    }
}

/// The URL this request was made to.
///
/// Uses the gateway-supplied URL when present, otherwise rebuilds one from
/// the `Host` header, the login path and the production scheme.
pub fn effective_url(req: &GatewayRequest, prod_base: &Url) -> Result<Url> {
    if let Some(raw) = req.raw_url.as_deref().filter(|r| !r.is_empty()) {
        if let Ok(url) = Url::parse(raw) {
            return Ok(url);
        }
    }
    fallback_raw_url(req.header("host"), LOGIN_PATH, prod_base.scheme())
}

/// Rebuild a request URL from its parts.
///
/// A missing host becomes `localhost`. Only `http` and `https` are accepted.
pub fn fallback_raw_url(host: Option<&str>, path: &str, scheme: &str) -> Result<Url> {
    if !matches!(scheme, "http" | "https") {
        return Err(Error::Protocol(format!("{scheme}:")));
    }
    let host = host.filter(|h| !h.is_empty()).unwrap_or("localhost");
    let base = Url::parse(&format!("{scheme}://{host}")).map_err(|_| Error::BadRequest)?;
    base.join(path).map_err(|_| Error::BadRequest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_uses_host_and_path() {
        let url = fallback_raw_url(Some("www.example.com"), "/foo/bar", "https").unwrap();
        assert_eq!(url.as_str(), "https://www.example.com/foo/bar");
    }

    #[test]
    fn fallback_without_host() {
        let url = fallback_raw_url(None, "/foo/bar", "https").unwrap();
        assert_eq!(url.as_str(), "https://localhost/foo/bar");
        let url = fallback_raw_url(None, "/foo/bar", "http").unwrap();
        assert_eq!(url.as_str(), "http://localhost/foo/bar");
    }

    #[test]
    fn fallback_rejects_other_schemes() {
        let err = fallback_raw_url(None, "/foo/bar", "ftp").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(err.to_string(), "Invalid protocol ftp:");
    }

    #[test]
    fn fallback_keeps_port() {
        let url = fallback_raw_url(Some("localhost:8888"), LOGIN_PATH, "http").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8888/.netlify/functions/login");
    }

    #[test]
    fn labels() {
        assert_eq!(Deployment::Production.target_label(), "IdP");
        assert_eq!(Deployment::Preview.target_label(), "production site");
    }
}
