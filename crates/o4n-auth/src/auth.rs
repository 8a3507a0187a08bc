//! Token verification and exchange.
//!
//! Receives the IdP's form POST, verifies the identity token and either
//! mints the platform session (native branch) or forwards the token to the
//! preview deployment that asked for it (relay branch). Both branches clear
//! the carrier cookie.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{info, instrument, warn};
use url::Url;

use crate::config::Options;
use crate::cookie::{
    CLIENT_ID_COOKIE, CookieOptions, REDIRECT_COOKIE, build_clear_cookie, build_set_cookie,
    read_cookie,
};
use crate::gateway::{AUTH_PATH, GatewayRequest, GatewayResponse, InvocationContext, debug_dump};
use crate::jwt::{IdTokenVerifier, KeyResolver, UnverifiedPeek, VerifyOptions};
use crate::login::fallback_raw_url;
use crate::redirect::RedirectPolicy;
use crate::relay::{RelayPage, is_relay_target, page_title, render_relay_page};
use crate::session::SessionClaims;
use crate::{Error, Result};

/// Handler for the auth endpoint.
#[derive(Debug, Clone)]
pub struct AuthHandler<R> {
    options: Arc<Options>,
    verifier: IdTokenVerifier<R>,
}

impl<R: KeyResolver> AuthHandler<R> {
    /// Handler over shared options, resolving IdP keys with `resolver`.
    pub fn new(options: Arc<Options>, resolver: R) -> Self {
        Self {
            options,
            verifier: IdTokenVerifier::new(resolver),
        }
    }

    /// Serve an auth request.
    #[instrument(skip_all, fields(request_id = %ctx.request_id))]
    pub async fn handle(&self, req: &GatewayRequest, ctx: &InvocationContext) -> GatewayResponse {
        match self.exchange(req, ctx).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(status = err.status(), error = %err, "token exchange failed");
                GatewayResponse::error(&err)
            }
        }
    }

    async fn exchange(
        &self,
        req: &GatewayRequest,
        ctx: &InvocationContext,
    ) -> Result<GatewayResponse> {
        let secret = self
            .options
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::config("Misconfigured application."))?;

        let token = id_token_field(req)?;
        let peek = UnverifiedPeek::parse(&token)?;

        let verify_opts = VerifyOptions {
            issuer: self.expected_issuer()?,
            ignore_expiration: self.options.unsafe_flags.ignore_token_expiration,
        };
        let identity = self.verifier.verify(&token, &peek, &verify_opts).await?;

        let destination = read_cookie(req.header("cookie"), REDIRECT_COOKIE);
        let carrier = CookieOptions::carrier(self.options.secure_cookies());

        if let Some(dest) = destination
            .filter(|d| is_relay_target(d, &self.options.preview_origin_set()))
        {
            info!(destination = %dest, "relaying token to preview deployment");
            return Ok(self.relay(dest, &token, &carrier, req, ctx));
        }

        let claims = SessionClaims::from_identity(&identity, SystemTime::now());
        let session_token = claims.sign(secret)?;

        let location = match self.redirect_policy(req).validate(destination.unwrap_or_default()) {
            v if v.is_empty() => "/".to_string(),
            v => v,
        };
        info!(location = %location, "session issued");

        let secure = self.options.secure_cookies();
        let body = if self.options.unsafe_flags.debug {
            serde_json::to_value(&claims)?
        } else {
            serde_json::json!({})
        };

        Ok(GatewayResponse::json(302, &body)
            .with_header("Location", location)
            .with_cookie(build_set_cookie(
                &session_token,
                &CookieOptions::new(&self.options.session_cookie_name, secure).http_only(),
            ))
            .with_cookie(build_set_cookie(
                &claims.client_id(),
                &CookieOptions::new(CLIENT_ID_COOKIE, secure),
            ))
            .with_cookie(build_clear_cookie(&carrier)))
    }

    fn relay(
        &self,
        destination: &str,
        token: &str,
        carrier: &CookieOptions,
        req: &GatewayRequest,
        ctx: &InvocationContext,
    ) -> GatewayResponse {
        let title = page_title(self.options.site_title.as_deref());
        let dumps = self
            .options
            .unsafe_flags
            .debug
            .then(|| debug_dump(req, ctx));

        let html = render_relay_page(&RelayPage {
            title: &title,
            destination,
            id_token: token,
            debug: dumps.as_ref().map(|(e, c)| (e.as_str(), c.as_str())),
        });

        GatewayResponse::html(200, html).with_cookie(build_clear_cookie(carrier))
    }

    fn expected_issuer(&self) -> Result<Option<String>> {
        match (&self.options.okta_url, self.options.expected_issuer()) {
            (Some(url), None) if !url.is_empty() => {
                Err(Error::config("IdP URL is not a valid URL."))
            }
            (_, issuer) => Ok(issuer),
        }
    }

    /// Paths, plus absolute URLs back to production or to this deployment.
    fn redirect_policy(&self, req: &GatewayRequest) -> RedirectPolicy {
        let mut policy = RedirectPolicy::new();
        let mut scheme = "https".to_string();

        if let Some(prod) = self.options.prod_base_url.as_deref() {
            policy = policy.allow_origin_of(prod);
            if let Ok(url) = Url::parse(prod) {
                scheme = url.scheme().to_string();
            }
        }

        let own = req
            .raw_url
            .clone()
            .filter(|r| !r.is_empty())
            .or_else(|| {
                fallback_raw_url(req.header("host"), AUTH_PATH, &scheme)
                    .ok()
                    .map(String::from)
            });
        if let Some(own) = own {
            policy = policy.allow_origin_of(&own);
        }
        policy
    }
}

/// The non-empty `id_token` field of a form-encoded POST body.
fn id_token_field(req: &GatewayRequest) -> Result<String> {
    if !req.method.eq_ignore_ascii_case("POST") {
        return Err(Error::BadRequest);
    }
    let body = req
        .body
        .as_deref()
        .filter(|b| !b.is_empty())
        .ok_or(Error::BadRequest)?;

    url::form_urlencoded::parse(body.as_bytes())
        .find(|(k, _)| k == "id_token")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or(Error::BadRequest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(body: Option<&str>) -> GatewayRequest {
        GatewayRequest {
            method: "POST".to_string(),
            body: body.map(ToString::to_string),
            ..GatewayRequest::default()
        }
    }

    #[test]
    fn id_token_requires_post() {
        let mut req = post(Some("id_token=abc"));
        req.method = "GET".to_string();
        assert!(matches!(id_token_field(&req), Err(Error::BadRequest)));
    }

    #[test]
    fn id_token_requires_body() {
        assert!(matches!(id_token_field(&post(None)), Err(Error::BadRequest)));
        assert!(matches!(id_token_field(&post(Some(""))), Err(Error::BadRequest)));
    }

    #[test]
    fn id_token_requires_field() {
        assert!(matches!(
            id_token_field(&post(Some("foo=bar&fiz=baz"))),
            Err(Error::BadRequest)
        ));
        assert!(matches!(
            id_token_field(&post(Some("id_token=&fiz=baz"))),
            Err(Error::BadRequest)
        ));
    }

    #[test]
    fn id_token_is_form_decoded() {
        assert_eq!(
            id_token_field(&post(Some("foo=bar&id_token=a.b%2Bc&fiz=baz"))).unwrap(),
            "a.b+c"
        );
    }
}
