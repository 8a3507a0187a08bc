//! o4n-auth
//!
//! OpenID Connect login bridge between an IdP and a hosting platform's
//! native JWT session, for a production site and for preview deployments the
//! IdP does not know about.
//!
//! Two handlers make up the handshake:
//!
//! - [`LoginHandler`] serves the page that remembers the destination in the
//!   `redirect_to` cookie and sends the browser to the IdP, or, on a preview
//!   deployment, to the production login;
//! - [`AuthHandler`] receives the IdP's form POST, verifies the identity
//!   token against the issuer's JWKS, and either mints the platform session
//!   or relays the token to the preview deployment that asked for it.
//!
//! ## Quick start
//! ```no_run
//! use std::sync::Arc;
//! use o4n_auth::{AuthHandler, GatewayRequest, HttpKeyResolver, InvocationContext, Options};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let options = Arc::new(Options::from_env());
//! let resolver = HttpKeyResolver::new(options.jwks_timeout)?;
//! let auth = AuthHandler::new(options, resolver);
//!
//! let req = GatewayRequest {
//!     method: "POST".to_string(),
//!     body: Some("id_token=eyJ...".to_string()),
//!     ..Default::default()
//! };
//! let resp = auth.handle(&req, &InvocationContext::default()).await;
//! println!("{} {:?}", resp.status, resp.header("Location"));
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod auth;
mod config;
mod cookie;
mod error;
mod gateway;
mod jwt;
mod login;
mod redirect;
mod relay;
mod session;

pub use auth::AuthHandler;
pub use config::{Options, UnsafeFlags, parse_bool};
pub use cookie::{
    CLIENT_ID_COOKIE, CookieOptions, REDIRECT_COOKIE, build_clear_cookie, build_set_cookie,
    read_cookie, strip_cookie_breaking,
};
pub use error::{Error, Result};
pub use gateway::{AUTH_PATH, GatewayRequest, GatewayResponse, InvocationContext, LOGIN_PATH};
#[cfg(feature = "fetch-reqwest")]
pub use jwt::HttpKeyResolver;
pub use jwt::{
    IdTokenVerifier, IdentityClaims, Jwk, JwksSet, KeyResolver, StaticKeyResolver,
    UnverifiedPeek, VerifyOptions, select_key,
};
pub use login::{CarrierValue, Deployment, LoginHandler, LoginPlan, effective_url, fallback_raw_url};
pub use redirect::{RedirectPolicy, strip_script_breaking, validate};
pub use relay::{RelayPage, is_relay_target, preview_callback_url, relay_login_url, render_relay_page};
pub use session::{SESSION_TTL, SessionClaims};
