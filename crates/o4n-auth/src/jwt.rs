//! Identity token verification using the IdP's JWKS.
//!
//! Verification runs in two phases. [`UnverifiedPeek`] reads the issuer and
//! key id from the token without trusting it; [`IdTokenVerifier::verify`]
//! then resolves the signing key through a [`KeyResolver`] and checks the
//! signature, issuer and expiry.

use crate::{Error, Result};

use async_trait::async_trait;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

/// Key-set path appended to the issuer origin.
pub const JWKS_PATH: &str = "/oauth2/v1/keys";

/// A JWKS (JSON Web Key Set).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JwksSet {
    /// Keys.
    pub keys: Vec<Jwk>,
}

/// Minimal JWK structure for RSA keys.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Jwk {
    /// Key type ("RSA").
    pub kty: String,

    /// Key id.
    pub kid: Option<String>,

    /// Public key use.
    #[serde(rename = "use")]
    pub use_: Option<String>,

    /// Algorithm (optional).
    pub alg: Option<String>,

    /// RSA modulus.
    pub n: Option<String>,
    /// RSA exponent.
    pub e: Option<String>,
}

/// Issuer and key id read from a token whose signature is not yet checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedPeek {
    /// `iss` claim.
    pub issuer: String,
    /// `kid` header.
    pub kid: Option<String>,
}

impl UnverifiedPeek {
    /// Decode header and payload without verifying anything.
    ///
    /// Fails with [`Error::BadRequest`] when the token cannot be decoded or
    /// has no `iss`.
    pub fn parse(token: &str) -> Result<Self> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| Error::BadRequest)?;

        let payload = token.split('.').nth(1).ok_or(Error::BadRequest)?;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| Error::BadRequest)?;
        let claims: Value = serde_json::from_slice(&bytes).map_err(|_| Error::BadRequest)?;

        let issuer = claims
            .get("iss")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(Error::BadRequest)?;

        Ok(Self {
            issuer: issuer.to_string(),
            kid: header.kid,
        })
    }

    /// Where the issuer publishes its signing keys.
    pub fn jwks_url(&self) -> Result<String> {
        let url = Url::parse(&self.issuer).map_err(|e| {
            Error::unauthorized("JsonWebTokenError", format!("invalid issuer: {e}"))
        })?;
        Ok(format!("{}{JWKS_PATH}", url.origin().ascii_serialization()))
    }
}

/// Claims read from a verified identity token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityClaims {
    /// Issuer.
    pub iss: String,
    /// Subject.
    #[serde(default)]
    pub sub: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// IdP roles/groups, passed through untouched.
    #[serde(default)]
    pub roles: Option<Value>,
    /// Issued at.
    #[serde(default)]
    pub iat: Option<u64>,
    /// Expiry.
    #[serde(default)]
    pub exp: Option<u64>,
}

/// Resolves the public key a token was signed with.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Key for `kid` published at `jwks_url`.
    async fn resolve(&self, jwks_url: &str, kid: Option<&str>) -> Result<DecodingKey>;
}

/// Resolver backed by a fixed key set, whatever the URL.
#[derive(Debug, Clone)]
pub struct StaticKeyResolver {
    jwks: JwksSet,
}

impl StaticKeyResolver {
    /// Use this parsed key set.
    pub fn new(jwks: JwksSet) -> Self {
        Self { jwks }
    }

    /// Parse this JSON key set.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, _jwks_url: &str, kid: Option<&str>) -> Result<DecodingKey> {
        select_key(&self.jwks, kid)
    }
}

/// Resolver fetching the key set over HTTP on every call.
///
/// Each attempt is bounded by the client timeout. Transport failures and
/// 5xx answers are retried once.
#[cfg(feature = "fetch-reqwest")]
#[derive(Debug, Clone)]
pub struct HttpKeyResolver {
    client: reqwest::Client,
    max_attempts: u32,
}

#[cfg(feature = "fetch-reqwest")]
impl HttpKeyResolver {
    /// Build a resolver whose requests time out after `timeout`.
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            max_attempts: 2,
        })
    }

    async fn fetch(&self, url: &str) -> Result<JwksSet> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(set) => return Ok(set),
                Err(err) if attempt < self.max_attempts && is_transient(&err) => {
                    warn!(%url, attempt, error = %err, "JWKS fetch failed, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<JwksSet> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.json::<JwksSet>().await?)
    }
}

#[cfg(feature = "fetch-reqwest")]
#[async_trait]
impl KeyResolver for HttpKeyResolver {
    async fn resolve(&self, jwks_url: &str, kid: Option<&str>) -> Result<DecodingKey> {
        debug!(%jwks_url, ?kid, "fetching JWKS");
        let jwks = self.fetch(jwks_url).await?;
        select_key(&jwks, kid)
    }
}

#[cfg(feature = "fetch-reqwest")]
fn is_transient(err: &Error) -> bool {
    match err {
        Error::Reqwest(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        _ => false,
    }
}

/// Pick the RSA key matching `kid`.
///
/// Without a `kid` the set must hold exactly one key.
pub fn select_key(jwks: &JwksSet, kid: Option<&str>) -> Result<DecodingKey> {
    let jwk = match kid {
        Some(kid) => jwks.keys.iter().find(|k| k.kid.as_deref() == Some(kid)),
        None if jwks.keys.len() == 1 => jwks.keys.first(),
        None => None,
    }
    .ok_or(Error::NoMatchingKey)?;

    decoding_key_from_jwk(jwk)
}

fn decoding_key_from_jwk(jwk: &Jwk) -> Result<DecodingKey> {
    if jwk.kty != "RSA" {
        return Err(Error::Jwks(format!("unsupported kty: {}", jwk.kty)));
    }
    let n = jwk
        .n
        .as_deref()
        .ok_or_else(|| Error::Jwks("RSA JWK missing n".to_string()))?;
    let e = jwk
        .e
        .as_deref()
        .ok_or_else(|| Error::Jwks("RSA JWK missing e".to_string()))?;
    Ok(DecodingKey::from_rsa_components(n, e)?)
}

/// Options for token verification.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Expected issuer (`iss`).
    pub issuer: Option<String>,

    /// Skip the `exp` check.
    pub ignore_expiration: bool,
}

/// Verifies IdP identity tokens (RS256) against keys from a [`KeyResolver`].
#[derive(Debug, Clone)]
pub struct IdTokenVerifier<R> {
    resolver: R,
}

impl<R: KeyResolver> IdTokenVerifier<R> {
    /// Verifier using `resolver` for key lookup.
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Verify `token`, previously peeked as `peek`.
    ///
    /// Every failure is reported as [`Error::Unauthorized`].
    pub async fn verify(
        &self,
        token: &str,
        peek: &UnverifiedPeek,
        opts: &VerifyOptions,
    ) -> Result<IdentityClaims> {
        // Refuse foreign issuers before fetching anything from them.
        validate_issuer(&peek.issuer, opts)?;

        let jwks_url = peek.jwks_url()?;
        let key = self
            .resolver
            .resolve(&jwks_url, peek.kid.as_deref())
            .await
            .map_err(|e| Error::unauthorized("SigningKeyError", e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        // `exp` is checked when present, never required.
        validation.set_required_spec_claims::<&str>(&[]);
        validation.validate_exp = !opts.ignore_expiration;

        let data = jsonwebtoken::decode::<IdentityClaims>(token, &key, &validation)
            .map_err(map_jwt_error)?;

        validate_issuer(&data.claims.iss, opts)?;
        Ok(data.claims)
    }
}

fn validate_issuer(iss: &str, opts: &VerifyOptions) -> Result<()> {
    if let Some(expected) = &opts.issuer {
        if iss != expected {
            return Err(Error::unauthorized(
                "JsonWebTokenError",
                format!("jwt issuer invalid. expected: {expected}"),
            ));
        }
    }
    Ok(())
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> Error {
    match err.kind() {
        ErrorKind::ExpiredSignature => Error::unauthorized("TokenExpiredError", "jwt expired"),
        ErrorKind::InvalidSignature => Error::unauthorized("JsonWebTokenError", "invalid signature"),
        ErrorKind::InvalidAlgorithm => Error::unauthorized("JsonWebTokenError", "invalid algorithm"),
        _ => Error::unauthorized("JsonWebTokenError", err.to_string()),
    }
}
