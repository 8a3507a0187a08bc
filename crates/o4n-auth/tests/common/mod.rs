//! Shared fixtures: test RSA keys, token signing, and a mock IdP.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use o4n_auth::GatewayRequest;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_KEY_PEM: &[u8] = include_bytes!("../fixtures/test.key.pem");
pub const BAD_KEY_PEM: &[u8] = include_bytes!("../fixtures/bad.key.pem");
pub const TEST_JWKS: &str = include_str!("../fixtures/test-public-jwk.json");
pub const TEST_KID: &str = "test-key-1";

pub const PREVIEW_AUTH_URL: &str = "https://preview-123.netlify.app/.netlify/functions/auth";

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs()
}

/// Identity token claims the way the IdP issues them.
pub fn sample_claims(issuer: &str) -> Value {
    let now = now();
    json!({
        "sub": "some-unique-id",
        "email": "foo@example.com",
        "ver": 1,
        "iss": issuer,
        "aud": "some-unique-id",
        "iat": now,
        "exp": now + 60 * 60,
        "idp": "some-unique-id",
        "email_verified": true,
        "roles": ["Everyone"],
    })
}

pub fn expired_claims(issuer: &str) -> Value {
    let mut claims = sample_claims(issuer);
    claims["iat"] = json!(now() - 60);
    claims["exp"] = json!(now() - 10);
    claims
}

pub fn sign_with(claims: &Value, pem: &[u8]) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KID.to_string());
    let key = EncodingKey::from_rsa_pem(pem).expect("valid test key");
    jsonwebtoken::encode(&header, claims, &key).expect("token signs")
}

pub fn sign(claims: &Value) -> String {
    sign_with(claims, TEST_KEY_PEM)
}

/// Mock IdP publishing the test key set at the well-known key path.
pub async fn mock_idp() -> MockServer {
    let server = MockServer::start().await;
    let jwks: Value = serde_json::from_str(TEST_JWKS).expect("fixture JWKS parses");
    Mock::given(method("GET"))
        .and(path("/oauth2/v1/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
        .mount(&server)
        .await;
    server
}

pub fn token_post(token: &str, cookie: Option<&str>) -> GatewayRequest {
    let mut headers = BTreeMap::new();
    if let Some(cookie) = cookie {
        headers.insert("cookie".to_string(), cookie.to_string());
    }
    GatewayRequest {
        method: "POST".to_string(),
        body: Some(format!("id_token={token}")),
        headers,
        ..GatewayRequest::default()
    }
}

pub fn cookie_value<'a>(cookies: &'a [String], name: &str) -> &'a str {
    let cookie = cookies
        .iter()
        .find(|c| c.starts_with(&format!("{name}=")))
        .unwrap_or_else(|| panic!("cannot find cookie {name}"));
    cookie[name.len() + 1..]
        .split(';')
        .next()
        .unwrap_or_default()
}
