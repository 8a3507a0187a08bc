//! Platform session tokens.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::jwt::IdentityClaims;

/// Lifetime of a minted session token.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Claims of the platform session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject, copied from the identity token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Email, copied from the identity token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiry: issuance plus [`SESSION_TTL`].
    pub exp: u64,
    /// Role data in the shape the platform reads.
    pub app_metadata: AppMetadata,
}

/// `app_metadata` claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    /// `authorization` claim.
    pub authorization: Authorization,
}

/// `app_metadata.authorization` claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    /// Roles from the identity token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Value>,
}

impl SessionClaims {
    /// Session claims for a verified identity, issued at `now`.
    pub fn from_identity(identity: &IdentityClaims, now: SystemTime) -> Self {
        let issued = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        Self {
            sub: identity.sub.clone(),
            email: identity.email.clone(),
            exp: issued + SESSION_TTL.as_secs(),
            app_metadata: AppMetadata {
                authorization: Authorization {
                    roles: identity.roles.clone(),
                },
            },
        }
    }

    /// `subject|email` identifier for client-side analytics.
    pub fn client_id(&self) -> String {
        format!(
            "{}|{}",
            self.sub.as_deref().unwrap_or_default(),
            self.email.as_deref().unwrap_or_default()
        )
    }

    /// Sign as HS256 with `secret`.
    pub fn sign(&self, secret: &str) -> Result<String> {
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?)
    }
}
