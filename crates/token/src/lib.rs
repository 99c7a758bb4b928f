//! Signed access credentials for the voice transport.
//!
//! A credential is a time-scoped JWT granting one participant the right to
//! join a single room, publish audio and data, and subscribe to everything
//! in it. It may also embed an instruction for the media cloud to dispatch
//! a named agent into the room, so no separate dispatch call is needed.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

/// Default credential lifetime. Long enough for one coaching call.
pub const DEFAULT_TTL_SECONDS: i64 = 15 * 60;

/// Per-room rights embedded in the credential.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AccessGrants {
    pub room_join: bool,
    pub room: String,
    pub can_publish: bool,
    pub can_publish_data: bool,
    pub can_subscribe: bool,
}

impl AccessGrants {
    /// The full set a voice-chat participant needs: join the target room,
    /// publish audio and data, subscribe to all.
    pub fn voice(room: &str) -> Self {
        Self {
            room_join: true,
            room: room.to_string(),
            can_publish: true,
            can_publish_data: true,
            can_subscribe: true,
        }
    }
}

/// Auto-dispatch directive: ask the media cloud to send this agent into
/// the room as soon as it exists.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AgentDispatch {
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// JWT claim set for one session's credential.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    /// Signing key id.
    pub iss: String,
    /// Participant identity.
    pub sub: String,
    /// Not valid before (Unix epoch).
    pub nbf: i64,
    /// Expiration (Unix epoch).
    pub exp: i64,
    pub grants: AccessGrants,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<AgentDispatch>,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("signing configuration is missing or empty")]
    Configuration,
    #[error("token generation failed: {0}")]
    Generation(String),
    #[error("token has expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Mints and verifies credentials with a shared signing key/secret pair.
pub struct CredentialIssuer {
    key: String,
    secret: SecretString,
}

impl CredentialIssuer {
    /// Fails with `TokenError::Configuration` when either half of the
    /// signing configuration is absent.
    pub fn new(key: &str, secret: &str) -> Result<Self, TokenError> {
        if key.is_empty() || secret.is_empty() {
            return Err(TokenError::Configuration);
        }
        Ok(Self {
            key: key.to_string(),
            secret: SecretString::from(secret.to_string()),
        })
    }

    /// Issue a credential for `identity` scoped to `room`.
    pub fn issue(
        &self,
        identity: &str,
        room: &str,
        dispatch: Option<AgentDispatch>,
        ttl_seconds: i64,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(Duration::seconds(ttl_seconds))
            .ok_or_else(|| TokenError::Generation("ttl out of range".to_string()))?
            .timestamp();
        let claims = Claims {
            iss: self.key.clone(),
            sub: identity.to_string(),
            nbf: now.timestamp(),
            exp,
            grants: AccessGrants::voice(room),
            dispatch,
        };
        self.issue_with_claims(&claims)
    }

    pub fn issue_with_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        let key = EncodingKey::from_secret(self.secret.expose_secret().as_bytes());
        encode(&Header::default(), claims, &key).map_err(|e| TokenError::Generation(e.to_string()))
    }

    /// Decode and verify a credential. Tokens expire at exactly `exp`.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let key = DecodingKey::from_secret(self.secret.expose_secret().as_bytes());
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })?;
        Ok(data.claims)
    }
}

/// Generate a fresh room name, globally unique per call. The credential
/// endpoint uses this when the caller does not name a room.
pub fn generate_room_name() -> String {
    format!("room-{}", Uuid::new_v4().simple())
}
