//! Fetching the single-use session credential from the first-party
//! credential endpoint.

use voxcoach_types::{ErrorResponse, TokenRequest, TokenResponse};

use crate::error::SessionError;

/// Opaque signed token plus the transport endpoint it is valid for.
/// Good for exactly one connect call; never cached across sessions.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch<'a>(
        &self,
        participant_name: &str,
        room_name: Option<&'a str>,
    ) -> Result<Credential, SessionError>;
}

/// Talks to the `POST /api/token` route.
pub struct HttpCredentialProvider {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpCredentialProvider {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn fetch<'a>(
        &self,
        participant_name: &str,
        room_name: Option<&'a str>,
    ) -> Result<Credential, SessionError> {
        let request = TokenRequest {
            participant_name: participant_name.to_string(),
            room_name: room_name.map(str::to_string),
        };
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SessionError::CredentialRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Surface the server's error string when it sent one.
            let detail = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| format!("credential endpoint returned {status}"));
            return Err(SessionError::CredentialRequest(detail));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SessionError::CredentialRequest(e.to_string()))?;
        Ok(Credential {
            token: body.token,
            url: body.url,
        })
    }
}
