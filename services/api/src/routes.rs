use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use base64::Engine;
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use tower_http::cors::{Any, CorsLayer};
use voxcoach_token::{AgentDispatch, CredentialIssuer};
use voxcoach_types::{ErrorResponse, TokenRequest, TokenResponse};

use crate::config::Config;

/// Participants whose identity carries this prefix are agents; they never
/// trigger a dispatch of their own.
const AGENT_IDENTITY_PREFIX: &str = "agent-";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http: reqwest::Client,
}

pub fn router(state: AppState) -> Router {
    // A separate frontend origin talks to these routes.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/token", post(issue_token))
        .route("/webhook", post(webhook))
        .layer(cors)
        .with_state(state)
}

/// Mint a single-session credential.
///
/// Generates a fresh room name when the caller does not provide one, and
/// embeds the agent auto-dispatch directive when so configured. Missing
/// signing configuration is a 500; the client treats the absence of a
/// credential as fatal to session start.
async fn issue_token(State(state): State<AppState>, Json(req): Json<TokenRequest>) -> Response {
    let (Some(key), Some(secret)) = (
        state.config.signing_key.as_deref(),
        state.config.signing_secret.as_ref(),
    ) else {
        tracing::error!("token requested but signing configuration is missing");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server signing configuration is missing",
        );
    };

    let issuer = match CredentialIssuer::new(key, secret.expose_secret()) {
        Ok(issuer) => issuer,
        Err(e) => {
            tracing::error!("credential issuer rejected configuration: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server signing configuration is invalid",
            );
        }
    };

    let room = req
        .room_name
        .clone()
        .unwrap_or_else(voxcoach_token::generate_room_name);

    let dispatch = if state.config.embed_dispatch {
        state
            .config
            .agent_name
            .clone()
            .map(|agent_name| AgentDispatch {
                agent_name,
                metadata: None,
            })
    } else {
        None
    };

    match issuer.issue(
        &req.participant_name,
        &room,
        dispatch,
        state.config.token_ttl_seconds,
    ) {
        Ok(token) => {
            tracing::info!(room = %room, participant = %req.participant_name, "credential issued");
            Json(TokenResponse {
                token,
                url: state.config.transport_url.clone(),
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!("failed to issue credential: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to issue credential")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Claim set the provider signs over each webhook delivery: a digest of
/// the exact body bytes, plus the usual freshness claims.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct WebhookClaims {
    iss: String,
    exp: i64,
    sha256: String,
}

#[derive(Debug, serde::Deserialize)]
struct WebhookEvent {
    event: String,
    #[serde(default)]
    room: Option<RoomRef>,
    #[serde(default)]
    participant: Option<ParticipantRef>,
}

#[derive(Debug, serde::Deserialize)]
struct RoomRef {
    name: String,
}

#[derive(Debug, serde::Deserialize)]
struct ParticipantRef {
    identity: String,
}

/// Provider event sink. Fire-and-forget: verification or handling
/// failures are logged and the response is 200 regardless, so the
/// provider never retries against us.
async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    match parse_webhook(&state.config, &headers, &body) {
        Ok(event) => handle_webhook_event(&state, event),
        Err(e) => tracing::warn!("webhook rejected: {:#}", e),
    }
    StatusCode::OK
}

fn parse_webhook(
    config: &Config,
    headers: &HeaderMap,
    body: &[u8],
) -> anyhow::Result<WebhookEvent> {
    match (&config.signing_key, &config.signing_secret) {
        (Some(key), Some(secret)) => verify_signature(key, secret.expose_secret(), headers, body)?,
        _ => {
            // Local/dev mode: no shared credentials to check against.
            tracing::warn!("no signing secret configured; accepting unverified webhook");
        }
    }
    Ok(serde_json::from_slice(body)?)
}

fn verify_signature(
    key: &str,
    secret: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> anyhow::Result<()> {
    let auth = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("missing signature header"))?;
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    let mut validation = jsonwebtoken::Validation::default();
    validation.leeway = 0;
    validation.set_issuer(&[key]);
    let claims = jsonwebtoken::decode::<WebhookClaims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?
    .claims;

    let digest = base64::engine::general_purpose::STANDARD.encode(Sha256::digest(body));
    if claims.sha256 != digest {
        anyhow::bail!("body digest mismatch");
    }
    Ok(())
}

fn handle_webhook_event(state: &AppState, event: WebhookEvent) {
    tracing::info!(event = %event.event, "webhook event received");
    if event.event != "participant_joined" {
        return;
    }
    let Some(room) = event.room else { return };
    let Some(participant) = event.participant else {
        return;
    };
    if participant.identity.starts_with(AGENT_IDENTITY_PREFIX) {
        return;
    }
    // Dispatch only when it was not already embedded in the token.
    if state.config.embed_dispatch {
        return;
    }
    let Some(agent_name) = state.config.agent_name.clone() else {
        return;
    };
    let http = state.http.clone();
    let endpoint = dispatch_endpoint(&state.config.transport_url);
    let room_name = room.name;
    tokio::spawn(async move {
        let body = serde_json::json!({ "room": &room_name, "agent_name": &agent_name });
        match http.post(&endpoint).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(room = %room_name, agent = %agent_name, "agent dispatched");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "agent dispatch refused");
            }
            Err(e) => tracing::warn!("agent dispatch failed: {}", e),
        }
    });
}

/// The transport URL is a WebSocket endpoint; the dispatch API lives on
/// its HTTP sibling.
fn dispatch_endpoint(transport_url: &str) -> String {
    let base = transport_url
        .replacen("wss://", "https://", 1)
        .replacen("ws://", "http://", 1);
    format!("{}/agents/dispatch", base.trim_end_matches('/'))
}
