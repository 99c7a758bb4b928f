//! Thin WebSocket signaling client for the media cloud.
//!
//! One mpsc channel carries outgoing frames into a send task; a recv task
//! parses incoming frames and broadcasts them to however many subscribers
//! the session layer needs. Malformed frames are logged and dropped.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use voxcoach_types::{ClientSignal, ClientWireEvent, ServerWireEvent};

use crate::credential::Credential;
use crate::error::SessionError;
use crate::transport::{AudioPublishOptions, RoomRx, Transport};

type WireTx = tokio::sync::mpsc::Sender<ClientWireEvent>;
type EventTx = tokio::sync::broadcast::Sender<ServerWireEvent>;

const AUTHORIZATION_HEADER: &str = "Authorization";
const DEFAULT_CAPACITY: usize = 256;

pub struct WsTransport {
    capacity: usize,
    c_tx: Option<WireTx>,
    s_tx: Option<EventTx>,
    send_handle: Option<tokio::task::JoinHandle<()>>,
    recv_handle: Option<tokio::task::JoinHandle<()>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            c_tx: None,
            s_tx: None,
            send_handle: None,
            recv_handle: None,
        }
    }

    fn build_request(
        credential: &Credential,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, SessionError> {
        let mut request = format!("{}/rtc", credential.url.trim_end_matches('/'))
            .into_client_request()
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        let bearer = format!("Bearer {}", credential.token)
            .parse()
            .map_err(|_| SessionError::Transport("credential is not header-safe".to_string()))?;
        request.headers_mut().insert(AUTHORIZATION_HEADER, bearer);
        Ok(request)
    }

    async fn send_wire_event(&self, event: ClientWireEvent) -> Result<(), SessionError> {
        match self.c_tx {
            Some(ref tx) => tx
                .send(event)
                .await
                .map_err(|_| SessionError::Transport("signaling channel closed".to_string())),
            None => Err(SessionError::NotConnected),
        }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn connect(&mut self, credential: &Credential) -> Result<RoomRx, SessionError> {
        if self.c_tx.is_some() {
            return Err(SessionError::AlreadyActive);
        }

        let request = Self::build_request(credential)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel(self.capacity);
        let (s_tx, s_rx) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx);
        self.s_tx = Some(s_tx.clone());

        self.send_handle = Some(tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send signaling frame: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize signaling frame: {}", e);
                    }
                }
            }
            // Outgoing channel closed: say goodbye to the server.
            let _ = write.send(Message::Close(None)).await;
        }));

        self.recv_handle = Some(tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read signaling frame: {}", e);
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<ServerWireEvent>(&text) {
                        Ok(event) => {
                            if let Err(e) = s_tx.send(event) {
                                tracing::debug!("no subscribers for room event: {}", e);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("dropping malformed signaling frame: {}", e);
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary frame: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("signaling connection closed: {:?}", reason);
                        let event = ServerWireEvent::Disconnected {
                            reason: reason.map(|r| r.reason.to_string()),
                        };
                        if let Err(e) = s_tx.send(event) {
                            tracing::debug!("no subscribers for close event: {}", e);
                        }
                        break;
                    }
                    _ => {}
                }
            }
        }));

        Ok(s_rx)
    }

    async fn publish_data(&self, signal: &ClientSignal) -> Result<(), SessionError> {
        let payload = serde_json::to_value(signal)
            .map_err(|e| SessionError::Transport(format!("failed to encode signal: {e}")))?;
        self.send_wire_event(ClientWireEvent::PublishData { payload })
            .await
    }

    async fn set_microphone(
        &self,
        enabled: bool,
        options: &AudioPublishOptions,
    ) -> Result<(), SessionError> {
        self.send_wire_event(ClientWireEvent::SetMicrophone {
            enabled,
            bitrate: options.bitrate,
            dtx: options.dtx,
            fec: options.fec,
        })
        .await
    }

    async fn disconnect(&mut self) {
        if let Some(tx) = self.c_tx.take() {
            if let Err(e) = tx.send(ClientWireEvent::Leave).await {
                tracing::debug!("leave not delivered, channel already closed: {}", e);
            }
            // Dropping the sender ends the send task, which closes the socket.
        }
        self.s_tx = None;
        if let Some(handle) = self.send_handle.take() {
            if let Err(e) = handle.await {
                tracing::debug!("send task ended abnormally: {}", e);
            }
        }
        if let Some(handle) = self.recv_handle.take() {
            handle.abort();
        }
    }
}
