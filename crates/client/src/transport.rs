//! Transport seam.
//!
//! The media cloud does the heavy lifting (negotiation, encoding,
//! reconnection); the session layer consumes it through this trait as
//! connect / publish / subscribe / disconnect plus a room-event stream.

use voxcoach_types::{ClientSignal, ServerWireEvent};

use crate::credential::Credential;
use crate::error::SessionError;

pub mod ws;

/// Receiver side of the room-event broadcast.
pub type RoomRx = tokio::sync::broadcast::Receiver<ServerWireEvent>;

/// Constrained publish profile for the local microphone: voice bitrate,
/// discontinuous transmission, forward error correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPublishOptions {
    pub bitrate: u32,
    pub dtx: bool,
    pub fec: bool,
}

impl Default for AudioPublishOptions {
    fn default() -> Self {
        Self {
            bitrate: 20_000,
            dtx: true,
            fec: true,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Open the room session with a single-use credential. Returns the
    /// stream of room events for this connection.
    async fn connect(&mut self, credential: &Credential) -> Result<RoomRx, SessionError>;

    /// Publish a data-channel signal to the room (reliable ordering).
    async fn publish_data(&self, signal: &ClientSignal) -> Result<(), SessionError>;

    /// Enable or disable the local microphone with the given profile.
    async fn set_microphone(
        &self,
        enabled: bool,
        options: &AudioPublishOptions,
    ) -> Result<(), SessionError>;

    /// Leave the room and tear down the connection. Infallible; stop must
    /// always complete.
    async fn disconnect(&mut self);
}
