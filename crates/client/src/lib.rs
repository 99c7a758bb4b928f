//! Client-side session core for the voice-coaching front end.
//!
//! The interesting parts live in three places: the audio unlock
//! sequencer ([`unlock`]), the session lifecycle controller
//! ([`session`]), and the evaluation wait coordinator ([`evaluation`]).
//! Everything else is the plumbing those three need: a credential
//! fetcher, a platform classifier, a playback-sink seam, and a thin
//! WebSocket signaling transport.

pub mod config;
pub mod credential;
pub mod error;
pub mod evaluation;
pub mod platform;
pub mod session;
pub mod sink;
pub mod transport;
pub mod unlock;

pub use voxcoach_types as types;

pub use config::{ClientConfig, ClientConfigBuilder};
pub use credential::{Credential, CredentialProvider, HttpCredentialProvider};
pub use error::SessionError;
pub use platform::Platform;
pub use session::{SessionController, SessionState, UiState};
pub use sink::{PlaybackSink, TraceSink};
pub use transport::{ws::WsTransport, AudioPublishOptions, Transport};
