//! JSON frames exchanged with the media cloud's signaling channel.
//!
//! The transport itself (negotiation, encoding, reconnection) lives on the
//! other side of this channel; these frames only cover what the session
//! layer observes: room membership, track lifecycle, and data messages.

/// Frames the client sends to the signaling channel.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientWireEvent {
    /// Publish an application payload over the reliable data channel.
    #[serde(rename = "publish_data")]
    PublishData { payload: serde_json::Value },
    /// Enable or disable the local microphone with a publish profile.
    #[serde(rename = "set_microphone")]
    SetMicrophone {
        enabled: bool,
        bitrate: u32,
        dtx: bool,
        fec: bool,
    },
    /// Leave the room. The server closes the channel afterwards.
    #[serde(rename = "leave")]
    Leave,
}

/// Frames the signaling channel delivers to the client.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerWireEvent {
    /// The join completed; the local participant is in the room.
    #[serde(rename = "connected")]
    Connected { room: String },
    #[serde(rename = "participant_joined")]
    ParticipantJoined { identity: String },
    #[serde(rename = "participant_left")]
    ParticipantLeft { identity: String },
    /// A remote audio track became available for playback.
    #[serde(rename = "track_subscribed")]
    TrackSubscribed {
        participant_identity: String,
        track_sid: String,
    },
    #[serde(rename = "track_unsubscribed")]
    TrackUnsubscribed {
        participant_identity: String,
        track_sid: String,
    },
    /// An application payload from another participant's data channel.
    #[serde(rename = "data")]
    Data { payload: serde_json::Value },
    /// The room connection ended, whether requested or not.
    #[serde(rename = "disconnected")]
    Disconnected { reason: Option<String> },
}
