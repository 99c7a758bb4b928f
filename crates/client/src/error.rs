/// Failure taxonomy for the session layer.
///
/// Everything raised during `start()` aborts the session and returns the
/// controller to `Disconnected`; nothing is retried automatically. Failures
/// on the stop path are logged and swallowed so disconnect always completes.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Non-2xx from the credential endpoint, or the request never made it.
    #[error("credential request failed: {0}")]
    CredentialRequest(String),
    /// The unlock step failed on a platform where that is fatal.
    #[error("audio unlock failed: {hint}")]
    AudioUnlock { hint: String },
    /// The enable-microphone call was refused.
    #[error("microphone permission denied: {hint}")]
    MicrophonePermission { hint: String },
    #[error("transport failure: {0}")]
    Transport(String),
    /// `start()` called while a session is connecting or connected.
    #[error("a session is already active")]
    AlreadyActive,
    /// Microphone toggles are refused once stop is committed.
    #[error("microphone is locked while the evaluation wait is in progress")]
    EvaluationInProgress,
    #[error("not connected")]
    NotConnected,
}
