//! Audio unlock sequencer.
//!
//! Browser autoplay policies require audio playback to originate from a
//! user gesture. The remote track arrives asynchronously, long after the
//! gesture that started the session, so an explicit unlock anchored to
//! that gesture is needed to guarantee later unprompted playback: create
//! the persistent element, resume the processing context, and push a
//! near-silent sample through it while the gesture scope is still warm.

use base64::Engine;

use crate::error::SessionError;
use crate::platform::{Platform, IOS_UNLOCK_HINT};
use crate::sink::{ContextState, PlaybackSink, SinkError};

/// A tiny silent WAV compiled into the crate; enough to satisfy the
/// gesture requirement without being audible.
const UNLOCK_TONE_B64: &str = "UklGRmQAAABXQVZFZm10IBAAAAABAAEAQB8AAIA+AAACABAAZGF0YUAAAAAAAAAA\
AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

fn unlock_tone() -> Vec<u8> {
    // The constant is well-formed; a decode failure would be a build bug,
    // and an empty tone only degrades the unlock attempt.
    base64::engine::general_purpose::STANDARD
        .decode(UNLOCK_TONE_B64)
        .unwrap_or_default()
}

/// Tracks whether the gesture-scoped unlock has succeeded for this tab.
#[derive(Debug, Default)]
pub struct UnlockSequencer {
    unlocked: bool,
}

impl UnlockSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Run the unlock protocol against the sink. On the restrictive iOS
    /// class a failure aborts session start; elsewhere it is logged and
    /// remote audio is left to autoplay once the stream attaches.
    pub fn run(
        &mut self,
        sink: &mut dyn PlaybackSink,
        platform: Platform,
    ) -> Result<(), SessionError> {
        match self.try_unlock(sink) {
            Ok(()) => {
                self.unlocked = true;
                tracing::debug!("audio unlock succeeded");
                Ok(())
            }
            Err(e) => {
                self.unlocked = false;
                if platform.unlock_required() {
                    tracing::error!("audio unlock failed on restrictive platform: {}", e);
                    return Err(SessionError::AudioUnlock {
                        hint: IOS_UNLOCK_HINT.to_string(),
                    });
                }
                tracing::warn!("audio unlock failed ({}); continuing without it", e);
                Ok(())
            }
        }
    }

    fn try_unlock(&mut self, sink: &mut dyn PlaybackSink) -> Result<(), SinkError> {
        sink.ensure_element()?;
        if sink.context_state() == ContextState::Suspended {
            sink.resume_context()?;
        }
        sink.play_unlock_tone(&unlock_tone())
    }
}
