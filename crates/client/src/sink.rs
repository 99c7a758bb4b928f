//! The playback sink: one persistent audio-output element plus one
//! audio-processing context, owned by the session controller for the
//! lifetime of the tab. Only the controller and the unlock sequencer may
//! touch it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
}

#[derive(Debug, thiserror::Error)]
#[error("playback sink failure: {0}")]
pub struct SinkError(pub String);

/// Seam between the session layer and the host's audio output.
///
/// A host embedding this crate provides the real element/context pair;
/// tests substitute a recording double.
#[cfg_attr(test, mockall::automock)]
pub trait PlaybackSink: Send {
    /// Create the persistent output element (autoplay, unmuted, inline)
    /// if it does not exist yet. Returns true when this call created it.
    fn ensure_element(&mut self) -> Result<bool, SinkError>;

    /// Number of persistent output elements currently alive. Never more
    /// than one.
    fn element_count(&self) -> usize;

    fn context_state(&self) -> ContextState;

    fn resume_context(&mut self) -> Result<(), SinkError>;

    /// Play a short locally-embedded sample through a transient element.
    fn play_unlock_tone(&mut self, tone: &[u8]) -> Result<(), SinkError>;

    /// Bind a subscribed remote track to the output element and play it.
    fn attach_track(&mut self, track_sid: &str) -> Result<(), SinkError>;

    fn detach_track(&mut self, track_sid: &str);

    /// Mute/unmute local playback without detaching tracks.
    fn set_silenced(&mut self, silenced: bool);

    /// Remove the element and close the context. Called on unmount.
    fn teardown(&mut self);
}

/// Sink that only records state and logs; used by the headless CLI and
/// as a reference for host integrations.
#[derive(Debug, Default)]
pub struct TraceSink {
    element: bool,
    context: Option<ContextState>,
    attached: Vec<String>,
    silenced: bool,
}

impl TraceSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackSink for TraceSink {
    fn ensure_element(&mut self) -> Result<bool, SinkError> {
        if self.element {
            return Ok(false);
        }
        tracing::debug!("creating persistent playback element");
        self.element = true;
        if self.context.is_none() {
            self.context = Some(ContextState::Suspended);
        }
        Ok(true)
    }

    fn element_count(&self) -> usize {
        usize::from(self.element)
    }

    fn context_state(&self) -> ContextState {
        self.context.unwrap_or(ContextState::Suspended)
    }

    fn resume_context(&mut self) -> Result<(), SinkError> {
        tracing::debug!("resuming audio context");
        self.context = Some(ContextState::Running);
        Ok(())
    }

    fn play_unlock_tone(&mut self, tone: &[u8]) -> Result<(), SinkError> {
        tracing::debug!(bytes = tone.len(), "playing unlock tone");
        Ok(())
    }

    fn attach_track(&mut self, track_sid: &str) -> Result<(), SinkError> {
        tracing::debug!(track_sid, "attaching remote track");
        if !self.attached.iter().any(|sid| sid == track_sid) {
            self.attached.push(track_sid.to_string());
        }
        Ok(())
    }

    fn detach_track(&mut self, track_sid: &str) {
        tracing::debug!(track_sid, "detaching remote track");
        self.attached.retain(|sid| sid != track_sid);
    }

    fn set_silenced(&mut self, silenced: bool) {
        self.silenced = silenced;
    }

    fn teardown(&mut self) {
        tracing::debug!("tearing down playback sink");
        self.element = false;
        self.context = None;
        self.attached.clear();
        self.silenced = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_sink_keeps_a_single_element() {
        let mut sink = TraceSink::new();
        assert_eq!(sink.element_count(), 0);
        assert!(sink.ensure_element().unwrap());
        assert!(!sink.ensure_element().unwrap());
        assert_eq!(sink.element_count(), 1);
        sink.teardown();
        assert_eq!(sink.element_count(), 0);
    }

    #[test]
    fn trace_sink_tracks_attachments() {
        let mut sink = TraceSink::new();
        sink.attach_track("TR_1").unwrap();
        sink.attach_track("TR_1").unwrap();
        assert_eq!(sink.attached.len(), 1);
        sink.detach_track("TR_1");
        assert!(sink.attached.is_empty());
    }
}
