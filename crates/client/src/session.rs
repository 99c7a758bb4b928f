//! Session lifecycle controller.
//!
//! Owns the `disconnected → connecting → connected → (evaluating) →
//! disconnected` transition, reacts to room events, and publishes
//! UI-visible state over a watch channel. One controller per tab; at most
//! one session active at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use voxcoach_types::{AgentSignal, ClientSignal, EvaluationPayload, ServerWireEvent};

use crate::config::ClientConfig;
use crate::credential::CredentialProvider;
use crate::error::SessionError;
use crate::evaluation::EvaluationGate;
use crate::platform::{self, Platform};
use crate::sink::PlaybackSink;
use crate::transport::{RoomRx, Transport};
use crate::unlock::UnlockSequencer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// Stop committed, waiting out the evaluation grace window.
    Evaluating,
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone)]
pub struct UiState {
    pub state: SessionState,
    pub muted: bool,
    pub agent_speaking: bool,
    pub evaluation_opted_in: bool,
    pub evaluation: Option<EvaluationPayload>,
    pub last_error: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            muted: false,
            agent_speaking: false,
            evaluation_opted_in: false,
            evaluation: None,
            last_error: None,
        }
    }
}

/// State shared with the room-event task. The epoch counter invalidates
/// in-flight handlers when a session ends: anything that resolves late
/// must check it before mutating shared state.
struct Shared {
    epoch: AtomicU64,
    ui: watch::Sender<UiState>,
    sink: Mutex<Box<dyn PlaybackSink>>,
    gate: Mutex<Option<Arc<EvaluationGate>>>,
    /// Track sid currently driving the agent-speaking indicator.
    agent_track: Mutex<Option<String>>,
}

impl Shared {
    fn update_ui(&self, f: impl FnOnce(&mut UiState)) {
        self.ui.send_modify(f);
    }
}

pub struct SessionController {
    config: ClientConfig,
    platform: Platform,
    provider: Box<dyn CredentialProvider>,
    transport: Box<dyn Transport>,
    unlock: UnlockSequencer,
    shared: Arc<Shared>,
    ui_rx: watch::Receiver<UiState>,
    event_task: Option<tokio::task::JoinHandle<()>>,
}

impl SessionController {
    pub fn new(
        config: ClientConfig,
        provider: Box<dyn CredentialProvider>,
        transport: Box<dyn Transport>,
        sink: Box<dyn PlaybackSink>,
    ) -> Self {
        let platform = Platform::classify(config.user_agent());
        let (ui_tx, ui_rx) = watch::channel(UiState::default());
        Self {
            config,
            platform,
            provider,
            transport,
            unlock: UnlockSequencer::new(),
            shared: Arc::new(Shared {
                epoch: AtomicU64::new(0),
                ui: ui_tx,
                sink: Mutex::new(sink),
                gate: Mutex::new(None),
                agent_track: Mutex::new(None),
            }),
            ui_rx,
            event_task: None,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Subscribe to UI state changes.
    pub fn ui_state(&self) -> watch::Receiver<UiState> {
        self.ui_rx.clone()
    }

    pub fn current(&self) -> UiState {
        self.ui_rx.borrow().clone()
    }

    /// Start a session. Guarded against re-entry; any failure aborts the
    /// start, surfaces a human-readable hint, and returns the controller
    /// to `Disconnected`. Nothing is retried automatically.
    pub async fn start(&mut self, evaluation_opted_in: bool) -> Result<(), SessionError> {
        if self.current().state != SessionState::Disconnected {
            return Err(SessionError::AlreadyActive);
        }

        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        // Reset prior evaluation state; the gate lives for this session only.
        if let Ok(mut gate) = self.shared.gate.lock() {
            *gate = Some(Arc::new(EvaluationGate::new()));
        }
        if let Ok(mut agent) = self.shared.agent_track.lock() {
            *agent = None;
        }
        self.shared.update_ui(|ui| {
            *ui = UiState {
                state: SessionState::Connecting,
                evaluation_opted_in,
                ..UiState::default()
            };
        });

        match self.start_inner(epoch, evaluation_opted_in).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!("session start failed: {}", e);
                self.transport.disconnect().await;
                if let Some(task) = self.event_task.take() {
                    task.abort();
                }
                self.shared.update_ui(|ui| {
                    ui.state = SessionState::Disconnected;
                    ui.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    async fn start_inner(
        &mut self,
        epoch: u64,
        evaluation_opted_in: bool,
    ) -> Result<(), SessionError> {
        let credential = self
            .provider
            .fetch(self.config.participant_name(), self.config.room_name())
            .await?;

        // Unlock while the user-gesture scope is still warm, before any
        // remote audio can arrive.
        {
            let mut sink = self
                .shared
                .sink
                .lock()
                .map_err(|_| SessionError::Transport("playback sink poisoned".to_string()))?;
            self.unlock.run(sink.as_mut(), self.platform)?;
        }

        let mut events = self.transport.connect(&credential).await?;

        // The credential was single-use; from here only the event stream
        // tells us whether the join landed.
        loop {
            match events.recv().await {
                Ok(ServerWireEvent::Connected { room }) => {
                    tracing::info!(room = %room, "room joined");
                    break;
                }
                Ok(ServerWireEvent::Disconnected { reason }) => {
                    return Err(SessionError::Transport(format!(
                        "disconnected during join: {reason:?}"
                    )));
                }
                Ok(other) => {
                    if self.config.debug() {
                        tracing::debug!(?other, "room event before join completed");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "room event stream lagged during join");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SessionError::Transport(
                        "signaling closed during join".to_string(),
                    ));
                }
            }
        }

        self.shared
            .update_ui(|ui| ui.state = SessionState::Connected);

        // Microphone denial is not fatal: the session continues listen-only
        // with a browser-specific remediation hint.
        if let Err(e) = self
            .transport
            .set_microphone(true, self.config.publish())
            .await
        {
            let hint = platform::mic_permission_hint(self.config.user_agent()).to_string();
            tracing::warn!("microphone enable failed ({}); continuing listen-only", e);
            self.shared.update_ui(|ui| {
                ui.muted = true;
                ui.last_error = Some(SessionError::MicrophonePermission { hint }.to_string());
            });
        }

        // Only after unlock success and transport connect, never before.
        self.transport
            .publish_data(&ClientSignal::Evaluate {
                value: evaluation_opted_in,
            })
            .await?;

        self.spawn_event_task(epoch, events);
        Ok(())
    }

    fn spawn_event_task(&mut self, epoch: u64, mut events: RoomRx) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        let shared = self.shared.clone();
        let agent_prefix = self.config.agent_identity_prefix().to_string();
        let debug = self.config.debug();
        self.event_task = Some(tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "room event stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                // A stale task must never mutate state for a later session.
                if shared.epoch.load(Ordering::SeqCst) != epoch {
                    break;
                }
                if debug {
                    tracing::debug!(?event, "room event");
                }
                if !handle_room_event(&shared, &agent_prefix, event) {
                    break;
                }
            }
        }));
    }

    /// Toggle the local microphone with the same constrained publish
    /// profile used at connect. Refused once stop is committed.
    pub async fn set_microphone(&mut self, enabled: bool) -> Result<(), SessionError> {
        match self.current().state {
            SessionState::Connected => {}
            SessionState::Evaluating => return Err(SessionError::EvaluationInProgress),
            _ => return Err(SessionError::NotConnected),
        }
        if let Err(e) = self
            .transport
            .set_microphone(enabled, self.config.publish())
            .await
        {
            tracing::warn!("microphone toggle failed: {}", e);
            let hint = platform::mic_permission_hint(self.config.user_agent()).to_string();
            return Err(SessionError::MicrophonePermission { hint });
        }
        self.shared.update_ui(|ui| ui.muted = !enabled);
        Ok(())
    }

    /// Stop the session. When evaluation was opted in and no result has
    /// arrived, this waits out the grace window first; either way the
    /// transport is disconnected and the state returns to `Disconnected`.
    /// Failures on this path are logged and swallowed.
    pub async fn stop(&mut self) {
        let snapshot = self.current();
        if snapshot.state == SessionState::Disconnected {
            return;
        }

        let gate = self.shared.gate.lock().ok().and_then(|g| g.clone());
        let wants_wait = snapshot.state == SessionState::Connected
            && snapshot.evaluation_opted_in
            && gate.as_ref().map(|g| !g.has_result()).unwrap_or(false);

        if wants_wait {
            self.shared
                .update_ui(|ui| ui.state = SessionState::Evaluating);

            // Responsiveness first: mute and silence before the wait.
            if let Err(e) = self
                .transport
                .set_microphone(false, self.config.publish())
                .await
            {
                tracing::warn!("failed to mute microphone during stop: {}", e);
            }
            self.shared.update_ui(|ui| ui.muted = true);
            if let Ok(mut sink) = self.shared.sink.lock() {
                sink.set_silenced(true);
            }

            match self
                .transport
                .publish_data(&ClientSignal::RequestEvaluation)
                .await
            {
                Ok(()) => {
                    if let Some(gate) = gate {
                        if let Some(result) = gate.wait(self.config.grace_window()).await {
                            self.shared
                                .update_ui(|ui| ui.evaluation = Some(result));
                        }
                    }
                }
                Err(e) => tracing::warn!("failed to request evaluation: {}", e),
            }
        }

        self.teardown_connection().await;
    }

    /// Tear down on component unmount: end any session immediately (no
    /// evaluation wait) and remove the playback sink.
    pub async fn shutdown(&mut self) {
        self.teardown_connection().await;
        if let Ok(mut sink) = self.shared.sink.lock() {
            sink.teardown();
        }
    }

    async fn teardown_connection(&mut self) {
        // Invalidate any in-flight handlers for this session.
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.transport.disconnect().await;
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        if let Ok(mut sink) = self.shared.sink.lock() {
            sink.set_silenced(false);
        }
        if let Ok(mut agent) = self.shared.agent_track.lock() {
            *agent = None;
        }
        self.shared.update_ui(|ui| {
            ui.state = SessionState::Disconnected;
            ui.muted = false;
            ui.agent_speaking = false;
        });
    }
}

/// Returns false when the session is over and the event task should end.
fn handle_room_event(shared: &Shared, agent_prefix: &str, event: ServerWireEvent) -> bool {
    match event {
        ServerWireEvent::TrackSubscribed {
            participant_identity,
            track_sid,
        } => {
            if let Ok(mut sink) = shared.sink.lock() {
                if let Err(e) = sink.attach_track(&track_sid) {
                    tracing::warn!("failed to attach track {}: {}", track_sid, e);
                }
            }
            if participant_identity.starts_with(agent_prefix) {
                if let Ok(mut agent) = shared.agent_track.lock() {
                    // At most one agent track drives the speaking indicator.
                    if agent.is_none() {
                        *agent = Some(track_sid);
                        shared.update_ui(|ui| ui.agent_speaking = true);
                    }
                }
            }
            true
        }
        ServerWireEvent::TrackUnsubscribed { track_sid, .. } => {
            if let Ok(mut sink) = shared.sink.lock() {
                sink.detach_track(&track_sid);
            }
            if let Ok(mut agent) = shared.agent_track.lock() {
                if agent.as_deref() == Some(track_sid.as_str()) {
                    *agent = None;
                    shared.update_ui(|ui| ui.agent_speaking = false);
                }
            }
            true
        }
        ServerWireEvent::Data { payload } => {
            match serde_json::from_value::<AgentSignal>(payload) {
                Ok(signal) => deliver_evaluation(shared, signal.into_payload()),
                Err(e) => tracing::warn!("dropping malformed data-channel message: {}", e),
            }
            true
        }
        ServerWireEvent::Disconnected { reason } => {
            // Transport-level disconnect outside explicit stop: reset UI
            // state, leave the evaluation path untouched.
            tracing::info!("transport disconnected: {:?}", reason);
            if let Ok(mut agent) = shared.agent_track.lock() {
                *agent = None;
            }
            shared.update_ui(|ui| {
                ui.state = SessionState::Disconnected;
                ui.agent_speaking = false;
            });
            false
        }
        ServerWireEvent::ParticipantJoined { identity } => {
            tracing::debug!(identity = %identity, "participant joined");
            true
        }
        ServerWireEvent::ParticipantLeft { identity } => {
            tracing::debug!(identity = %identity, "participant left");
            true
        }
        ServerWireEvent::Connected { .. } => true,
    }
}

fn deliver_evaluation(shared: &Shared, payload: EvaluationPayload) {
    let gate = shared.gate.lock().ok().and_then(|g| g.clone());
    match gate {
        Some(gate) => {
            if gate.deliver(payload) {
                let result = gate.result();
                shared.update_ui(|ui| ui.evaluation = result);
            } else {
                tracing::debug!("ignoring duplicate evaluation result");
            }
        }
        None => tracing::debug!("evaluation result arrived with no active session; dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, MockCredentialProvider};
    use crate::sink::{ContextState, SinkError};
    use crate::transport::{AudioPublishOptions, MockTransport};
    use std::time::Duration;
    use tokio::time::Instant;

    const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
    const IOS_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) \
         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";

    #[derive(Default)]
    struct SinkStats {
        element: bool,
        elements_created: usize,
        attached: Vec<String>,
        silenced: bool,
        torn_down: bool,
        fail_tone: bool,
    }

    /// Hand-rolled sink double whose state outlives the controller.
    struct SharedSink(Arc<Mutex<SinkStats>>);

    impl PlaybackSink for SharedSink {
        fn ensure_element(&mut self) -> Result<bool, SinkError> {
            let mut stats = self.0.lock().unwrap();
            if stats.element {
                return Ok(false);
            }
            stats.element = true;
            stats.elements_created += 1;
            Ok(true)
        }
        fn element_count(&self) -> usize {
            usize::from(self.0.lock().unwrap().element)
        }
        fn context_state(&self) -> ContextState {
            ContextState::Running
        }
        fn resume_context(&mut self) -> Result<(), SinkError> {
            Ok(())
        }
        fn play_unlock_tone(&mut self, _tone: &[u8]) -> Result<(), SinkError> {
            if self.0.lock().unwrap().fail_tone {
                return Err(SinkError("autoplay blocked".to_string()));
            }
            Ok(())
        }
        fn attach_track(&mut self, track_sid: &str) -> Result<(), SinkError> {
            self.0.lock().unwrap().attached.push(track_sid.to_string());
            Ok(())
        }
        fn detach_track(&mut self, track_sid: &str) {
            self.0.lock().unwrap().attached.retain(|sid| sid != track_sid);
        }
        fn set_silenced(&mut self, silenced: bool) {
            self.0.lock().unwrap().silenced = silenced;
        }
        fn teardown(&mut self) {
            let mut stats = self.0.lock().unwrap();
            stats.element = false;
            stats.torn_down = true;
        }
    }

    struct Harness {
        tx: broadcast::Sender<ServerWireEvent>,
        signals: Arc<Mutex<Vec<ClientSignal>>>,
        mic_calls: Arc<Mutex<Vec<(bool, AudioPublishOptions)>>>,
        sink_stats: Arc<Mutex<SinkStats>>,
        // Keeps the room-event channel open across sessions.
        _keepalive: broadcast::Receiver<ServerWireEvent>,
    }

    fn controller_with(config: ClientConfig) -> (SessionController, Harness) {
        let (tx, keepalive) = broadcast::channel(64);

        let signals: Arc<Mutex<Vec<ClientSignal>>> = Arc::new(Mutex::new(Vec::new()));
        let mic_calls: Arc<Mutex<Vec<(bool, AudioPublishOptions)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let sink_stats = Arc::new(Mutex::new(SinkStats::default()));

        let mut provider = MockCredentialProvider::new();
        provider.expect_fetch().returning(|_, _| {
            Ok(Credential {
                token: "signed-token".to_string(),
                url: "wss://cloud.example".to_string(),
            })
        });

        let mut transport = MockTransport::new();
        let connect_tx = tx.clone();
        transport.expect_connect().returning(move |_| {
            let rx = connect_tx.subscribe();
            // Join lands immediately in tests.
            let _ = connect_tx.send(ServerWireEvent::Connected {
                room: "room-test".to_string(),
            });
            Ok(rx)
        });
        let recorded = signals.clone();
        transport.expect_publish_data().returning(move |signal| {
            recorded.lock().unwrap().push(signal.clone());
            Ok(())
        });
        let mic = mic_calls.clone();
        transport
            .expect_set_microphone()
            .returning(move |enabled, options| {
                mic.lock().unwrap().push((enabled, options.clone()));
                Ok(())
            });
        transport.expect_disconnect().returning(|| ());

        let controller = SessionController::new(
            config,
            Box::new(provider),
            Box::new(transport),
            Box::new(SharedSink(sink_stats.clone())),
        );
        (
            controller,
            Harness {
                tx,
                signals,
                mic_calls,
                sink_stats,
                _keepalive: keepalive,
            },
        )
    }

    fn desktop_config() -> ClientConfig {
        ClientConfig::builder()
            .with_participant_name("user-1000")
            .with_user_agent(DESKTOP_UA)
            .with_grace_window(Duration::from_secs(10))
            .build()
    }

    async fn wait_for_ui(rx: &mut watch::Receiver<UiState>, pred: impl Fn(&UiState) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if pred(&rx.borrow()) {
                    return;
                }
                rx.changed().await.expect("ui channel closed");
            }
        })
        .await
        .expect("ui condition not reached in time");
    }

    fn ready_payload(summary: &str) -> serde_json::Value {
        serde_json::json!({
            "type": "evaluation_ready",
            "data": { "overall_score": 4.0, "summary": summary }
        })
    }

    #[tokio::test]
    async fn repeated_sessions_reuse_a_single_playback_element() {
        let (mut controller, harness) = controller_with(desktop_config());

        for _ in 0..2 {
            controller.start(false).await.unwrap();
            assert_eq!(controller.current().state, SessionState::Connected);
            assert_eq!(harness.sink_stats.lock().unwrap().elements_created, 1);
            controller.stop().await;
            assert_eq!(controller.current().state, SessionState::Disconnected);
        }

        controller.shutdown().await;
        let stats = harness.sink_stats.lock().unwrap();
        assert!(stats.torn_down);
        assert!(!stats.element);
    }

    #[tokio::test]
    async fn start_is_guarded_against_reentry() {
        let (mut controller, _harness) = controller_with(desktop_config());
        controller.start(false).await.unwrap();
        assert!(matches!(
            controller.start(false).await,
            Err(SessionError::AlreadyActive)
        ));
    }

    #[tokio::test]
    async fn mute_toggle_preserves_the_publish_profile() {
        let (mut controller, harness) = controller_with(desktop_config());
        controller.start(false).await.unwrap();

        controller.set_microphone(false).await.unwrap();
        assert!(controller.current().muted);
        controller.set_microphone(true).await.unwrap();
        assert!(!controller.current().muted);

        let calls = harness.mic_calls.lock().unwrap();
        // Enable at connect, then the two toggles.
        assert_eq!(
            calls.iter().map(|(enabled, _)| *enabled).collect::<Vec<_>>(),
            vec![true, false, true]
        );
        assert!(calls
            .iter()
            .all(|(_, options)| *options == AudioPublishOptions::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_opt_in_skips_the_evaluation_request() {
        let (mut controller, harness) = controller_with(desktop_config());
        controller.start(false).await.unwrap();

        let before = Instant::now();
        controller.stop().await;
        assert_eq!(before.elapsed(), Duration::ZERO);

        assert_eq!(controller.current().state, SessionState::Disconnected);
        let signals = harness.signals.lock().unwrap();
        assert_eq!(
            signals.as_slice(),
            &[ClientSignal::Evaluate { value: false }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn opted_in_stop_disconnects_within_the_grace_window() {
        let (mut controller, harness) = controller_with(desktop_config());
        controller.start(true).await.unwrap();

        let before = Instant::now();
        controller.stop().await;
        let elapsed = before.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed <= Duration::from_millis(10_500));

        let ui = controller.current();
        assert_eq!(ui.state, SessionState::Disconnected);
        assert!(ui.evaluation.is_none());
        assert!(harness
            .signals
            .lock()
            .unwrap()
            .contains(&ClientSignal::RequestEvaluation));
    }

    #[tokio::test(start_paused = true)]
    async fn result_arriving_during_the_wait_is_retained() {
        let (mut controller, harness) = controller_with(desktop_config());
        controller.start(true).await.unwrap();

        let tx = harness.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let _ = tx.send(ServerWireEvent::Data {
                payload: ready_payload("well handled objections"),
            });
        });

        let before = Instant::now();
        controller.stop().await;
        assert!(before.elapsed() < Duration::from_secs(10));

        let ui = controller.current();
        assert_eq!(ui.state, SessionState::Disconnected);
        assert_eq!(
            ui.evaluation.unwrap().summary.as_deref(),
            Some("well handled objections")
        );
    }

    #[tokio::test]
    async fn second_evaluation_result_does_not_overwrite_the_first() {
        let (mut controller, harness) = controller_with(desktop_config());
        controller.start(true).await.unwrap();
        let mut ui_rx = controller.ui_state();

        harness
            .tx
            .send(ServerWireEvent::Data {
                payload: ready_payload("first"),
            })
            .unwrap();
        wait_for_ui(&mut ui_rx, |ui| ui.evaluation.is_some()).await;

        harness
            .tx
            .send(ServerWireEvent::Data {
                payload: ready_payload("second"),
            })
            .unwrap();
        // An ordered marker event: once it is reflected, the duplicate
        // delivery has been processed too.
        harness
            .tx
            .send(ServerWireEvent::TrackSubscribed {
                participant_identity: "agent-coach".to_string(),
                track_sid: "TR_marker".to_string(),
            })
            .unwrap();
        wait_for_ui(&mut ui_rx, |ui| ui.agent_speaking).await;

        assert_eq!(
            controller.current().evaluation.unwrap().summary.as_deref(),
            Some("first")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn result_arriving_after_teardown_is_dropped() {
        let (mut controller, harness) = controller_with(desktop_config());
        controller.start(true).await.unwrap();
        controller.stop().await;
        assert_eq!(controller.current().state, SessionState::Disconnected);

        harness
            .tx
            .send(ServerWireEvent::Data {
                payload: ready_payload("too late"),
            })
            .unwrap();
        // The event task is gone; give any stray task a chance to run.
        tokio::task::yield_now().await;
        assert!(controller.current().evaluation.is_none());

        // A fresh session must not inherit the stale delivery either.
        controller.start(true).await.unwrap();
        assert!(controller.current().evaluation.is_none());
    }

    #[tokio::test]
    async fn malformed_data_payloads_are_dropped_without_ui_effect() {
        let (mut controller, harness) = controller_with(desktop_config());
        controller.start(true).await.unwrap();
        let mut ui_rx = controller.ui_state();

        harness
            .tx
            .send(ServerWireEvent::Data {
                payload: serde_json::json!({ "type": "speaker_stats", "level": 0.4 }),
            })
            .unwrap();
        // An ordered marker event proves the malformed frame was handled.
        harness
            .tx
            .send(ServerWireEvent::TrackSubscribed {
                participant_identity: "agent-coach".to_string(),
                track_sid: "TR_marker".to_string(),
            })
            .unwrap();
        wait_for_ui(&mut ui_rx, |ui| ui.agent_speaking).await;

        let ui = controller.current();
        assert_eq!(ui.state, SessionState::Connected);
        assert!(ui.evaluation.is_none());
        assert!(ui.last_error.is_none());
    }

    #[tokio::test]
    async fn agent_track_drives_the_speaking_indicator() {
        let (mut controller, harness) = controller_with(desktop_config());
        controller.start(false).await.unwrap();
        let mut ui_rx = controller.ui_state();

        harness
            .tx
            .send(ServerWireEvent::TrackSubscribed {
                participant_identity: "agent-coach".to_string(),
                track_sid: "TR_agent".to_string(),
            })
            .unwrap();
        wait_for_ui(&mut ui_rx, |ui| ui.agent_speaking).await;
        assert_eq!(harness.sink_stats.lock().unwrap().attached, ["TR_agent"]);

        harness
            .tx
            .send(ServerWireEvent::TrackUnsubscribed {
                participant_identity: "agent-coach".to_string(),
                track_sid: "TR_agent".to_string(),
            })
            .unwrap();
        wait_for_ui(&mut ui_rx, |ui| !ui.agent_speaking).await;
        assert!(harness.sink_stats.lock().unwrap().attached.is_empty());
    }

    #[tokio::test]
    async fn non_agent_tracks_do_not_mark_the_agent_speaking() {
        let (mut controller, harness) = controller_with(desktop_config());
        controller.start(false).await.unwrap();
        let mut ui_rx = controller.ui_state();

        harness
            .tx
            .send(ServerWireEvent::TrackSubscribed {
                participant_identity: "user-2000".to_string(),
                track_sid: "TR_user".to_string(),
            })
            .unwrap();
        // Wait for the attach to land, then check the flag stayed down.
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if !harness.sink_stats.lock().unwrap().attached.is_empty() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(!ui_rx.borrow().agent_speaking);
    }

    #[tokio::test]
    async fn unexpected_disconnect_resets_ui_state() {
        let (mut controller, harness) = controller_with(desktop_config());
        controller.start(true).await.unwrap();
        let mut ui_rx = controller.ui_state();

        harness
            .tx
            .send(ServerWireEvent::Disconnected {
                reason: Some("network loss".to_string()),
            })
            .unwrap();
        wait_for_ui(&mut ui_rx, |ui| ui.state == SessionState::Disconnected).await;

        let ui = controller.current();
        assert!(!ui.agent_speaking);
        // The evaluation path is untouched by a transport-level drop.
        assert!(ui.evaluation.is_none());
        assert!(ui.evaluation_opted_in);
    }

    #[tokio::test]
    async fn unlock_failure_is_fatal_only_on_restrictive_ios() {
        let ios_config = ClientConfig::builder()
            .with_participant_name("user-1000")
            .with_user_agent(IOS_UA)
            .build();
        let (mut controller, harness) = controller_with(ios_config);
        harness.sink_stats.lock().unwrap().fail_tone = true;

        let err = controller.start(false).await.unwrap_err();
        assert!(matches!(err, SessionError::AudioUnlock { .. }));
        let ui = controller.current();
        assert_eq!(ui.state, SessionState::Disconnected);
        assert!(ui.last_error.is_some());

        // Same failure on desktop: session start proceeds.
        let (mut controller, harness) = controller_with(desktop_config());
        harness.sink_stats.lock().unwrap().fail_tone = true;
        controller.start(false).await.unwrap();
        assert_eq!(controller.current().state, SessionState::Connected);
    }

    #[tokio::test]
    async fn microphone_toggle_is_refused_after_stop() {
        let (mut controller, _harness) = controller_with(desktop_config());
        controller.start(false).await.unwrap();
        controller.stop().await;
        assert!(matches!(
            controller.set_microphone(true).await,
            Err(SessionError::NotConnected)
        ));
    }
}
