//! Session configuration, fixed at controller construction time.
//!
//! Everything the session layer used to pick up from ambient globals in
//! earlier variants of this UI is an explicit value here: the grace
//! window is tunable (the summarization pipeline's latency is not ours to
//! control) and debug verbosity is a constructor-time flag, not a
//! window-level toggle.

use std::time::Duration;

use uuid::Uuid;

use crate::transport::AudioPublishOptions;

pub const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(45);
pub const DEFAULT_AGENT_IDENTITY_PREFIX: &str = "agent-";

pub struct ClientConfig {
    participant_name: String,
    room_name: Option<String>,
    user_agent: String,
    grace_window: Duration,
    agent_identity_prefix: String,
    publish: AudioPublishOptions,
    debug: bool,
}

pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::new(),
        }
    }

    pub fn with_participant_name(mut self, name: &str) -> Self {
        self.config.participant_name = name.to_string();
        self
    }

    pub fn with_room_name(mut self, room: &str) -> Self {
        self.config.room_name = Some(room.to_string());
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.config.user_agent = user_agent.to_string();
        self
    }

    pub fn with_grace_window(mut self, grace: Duration) -> Self {
        self.config.grace_window = grace;
        self
    }

    pub fn with_agent_identity_prefix(mut self, prefix: &str) -> Self {
        self.config.agent_identity_prefix = prefix.to_string();
        self
    }

    pub fn with_publish_options(mut self, publish: AudioPublishOptions) -> Self {
        self.config.publish = publish;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            participant_name: generate_participant_name(),
            room_name: None,
            user_agent: String::new(),
            grace_window: DEFAULT_GRACE_WINDOW,
            agent_identity_prefix: DEFAULT_AGENT_IDENTITY_PREFIX.to_string(),
            publish: AudioPublishOptions::default(),
            debug: false,
        }
    }

    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn participant_name(&self) -> &str {
        &self.participant_name
    }

    pub fn room_name(&self) -> Option<&str> {
        self.room_name.as_deref()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn grace_window(&self) -> Duration {
        self.grace_window
    }

    pub fn agent_identity_prefix(&self) -> &str {
        &self.agent_identity_prefix
    }

    pub fn publish(&self) -> &AudioPublishOptions {
        &self.publish
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Generated participant identity, unique enough per tab.
fn generate_participant_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("user-{}", &id[..8])
}
