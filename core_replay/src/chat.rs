use std::time::{SystemTime, UNIX_EPOCH};

use replay_runtime::SpeakData;
use serde::Serialize;

use crate::config::ReplayConfig;

/// One rendered line of the chat view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub nick: String,
    pub color: String,
    pub text: String,
    pub time: i64,
}

impl ChatMessage {
    /// Team messages show the speaker as `*id*`.
    pub fn from_speak(speak: &SpeakData, config: &ReplayConfig, now: i64) -> Self {
        let nick = if speak.team_name.is_empty() {
            speak.id.clone()
        } else {
            format!("*{}*", speak.id)
        };
        Self {
            nick,
            color: config.side_color(speak.side).to_string(),
            text: speak.message.clone(),
            time: speak.time.unwrap_or(now),
        }
    }
}

/// Decides which speak commands reach the chat view.
#[derive(Debug, Clone, Copy)]
pub struct ChatFilter<'a> {
    config: &'a ReplayConfig,
}

impl<'a> ChatFilter<'a> {
    pub fn new(config: &'a ReplayConfig) -> Self {
        Self { config }
    }

    pub fn allows(&self, speak: &SpeakData) -> bool {
        !self.config.is_ignored(&speak.id)
            && self.config.should_show_lobby_join(&speak.id, &speak.message)
    }
}

/// Session-owned cache of rendered chat lines. Cleared on teardown.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
