use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use replay_runtime::SideNumber;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BUILTIN_REPLAY_CONFIG: &str = include_str!("data/replay_config.json");

/// Which "has logged into the lobby" notices reach the chat view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyJoins {
    None,
    #[default]
    Friends,
    All,
}

const DEFAULT_SIDE_COLORS: [&str; 9] = [
    "red", "blue", "green", "purple", "black", "brown", "orange", "white", "teal",
];

/// Engine tunables shared by every peer of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "bevy_support", derive(bevy_ecs::prelude::Resource))]
#[serde(default)]
pub struct ReplayConfig {
    /// Attach unit checksums to synced actions and verify blocks to turn ends.
    pub mp_debug: bool,
    /// Sleep between polls while waiting on a remote decision.
    pub remote_poll_interval_ms: u64,
    pub message_bell: bool,
    pub lobby_joins: LobbyJoins,
    pub friends: Vec<String>,
    pub ignored_speakers: Vec<String>,
    pub observer_color: String,
    pub side_colors: Vec<String>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            mp_debug: false,
            remote_poll_interval_ms: 10,
            message_bell: true,
            lobby_joins: LobbyJoins::Friends,
            friends: Vec::new(),
            ignored_speakers: Vec::new(),
            observer_color: "white".to_string(),
            side_colors: DEFAULT_SIDE_COLORS.iter().map(|color| color.to_string()).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReplayConfigError {
    #[error("failed to parse replay config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read replay config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReplayConfig {
    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_REPLAY_CONFIG).expect("builtin replay config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, ReplayConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ReplayConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ReplayConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn remote_poll_interval(&self) -> Duration {
        Duration::from_millis(self.remote_poll_interval_ms)
    }

    pub fn is_ignored(&self, speaker: &str) -> bool {
        self.ignored_speakers.iter().any(|name| name == speaker)
    }

    pub fn is_friend(&self, nick: &str) -> bool {
        self.friends.iter().any(|name| name == nick)
    }

    /// Anything other than a server lobby-join notice is always shown.
    pub fn should_show_lobby_join(&self, sender: &str, message: &str) -> bool {
        if sender != "server" {
            return true;
        }
        let Some(pos) = message.find(" has logged into the lobby") else {
            return true;
        };
        match self.lobby_joins {
            LobbyJoins::None => false,
            LobbyJoins::All => true,
            LobbyJoins::Friends => self.is_friend(&message[..pos]),
        }
    }

    /// Display colour for a chat line; side 0 is an observer.
    pub fn side_color(&self, side: SideNumber) -> &str {
        if side == 0 || self.side_colors.is_empty() {
            return &self.observer_color;
        }
        let index = (side as usize - 1) % self.side_colors.len();
        &self.side_colors[index]
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayConfigMetadata {
    path: Option<PathBuf>,
}

impl ReplayConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Load the config named by `REPLAY_CONFIG_PATH`, falling back to the
/// bundled defaults when the variable is unset or the file is unusable.
pub fn load_replay_config_from_env() -> (ReplayConfig, ReplayConfigMetadata) {
    if let Some(path) = env::var("REPLAY_CONFIG_PATH").ok().map(PathBuf::from) {
        match ReplayConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "replay::config",
                    path = %path.display(),
                    "replay_config.loaded=file"
                );
                return (config, ReplayConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "replay::config",
                    path = %path.display(),
                    error = %err,
                    "replay_config.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "replay::config", "replay_config.loaded=builtin");
    (ReplayConfig::builtin(), ReplayConfigMetadata::new(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_parses() {
        let config = ReplayConfig::builtin();
        assert!(!config.mp_debug);
        assert_eq!(config.remote_poll_interval(), Duration::from_millis(10));
        assert_eq!(config.side_color(0), "white");
        assert_eq!(config.side_color(1), "red");
        assert_eq!(config.side_color(10), "red");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = ReplayConfig::from_json_str(r#"{ "mp_debug": true }"#).unwrap();
        assert!(config.mp_debug);
        assert_eq!(config.observer_color, "white");
        assert_eq!(config.side_color(3), "green");
        assert_eq!(config.side_colors, ReplayConfig::builtin().side_colors);
    }

    #[test]
    fn default_matches_builtin_file() {
        assert_eq!(ReplayConfig::default(), ReplayConfig::builtin());
    }

    #[test]
    fn lobby_join_filter_follows_setting() {
        let mut config = ReplayConfig::builtin();
        config.friends.push("bob".into());
        let join = |nick: &str| format!("{nick} has logged into the lobby");

        assert!(config.should_show_lobby_join("server", &join("bob")));
        assert!(!config.should_show_lobby_join("server", &join("eve")));
        assert!(config.should_show_lobby_join("alice", &join("eve")));
        assert!(config.should_show_lobby_join("server", "maintenance at noon"));

        config.lobby_joins = LobbyJoins::None;
        assert!(!config.should_show_lobby_join("server", &join("bob")));
        config.lobby_joins = LobbyJoins::All;
        assert!(config.should_show_lobby_join("server", &join("eve")));
    }

    #[test]
    fn unreadable_file_reports_path() {
        let err = ReplayConfig::from_file(Path::new("/nonexistent/replay.json")).unwrap_err();
        assert!(matches!(err, ReplayConfigError::ReadFailed { .. }));
    }
}
