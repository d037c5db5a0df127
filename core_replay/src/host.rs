//! Seams between the replay engine and the game that embeds it.
//!
//! The engine never owns game state. Everything it needs to read or mutate
//! (the current side, units, labels, the chat surface, the action runner and
//! the peer connection) is reached through the traits below, which together
//! make up a [`ReplayHost`].

use replay_runtime::{Document, LabelData, MapLocation, SideNumber, UnitRecord};
use tracing::error;

use crate::command_log::CommandLog;
use crate::error::{OosDecision, ReplayError};
use crate::replay::Replay;

/// Stage of the scenario lifecycle; choices before `Start` cannot be synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GamePhase {
    Initial,
    Preload,
    Prestart,
    Start,
    #[default]
    Play,
}

impl GamePhase {
    pub fn is_too_early(self) -> bool {
        !matches!(self, GamePhase::Start | GamePhase::Play)
    }
}

/// Who drives a side on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    Human,
    Ai,
    Empty,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideInfo {
    pub controller: Controller,
    /// A local human that stepped away; its choices come from the network.
    pub idle: bool,
}

impl SideInfo {
    pub fn new(controller: Controller) -> Self {
        Self {
            controller,
            idle: false,
        }
    }

    pub fn human() -> Self {
        Self::new(Controller::Human)
    }

    pub fn ai() -> Self {
        Self::new(Controller::Ai)
    }

    pub fn empty() -> Self {
        Self::new(Controller::Empty)
    }

    pub fn remote() -> Self {
        Self::new(Controller::Remote)
    }

    pub fn is_empty(&self) -> bool {
        self.controller == Controller::Empty
    }

    pub fn is_local(&self) -> bool {
        matches!(self.controller, Controller::Human | Controller::Ai)
    }

    /// Local and present: this peer answers the side's choices itself.
    pub fn answers_locally(&self) -> bool {
        self.is_local() && !self.idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed,
    Unrenamable,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Public,
    Private,
}

/// A chat line handed to the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub time: i64,
    pub speaker: String,
    pub side: SideNumber,
    pub message: String,
    pub kind: ChatKind,
    pub bell: bool,
}

/// A synced player action ready to run against live game state.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedAction {
    pub name: String,
    pub data: Document,
    pub from_side: SideNumber,
    pub is_replay: bool,
    pub use_undo: bool,
}

pub trait ErrorEscalation {
    /// Report an out-of-sync condition and let the host decide whether play continues.
    fn process_oos(&mut self, message: &str) -> OosDecision;
}

pub trait GameController {
    fn current_side(&self) -> SideNumber;

    fn phase(&self) -> GamePhase {
        GamePhase::Play
    }

    /// Fast-forward mode: display side effects are suppressed.
    fn is_skipping_replay(&self) -> bool {
        false
    }

    fn is_regular_game_end(&self) -> bool {
        false
    }

    fn do_init_side(&mut self) -> Result<(), ReplayError>;

    fn set_countdown_time(&mut self, side: SideNumber, value: i64);
}

pub trait SideRegistry {
    fn side_count(&self) -> usize;

    fn side_info(&self, side: SideNumber) -> Option<SideInfo>;
}

pub trait UnitView {
    fn unit_count(&self) -> usize;

    fn unit_locations(&self) -> Vec<MapLocation>;

    fn unit_record(&self, location: MapLocation) -> Option<UnitRecord>;

    fn rename_unit(&mut self, location: MapLocation, name: &str) -> RenameOutcome;

    /// Full unit state as fed to checksums.
    fn unit_document(&self, location: MapLocation) -> Option<Document> {
        self.unit_record(location).map(|record| record.to_document())
    }
}

pub trait DisplaySurface {
    fn add_chat_message(&mut self, event: ChatEvent);

    fn set_label(&mut self, label: &LabelData);

    fn clear_labels(&mut self, team_name: &str, force: bool);

    fn recalculate_minimap(&mut self) {}

    fn lock_updates(&mut self, _locked: bool) {}
}

pub trait SyncedExecutor {
    /// Run one synced action. The engine marks the session synced for the
    /// duration of the call, so user choices raised inside it are recorded
    /// or replayed as dependent commands.
    fn run_synced(&mut self, replay: &mut Replay, action: &SyncedAction) -> Result<(), ReplayError>;
}

pub trait PeerLink {
    fn connection_count(&self) -> usize;

    /// Ship freshly recorded choice answers (and anything unsent before them).
    fn send_user_choice(&mut self, log: &mut CommandLog) -> Result<(), ReplayError>;

    /// Append whatever the network delivered since the last poll.
    fn pull_remote_user_input(&mut self, log: &mut CommandLog) -> Result<(), ReplayError>;
}

/// Everything the replay driver and the choice protocol need from the game.
pub trait ReplayHost:
    ErrorEscalation + GameController + SideRegistry + UnitView + DisplaySurface + SyncedExecutor + PeerLink
{
}

impl<T> ReplayHost for T where
    T: ErrorEscalation
        + GameController
        + SideRegistry
        + UnitView
        + DisplaySurface
        + SyncedExecutor
        + PeerLink
        + ?Sized
{
}

/// Log an out-of-sync condition and escalate it to the host.
pub fn process_error<H>(host: &mut H, message: &str) -> Result<(), ReplayError>
where
    H: ErrorEscalation + ?Sized,
{
    error!(target: "replay", "{}", message.trim_end());
    match host.process_oos(message) {
        OosDecision::Continue => Ok(()),
        OosDecision::Abort(reason) => Err(ReplayError::Aborted { reason }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Escalator {
        abort: bool,
        seen: Vec<String>,
    }

    impl ErrorEscalation for Escalator {
        fn process_oos(&mut self, message: &str) -> OosDecision {
            self.seen.push(message.to_string());
            if self.abort {
                OosDecision::Abort("host quit".into())
            } else {
                OosDecision::Continue
            }
        }
    }

    #[test]
    fn escalation_respects_host_decision() {
        let mut host = Escalator {
            abort: false,
            seen: Vec::new(),
        };
        assert!(process_error(&mut host, "drift\n").is_ok());

        host.abort = true;
        match process_error(&mut host, "drift again\n") {
            Err(ReplayError::Aborted { reason }) => assert_eq!(reason, "host quit"),
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(host.seen.len(), 2);
    }

    #[test]
    fn side_locality() {
        assert!(SideInfo::human().answers_locally());
        assert!(SideInfo::ai().answers_locally());
        assert!(!SideInfo::remote().answers_locally());
        assert!(!SideInfo {
            idle: true,
            ..SideInfo::human()
        }
        .answers_locally());
        assert!(SideInfo::empty().is_empty());
        assert!(GamePhase::Prestart.is_too_early());
        assert!(!GamePhase::Start.is_too_early());
    }
}
