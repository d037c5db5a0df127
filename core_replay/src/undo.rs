use replay_runtime::{read_locations, Action, Command, MapLocation};
use tracing::{debug, error, warn};

use crate::error::UndoError;
use crate::replay::Replay;

/// What an async command that names a location needs once the action it
/// followed is rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameRepair {
    Keep,
    Relocate(MapLocation),
    Drop,
}

impl Replay {
    /// Roll back the most recent undoable action and return the commands
    /// removed with it, oldest first.
    ///
    /// Non-undoable commands recorded after it stay in place. Async renames
    /// are repaired so they still point at the unit: a rename at a move's
    /// destination follows the unit back to its source, and a rename of a
    /// unit whose recruit/recall is undone disappears.
    pub fn undo_cut(&mut self) -> Result<Vec<Command>, UndoError> {
        assert!(self.at_end(), "undo requested while commands remain unreplayed");
        let index = self.undo_candidate()?;
        let undone = self.log().get(index).clone();
        let mut removed = Vec::new();

        for i in (index..self.log().len()).rev() {
            let command = self.log().get(i);
            let (undo, is_async, dependent) = (command.undo, command.is_async, command.dependent);
            let rename_target = match &command.action {
                Action::Rename { location, .. } => Some(*location),
                _ => None,
            };

            if !undo {
                continue;
            }
            if is_async {
                let Some(target) = rename_target else {
                    error!(target: "replay::undo", "unsupported async command while undoing:\n{}", command);
                    continue;
                };
                match rename_repair(&undone, target) {
                    RenameRepair::Keep => {}
                    RenameRepair::Relocate(source) => {
                        debug!(target: "replay::undo", from = %target, to = %source, "moving rename with undone move");
                        if let Action::Rename { location, .. } = &mut self.log_mut().get_mut(i).action {
                            *location = source;
                        }
                    }
                    RenameRepair::Drop => {
                        debug!(target: "replay::undo", at = %target, "dropping rename of unrecruited unit");
                        self.log_mut().remove(i);
                    }
                }
            } else if dependent || i == index {
                removed.push(self.log_mut().remove(i));
            } else {
                error!(target: "replay::undo", "couldn't handle command when undoing:\n{}", command);
            }
        }

        removed.reverse();
        self.log_mut().seek_to_end();
        Ok(removed)
    }

    pub fn undo(&mut self) -> Result<(), UndoError> {
        self.undo_cut().map(|_| ())
    }

    fn undo_candidate(&self) -> Result<usize, UndoError> {
        for index in (0..self.log().len()).rev() {
            let command = self.log().get(index);
            if !command.undo || command.is_async || command.dependent {
                continue;
            }
            if command.sent {
                error!(
                    target: "replay::undo",
                    index,
                    "trying to undo a command that was already sent:\n{}",
                    command
                );
                return Err(UndoError::AlreadySent { index });
            }
            return Ok(index);
        }
        error!(target: "replay::undo", "trying to undo with no undoable command in the log");
        Err(UndoError::NothingToUndo)
    }
}

fn rename_repair(undone: &Command, target: MapLocation) -> RenameRepair {
    let Action::Custom { name, data } = &undone.action else {
        return RenameRepair::Keep;
    };
    match name.as_str() {
        "move" => {
            let steps = match read_locations(data) {
                Ok(steps) => steps,
                Err(err) => {
                    warn!(target: "replay::undo", error = %err, "malformed path in undone move");
                    Vec::new()
                }
            };
            match (steps.first(), steps.last()) {
                (Some(source), Some(destination)) if *destination == target => {
                    RenameRepair::Relocate(*source)
                }
                (Some(_), Some(_)) => RenameRepair::Keep,
                _ => {
                    error!(target: "replay::undo", "trying to undo a move using an empty path");
                    RenameRepair::Keep
                }
            }
        }
        "recruit" | "recall" => match MapLocation::read_from(data) {
            Ok(location) if location == target => RenameRepair::Drop,
            _ => RenameRepair::Keep,
        },
        _ => RenameRepair::Keep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_runtime::{path_document, Document, SideNumber, SpeakData};

    const SIDE: SideNumber = 1;

    fn started() -> Replay {
        let mut replay = Replay::default();
        replay.add_start();
        replay
    }

    fn record_move(replay: &mut Replay, from: (i32, i32), to: (i32, i32)) {
        let path = path_document(&[MapLocation::new(from.0, from.1), MapLocation::new(to.0, to.1)]);
        replay.add_synced_command("move", path, SIDE);
    }

    fn record_recruit(replay: &mut Replay, x: i32, y: i32) {
        let mut data = Document::new().with("type", "Spearman");
        MapLocation::new(x, y).write_to(&mut data);
        replay.add_synced_command("recruit", data, SIDE);
    }

    fn summary(replay: &Replay) -> Vec<String> {
        replay
            .log()
            .commands()
            .iter()
            .map(|command| match &command.action {
                Action::Rename { location, name } => format!("rename {name}@{location}"),
                other => other.name().to_string(),
            })
            .collect()
    }

    #[test]
    fn rename_follows_an_undone_move_back() {
        let mut replay = started();
        record_move(&mut replay, (3, 3), (5, 4));
        replay.add_rename("Konrad", MapLocation::new(5, 4));

        let removed = replay.undo_cut().unwrap();
        assert_eq!(removed.len(), 1);
        assert!(removed[0].has_child("move"));
        assert_eq!(summary(&replay), vec!["start", "rename Konrad@3,3"]);
        assert!(replay.at_end());
    }

    #[test]
    fn rename_elsewhere_is_untouched() {
        let mut replay = started();
        record_move(&mut replay, (3, 3), (5, 4));
        replay.add_rename("Li'sar", MapLocation::new(7, 7));
        replay.undo().unwrap();
        assert_eq!(summary(&replay), vec!["start", "rename Li'sar@7,7"]);
    }

    #[test]
    fn rename_of_undone_recruit_is_dropped() {
        let mut replay = started();
        record_recruit(&mut replay, 2, 6);
        replay.add_rename("Grug", MapLocation::new(2, 6));
        replay.undo().unwrap();
        assert_eq!(summary(&replay), vec!["start"]);
    }

    #[test]
    fn chat_survives_undo_and_dependents_leave_with_their_action() {
        let mut replay = started();
        record_move(&mut replay, (1, 1), (2, 2));
        replay.speak(SpeakData::new("alice", "oops"));
        replay.user_input("advance", Document::new().with("value", 1), Some(SIDE));

        let removed = replay.undo_cut().unwrap();
        let removed_names: Vec<&str> = removed.iter().map(|c| c.action.name()).collect();
        assert_eq!(removed_names, vec!["move", "advance"]);
        assert_eq!(summary(&replay), vec!["start", "speak"]);
        assert_eq!(replay.log().message_locations(), &[1]);
    }

    #[test]
    fn sent_commands_refuse_undo_without_mutation() {
        let mut replay = started();
        record_move(&mut replay, (1, 1), (2, 2));
        replay.log_mut().get_mut(1).sent = true;

        assert_eq!(replay.undo(), Err(UndoError::AlreadySent { index: 1 }));
        assert_eq!(summary(&replay), vec!["start", "move"]);
    }

    #[test]
    fn start_marker_alone_cannot_be_undone() {
        let mut replay = started();
        assert_eq!(replay.undo(), Err(UndoError::AlreadySent { index: 0 }));

        let mut empty = Replay::default();
        assert_eq!(empty.undo(), Err(UndoError::NothingToUndo));
    }

    #[test]
    fn undo_then_redo_restores_the_log() {
        let mut replay = started();
        record_move(&mut replay, (1, 1), (2, 2));
        replay.user_input("advance", Document::new(), Some(SIDE));
        let before = replay.log().commands().to_vec();

        let removed = replay.undo_cut().unwrap();
        replay.redo(replay_runtime::TurnBatch::new(removed));
        assert_eq!(replay.log().commands(), before.as_slice());
    }
}
