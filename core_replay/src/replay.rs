use replay_runtime::{
    digest_document, Action, AttrValue, Command, Document, DocumentError, FromSide, LabelData,
    MapLocation, SideNumber, SpeakData, TurnBatch, UnitDigest,
};
use tracing::debug;

use crate::chat::{unix_now, ChatFilter, ChatLog, ChatMessage};
use crate::command_log::CommandLog;
use crate::config::ReplayConfig;
use crate::host::UnitView;

/// Whether the session is inside a synced action, and whether the running
/// user choice involves more than the active side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncContext {
    synced: bool,
    simultaneous: bool,
}

impl SyncContext {
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn is_simultaneous(&self) -> bool {
        self.simultaneous
    }
}

/// A replay session: the command log plus the state that travels with it.
#[derive(Debug)]
#[cfg_attr(feature = "bevy_support", derive(bevy_ecs::prelude::Resource))]
pub struct Replay {
    log: CommandLog,
    chat: ChatLog,
    upload_log: Document,
    sync: SyncContext,
    config: ReplayConfig,
}

impl Default for Replay {
    fn default() -> Self {
        Self::new(ReplayConfig::default())
    }
}

impl Replay {
    pub fn new(config: ReplayConfig) -> Self {
        Self::with_log(config, CommandLog::new())
    }

    pub fn with_log(config: ReplayConfig, log: CommandLog) -> Self {
        Self {
            log,
            chat: ChatLog::new(),
            upload_log: Document::new(),
            sync: SyncContext::default(),
            config,
        }
    }

    /// Load a recorded batch for replay from the first command.
    pub fn from_batch(config: ReplayConfig, batch: TurnBatch) -> Self {
        Self::with_log(config, CommandLog::from_commands(batch.commands))
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut CommandLog {
        &mut self.log
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn upload_log(&self) -> &Document {
        &self.upload_log
    }

    pub fn sync_context(&self) -> SyncContext {
        self.sync
    }

    pub fn is_synced(&self) -> bool {
        self.sync.synced
    }

    /// Enter or leave synced mode, returning the previous context.
    pub fn set_synced(&mut self, synced: bool) -> SyncContext {
        let previous = self.sync;
        self.sync.synced = synced;
        self.sync.simultaneous = false;
        previous
    }

    pub fn set_simultaneous(&mut self) {
        self.sync.simultaneous = true;
    }

    pub fn restore_sync(&mut self, previous: SyncContext) {
        self.sync = previous;
    }

    /// The whole log as a turn batch, e.g. for saving.
    pub fn to_batch(&self) -> TurnBatch {
        TurnBatch::new(self.log.commands().to_vec())
    }

    pub fn add_start(&mut self) {
        let mut command = Command::new(Action::Start);
        command.sent = true;
        self.log.append(command);
    }

    /// Prepend a `start` marker unless the log already opens with one.
    pub fn add_start_if_not_there_yet(&mut self) -> bool {
        assert_eq!(self.log.pos(), 0, "start marker checked mid-replay");
        let has_start = !self.log.is_empty() && matches!(self.log.get(0).action, Action::Start);
        if has_start {
            return false;
        }
        let mut command = Command::new(Action::Start);
        command.sent = true;
        self.log.insert_at(0, command);
        true
    }

    pub fn init_side(&mut self, current_side: SideNumber) {
        self.log.append(Command::new(Action::InitSide {
            side_number: current_side,
        }));
    }

    pub fn end_turn(&mut self) {
        self.log.append(Command::new(Action::EndTurn));
    }

    pub fn end_turn_with_verify(&mut self, digest: UnitDigest) {
        let command = self.log.append(Command::new(Action::EndTurn));
        command.verify = Some(digest);
    }

    pub fn add_countdown_update(&mut self, value: i64, team: i64) {
        self.log
            .append(Command::new(Action::CountdownUpdate { value, team }));
    }

    pub fn add_synced_command(
        &mut self,
        name: &str,
        data: Document,
        current_side: SideNumber,
    ) -> &mut Command {
        let mut command = Command::new(Action::custom(name, data));
        command.from_side = Some(FromSide::Side(current_side));
        self.log.append(command)
    }

    /// Record the answer to a user choice. `None` marks a server answer.
    pub fn user_input(&mut self, name: &str, data: Document, from_side: Option<SideNumber>) {
        let origin = from_side.map(FromSide::Side).unwrap_or(FromSide::Server);
        self.log.append(Command::dependent(name, data, origin));
    }

    pub fn add_label(&mut self, label: LabelData) {
        self.log.insert_nonundoable(Command::new(Action::Label(label)));
    }

    pub fn clear_labels(&mut self, team_name: &str, force: bool) {
        self.log.insert_nonundoable(Command::new(Action::ClearLabels {
            team_name: team_name.to_string(),
            force,
        }));
    }

    pub fn speak(&mut self, speak: SpeakData) {
        self.log.insert_nonundoable(Command::new(Action::Speak(speak)));
        self.log.record_message_location();
    }

    pub fn add_rename(&mut self, name: &str, location: MapLocation) {
        let mut command = Command::new(Action::Rename {
            location,
            name: name.to_string(),
        });
        command.is_async = true;
        self.log.append(command);
    }

    /// Attach a `checksum` child for the unit at `location` to `data`.
    /// Does nothing unless `mp_debug` is on.
    pub fn add_unit_checksum<U>(
        &self,
        location: MapLocation,
        units: &U,
        data: &mut Document,
    ) -> Result<(), DocumentError>
    where
        U: UnitView + ?Sized,
    {
        if !self.config.mp_debug {
            return Ok(());
        }
        let Some(unit) = units.unit_document(location) else {
            panic!("no unit at {location} to checksum");
        };
        let value = digest_document(&unit)?;
        let mut checksum = Document::new().with("value", format!("{value:016x}"));
        location.write_to(&mut checksum);
        data.add_child("checksum", checksum);
        Ok(())
    }

    pub fn add_log_data(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.upload_log.set(key, value);
    }

    pub fn add_log_data_in(&mut self, category: &str, key: &str, value: impl Into<AttrValue>) {
        self.upload_category(category).set(key, value);
    }

    pub fn add_log_child(&mut self, category: &str, key: &str, child: Document) {
        self.upload_category(category).add_child(key, child);
    }

    fn upload_category(&mut self, category: &str) -> &mut Document {
        if !self.upload_log.has_child(category) {
            self.upload_log.add_child(category, Document::new());
        }
        self.upload_log
            .child_mut(category)
            .expect("category child was just ensured")
    }

    /// Re-append a batch previously removed by undo.
    pub fn redo(&mut self, batch: TurnBatch) {
        assert!(self.log.at_end(), "redo requested while commands remain unreplayed");
        for command in batch.commands {
            self.log.append(command);
        }
        self.log.seek_to_end();
    }

    /// Commands received from a peer, queued for replay.
    pub fn add_commands(&mut self, batch: TurnBatch, mark_as_sent: bool) -> usize {
        self.log.ingest(batch.commands, mark_as_sent)
    }

    /// The latest consumed command that undo could target.
    pub fn last_real_command(&self) -> &Command {
        (0..self.log.pos())
            .rev()
            .map(|index| self.log.get(index))
            .find(|command| command.undo && !command.is_async && !command.dependent)
            .expect("no undoable command before the replay cursor")
    }

    pub fn remove_command(&mut self, index: usize) -> Command {
        self.log.remove(index)
    }

    pub fn start_replay(&mut self) {
        self.log.start();
    }

    pub fn revert_action(&mut self) {
        self.log.rewind_one();
    }

    pub fn next_action(&mut self) -> Option<&Command> {
        self.log.next_command()
    }

    pub fn at_end(&self) -> bool {
        self.log.at_end()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn ncommands(&self) -> usize {
        self.log.len()
    }

    /// Render chat lines recorded since the last call into the cache.
    pub fn build_chat_log(&mut self) -> &ChatLog {
        let now = unix_now();
        let filter = ChatFilter::new(&self.config);
        for &location in self.log.message_locations() {
            if location >= self.log.len() {
                continue;
            }
            if let Action::Speak(speak) = &self.log.get(location).action {
                if filter.allows(speak) {
                    self.chat
                        .push(ChatMessage::from_speak(speak, &self.config, now));
                }
            }
        }
        self.log.clear_message_locations();
        &self.chat
    }

    pub fn chat_log(&self) -> &ChatLog {
        &self.chat
    }

    /// Session teardown.
    pub fn clear(&mut self) {
        debug!(target: "replay", commands = self.log.len(), "clearing replay session");
        self.log.clear();
        self.chat.clear();
        self.upload_log = Document::new();
        self.sync = SyncContext::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(replay: &Replay) -> Vec<&str> {
        replay
            .log()
            .commands()
            .iter()
            .map(|command| command.action.name())
            .collect()
    }

    #[test]
    fn start_marker_is_prepended_once() {
        let mut replay = Replay::from_batch(
            ReplayConfig::default(),
            TurnBatch::new(vec![Command::new(Action::EndTurn)]),
        );
        assert!(replay.add_start_if_not_there_yet());
        assert!(!replay.add_start_if_not_there_yet());
        assert_eq!(names(&replay), vec!["start", "end_turn"]);
        assert!(replay.log().get(0).sent);
    }

    #[test]
    fn chat_and_labels_are_not_undoable() {
        let mut replay = Replay::default();
        replay.add_synced_command("move", Document::new(), 1);
        replay.speak(SpeakData::new("alice", "hi"));
        replay.clear_labels("", true);
        assert!(replay.log().get(0).undo);
        assert!(!replay.log().get(1).undo);
        assert!(!replay.log().get(2).undo);
        assert_eq!(replay.log().message_locations(), &[1]);
    }

    #[test]
    fn user_input_without_side_is_from_server() {
        let mut replay = Replay::default();
        replay.user_input("seed", Document::new().with("value", 7), None);
        let command = replay.log().get(0);
        assert!(command.dependent);
        assert_eq!(command.from_side, Some(FromSide::Server));
    }

    #[test]
    fn last_real_command_skips_async_and_dependent() {
        let mut replay = Replay::default();
        replay.add_synced_command("move", Document::new(), 1);
        replay.user_input("advance", Document::new(), Some(1));
        replay.add_rename("Konrad", MapLocation::new(2, 2));
        assert!(replay.last_real_command().has_child("move"));
    }

    #[test]
    #[should_panic(expected = "no undoable command")]
    fn last_real_command_requires_one() {
        Replay::default().last_real_command();
    }

    #[test]
    fn default_session_colors_chat_by_side() {
        let mut replay = Replay::default();
        let mut speak = SpeakData::new("alice", "gl");
        speak.side = 2;
        replay.speak(speak);
        replay.speak(SpeakData::new("observer", "hf"));

        let messages = replay.build_chat_log().messages();
        assert_eq!(messages[0].color, "blue");
        assert_eq!(messages[1].color, "white");
    }

    #[test]
    fn chat_view_consumes_recorded_offsets() {
        let mut replay = Replay::new(ReplayConfig::builtin());
        let mut speak = SpeakData::new("alice", "gg");
        speak.side = 1;
        speak.time = Some(5);
        replay.speak(speak);
        replay.speak(SpeakData::new("bob", "wp"));

        assert_eq!(replay.build_chat_log().len(), 2);
        assert!(replay.log().message_locations().is_empty());
        assert_eq!(replay.build_chat_log().len(), 2);
        assert_eq!(replay.chat_log().messages()[0].color, "red");

        replay.clear();
        assert!(replay.chat_log().is_empty());
        assert!(replay.is_empty());
    }

    #[test]
    fn upload_log_groups_by_category() {
        let mut replay = Replay::default();
        replay.add_log_data("version", "1.18");
        replay.add_log_data_in("ai_log", "turns", 3);
        replay.add_log_child("results", "side", Document::new().with("gold", 90));
        let upload = replay.upload_log();
        assert_eq!(upload.get_str("version"), "1.18");
        assert_eq!(upload.child("ai_log").map(|c| c.get_int("turns", 0)), Some(3));
        let results = upload.child("results").expect("results category");
        assert_eq!(results.child("side").map(|c| c.get_int("gold", 0)), Some(90));
        assert_eq!(upload.child_count(), 2);
    }

    #[test]
    fn redo_appends_the_removed_batch() {
        let mut replay = Replay::default();
        replay.add_start();
        replay.redo(TurnBatch::new(vec![
            Command::new(Action::custom("move", Document::new())),
            Command::new(Action::EndTurn),
        ]));
        assert_eq!(names(&replay), vec!["start", "move", "end_turn"]);
        assert!(replay.at_end());
    }
}
