//! An in-memory [`ReplayHost`](crate::host::ReplayHost) with no UI.
//!
//! It keeps just enough game state to replay recorded logs (unit positions,
//! labels, countdowns) and records every effect the engine asks for, which
//! makes it the host used by the inspector CLI and by tests.

use std::collections::BTreeMap;
use std::fmt;

use replay_runtime::{read_locations, LabelData, MapLocation, SideNumber, UnitRecord};
use tracing::{debug, warn};

use crate::command_log::CommandLog;
use crate::error::{OosDecision, ReplayError};
use crate::host::{
    ChatEvent, DisplaySurface, ErrorEscalation, GameController, GamePhase, PeerLink,
    RenameOutcome, SideInfo, SideRegistry, SyncedAction, SyncedExecutor, UnitView,
};
use crate::network::{send_user_choice, ChannelInbox, ChannelTransport};
use crate::replay::Replay;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessUnit {
    pub unit_type: String,
    pub name: String,
    pub hitpoints: i64,
    pub experience: i64,
    pub side: SideNumber,
    pub can_rename: bool,
}

impl HeadlessUnit {
    pub fn new(unit_type: impl Into<String>, side: SideNumber) -> Self {
        Self {
            unit_type: unit_type.into(),
            name: String::new(),
            hitpoints: 30,
            experience: 0,
            side,
            can_rename: true,
        }
    }
}

/// Extra behaviour run after the built-in effects of a synced action.
pub type ActionHook =
    Box<dyn FnMut(&mut Replay, &mut HeadlessHost, &SyncedAction) -> Result<(), ReplayError>>;

#[derive(Default)]
pub struct HeadlessHost {
    pub current_side: SideNumber,
    pub sides: Vec<SideInfo>,
    pub phase: GamePhase,
    pub skipping: bool,
    pub game_over: bool,
    /// Answer every out-of-sync report with an abort instead of continuing.
    pub abort_on_oos: bool,
    pub units: BTreeMap<MapLocation, HeadlessUnit>,
    pub labels: BTreeMap<MapLocation, LabelData>,
    pub chat: Vec<ChatEvent>,
    pub countdowns: BTreeMap<SideNumber, i64>,
    pub oos_messages: Vec<String>,
    pub executed: Vec<SyncedAction>,
    pub turns_started: usize,
    transport: Option<ChannelTransport>,
    inbox: Option<ChannelInbox>,
    on_action: Option<ActionHook>,
}

impl fmt::Debug for HeadlessHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessHost")
            .field("current_side", &self.current_side)
            .field("sides", &self.sides)
            .field("units", &self.units.len())
            .field("oos_messages", &self.oos_messages.len())
            .finish_non_exhaustive()
    }
}

impl HeadlessHost {
    pub fn new(sides: Vec<SideInfo>) -> Self {
        Self {
            current_side: 1,
            sides,
            ..Self::default()
        }
    }

    /// Wire the host to peers: outgoing answers go through `transport`,
    /// remote input is read from `inbox`.
    pub fn with_link(mut self, transport: ChannelTransport, inbox: ChannelInbox) -> Self {
        self.transport = Some(transport);
        self.inbox = Some(inbox);
        self
    }

    pub fn set_link(&mut self, transport: Option<ChannelTransport>, inbox: Option<ChannelInbox>) {
        self.transport = transport;
        self.inbox = inbox;
    }

    pub fn transport_mut(&mut self) -> Option<&mut ChannelTransport> {
        self.transport.as_mut()
    }

    pub fn inbox(&self) -> Option<&ChannelInbox> {
        self.inbox.as_ref()
    }

    pub fn on_action(&mut self, hook: ActionHook) {
        self.on_action = Some(hook);
    }

    /// Hand play to the next side, wrapping after the last one.
    pub fn next_side(&mut self) {
        let count = SideNumber::try_from(self.sides.len()).unwrap_or(SideNumber::MAX);
        if count > 0 {
            self.current_side = self.current_side % count + 1;
        }
    }

    pub fn spawn_unit(&mut self, location: MapLocation, unit: HeadlessUnit) {
        self.units.insert(location, unit);
    }

    pub fn unit(&self, location: MapLocation) -> Option<&HeadlessUnit> {
        self.units.get(&location)
    }

    fn apply_builtin(&mut self, action: &SyncedAction) {
        match action.name.as_str() {
            "move" => {
                let steps = match read_locations(&action.data) {
                    Ok(steps) => steps,
                    Err(err) => {
                        warn!(target: "replay", error = %err, "malformed move path");
                        return;
                    }
                };
                let (Some(&from), Some(&to)) = (steps.first(), steps.last()) else {
                    warn!(target: "replay", "move with an empty path");
                    return;
                };
                match self.units.remove(&from) {
                    Some(unit) => {
                        self.units.insert(to, unit);
                    }
                    None => warn!(target: "replay", at = %from, "no unit to move"),
                }
            }
            "recruit" | "recall" => {
                let Ok(location) = MapLocation::read_from(&action.data) else {
                    warn!(target: "replay", action = %action.name, "missing location");
                    return;
                };
                let key = if action.name == "recruit" { "type" } else { "value" };
                let unit_type = action.data.get_str(key);
                self.units
                    .insert(location, HeadlessUnit::new(unit_type, action.from_side));
            }
            other => debug!(target: "replay", action = %other, "no built-in effect"),
        }
    }
}

impl ErrorEscalation for HeadlessHost {
    fn process_oos(&mut self, message: &str) -> OosDecision {
        self.oos_messages.push(message.to_string());
        if self.abort_on_oos {
            OosDecision::Abort(message.trim_end().to_string())
        } else {
            OosDecision::Continue
        }
    }
}

impl GameController for HeadlessHost {
    fn current_side(&self) -> SideNumber {
        self.current_side
    }

    fn phase(&self) -> GamePhase {
        self.phase
    }

    fn is_skipping_replay(&self) -> bool {
        self.skipping
    }

    fn is_regular_game_end(&self) -> bool {
        self.game_over
    }

    fn do_init_side(&mut self) -> Result<(), ReplayError> {
        self.turns_started += 1;
        Ok(())
    }

    fn set_countdown_time(&mut self, side: SideNumber, value: i64) {
        self.countdowns.insert(side, value);
    }
}

impl SideRegistry for HeadlessHost {
    fn side_count(&self) -> usize {
        self.sides.len()
    }

    fn side_info(&self, side: SideNumber) -> Option<SideInfo> {
        let index = usize::try_from(side).ok()?.checked_sub(1)?;
        self.sides.get(index).copied()
    }
}

impl UnitView for HeadlessHost {
    fn unit_count(&self) -> usize {
        self.units.len()
    }

    fn unit_locations(&self) -> Vec<MapLocation> {
        self.units.keys().copied().collect()
    }

    fn unit_record(&self, location: MapLocation) -> Option<UnitRecord> {
        self.units.get(&location).map(|unit| UnitRecord {
            location,
            unit_type: unit.unit_type.clone(),
            hitpoints: unit.hitpoints,
            experience: unit.experience,
            side: unit.side,
        })
    }

    fn rename_unit(&mut self, location: MapLocation, name: &str) -> RenameOutcome {
        match self.units.get_mut(&location) {
            None => RenameOutcome::Missing,
            Some(unit) if !unit.can_rename => RenameOutcome::Unrenamable,
            Some(unit) => {
                unit.name = name.to_string();
                RenameOutcome::Renamed
            }
        }
    }
}

impl DisplaySurface for HeadlessHost {
    fn add_chat_message(&mut self, event: ChatEvent) {
        self.chat.push(event);
    }

    fn set_label(&mut self, label: &LabelData) {
        if label.text.is_empty() {
            self.labels.remove(&label.location);
        } else {
            self.labels.insert(label.location, label.clone());
        }
    }

    fn clear_labels(&mut self, team_name: &str, force: bool) {
        self.labels
            .retain(|_, label| !(force || label.team_name == team_name));
    }
}

impl SyncedExecutor for HeadlessHost {
    fn run_synced(&mut self, replay: &mut Replay, action: &SyncedAction) -> Result<(), ReplayError> {
        self.executed.push(action.clone());
        self.apply_builtin(action);
        if let Some(mut hook) = self.on_action.take() {
            let result = hook(replay, self, action);
            self.on_action = Some(hook);
            result?;
        }
        Ok(())
    }
}

impl PeerLink for HeadlessHost {
    fn connection_count(&self) -> usize {
        self.transport
            .as_ref()
            .map(|transport| crate::network::Transport::connection_count(transport))
            .unwrap_or(0)
    }

    fn send_user_choice(&mut self, log: &mut CommandLog) -> Result<(), ReplayError> {
        if let Some(transport) = self.transport.as_mut() {
            send_user_choice(log, transport)?;
        }
        Ok(())
    }

    fn pull_remote_user_input(&mut self, log: &mut CommandLog) -> Result<(), ReplayError> {
        if let Some(inbox) = &self.inbox {
            inbox.drain_into(log)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sides_are_one_based() {
        let host = HeadlessHost::new(vec![SideInfo::human(), SideInfo::remote()]);
        assert_eq!(host.side_info(0), None);
        assert_eq!(host.side_info(2), Some(SideInfo::remote()));
        assert_eq!(host.side_info(3), None);
    }

    #[test]
    fn next_side_wraps_around() {
        let mut host = HeadlessHost::new(vec![SideInfo::human(), SideInfo::remote(), SideInfo::ai()]);
        let mut order = Vec::new();
        for _ in 0..4 {
            host.next_side();
            order.push(host.current_side);
        }
        assert_eq!(order, vec![2, 3, 1, 2]);
    }

    #[test]
    fn rename_reports_why_it_failed() {
        let mut host = HeadlessHost::new(vec![SideInfo::human()]);
        let here = MapLocation::new(4, 4);
        assert_eq!(host.rename_unit(here, "x"), RenameOutcome::Missing);

        let mut unit = HeadlessUnit::new("Lich", 1);
        unit.can_rename = false;
        host.spawn_unit(here, unit);
        assert_eq!(host.rename_unit(here, "x"), RenameOutcome::Unrenamable);
    }

    #[test]
    fn clear_labels_respects_team_unless_forced() {
        let mut host = HeadlessHost::new(vec![SideInfo::human()]);
        for (x, team) in [(1, ""), (2, "north")] {
            host.set_label(&LabelData {
                location: MapLocation::new(x, 1),
                text: "here".into(),
                team_name: team.into(),
                color: String::new(),
            });
        }
        host.clear_labels("north", false);
        assert_eq!(host.labels.len(), 1);
        host.clear_labels("", true);
        assert!(host.labels.is_empty());
    }
}
