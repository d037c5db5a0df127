//! The replay driver: consumes commands from the cursor and applies them to
//! the host until something needs the caller's attention.

use replay_runtime::{Action, Document};
use tracing::{debug, debug_span, error, info, warn};

use crate::chat::unix_now;
use crate::error::ReplayError;
use crate::host::{process_error, ChatEvent, ChatKind, RenameOutcome, ReplayHost, SyncedAction};
use crate::replay::Replay;
use crate::verify::verify_units;

/// Why the driver handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayReturn {
    /// The log is exhausted.
    AtEnd,
    FoundEndTurn,
    /// One synced action ran and the caller asked for single steps.
    FoundEndMove,
    /// The scenario ended during a synced action.
    FoundEndLevel,
    /// The next command answers a pending user choice; the cursor is left on it.
    FoundDependent,
}

impl Replay {
    /// Run [`Replay::do_replay_handle`], holding display updates while the
    /// host fast-forwards.
    pub fn do_replay<H>(&mut self, host: &mut H, one_move: bool) -> Result<ReplayReturn, ReplayError>
    where
        H: ReplayHost + ?Sized,
    {
        let skipping = host.is_skipping_replay();
        if !skipping {
            host.recalculate_minimap();
        }
        if skipping {
            host.lock_updates(true);
        }
        let result = self.do_replay_handle(host, one_move);
        if skipping {
            host.lock_updates(false);
        }
        result
    }

    pub fn do_replay_handle<H>(
        &mut self,
        host: &mut H,
        one_move: bool,
    ) -> Result<ReplayReturn, ReplayError>
    where
        H: ReplayHost + ?Sized,
    {
        let _span = debug_span!(target: "replay", "do_replay_handle", one_move).entered();
        let side_num = host.current_side();

        loop {
            let is_synced = self.is_synced();
            let Some(command) = self.next_action().cloned() else {
                debug!(target: "replay", "replay data at end");
                return Ok(ReplayReturn::AtEnd);
            };
            debug!(target: "replay", is_synced, "replay data:\n{}", command);

            match &command.action {
                Action::Empty | Action::Start => {
                    error!(target: "replay", "found {} in replay", describe(&command.action));
                }
                Action::Speak(speak) => {
                    self.log_mut().record_message_location();
                    if !host.is_skipping_replay() || speak.is_whisper() {
                        let kind = if speak.team_name.is_empty() {
                            ChatKind::Public
                        } else {
                            ChatKind::Private
                        };
                        host.add_chat_message(ChatEvent {
                            time: speak.time.unwrap_or_else(unix_now),
                            speaker: speak.id.clone(),
                            side: speak.side,
                            message: speak.message.clone(),
                            kind,
                            bell: self.config().message_bell,
                        });
                    }
                }
                Action::Label(label) => host.set_label(label),
                Action::ClearLabels { team_name, force } => host.clear_labels(team_name, *force),
                Action::Rename { location, name } => match host.rename_unit(*location, name) {
                    RenameOutcome::Renamed => {}
                    RenameOutcome::Unrenamable => {
                        warn!(target: "replay", at = %location, "attempt to rename an unrenamable unit")
                    }
                    RenameOutcome::Missing => {
                        warn!(target: "replay", at = %location, "rename target is no longer there")
                    }
                },
                Action::InitSide { .. } => {
                    if is_synced {
                        process_error(host, "found side initialization in replay expecting a user choice\n")?;
                        self.revert_action();
                        return Ok(ReplayReturn::FoundDependent);
                    }
                    host.do_init_side()?;
                }
                Action::EndTurn => {
                    if is_synced {
                        process_error(host, "found turn end in replay while expecting a user choice\n")?;
                        self.revert_action();
                        return Ok(ReplayReturn::FoundDependent);
                    }
                    if let Some(digest) = &command.verify {
                        verify_units(host, digest)?;
                    }
                    return Ok(ReplayReturn::FoundEndTurn);
                }
                Action::CountdownUpdate { value, team } => {
                    let side_count = host.side_count() as i64;
                    if *team <= 0 || *team > side_count {
                        let message = format!(
                            "Illegal countdown update \nReceived update for :{team} Current user :{side_num}\n Updated value :{value}\n"
                        );
                        process_error(host, &message)?;
                    } else {
                        host.set_countdown_time(*team as u32, *value);
                    }
                }
                Action::Custom { name, .. } if command.dependent => {
                    if !is_synced {
                        process_error(host, "found dependent command in replay while is_synced=false\n")?;
                        continue;
                    }
                    debug!(target: "replay", choice = %name, "found a dependent command");
                    self.revert_action();
                    return Ok(ReplayReturn::FoundDependent);
                }
                Action::Custom { name, data } => {
                    if is_synced {
                        process_error(host, &format!("found [{name}] command in replay expecting a user choice\n"))?;
                        self.revert_action();
                        return Ok(ReplayReturn::FoundDependent);
                    }
                    info!(target: "replay", command = %name, "replaying synced command");

                    let from_side = command.from_side_number();
                    if from_side != host.current_side() {
                        error!(
                            target: "replay",
                            from_side,
                            current_side = host.current_side(),
                            "received a synced command from a side that is not playing"
                        );
                    } else if command.side_invalid {
                        error!(target: "replay", from_side, "received a synced command flagged side_invalid");
                    }

                    let action = SyncedAction {
                        name: name.clone(),
                        data: data.clone(),
                        from_side,
                        is_replay: true,
                        use_undo: !host.is_skipping_replay(),
                    };
                    self.run_synced_action(host, &action)?;

                    if host.is_regular_game_end() {
                        return Ok(ReplayReturn::FoundEndLevel);
                    }
                    if one_move {
                        return Ok(ReplayReturn::FoundEndMove);
                    }
                }
            }

            if let Some(digest) = &command.verify {
                verify_units(host, digest)?;
            }
        }
    }

    /// Record a local synced action, then run it. Choices raised by the
    /// action are answered locally or by peers and recorded as dependents.
    pub fn run_and_store<H>(&mut self, host: &mut H, name: &str, data: Document) -> Result<(), ReplayError>
    where
        H: ReplayHost + ?Sized,
    {
        let from_side = host.current_side();
        self.add_synced_command(name, data.clone(), from_side);
        let action = SyncedAction {
            name: name.to_string(),
            data,
            from_side,
            is_replay: false,
            use_undo: true,
        };
        self.run_synced_action(host, &action)
    }

    fn run_synced_action<H>(&mut self, host: &mut H, action: &SyncedAction) -> Result<(), ReplayError>
    where
        H: ReplayHost + ?Sized,
    {
        let previous = self.set_synced(true);
        let result = host.run_synced(self, action);
        self.restore_sync(previous);
        result
    }
}

fn describe(action: &Action) -> &'static str {
    match action {
        Action::Start => "[start]",
        _ => "an empty command",
    }
}
