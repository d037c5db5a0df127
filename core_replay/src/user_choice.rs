//! Lockstep resolution of decisions that only some peers can make.
//!
//! A choice is answered either from the log (a dependent command recorded by
//! whichever peer owns the side) or, when the log is exhausted, by asking the
//! local player and recording the answer. Every peer ends up with the same
//! answers in the same log position.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;

use replay_runtime::{Action, Document, SideNumber};
use tracing::{debug, error, info};

use crate::error::ReplayError;
use crate::host::{process_error, ReplayHost};
use crate::replay::Replay;

/// The decision being synchronized.
pub trait UserChoice {
    /// Ask the local player (or AI) for side `side`.
    fn query_user(&mut self, side: SideNumber) -> Document;

    /// Answer without prompting, for sides nobody controls.
    fn random_choice(&mut self, side: SideNumber) -> Document;

    /// Whether answering shows UI to the player.
    fn is_visible(&self) -> bool {
        true
    }
}

/// Resolve a choice owned by a single side.
pub fn get_user_choice<H>(
    replay: &mut Replay,
    host: &mut H,
    name: &str,
    choice: &mut dyn UserChoice,
    side: SideNumber,
) -> Result<Document, ReplayError>
where
    H: ReplayHost + ?Sized,
{
    if !replay.is_synced() {
        info!(target: "replay::sync", choice = %name, "user choice requested outside a synced context");
        return Ok(choice.query_user(side));
    }
    if host.phase().is_too_early() && choice.is_visible() {
        return Ok(choice.random_choice(side));
    }

    let max_side = host.side_count() as SideNumber;
    let mut side = side;
    if side < 1 || side > max_side {
        if side != 0 {
            error!(target: "replay::sync", side, max_side, "invalid side for get_user_choice");
        }
        side = host.current_side();
    }

    let unoccupied = host.side_info(side).map(|info| info.is_empty()).unwrap_or(true);
    if unoccupied {
        let Some(occupied) = (1..=max_side)
            .find(|candidate| host.side_info(*candidate).is_some_and(|info| !info.is_empty()))
        else {
            panic!("no occupied side can answer [{name}]");
        };
        side = occupied;
    }

    let sides = BTreeSet::from([side]);
    let mut answers = get_user_choice_internal(replay, host, name, choice, &sides)?;
    Ok(answers.remove(&side).unwrap_or_default())
}

/// Resolve a choice every listed side answers independently.
pub fn get_user_choice_multiple_sides<H>(
    replay: &mut Replay,
    host: &mut H,
    name: &str,
    choice: &mut dyn UserChoice,
    sides: BTreeSet<SideNumber>,
) -> Result<BTreeMap<SideNumber, Document>, ReplayError>
where
    H: ReplayHost + ?Sized,
{
    if !replay.is_synced() {
        process_error(
            host,
            "MP synchronization only works in a synced context (for example Select or preload events are no synced context).\n",
        )?;
        return Ok(BTreeMap::new());
    }

    let max_side = host.side_count() as SideNumber;
    let mut empty_sides = Vec::new();
    let mut active_sides = BTreeSet::new();
    for side in sides {
        assert!(
            (1..=max_side).contains(&side),
            "side {side} outside 1..={max_side} in user choice [{name}]"
        );
        if host.side_info(side).is_some_and(|info| info.is_empty()) {
            empty_sides.push(side);
        } else {
            active_sides.insert(side);
        }
    }

    let mut answers = get_user_choice_internal(replay, host, name, choice, &active_sides)?;
    for side in empty_sides {
        answers.insert(side, choice.random_choice(side));
    }
    Ok(answers)
}

fn get_user_choice_internal<H>(
    replay: &mut Replay,
    host: &mut H,
    name: &str,
    choice: &mut dyn UserChoice,
    sides: &BTreeSet<SideNumber>,
) -> Result<BTreeMap<SideNumber, Document>, ReplayError>
where
    H: ReplayHost + ?Sized,
{
    let current_side = host.current_side();
    let involves_other_side = !sides.is_empty() && (sides.len() != 1 || !sides.contains(&current_side));
    if involves_other_side {
        replay.set_simultaneous();
    }

    let mut answers: BTreeMap<SideNumber, Document> = BTreeMap::new();
    let mut pending_shipped = false;
    while answers.len() < sides.len() {
        // Interleaved chat and labels are applied before looking for answers.
        replay.do_replay_handle(host, false)?;

        if !replay.at_end() {
            let Some(command) = replay.next_action().cloned() else {
                continue;
            };
            if !command.dependent || !command.has_child(name) {
                process_error(
                    host,
                    &format!("[{name}] expected but none found\n. found instead:\n{command}"),
                )?;
                replay.revert_action();
                for side in sides {
                    if !answers.contains_key(side) {
                        answers.insert(*side, choice.query_user(*side));
                    }
                }
                return Ok(answers);
            }

            let from_side = command.from_side_number();
            if command.side_invalid {
                process_error(
                    host,
                    "MP synchronization: side_invalid in replay data, this could mean someone wants to cheat.\n",
                )?;
            }
            if !sides.contains(&from_side) {
                process_error(
                    host,
                    &format!("MP synchronization: we got an answer from side {from_side} for [{name}] which is not what we expected\n"),
                )?;
                continue;
            }
            if answers.contains_key(&from_side) {
                process_error(
                    host,
                    &format!("MP synchronization: we already have an answer from side {from_side} for [{name}], now we have it twice.\n"),
                )?;
            }
            if let Action::Custom { data, .. } = command.action {
                answers.insert(from_side, data);
            }
            continue;
        }

        let local_side = sides.iter().copied().find(|side| {
            !answers.contains_key(side)
                && host.side_info(*side).is_some_and(|info| info.answers_locally())
        });

        match local_side {
            Some(side) => {
                debug!(target: "replay::sync", side, choice = %name, "answering locally");
                let previous = replay.set_synced(false);
                let value = choice.query_user(side);
                replay.restore_sync(previous);

                replay.user_input(name, value.clone(), Some(side));
                answers.insert(side, value);

                if replay.sync_context().is_simultaneous() || current_side != side {
                    host.send_user_choice(replay.log_mut())?;
                }
            }
            None => {
                if host.connection_count() == 0 {
                    error!(target: "replay::sync", choice = %name, "no peer left to answer");
                    return Err(ReplayError::NoDecisionSource {
                        name: name.to_string(),
                    });
                }
                if !pending_shipped {
                    // peers can only answer once they have replayed up to this point
                    host.send_user_choice(replay.log_mut())?;
                    pending_shipped = true;
                }
                debug!(target: "replay::sync", choice = %name, "waiting for a remote answer");
                host.pull_remote_user_input(replay.log_mut())?;
                if replay.at_end() {
                    thread::sleep(replay.config().remote_poll_interval());
                }
            }
        }
    }

    Ok(answers)
}
