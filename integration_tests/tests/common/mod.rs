#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use core_replay::headless::ActionHook;
use core_replay::host::{PeerLink, UnitView};
use core_replay::{
    get_user_choice, ChannelInbox, ChannelTransport, HeadlessHost, HeadlessUnit, Replay,
    ReplayReturn, SyncedAction, UserChoice,
};
use replay_runtime::{Command, Document, MapLocation, SideNumber, UnitDigest};

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_replay_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test replay config at {}",
            config_path.display()
        );

        std::env::set_var("REPLAY_CONFIG_PATH", &config_path);
    });
}

/// Two one-way channels wired into a duplex link between peers A and B.
pub struct Link {
    pub a_out: ChannelTransport,
    pub a_in: ChannelInbox,
    pub b_out: ChannelTransport,
    pub b_in: ChannelInbox,
}

pub fn link() -> Link {
    let mut a_out = ChannelTransport::new();
    let b_in = a_out.connect();
    let mut b_out = ChannelTransport::new();
    let a_in = b_out.connect();
    Link {
        a_out,
        a_in,
        b_out,
        b_in,
    }
}

/// Always answers with the same unit type.
pub struct FixedPick(pub &'static str);

impl UserChoice for FixedPick {
    fn query_user(&mut self, _side: SideNumber) -> Document {
        Document::new().with("type", self.0)
    }

    fn random_choice(&mut self, _side: SideNumber) -> Document {
        Document::new().with("type", "Peasant")
    }
}

/// `summon` places a unit whose type side 2 picks.
pub fn summon_hook(local_pick: &'static str) -> ActionHook {
    Box::new(move |replay: &mut Replay, host: &mut HeadlessHost, action: &SyncedAction| {
        if action.name != "summon" {
            return Ok(());
        }
        let mut choice = FixedPick(local_pick);
        let answer = get_user_choice(replay, host, "pick_unit", &mut choice, 2)?;
        let location = MapLocation::read_from(&action.data).unwrap_or(MapLocation::new(1, 1));
        host.spawn_unit(
            location,
            HeadlessUnit::new(answer.get_str("type"), action.from_side),
        );
        Ok(())
    })
}

pub fn unit_digest(host: &HeadlessHost) -> UnitDigest {
    UnitDigest::from_records(
        host.unit_locations()
            .into_iter()
            .filter_map(|location| host.unit_record(location))
            .collect(),
    )
}

/// Commands as every peer should agree on them; delivery bookkeeping differs.
pub fn canonical(commands: &[Command]) -> Vec<Command> {
    commands
        .iter()
        .cloned()
        .map(|mut command| {
            command.sent = false;
            command
        })
        .collect()
}

/// Poll the network and replay until the remote turn ends.
pub fn replay_remote_turn(replay: &mut Replay, host: &mut HeadlessHost) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        host.pull_remote_user_input(replay.log_mut())?;
        if replay.do_replay(host, false)? == ReplayReturn::FoundEndTurn {
            return Ok(());
        }
        if Instant::now() > deadline {
            bail!("timed out waiting for the remote turn to end");
        }
        thread::sleep(Duration::from_millis(1));
    }
}
