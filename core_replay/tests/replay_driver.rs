use core_replay::{
    HeadlessHost, HeadlessUnit, Replay, ReplayConfig, ReplayError, ReplayReturn, SideInfo,
};
use replay_runtime::{
    parse_command_line, path_document, Action, Command, Document, FromSide, MapLocation,
    SpeakData, TurnBatch, UnitDigest, UnitRecord,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn command(line: &str) -> Command {
    Command::new(parse_command_line(line).expect("test command should parse"))
}

fn synced(line: &str, side: u32) -> Command {
    let mut command = command(line);
    command.from_side = Some(FromSide::Side(side));
    command
}

fn replay_of(commands: Vec<Command>) -> Replay {
    Replay::from_batch(ReplayConfig::builtin(), TurnBatch::new(commands))
}

fn two_player_host() -> HeadlessHost {
    HeadlessHost::new(vec![SideInfo::human(), SideInfo::remote()])
}

#[test]
fn replays_actions_until_turn_end() {
    init_tracing();
    let mut replay = replay_of(vec![
        Command {
            sent: true,
            ..Command::new(Action::Start)
        },
        synced("recruit Spearman 3 4", 1),
        synced("move 3,4 4,4 5,4", 1),
        command("end_turn"),
        synced("move 5,4 6,4", 1),
    ]);
    let mut host = two_player_host();

    let outcome = replay.do_replay(&mut host, false).unwrap();
    assert_eq!(outcome, ReplayReturn::FoundEndTurn);
    assert_eq!(replay.log().pos(), 4);
    assert_eq!(host.executed.len(), 2);
    assert!(host.executed.iter().all(|action| action.is_replay));
    assert_eq!(
        host.unit(MapLocation::new(5, 4)).map(|u| u.unit_type.as_str()),
        Some("Spearman")
    );
    // the stray [start] is reported but not escalated
    assert!(host.oos_messages.is_empty());

    assert_eq!(replay.do_replay(&mut host, false).unwrap(), ReplayReturn::AtEnd);
    assert!(host.unit(MapLocation::new(6, 4)).is_some());
}

#[test]
fn one_move_stops_after_each_synced_action() {
    let mut replay = replay_of(vec![
        synced("recruit Bowman 1 1", 1),
        command("speak alice nice"),
        synced("recruit Bowman 2 2", 1),
    ]);
    let mut host = two_player_host();

    assert_eq!(replay.do_replay(&mut host, true).unwrap(), ReplayReturn::FoundEndMove);
    assert_eq!(replay.do_replay(&mut host, true).unwrap(), ReplayReturn::FoundEndMove);
    assert_eq!(host.chat.len(), 1);
    assert_eq!(replay.do_replay(&mut host, true).unwrap(), ReplayReturn::AtEnd);
}

#[test]
fn game_end_interrupts_replay() {
    let mut replay = replay_of(vec![synced("attack weapon=0", 1), command("end_turn")]);
    let mut host = two_player_host();
    host.game_over = true;
    assert_eq!(replay.do_replay(&mut host, false).unwrap(), ReplayReturn::FoundEndLevel);
    assert_eq!(replay.log().pos(), 1);
}

#[test]
fn skipping_hides_chat_except_whispers() {
    let mut whisper = SpeakData::new("whisper: bob", "psst");
    whisper.time = Some(10);
    let mut replay = replay_of(vec![
        command("speak alice hello"),
        Command::new(Action::Speak(whisper)),
    ]);
    let mut host = two_player_host();
    host.skipping = true;

    replay.do_replay(&mut host, false).unwrap();
    assert_eq!(host.chat.len(), 1);
    assert_eq!(host.chat[0].message, "psst");
    assert_eq!(host.chat[0].time, 10);
    assert_eq!(replay.log().message_locations(), &[0, 1]);
    assert_eq!(replay.build_chat_log().len(), 2);
}

#[test]
fn labels_renames_and_countdowns_reach_the_host() {
    let mut replay = replay_of(vec![
        command("label 2 3 ford"),
        synced("recruit Thief 5 5", 1),
        command("rename 5 5 Rogue"),
        command("rename 9 9 Nobody"),
        command("countdown 2 90"),
        command("init_side 2"),
        command("clear_labels"),
    ]);
    let mut host = two_player_host();

    assert_eq!(replay.do_replay(&mut host, false).unwrap(), ReplayReturn::AtEnd);
    assert_eq!(host.unit(MapLocation::new(5, 5)).map(|u| u.name.as_str()), Some("Rogue"));
    assert_eq!(host.countdowns.get(&2), Some(&90));
    assert_eq!(host.turns_started, 1);
    assert!(host.labels.is_empty());
    assert!(host.oos_messages.is_empty());
}

#[test]
fn illegal_countdown_is_out_of_sync() {
    let mut replay = replay_of(vec![command("countdown 7 30"), command("countdown 0 30")]);
    let mut host = two_player_host();
    assert_eq!(replay.do_replay(&mut host, false).unwrap(), ReplayReturn::AtEnd);
    assert_eq!(host.oos_messages.len(), 2);
    assert!(host.oos_messages[0].starts_with("Illegal countdown update"));
    assert!(host.countdowns.is_empty());
}

#[test]
fn turn_end_verification_reports_desync() {
    let mut end_turn = command("end_turn");
    end_turn.verify = Some(UnitDigest::from_records(vec![UnitRecord {
        location: MapLocation::new(3, 4),
        unit_type: "Spearman".into(),
        hitpoints: 36,
        experience: 0,
        side: 1,
    }]));
    let mut replay = replay_of(vec![synced("recruit Spearman 3 4", 1), end_turn]);
    let mut host = two_player_host();

    assert_eq!(replay.do_replay(&mut host, false).unwrap(), ReplayReturn::FoundEndTurn);
    assert_eq!(host.oos_messages.len(), 1);
    assert!(host.oos_messages[0].contains("hitpoints"));
}

#[test]
fn host_abort_propagates() {
    init_tracing();
    let mut replay = replay_of(vec![command("countdown 9 1"), command("end_turn")]);
    let mut host = two_player_host();
    host.abort_on_oos = true;

    match replay.do_replay(&mut host, false) {
        Err(ReplayError::Aborted { reason }) => assert!(reason.contains("countdown")),
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(replay.log().pos(), 1);
}

#[test]
fn dependent_outside_a_choice_is_skipped() {
    let mut replay = replay_of(vec![
        Command::dependent("advance", Document::new().with("value", 0), FromSide::Side(1)),
        command("end_turn"),
    ]);
    let mut host = two_player_host();
    assert_eq!(replay.do_replay(&mut host, false).unwrap(), ReplayReturn::FoundEndTurn);
    assert_eq!(host.oos_messages.len(), 1);
}

#[test]
fn synced_context_stops_on_anything_but_an_answer() {
    let mut replay = replay_of(vec![command("speak alice hm"), command("end_turn")]);
    let mut host = two_player_host();
    replay.set_synced(true);

    let outcome = replay.do_replay_handle(&mut host, false).unwrap();
    assert_eq!(outcome, ReplayReturn::FoundDependent);
    assert_eq!(replay.log().pos(), 1, "cursor rewound onto the turn end");
    assert_eq!(host.chat.len(), 1);
    assert_eq!(host.oos_messages.len(), 1);

    let mut replay = replay_of(vec![Command::dependent(
        "advance",
        Document::new(),
        FromSide::Side(2),
    )]);
    replay.set_synced(true);
    host.oos_messages.clear();
    assert_eq!(
        replay.do_replay_handle(&mut host, false).unwrap(),
        ReplayReturn::FoundDependent
    );
    assert_eq!(replay.log().pos(), 0);
    assert!(host.oos_messages.is_empty());
}

#[test]
fn off_turn_synced_commands_still_run() {
    let mut replay = replay_of(vec![Command {
        side_invalid: true,
        ..synced("move 1,1 2,2", 2)
    }]);
    let mut host = two_player_host();
    host.spawn_unit(MapLocation::new(1, 1), HeadlessUnit::new("Elvish Scout", 2));

    replay.do_replay(&mut host, false).unwrap();
    assert!(host.unit(MapLocation::new(2, 2)).is_some());
    assert!(host.oos_messages.is_empty());
}

#[test]
fn local_actions_are_recorded_then_run_unreplayed() {
    let mut replay = Replay::new(ReplayConfig::builtin());
    replay.add_start();
    let mut host = two_player_host();
    host.spawn_unit(MapLocation::new(1, 1), HeadlessUnit::new("Cavalryman", 1));

    let path = path_document(&[MapLocation::new(1, 1), MapLocation::new(1, 2)]);
    replay.run_and_store(&mut host, "move", path).unwrap();

    assert_eq!(replay.ncommands(), 2);
    assert_eq!(replay.log().get(1).from_side, Some(FromSide::Side(1)));
    assert!(!host.executed[0].is_replay);
    assert!(!replay.is_synced());
    assert!(host.unit(MapLocation::new(1, 2)).is_some());
}
