use std::fmt::Write;

use core_replay::{ChatKind, ChatMessage};
use replay_runtime::{Action, Command, FromSide};

use crate::app::ReplayReport;

fn flags(command: &Command) -> String {
    let mut flags = String::new();
    for (set, flag) in [
        (command.undo, 'u'),
        (command.is_async, 'a'),
        (command.dependent, 'd'),
        (command.sent, 's'),
        (command.side_invalid, '!'),
        (command.verify.is_some(), 'v'),
    ] {
        flags.push(if set { flag } else { '-' });
    }
    flags
}

fn origin(command: &Command) -> String {
    match command.from_side {
        Some(FromSide::Side(side)) => side.to_string(),
        Some(FromSide::Server) => "srv".to_string(),
        None => String::new(),
    }
}

fn summary(action: &Action) -> String {
    match action {
        Action::Speak(speak) if speak.team_name.is_empty() => {
            format!("<{}> {}", speak.id, speak.message)
        }
        Action::Speak(speak) => format!("<{}@{}> {}", speak.id, speak.team_name, speak.message),
        Action::Label(label) => format!("{} {:?}", label.location, label.text),
        Action::Rename { location, name } => format!("{location} {name:?}"),
        Action::InitSide { side_number } => format!("side {side_number}"),
        Action::CountdownUpdate { value, team } => format!("side {team} -> {value}"),
        Action::Custom { data, .. } => data
            .attributes()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

pub fn command_table(commands: &[Command]) -> String {
    let mut out = String::new();
    for (index, command) in commands.iter().enumerate() {
        let _ = writeln!(
            out,
            "{index:>4}  {}  {:>3}  {:<14} {}",
            flags(command),
            origin(command),
            command.action.name(),
            summary(&command.action)
        );
    }
    out
}

pub fn chat_lines(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        let _ = writeln!(out, "[{}] <{}> {}", message.time, message.nick, message.text);
    }
    out
}

pub fn replay_report(report: &ReplayReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "stops: {:?}", report.stops);
    let _ = writeln!(
        out,
        "executed {} synced actions over {} side turns, side {} to play",
        report.executed, report.turns_started, report.current_side
    );

    let _ = writeln!(out, "units ({}):", report.units.len());
    for (location, unit) in &report.units {
        let _ = writeln!(
            out,
            "  {location}  side {}  {} hp={} xp={}{}",
            unit.side,
            unit.unit_type,
            unit.hitpoints,
            unit.experience,
            if unit.name.is_empty() {
                String::new()
            } else {
                format!(" \"{}\"", unit.name)
            }
        );
    }

    if !report.chat.is_empty() {
        let _ = writeln!(out, "chat:");
        for event in &report.chat {
            let scope = match event.kind {
                ChatKind::Public => "",
                ChatKind::Private => " (team)",
            };
            let _ = writeln!(out, "  <{}>{scope} {}", event.speaker, event.message);
        }
    }

    if report.oos_messages.is_empty() {
        let _ = writeln!(out, "in sync");
    } else {
        let _ = writeln!(out, "out of sync ({}):", report.oos_messages.len());
        for message in &report.oos_messages {
            let _ = writeln!(out, "  {}", message.trim_end());
        }
    }
    out
}
