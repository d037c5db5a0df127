use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use core_replay::{
    read_frame, write_frame, ChatEvent, ChatMessage, HeadlessHost, HeadlessUnit, Replay,
    ReplayConfig, ReplayReturn, SideInfo,
};
use replay_runtime::{parse_command_line, Action, Command, FromSide, MapLocation, TurnBatch};
use tracing::{debug, warn};

use crate::Encoding;

/// A turn batch read from disk, remembering how it was encoded.
pub struct LogFile {
    pub batch: TurnBatch,
    pub encoding: Encoding,
}

impl LogFile {
    pub fn load(path: &Path) -> Result<Self> {
        let encoding = encoding_for(path);
        let batch = match encoding {
            Encoding::Json => {
                let contents = fs::read_to_string(path)
                    .wrap_err_with(|| format!("reading {}", path.display()))?;
                TurnBatch::from_json(&contents)?
            }
            Encoding::Bin => {
                let mut file =
                    File::open(path).wrap_err_with(|| format!("opening {}", path.display()))?;
                read_frame(&mut file)?
            }
        };
        Ok(Self { batch, encoding })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        match self.encoding {
            Encoding::Json => fs::write(path, self.batch.to_json()?)
                .wrap_err_with(|| format!("writing {}", path.display()))?,
            Encoding::Bin => {
                let file =
                    File::create(path).wrap_err_with(|| format!("creating {}", path.display()))?;
                let mut writer = BufWriter::new(file);
                write_frame(&mut writer, &self.batch)?;
                writer.flush()?;
            }
        }
        debug!(path = %path.display(), commands = self.batch.len(), "log.saved");
        Ok(())
    }
}

fn encoding_for(path: &Path) -> Encoding {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("bin") => Encoding::Bin,
        _ => Encoding::Json,
    }
}

pub struct ReplayOptions {
    pub one_move: bool,
    pub sides: u32,
    pub local: u32,
}

#[derive(Debug)]
pub struct ReplayReport {
    pub stops: Vec<ReplayReturn>,
    pub executed: usize,
    pub turns_started: usize,
    pub current_side: u32,
    pub units: Vec<(MapLocation, HeadlessUnit)>,
    pub chat: Vec<ChatEvent>,
    pub oos_messages: Vec<String>,
}

fn headless_host(sides: u32, local: u32) -> HeadlessHost {
    let sides = (1..=sides)
        .map(|side| {
            if side == local {
                SideInfo::human()
            } else {
                SideInfo::remote()
            }
        })
        .collect();
    HeadlessHost::new(sides)
}

/// Drive the replay until the log is exhausted or the scenario ends.
fn replay_to_end(
    replay: &mut Replay,
    host: &mut HeadlessHost,
    one_move: bool,
) -> Result<Vec<ReplayReturn>> {
    let mut stops = Vec::new();
    loop {
        let stop = replay.do_replay(host, one_move)?;
        stops.push(stop);
        match stop {
            ReplayReturn::AtEnd | ReplayReturn::FoundEndLevel => return Ok(stops),
            ReplayReturn::FoundDependent => {
                // nobody is waiting on this answer; step over it
                warn!(at = replay.log().pos(), "skipping unclaimed choice answer");
                replay.next_action();
            }
            ReplayReturn::FoundEndTurn => host.next_side(),
            ReplayReturn::FoundEndMove => {}
        }
    }
}

pub fn replay(file: &LogFile, config: ReplayConfig, options: ReplayOptions) -> Result<ReplayReport> {
    if options.local == 0 || options.local > options.sides {
        bail!("local side {} is not one of 1..={}", options.local, options.sides);
    }
    let mut replay = Replay::from_batch(config, file.batch.clone());
    let mut host = headless_host(options.sides, options.local);
    let stops = replay_to_end(&mut replay, &mut host, options.one_move)?;

    Ok(ReplayReport {
        stops,
        executed: host.executed.len(),
        turns_started: host.turns_started,
        current_side: host.current_side,
        units: host.units.into_iter().collect(),
        chat: host.chat,
        oos_messages: host.oos_messages,
    })
}

pub fn chat_history(file: &LogFile, config: ReplayConfig) -> Vec<ChatMessage> {
    let mut replay = Replay::from_batch(config, file.batch.clone());
    let mut host = headless_host(2, 1);
    host.skipping = true;
    if let Err(err) = replay_to_end(&mut replay, &mut host, false) {
        warn!(error = %err, "replay stopped early, chat may be incomplete");
    }
    replay.build_chat_log().messages().to_vec()
}

pub fn undo_last(file: &mut LogFile, config: ReplayConfig) -> Result<Vec<Command>> {
    let mut replay = Replay::from_batch(config, file.batch.clone());
    replay.log_mut().seek_to_end();
    let removed = replay.undo_cut()?;
    file.batch = replay.to_batch();
    Ok(removed)
}

pub fn append(
    file: &mut LogFile,
    config: ReplayConfig,
    line: &str,
    side: Option<u32>,
) -> Result<Command> {
    let action = parse_command_line(line).wrap_err_with(|| format!("parsing '{line}'"))?;
    let mut replay = Replay::from_batch(config, file.batch.clone());
    replay.log_mut().seek_to_end();
    match action {
        Action::Speak(speak) => replay.speak(speak),
        Action::Label(label) => replay.add_label(label),
        Action::Custom { name, data } => {
            replay.add_synced_command(&name, data, side.unwrap_or(1));
        }
        other => {
            let command = replay.log_mut().append(Command::new(other));
            command.from_side = side.map(FromSide::Side);
        }
    }
    file.batch = replay.to_batch();
    let Some(last) = file.batch.commands.last() else {
        bail!("log is empty after appending");
    };
    Ok(last.clone())
}
