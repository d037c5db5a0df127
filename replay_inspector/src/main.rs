use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use tracing::info;

mod app;
mod render;

use app::{LogFile, ReplayOptions};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect, replay and edit recorded command logs", long_about = None)]
struct Cli {
    /// Recorded turn batch: JSON, or a bincode frame when the extension is `.bin`.
    log: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every command with its flags.
    Show {
        /// Print the document form instead of the table.
        #[arg(long)]
        document: bool,
    },
    /// Print the chat history, filtered by the replay config.
    Chat {
        #[arg(long)]
        json: bool,
    },
    /// Run the log against an in-memory game and report what happened.
    Replay {
        /// Stop after every synced action.
        #[arg(long)]
        one_move: bool,
        /// Number of sides in the game.
        #[arg(long, default_value_t = 2)]
        sides: u32,
        /// Side controlled by this machine; the others are remote.
        #[arg(long, default_value_t = 1)]
        local: u32,
    },
    /// Remove the last undoable command.
    Undo {
        /// Save the result back to the log file.
        #[arg(long)]
        write: bool,
    },
    /// Append a command written as `name args...`, e.g. `move 1,1 2,1`.
    Append {
        line: String,
        /// Side that issued the command.
        #[arg(long)]
        side: Option<u32>,
        #[arg(long)]
        write: bool,
    },
    /// Rewrite the log in another encoding.
    Convert {
        #[arg(long, value_enum)]
        to: Encoding,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Bin,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (config, metadata) = core_replay::load_replay_config_from_env();
    if let Some(path) = metadata.path() {
        info!(path = %path.display(), "using replay config override");
    }

    let mut file = LogFile::load(&cli.log)?;
    info!(commands = file.batch.len(), path = %cli.log.display(), "log.loaded");

    match cli.command {
        Command::Show { document } => {
            if document {
                println!("{}", file.batch.to_document());
            } else {
                print!("{}", render::command_table(&file.batch.commands));
            }
        }
        Command::Chat { json } => {
            let messages = app::chat_history(&file, config);
            if json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                print!("{}", render::chat_lines(&messages));
            }
        }
        Command::Replay {
            one_move,
            sides,
            local,
        } => {
            let report = app::replay(
                &file,
                config,
                ReplayOptions {
                    one_move,
                    sides,
                    local,
                },
            )?;
            print!("{}", render::replay_report(&report));
        }
        Command::Undo { write } => {
            let removed = app::undo_last(&mut file, config)?;
            print!("{}", render::command_table(&removed));
            if write {
                file.save(&cli.log)?;
            }
        }
        Command::Append { line, side, write } => {
            let command = app::append(&mut file, config, &line, side)?;
            println!("{command}");
            if write {
                file.save(&cli.log)?;
            }
        }
        Command::Convert { to, out } => {
            file.encoding = to;
            file.save(&out)?;
            info!(path = %out.display(), ?to, "log.converted");
        }
    }

    Ok(())
}
