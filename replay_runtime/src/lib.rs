//! Shared runtime types for the lockstep replay engine.
//!
//! This crate re-exports the document contracts from `replay_schema` and adds
//! the typed command envelope recorded in the command log, the "turn" batch
//! exchanged between peers, and a small text syntax for authoring actions
//! without the engine crate.

pub use replay_schema::*;

pub mod command_text;
pub mod commands;

pub use command_text::{parse_command_line, path_document, CommandParseError};
pub use commands::{
    Action, Command, CommandDecodeError, CommandEncodeError, FromSide, LabelData, SideNumber,
    SpeakData, TurnBatch, UnitDigest, UnitRecord,
};
