//! Deterministic replay and lockstep synchronization engine.
//!
//! Every player action is recorded into an ordered [`CommandLog`]. Peers
//! reconstruct identical game state by replaying the log through
//! [`Replay::do_replay`], resolve cross-peer decisions with
//! [`get_user_choice`] and ship new commands with [`NetworkSyncSender`].
//! Game state itself stays with the embedding application behind the
//! [`ReplayHost`] traits.

pub mod chat;
pub mod command_log;
pub mod config;
mod error;
pub mod execute;
pub mod headless;
pub mod host;
pub mod network;
mod replay;
mod undo;
pub mod user_choice;
pub mod verify;

pub use chat::{ChatFilter, ChatLog, ChatMessage};
pub use command_log::{CommandLog, ExtractMode};
pub use config::{load_replay_config_from_env, LobbyJoins, ReplayConfig, ReplayConfigError};
pub use error::{OosDecision, ReplayError, TransportError, UndoError};
pub use execute::ReplayReturn;
pub use headless::{HeadlessHost, HeadlessUnit};
pub use host::{
    process_error, ChatEvent, ChatKind, Controller, GamePhase, ReplayHost, SideInfo, SyncedAction,
};
pub use network::{
    read_frame, write_frame, ChannelInbox, ChannelTransport, FramedTransport, NetworkSyncSender,
    Transport,
};
pub use replay::{Replay, SyncContext};
pub use user_choice::{get_user_choice, get_user_choice_multiple_sides, UserChoice};
pub use verify::{find_mismatches, verify_units, SyncMismatch};
