//! Data contracts shared by the replay runtime and engine.
//!
//! Every recorded command carries its payload as a [`Document`]: an ordered,
//! hierarchical container of named children and scalar attributes. Board
//! positions travel as [`MapLocation`] attributes and verification payloads
//! are digested with [`digest_document`].

mod document;
mod hashing;
mod location;

pub use document::{AttrValue, Document};
pub use hashing::{digest_document, FnvHasher};
pub use location::{read_locations, MapLocation};

use thiserror::Error;

/// Error returned when a document does not have the shape a reader expects.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("missing attribute '{0}'")]
    MissingAttribute(&'static str),
    #[error("invalid integer '{value}' for attribute '{key}'")]
    InvalidInteger { key: &'static str, value: String },
    #[error("path has {xs} x coordinates but {ys} y coordinates")]
    PathLengthMismatch { xs: usize, ys: usize },
    #[error("encode failed: {0}")]
    Encode(#[from] bincode::Error),
}
