use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Document, DocumentError, MapLocation};

/// 1-based player slot number. Side 0 denotes observers.
pub type SideNumber = u32;

/// Origin of a synced or dependent command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FromSide {
    Side(SideNumber),
    Server,
}

impl FromSide {
    /// Numeric origin; the server reads as side 0.
    pub fn side_number(&self) -> SideNumber {
        match self {
            FromSide::Side(side) => *side,
            FromSide::Server => 0,
        }
    }
}

impl fmt::Display for FromSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FromSide::Side(side) => write!(f, "{}", side),
            FromSide::Server => f.write_str("server"),
        }
    }
}

/// Payload of a `speak` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakData {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub side: SideNumber,
    #[serde(default)]
    pub team_name: String,
    #[serde(default)]
    pub time: Option<i64>,
}

impl SpeakData {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            side: 0,
            team_name: String::new(),
            time: None,
        }
    }

    pub fn is_whisper(&self) -> bool {
        self.id.starts_with("whisper: ")
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new()
            .with("id", self.id.as_str())
            .with("message", self.message.as_str())
            .with("side", self.side)
            .with("team_name", self.team_name.as_str());
        if let Some(time) = self.time {
            doc.set("time", time);
        }
        doc
    }

    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: doc.get_str("id"),
            message: doc.get_str("message"),
            side: side_attr(doc, "side"),
            team_name: doc.get_str("team_name"),
            time: doc.attr("time").map(|value| value.to_int(0)),
        }
    }
}

/// Payload of a `label` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelData {
    pub location: MapLocation,
    pub text: String,
    #[serde(default)]
    pub team_name: String,
    #[serde(default)]
    pub color: String,
}

impl LabelData {
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new()
            .with("text", self.text.as_str())
            .with("team_name", self.team_name.as_str())
            .with("color", self.color.as_str());
        self.location.write_to(&mut doc);
        doc
    }

    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        Ok(Self {
            location: MapLocation::read_from(doc)?,
            text: doc.get_str("text"),
            team_name: doc.get_str("team_name"),
            color: doc.get_str("color"),
        })
    }
}

/// Authoritative summary of one unit inside a verification block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub location: MapLocation,
    pub unit_type: String,
    pub hitpoints: i64,
    pub experience: i64,
    pub side: SideNumber,
}

impl UnitRecord {
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new()
            .with("type", self.unit_type.as_str())
            .with("hitpoints", self.hitpoints)
            .with("experience", self.experience)
            .with("side", self.side);
        self.location.write_to(&mut doc);
        doc
    }

    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        Ok(Self {
            location: MapLocation::read_from(doc)?,
            unit_type: doc.get_str("type"),
            hitpoints: doc.get_int("hitpoints", 0),
            experience: doc.get_int("experience", 0),
            side: side_attr(doc, "side"),
        })
    }
}

/// Embedded `verify` block: unit count plus per-unit summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDigest {
    pub num_units: usize,
    pub units: Vec<UnitRecord>,
}

impl UnitDigest {
    pub fn from_records(units: Vec<UnitRecord>) -> Self {
        Self {
            num_units: units.len(),
            units,
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new().with("num_units", self.num_units as i64);
        for unit in &self.units {
            doc.add_child("unit", unit.to_document());
        }
        doc
    }

    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        let units = doc
            .children("unit")
            .map(UnitRecord::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            num_units: usize::try_from(doc.get_int("num_units", 0)).unwrap_or(0),
            units,
        })
    }
}

/// The single named action a command carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A command with no action child.
    Empty,
    /// Scenario start marker.
    Start,
    Speak(SpeakData),
    Label(LabelData),
    ClearLabels {
        team_name: String,
        force: bool,
    },
    Rename {
        location: MapLocation,
        name: String,
    },
    InitSide {
        side_number: SideNumber,
    },
    EndTurn,
    CountdownUpdate {
        value: i64,
        team: i64,
    },
    /// Any other synced player action (`move`, `recruit`, ...) or the answer
    /// to a user choice when the command is dependent.
    Custom {
        name: String,
        data: Document,
    },
}

impl Action {
    pub fn custom(name: impl Into<String>, data: Document) -> Self {
        Action::Custom {
            name: name.into(),
            data,
        }
    }

    /// Name of the action child in document form; empty for [`Action::Empty`].
    pub fn name(&self) -> &str {
        match self {
            Action::Empty => "",
            Action::Start => "start",
            Action::Speak(_) => "speak",
            Action::Label(_) => "label",
            Action::ClearLabels { .. } => "clear_labels",
            Action::Rename { .. } => "rename",
            Action::InitSide { .. } => "init_side",
            Action::EndTurn => "end_turn",
            Action::CountdownUpdate { .. } => "countdown_update",
            Action::Custom { name, .. } => name,
        }
    }

    /// The empty and `start` forms carry no game effect.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Action::Empty | Action::Start)
    }

    /// Payload in document form.
    pub fn to_document(&self) -> Document {
        match self {
            Action::Empty | Action::Start | Action::EndTurn => Document::new(),
            Action::Speak(speak) => speak.to_document(),
            Action::Label(label) => label.to_document(),
            Action::ClearLabels { team_name, force } => Document::new()
                .with("team_name", team_name.as_str())
                .with("force", *force),
            Action::Rename { location, name } => {
                let mut doc = Document::new().with("name", name.as_str());
                location.write_to(&mut doc);
                doc
            }
            Action::InitSide { side_number } => Document::new().with("side_number", *side_number),
            Action::CountdownUpdate { value, team } => {
                Document::new().with("value", *value).with("team", *team)
            }
            Action::Custom { data, .. } => data.clone(),
        }
    }

    /// Build the typed action for a named child; unknown names become
    /// [`Action::Custom`].
    pub fn from_document(name: &str, data: &Document) -> Result<Self, CommandDecodeError> {
        let action = match name {
            "" => Action::Empty,
            "start" => Action::Start,
            "speak" => Action::Speak(SpeakData::from_document(data)),
            "label" => Action::Label(LabelData::from_document(data)?),
            "clear_labels" => Action::ClearLabels {
                team_name: data.get_str("team_name"),
                force: data.get_bool("force", false),
            },
            "rename" => Action::Rename {
                location: MapLocation::read_from(data)?,
                name: data.get_str("name"),
            },
            "init_side" => Action::InitSide {
                side_number: side_attr(data, "side_number"),
            },
            "end_turn" => Action::EndTurn,
            "countdown_update" => Action::CountdownUpdate {
                value: data.get_int("value", 0),
                team: data.get_int("team", 0),
            },
            other => Action::custom(other, data.clone()),
        };
        Ok(action)
    }
}

/// One entry of the command log: a single action plus bookkeeping flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Whether the command may be rolled back.
    #[serde(default = "default_true")]
    pub undo: bool,
    /// Correctness depends on current game state (e.g. a rename tied to a location).
    #[serde(rename = "async", default)]
    pub is_async: bool,
    /// Answer to a cross-peer decision rather than a direct game action.
    #[serde(default)]
    pub dependent: bool,
    /// Already transmitted to peers.
    #[serde(default)]
    pub sent: bool,
    /// Flagged by the server as sent from a client that does not own the side.
    #[serde(default)]
    pub side_invalid: bool,
    #[serde(default)]
    pub from_side: Option<FromSide>,
    pub action: Action,
    #[serde(default)]
    pub verify: Option<UnitDigest>,
}

fn default_true() -> bool {
    true
}

impl Command {
    pub fn new(action: Action) -> Self {
        Self {
            undo: true,
            is_async: false,
            dependent: false,
            sent: false,
            side_invalid: false,
            from_side: None,
            action,
            verify: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Action::Empty)
    }

    /// A recorded answer to the user choice `name`.
    pub fn dependent(name: impl Into<String>, data: Document, from_side: FromSide) -> Self {
        Self {
            dependent: true,
            from_side: Some(from_side),
            ..Self::new(Action::custom(name, data))
        }
    }

    /// True when the action child is named `name`.
    pub fn has_child(&self, name: &str) -> bool {
        !matches!(self.action, Action::Empty) && self.action.name() == name
    }

    /// Origin side as a number; missing or server origins read as 0.
    pub fn from_side_number(&self) -> SideNumber {
        self.from_side.map(|side| side.side_number()).unwrap_or(0)
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        if !self.undo {
            doc.set("undo", false);
        }
        if self.is_async {
            doc.set("async", true);
        }
        if self.dependent {
            doc.set("dependent", true);
        }
        if self.sent {
            doc.set("sent", true);
        }
        if self.side_invalid {
            doc.set("side_invalid", true);
        }
        match self.from_side {
            Some(FromSide::Side(side)) => doc.set("from_side", side),
            Some(FromSide::Server) => doc.set("from_side", "server"),
            None => {}
        }
        if !matches!(self.action, Action::Empty) {
            doc.add_child(self.action.name(), self.action.to_document());
        }
        if let Some(verify) = &self.verify {
            doc.add_child("verify", verify.to_document());
        }
        doc
    }

    pub fn from_document(doc: &Document) -> Result<Self, CommandDecodeError> {
        let mut action = Action::Empty;
        let mut verify = None;
        let mut names = Vec::new();
        for (name, child) in doc.all_children() {
            if name == "verify" {
                verify = Some(UnitDigest::from_document(child)?);
                continue;
            }
            names.push(name.to_string());
            action = Action::from_document(name, child)?;
        }
        if names.len() > 1 {
            return Err(CommandDecodeError::MultipleActions { names });
        }

        let from_side = doc.attr("from_side").map(|value| {
            if value.to_string() == "server" {
                FromSide::Server
            } else {
                FromSide::Side(SideNumber::try_from(value.to_int(0)).unwrap_or(0))
            }
        });

        Ok(Self {
            undo: doc.get_bool("undo", true),
            is_async: doc.get_bool("async", false),
            dependent: doc.get_bool("dependent", false),
            sent: doc.get_bool("sent", false),
            side_invalid: doc.get_bool("side_invalid", false),
            from_side,
            action,
            verify,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_document())
    }
}

fn side_attr(doc: &Document, key: &str) -> SideNumber {
    SideNumber::try_from(doc.get_int(key, 0)).unwrap_or(0)
}

/// The "turn" envelope: an ordered batch of commands shipped to every peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnBatch {
    pub commands: Vec<Command>,
}

/// Error returned when encoding a turn batch fails.
#[derive(Debug, Error)]
pub enum CommandEncodeError {
    #[error("encode failed: {0}")]
    Encode(#[from] bincode::Error),
    #[error("json encode failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error returned when decoding a command or turn batch fails.
#[derive(Debug, Error)]
pub enum CommandDecodeError {
    #[error("decode failed: {0}")]
    Decode(#[from] bincode::Error),
    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed command payload: {0}")]
    Document(#[from] DocumentError),
    #[error("command holds more than one action: {names:?}")]
    MultipleActions { names: Vec<String> },
    #[error("document has no [turn] child")]
    MissingTurn,
}

impl TurnBatch {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Encode the batch into a binary frame.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, CommandEncodeError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a batch from a binary frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, CommandDecodeError> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn to_json(&self) -> Result<String, CommandEncodeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CommandDecodeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Document form: a `[turn]` child wrapping one `[command]` per entry.
    pub fn to_document(&self) -> Document {
        let mut turn = Document::new();
        for command in &self.commands {
            turn.add_child("command", command.to_document());
        }
        Document::new().with_child("turn", turn)
    }

    pub fn from_document(doc: &Document) -> Result<Self, CommandDecodeError> {
        let turn = doc.child("turn").ok_or(CommandDecodeError::MissingTurn)?;
        let commands = turn
            .children("command")
            .map(Command::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { commands })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rename_at(x: i32, y: i32, name: &str) -> Command {
        Command {
            is_async: true,
            ..Command::new(Action::Rename {
                location: MapLocation::new(x, y),
                name: name.to_string(),
            })
        }
    }

    #[test]
    fn document_form_carries_flags_and_single_child() {
        let doc = rename_at(3, 4, "Delfador").to_document();
        assert!(doc.get_bool("async", false));
        assert!(doc.attr("undo").is_none());
        let rename = doc.child("rename").expect("rename child");
        assert_eq!(rename.get_str("name"), "Delfador");
        assert_eq!(rename.get_int("x", 0), 3);
        assert_eq!(doc.child_count(), 1);
    }

    #[test]
    fn document_form_decodes_back_to_typed_command() {
        let original = rename_at(3, 4, "Delfador");
        let decoded = Command::from_document(&original.to_document()).unwrap();
        assert_eq!(decoded, original);

        let answer = Command::dependent(
            "advance",
            Document::new().with("value", 2),
            FromSide::Server,
        );
        let decoded = Command::from_document(&answer.to_document()).unwrap();
        assert_eq!(decoded.from_side, Some(FromSide::Server));
        assert!(decoded.dependent);
        assert!(decoded.has_child("advance"));
    }

    #[test]
    fn two_action_children_are_rejected() {
        let doc = Document::new()
            .with_child("move", Document::new())
            .with_child("attack", Document::new());
        match Command::from_document(&doc) {
            Err(CommandDecodeError::MultipleActions { names }) => {
                assert_eq!(names, vec!["move".to_string(), "attack".to_string()]);
            }
            other => panic!("expected MultipleActions, got {other:?}"),
        }
    }

    #[test]
    fn empty_command_has_no_children() {
        let command = Command::empty();
        assert!(!command.has_child(""));
        assert!(command.action.is_sentinel());
        assert!(command.to_document().is_empty());
    }

    #[test]
    fn turn_batch_survives_binary_frame() {
        let mut speak = SpeakData::new("alice", "gg");
        speak.time = Some(1_700_000_000);
        let batch = TurnBatch::new(vec![
            Command::new(Action::Start),
            Command::new(Action::Speak(speak)),
            Command::dependent("advance", Document::new().with("value", 1), FromSide::Side(2)),
        ]);
        let bytes = batch.encode_to_vec().unwrap();
        assert_eq!(TurnBatch::decode(&bytes).unwrap(), batch);
    }

    #[test]
    fn turn_document_requires_turn_child() {
        assert!(matches!(
            TurnBatch::from_document(&Document::new()),
            Err(CommandDecodeError::MissingTurn)
        ));
        let batch = TurnBatch::new(vec![Command::new(Action::EndTurn)]);
        assert_eq!(TurnBatch::from_document(&batch.to_document()).unwrap(), batch);
    }

    #[test]
    fn verify_block_is_kept_apart_from_the_action() {
        let mut command = Command::new(Action::EndTurn);
        command.verify = Some(UnitDigest::from_records(vec![UnitRecord {
            location: MapLocation::new(1, 1),
            unit_type: "Spearman".into(),
            hitpoints: 36,
            experience: 0,
            side: 1,
        }]));
        let decoded = Command::from_document(&command.to_document()).unwrap();
        assert_eq!(decoded, command);
    }
}
