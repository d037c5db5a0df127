use std::num::ParseIntError;

use thiserror::Error;

use crate::{Action, AttrValue, Document, LabelData, MapLocation, SideNumber, SpeakData};

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
    #[error("invalid location '{0}', expected x,y")]
    InvalidLocation(String),
    #[error("invalid attribute '{0}', expected key=value")]
    InvalidAttribute(String),
}

/// Parse one line of the authoring syntax into an action.
///
/// Verbs: `speak`, `label`, `clear_labels`, `rename`, `init_side`, `end_turn`,
/// `countdown`, `move`, `recruit`, `recall`; anything else is read as a custom
/// action followed by `key=value` attributes.
pub fn parse_command_line(input: &str) -> Result<Action, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    match verb.as_str() {
        "speak" => {
            let id = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("speaker"))?;
            let message = rest(parts);
            Ok(Action::Speak(SpeakData::new(id, message)))
        }
        "label" => {
            let location = parse_xy(&mut parts)?;
            let text = rest(parts);
            Ok(Action::Label(LabelData {
                location,
                text,
                team_name: String::new(),
                color: String::new(),
            }))
        }
        "clear_labels" => {
            let team_name = parts.next().unwrap_or("").to_string();
            let force = matches!(parts.next(), Some("force"));
            Ok(Action::ClearLabels { team_name, force })
        }
        "rename" => {
            let location = parse_xy(&mut parts)?;
            let name = rest(parts);
            if name.is_empty() {
                return Err(CommandParseError::MissingArgument("name"));
            }
            Ok(Action::Rename { location, name })
        }
        "init_side" => {
            let side_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("side"))?;
            let side_number = parse_side(side_str, "init_side side")?;
            Ok(Action::InitSide { side_number })
        }
        "end_turn" => Ok(Action::EndTurn),
        "countdown" => {
            let team_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("team"))?;
            let value_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("value"))?;
            let team = parse_i64(team_str, "countdown team")?;
            let value = parse_i64(value_str, "countdown value")?;
            Ok(Action::CountdownUpdate { value, team })
        }
        "move" => {
            let steps = parts
                .map(parse_location)
                .collect::<Result<Vec<_>, _>>()?;
            if steps.len() < 2 {
                return Err(CommandParseError::MissingArgument("destination"));
            }
            Ok(Action::custom("move", path_document(&steps)))
        }
        "recruit" | "recall" => {
            let key = if verb == "recruit" { "type" } else { "value" };
            let subject = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("unit"))?;
            let location = parse_xy(&mut parts)?;
            let mut data = Document::new().with(key, subject);
            location.write_to(&mut data);
            Ok(Action::custom(verb.as_str(), data))
        }
        _ => {
            let mut data = Document::new();
            for token in parts {
                let (key, value) = token
                    .split_once('=')
                    .ok_or_else(|| CommandParseError::InvalidAttribute(token.to_string()))?;
                let value = match value.parse::<i64>() {
                    Ok(number) => AttrValue::Int(number),
                    Err(_) => AttrValue::Str(value.to_string()),
                };
                data.set(key, value);
            }
            Ok(Action::custom(verb.as_str(), data))
        }
    }
}

/// Encode a path the way recorded `move` commands carry it.
pub fn path_document(steps: &[MapLocation]) -> Document {
    let xs: Vec<String> = steps.iter().map(|step| step.x.to_string()).collect();
    let ys: Vec<String> = steps.iter().map(|step| step.y.to_string()).collect();
    Document::new()
        .with("x", xs.join(","))
        .with("y", ys.join(","))
}

fn rest<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(" ")
}

fn parse_xy<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<MapLocation, CommandParseError> {
    let x_str = parts.next().ok_or(CommandParseError::MissingArgument("x"))?;
    let y_str = parts.next().ok_or(CommandParseError::MissingArgument("y"))?;
    let x = parse_i64(x_str, "x coordinate")?;
    let y = parse_i64(y_str, "y coordinate")?;
    Ok(MapLocation::new(x as i32, y as i32))
}

fn parse_location(token: &str) -> Result<MapLocation, CommandParseError> {
    let (x, y) = token
        .split_once(',')
        .ok_or_else(|| CommandParseError::InvalidLocation(token.to_string()))?;
    match (x.trim().parse(), y.trim().parse()) {
        (Ok(x), Ok(y)) => Ok(MapLocation::new(x, y)),
        _ => Err(CommandParseError::InvalidLocation(token.to_string())),
    }
}

fn parse_side(value: &str, context: &'static str) -> Result<SideNumber, CommandParseError> {
    value
        .parse::<SideNumber>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_i64(value: &str, context: &'static str) -> Result<i64, CommandParseError> {
    value
        .parse::<i64>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}
