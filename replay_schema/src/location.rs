use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AttrValue, Document, DocumentError};

/// A hex on the game board, stored as 1-based `x`/`y` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapLocation {
    pub x: i32,
    pub y: i32,
}

impl MapLocation {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn read_from(doc: &Document) -> Result<Self, DocumentError> {
        let x = read_coordinate(doc, "x")?;
        let y = read_coordinate(doc, "y")?;
        Ok(Self { x, y })
    }

    pub fn write_to(&self, doc: &mut Document) {
        doc.set("x", self.x);
        doc.set("y", self.y);
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        self.write_to(&mut doc);
        doc
    }
}

impl fmt::Display for MapLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

fn read_coordinate(doc: &Document, key: &'static str) -> Result<i32, DocumentError> {
    let value = doc.attr(key).ok_or(DocumentError::MissingAttribute(key))?;
    match value {
        AttrValue::Int(raw) => i32::try_from(*raw).map_err(|_| DocumentError::InvalidInteger {
            key,
            value: raw.to_string(),
        }),
        other => {
            let text = other.to_string();
            text.trim()
                .parse()
                .map_err(|_| DocumentError::InvalidInteger { key, value: text })
        }
    }
}

/// Read a path encoded as parallel comma-separated `x` and `y` lists.
pub fn read_locations(doc: &Document) -> Result<Vec<MapLocation>, DocumentError> {
    let xs = split_coordinates(doc, "x")?;
    let ys = split_coordinates(doc, "y")?;
    if xs.len() != ys.len() {
        return Err(DocumentError::PathLengthMismatch {
            xs: xs.len(),
            ys: ys.len(),
        });
    }
    Ok(xs
        .into_iter()
        .zip(ys)
        .map(|(x, y)| MapLocation::new(x, y))
        .collect())
}

fn split_coordinates(doc: &Document, key: &'static str) -> Result<Vec<i32>, DocumentError> {
    let text = doc.get_str(key);
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse().map_err(|_| DocumentError::InvalidInteger {
                key,
                value: part.to_string(),
            })
        })
        .collect()
}
