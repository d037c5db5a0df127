//! Desync detection against an authoritative unit digest.

use std::collections::BTreeSet;
use std::fmt;

use replay_runtime::{MapLocation, UnitDigest, UnitRecord};
use tracing::{info, warn};

use crate::error::ReplayError;
use crate::host::{process_error, ErrorEscalation, UnitView};

/// One disagreement between the digest and local game state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMismatch {
    UnitCount {
        expected: usize,
        local: usize,
        only_in_digest: Vec<MapLocation>,
        only_local: Vec<MapLocation>,
    },
    MissingUnit {
        location: MapLocation,
    },
    FieldsDiffer {
        location: MapLocation,
        fields: Vec<&'static str>,
    },
}

impl fmt::Display for SyncMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMismatch::UnitCount {
                expected,
                local,
                only_in_digest,
                only_local,
            } => {
                writeln!(
                    f,
                    "Unit count mismatch: expected {expected} units, found {local}"
                )?;
                for location in only_in_digest {
                    writeln!(f, "missing unit at {location}")?;
                }
                for location in only_local {
                    writeln!(f, "extra unit at {location}")?;
                }
                Ok(())
            }
            SyncMismatch::MissingUnit { location } => {
                writeln!(f, "SYNC VERIFICATION FAILED: expected unit at {location} but none found")
            }
            SyncMismatch::FieldsDiffer { location, fields } => {
                writeln!(f, "SYNC VERIFICATION FAILED: unit at {location} differs in:")?;
                for field in fields {
                    writeln!(f, "  {field}")?;
                }
                Ok(())
            }
        }
    }
}

/// Compare the digest with the live units without touching the host.
pub fn find_mismatches<U>(units: &U, digest: &UnitDigest) -> Vec<SyncMismatch>
where
    U: UnitView + ?Sized,
{
    let mut mismatches = Vec::new();
    let local = units.unit_count();

    if local != digest.num_units {
        let expected: BTreeSet<MapLocation> = digest.units.iter().map(|unit| unit.location).collect();
        let present: BTreeSet<MapLocation> = units.unit_locations().into_iter().collect();
        mismatches.push(SyncMismatch::UnitCount {
            expected: digest.num_units,
            local,
            only_in_digest: expected.difference(&present).copied().collect(),
            only_local: present.difference(&expected).copied().collect(),
        });
    }

    for expected in &digest.units {
        match units.unit_record(expected.location) {
            None => mismatches.push(SyncMismatch::MissingUnit {
                location: expected.location,
            }),
            Some(actual) => {
                let fields = differing_fields(expected, &actual);
                if !fields.is_empty() {
                    mismatches.push(SyncMismatch::FieldsDiffer {
                        location: expected.location,
                        fields,
                    });
                }
            }
        }
    }

    mismatches
}

fn differing_fields(expected: &UnitRecord, actual: &UnitRecord) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if expected.unit_type != actual.unit_type {
        fields.push("type");
    }
    if expected.hitpoints != actual.hitpoints {
        fields.push("hitpoints");
    }
    if expected.experience != actual.experience {
        fields.push("experience");
    }
    if expected.side != actual.side {
        fields.push("side");
    }
    fields
}

/// Escalate every mismatch as an out-of-sync error.
pub fn verify_units<H>(host: &mut H, digest: &UnitDigest) -> Result<(), ReplayError>
where
    H: UnitView + ErrorEscalation + ?Sized,
{
    info!(target: "replay::verify", units = digest.num_units, "verifying unit structure");
    let mismatches = find_mismatches(&*host, digest);
    if mismatches.is_empty() {
        info!(target: "replay::verify", "verification passed");
        return Ok(());
    }
    warn!(target: "replay::verify", count = mismatches.len(), "verification found mismatches");
    for mismatch in &mismatches {
        process_error(host, &mismatch.to_string())?;
    }
    Ok(())
}
