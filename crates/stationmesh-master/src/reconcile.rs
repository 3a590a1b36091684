//! Fleet bookkeeping evaluated once per cycle: version skew and master
//! conflicts.
//!
//! Both checks only report. Nothing here elects or demotes a master, and
//! update commands are requests the stations act on themselves.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use stationmesh_layout::StationId;

use crate::messages::UpdateCommand;

/// One dot-separated piece of a version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    /// Digits only, leading zeros stripped.
    Number(&'a str),
}

impl<'a> Segment<'a> {
    fn parse(raw: &'a str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            let digits = raw.trim_start_matches('0');
            Self::Number(if digits.is_empty() { "0" } else { digits })
        } else {
            Self::Text(raw)
        }
    }
}

impl Ord for Segment<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), Self::Number(_)) => Ordering::Less,
            (Self::Number(_), Self::Text(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Segment<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Order two version strings.
///
/// Dotted segments are compared pairwise. All-digit segments compare by
/// value and rank above any segment containing other characters, which
/// compare as text. A version that extends another (`1.0.1` vs `1.0`) is
/// newer. Versions equal under those rules fall back to plain text order.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    a.split('.')
        .map(Segment::parse)
        .cmp(b.split('.').map(Segment::parse))
        .then_with(|| a.cmp(b))
}

/// Newest version present in the table.
pub fn latest_version(versions: &BTreeMap<StationId, String>) -> Option<&str> {
    versions
        .values()
        .map(String::as_str)
        .max_by(|a, b| compare_versions(a, b))
}

/// One update command per station not running the newest version.
pub fn update_commands(versions: &BTreeMap<StationId, String>) -> Vec<UpdateCommand> {
    let Some(latest) = latest_version(versions) else {
        return Vec::new();
    };
    versions
        .iter()
        .filter(|(_, version)| version.as_str() != latest)
        .map(|(station, version)| UpdateCommand {
            station: station.clone(),
            required_version: latest.to_string(),
            your_version: version.clone(),
        })
        .collect()
}

/// More than one station claims to be master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterConflict {
    /// Every claimant, sorted.
    pub claimants: Vec<StationId>,
    /// The claimant that would win a lowest-id tie-break. Reported only.
    pub presumed: StationId,
}

/// Detect conflicting master claims.
pub fn check_master_claims(claims: &BTreeSet<StationId>) -> Option<MasterConflict> {
    if claims.len() < 2 {
        return None;
    }
    let claimants: Vec<StationId> = claims.iter().cloned().collect();
    let presumed = claimants[0].clone();
    Some(MasterConflict { claimants, presumed })
}
