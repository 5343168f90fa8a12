//! Plate positions and well identity.
//!
//! Positions come from the microscope's position list generator and carry
//! labels of the form `B7-Site_3`: well row A-H, column 1-12, and a
//! zero-based site number within the well. Labels that do not match this
//! form are treated as a hard error; driving a plate acquisition from an
//! unrecognized position list silently misgroups wells.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AcqError, AcqResult};

static SITE_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^([A-H])([0-9]{1,2})-Site_([0-9]+)$").unwrap()
});

/// One entry from the position list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Index within the position list (visit order).
    pub index: usize,
    /// Label as generated by the plate layout tool, e.g. `B7-Site_3`.
    pub label: String,
}

impl Position {
    pub fn new(index: usize, label: impl Into<String>) -> Self {
        Self {
            index,
            label: label.into(),
        }
    }
}

/// A well on the plate, identified by row letter and column number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WellId {
    pub row: char,
    pub column: u8,
}

impl WellId {
    pub fn new(row: char, column: u8) -> Self {
        Self { row, column }
    }

    /// Zero-based (row, column) indices on the plate grid: A1 is (0, 0),
    /// H12 is (7, 11).
    pub fn indices(&self) -> (u8, u8) {
        (self.row as u8 - b'A', self.column - 1)
    }
}

impl std::fmt::Display for WellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.row, self.column)
    }
}

/// Parse a position label into its well and site number.
///
/// Returns [`AcqError::MalformedLabel`] if the label does not match
/// `<row><column>-Site_<n>`.
pub fn parse_site_label(label: &str) -> AcqResult<(WellId, u32)> {
    let caps = SITE_LABEL_RE
        .captures(label)
        .ok_or_else(|| AcqError::MalformedLabel(label.to_string()))?;
    // Capture groups are guaranteed by the regex; parse failures can only
    // come from a column or site number too large for its type.
    let row = caps[1]
        .chars()
        .next()
        .ok_or_else(|| AcqError::MalformedLabel(label.to_string()))?;
    let column: u8 = caps[2]
        .parse()
        .map_err(|_| AcqError::MalformedLabel(label.to_string()))?;
    let site: u32 = caps[3]
        .parse()
        .map_err(|_| AcqError::MalformedLabel(label.to_string()))?;
    Ok((WellId::new(row, column), site))
}

/// How the engine detects that a position starts a new well.
///
/// The two modes agree on well-formed position lists; `SiteLabel` replicates
/// the label-substring convention of older plate layout tools, while
/// `ParsedSite` derives the boundary from the parsed site number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WellMarker {
    /// The label contains one of the first-site marker substrings
    /// (`Site_0` or `Pos_000_000`).
    SiteLabel,
    /// The parsed site number is zero.
    ParsedSite,
}

impl WellMarker {
    /// Substrings that mark the first site of a well under [`WellMarker::SiteLabel`].
    pub const SITE_LABEL_MARKERS: [&'static str; 2] = ["Site_0", "Pos_000_000"];
}

impl Default for WellMarker {
    fn default() -> Self {
        WellMarker::ParsedSite
    }
}
