//! Marker-line grammar for flattened list pages
//!
//! A rendered list page, read as plain text, looks like:
//!
//! ```text
//! ...header lines...
//! Major                 <- data marker
//! 52  Fruit  Apple      <- three values per row
//! ...
//! Name                  <- name marker
//! Apple                 <- one name per row
//! ...
//! 0: estimated ...      <- optional footer line
//! ```
//!
//! The scan is a pure function over the line sequence so it can be tested
//! without a browser.

use std::fmt;

/// Values per row in the data block
pub const FIELDS_PER_ROW: usize = 3;

/// The literal lines that delimit the name and data blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerGrammar {
    /// Opens the names block and closes the data block
    pub name_marker: String,

    /// Opens the data block
    pub data_marker: String,

    /// Closes the names block when present; otherwise it runs to the end
    pub footer_marker: Option<String>,
}

impl Default for MarkerGrammar {
    fn default() -> Self {
        Self {
            name_marker: "Name".to_string(),
            data_marker: "Major".to_string(),
            footer_marker: Some("0: 估计0值，理论上为0值或不存在，或测定后为0".to_string()),
        }
    }
}

/// Why a page produced no rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    /// The page text had no non-blank lines
    EmptyPage,

    /// No line equal to the name marker
    MissingNameMarker,

    /// No line equal to the data marker
    MissingDataMarker,

    /// The data marker comes after the name marker
    MisorderedMarkers,

    /// Both blocks were found but no complete row could be formed
    NoMatches,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::EmptyPage => "page has no text",
            Self::MissingNameMarker => "name marker not found",
            Self::MissingDataMarker => "data marker not found",
            Self::MisorderedMarkers => "data marker follows name marker",
            Self::NoMatches => "no complete rows",
        };
        f.write_str(message)
    }
}

/// One matched row: a name with its three data values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedRow<'a> {
    pub name: &'a str,
    pub values: [&'a str; FIELDS_PER_ROW],
}

/// The two blocks located on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedBlocks<'a> {
    pub names: Vec<&'a str>,
    pub data: Vec<&'a str>,
}

impl<'a> ScannedBlocks<'a> {
    /// `min(names, data / 3)`: on disagreement, truncate rather than invent
    pub fn row_count(&self) -> usize {
        self.names.len().min(self.data.len() / FIELDS_PER_ROW)
    }

    pub fn rows(&self) -> Vec<ScannedRow<'a>> {
        (0..self.row_count())
            .map(|i| {
                let base = i * FIELDS_PER_ROW;
                ScannedRow {
                    name: self.names[i],
                    values: [self.data[base], self.data[base + 1], self.data[base + 2]],
                }
            })
            .collect()
    }
}

/// Splits page text into trimmed, non-blank lines
pub fn body_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

impl MarkerGrammar {
    /// Locates the names and data blocks in `lines`
    ///
    /// Marker positions are the first exact match of each marker.
    pub fn scan<'a>(&self, lines: &[&'a str]) -> Result<ScannedBlocks<'a>, ScanError> {
        if lines.is_empty() {
            return Err(ScanError::EmptyPage);
        }

        let name_at = position(lines, &self.name_marker).ok_or(ScanError::MissingNameMarker)?;
        let data_at = position(lines, &self.data_marker).ok_or(ScanError::MissingDataMarker)?;
        if data_at > name_at {
            return Err(ScanError::MisorderedMarkers);
        }

        let names_end = self
            .footer_marker
            .as_deref()
            .and_then(|footer| position(&lines[name_at + 1..], footer))
            .map(|offset| name_at + 1 + offset)
            .unwrap_or(lines.len());

        let blocks = ScannedBlocks {
            names: lines[name_at + 1..names_end].to_vec(),
            data: lines[data_at + 1..name_at].to_vec(),
        };

        if blocks.row_count() == 0 {
            return Err(ScanError::NoMatches);
        }

        Ok(blocks)
    }
}

fn position(lines: &[&str], marker: &str) -> Option<usize> {
    lines.iter().position(|line| *line == marker)
}
