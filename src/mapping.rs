//! SID to index user mapping table.
//!
//! The mapping file is a two-column CSV: `share_sid,index_user`. Blank lines
//! and lines starting with `#` are ignored. Cells may be double-quoted, in
//! which case commas are kept and `""` stands for a literal quote; surrounding
//! whitespace is trimmed. Quoted cells do not span lines.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{ConnectorError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMapping {
    rows: Vec<(String, String)>,
}

impl UserMapping {
    /// Load the mapping file. Rows with fewer than two columns are logged
    /// and skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content, &path.display().to_string()))
    }

    /// Load the mapping if `path` names a non-empty file; `None` otherwise.
    pub fn load_if_present(path: Option<&Path>) -> Result<Option<Self>> {
        match path {
            Some(path) if is_non_empty_file(path) => Self::load(path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn parse(content: &str, origin: &str) -> Self {
        let mut rows = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut cells = split_cells(line).into_iter();
            match (cells.next(), cells.next()) {
                (Some(sid), Some(user)) if !sid.is_empty() && !user.is_empty() => {
                    rows.push((sid, user));
                }
                _ => log::warn!(
                    "Skipping malformed row {} in user mapping {}",
                    line_no + 1,
                    origin
                ),
            }
        }
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Index user mapped to `sid`, if any
    pub fn get(&self, sid: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|(s, _)| s == sid)
            .map(|(_, user)| user.as_str())
    }

    /// Group SIDs by the index user they map to, preserving file order
    pub fn invert(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_user: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (sid, user) in &self.rows {
            by_user.entry(user.clone()).or_default().push(sid.clone());
        }
        by_user
    }
}

pub(crate) fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Split one CSV line on commas outside double quotes
fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut cell).trim().to_string()),
            _ => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

impl TryFrom<&Path> for UserMapping {
    type Error = ConnectorError;

    fn try_from(path: &Path) -> Result<Self> {
        let mapping = Self::load(path)?;
        if mapping.is_empty() {
            return Err(ConnectorError::EmptyMapping(path.display().to_string()));
        }
        Ok(mapping)
    }
}
