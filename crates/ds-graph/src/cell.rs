//! Cells: raw input, evaluated value, status, and graph edges.
//!
//! Cells hold identifiers of their dependencies and dependents, never
//! references; the sheet owns every cell and lookups resolve through its
//! identifier table. That keeps ownership acyclic and the structure
//! trivially serializable.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use ds_core::dist::Dist;

/// Evaluation status of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    /// Created but not yet evaluated.
    Pending,
    Ok,
    /// Last evaluation failed; `error` carries the message and `value`
    /// keeps the previous result as history.
    Error,
    /// Participates in a dependency cycle; `value` stays at the last
    /// successfully computed result.
    Circular,
    /// Queued in an in-flight recalculation.
    Evaluating,
}

/// One cell of the sheet.
#[derive(Debug, Clone)]
pub(crate) struct Cell {
    pub id: String,
    pub input: String,
    pub value: Dist,
    pub status: CellStatus,
    pub error: Option<String>,
    /// Upstream identifiers this cell reads.
    pub dependencies: BTreeSet<String>,
    /// Downstream identifiers reading this cell.
    pub dependents: BTreeSet<String>,
}

impl Cell {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            input: String::new(),
            value: Dist::empty(),
            status: CellStatus::Ok,
            error: None,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
        }
    }

    pub fn snapshot(&self) -> CellSnapshot {
        CellSnapshot {
            id: self.id.clone(),
            input: self.input.clone(),
            value: self.value.clone(),
            status: self.status,
            error: self.error.clone(),
            dependencies: self.dependencies.iter().cloned().collect(),
            dependents: self.dependents.iter().cloned().collect(),
        }
    }
}

/// Immutable view of a cell handed to embedders and listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub id: String,
    pub input: String,
    pub value: Dist,
    pub status: CellStatus,
    pub error: Option<String>,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
}

/// Coarse reference scan: every run of uppercase letters followed by a
/// run of digits counts as a dependency. Intentionally coarser than the
/// parser, so references inside ranges are caught too.
pub(crate) fn extract_refs(input: &str) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_uppercase() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_uppercase() {
                i += 1;
            }
            let letters_end = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i > letters_end {
                refs.insert(chars[start..i].iter().collect());
            }
        } else {
            i += 1;
        }
    }
    refs
}
