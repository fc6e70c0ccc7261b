//! # ds-graph
//!
//! The reactive computation graph of DistSheet: a table of cells keyed by
//! spreadsheet-style identifiers, dependency/dependent edges extracted
//! from raw inputs, and cycle-safe incremental recomputation that yields
//! cooperatively so an embedding UI stays responsive.
//!
//! ## Surface
//!
//! [`Sheet::set_input`] drives everything: it refreshes edges, walks the
//! dependents closure, and re-evaluates affected cells in topological
//! order. [`Sheet::subscribe`] + [`Sheet::drain_dirty`] form the change
//! notification channel; [`Sheet::to_json`] / [`Sheet::from_json`]
//! persist raw inputs only.

#![warn(clippy::all)]

mod cell;
mod persist;
mod sheet;

pub use cell::{CellSnapshot, CellStatus};
pub use sheet::{Sheet, SheetConfig};
