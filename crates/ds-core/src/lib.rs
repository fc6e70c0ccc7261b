//! # ds-core
//!
//! Core distribution algebra for DistSheet.
//!
//! This crate provides:
//! - compact mixture components (atoms, bins, parametric tails)
//! - the ordered mixture container with exact-where-possible arithmetic
//! - boundary-aware size reduction to a target component count
//! - Vose alias-table sampling
//! - random-walk operators (geometric sum, repeat-add, ruin probability)
//!
//! ## Architecture
//!
//! This crate depends on no other workspace crate. Backend acceleration is
//! accessed through the traits in [`traits`]; `ds-compute` provides the
//! reference CPU implementation, and callers may plug in their own with
//! identical semantics.

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod alias;
pub mod component;
pub mod dist;
pub mod error;
pub mod flat;
pub mod reduce;
pub mod traits;
pub mod walk;

pub use component::{BinShape, Component, TailFamily, TailSide};
pub use dist::Dist;
pub use error::{Error, Result};
pub use reduce::{ReduceOpts, reduce};

/// Default cap on the number of components a stored distribution may carry.
pub const DEFAULT_MAX_COMPONENTS: usize = 200;

/// Mass tolerance: totals within this of 1.0 are considered normalized.
pub const MASS_EPSILON: f64 = 1e-9;
