//! # ds-compute
//!
//! Reference CPU implementation of the DistSheet kernel traits.
//!
//! Everything here speaks the flattened component encoding of
//! [`ds_core::flat`] and matches the pure `Dist` operations exactly; the
//! point of the crate is to give embedders a backend object they can swap
//! for an accelerated one (SIMD, worker offload) without changing
//! semantics. The Monte Carlo ruin engine is Rayon-parallel with
//! counter-based per-trial seeding, so results are bit-stable for a given
//! seed regardless of thread count.

#![warn(clippy::all)]

mod kernels;

pub use kernels::CpuKernels;
