//! Backend traits for DistSheet
//!
//! This module defines the trait-based architecture that enables
//! dependency inversion: distribution logic does not depend on a concrete
//! compute backend. `ds-compute` ships the reference CPU implementation;
//! an embedder may substitute an accelerated one (SIMD, worker offload)
//! with identical semantics.
//!
//! All kernel methods speak the flattened component encoding of
//! [`crate::flat`].

/// Bulk distribution kernels over flattened component arrays.
pub trait DistKernels: Send + Sync {
    /// Pairwise convolution of two flattened distributions.
    fn convolve(&self, a: &[f64], b: &[f64]) -> Vec<f64>;

    /// Mass-conditional mean.
    fn mean(&self, a: &[f64]) -> f64;

    /// Mass-conditional variance.
    fn variance(&self, a: &[f64]) -> f64;

    /// Mass-conditional standard deviation.
    fn std_dev(&self, a: &[f64]) -> f64;

    /// `P(X > x)`.
    fn prob_gt(&self, a: &[f64], x: f64) -> f64;

    /// Scale positions by `k`.
    fn scale(&self, a: &[f64], k: f64) -> Vec<f64>;

    /// Mixture `(1−p)·a + p·b`.
    fn mix(&self, a: &[f64], b: &[f64], p: f64) -> Vec<f64>;

    /// Backend name for diagnostics.
    fn name(&self) -> &str;
}

/// Monte Carlo ruin trials: random walks from `init_wealth` taking
/// `steps` increments drawn from the flattened `step` distribution.
pub trait RuinKernel: Send + Sync {
    /// Number of trials (out of `trials`) whose wealth reached ≤ 0.
    /// Deterministic for a given `seed`.
    fn ruin_count(&self, step: &[f64], init_wealth: f64, steps: u32, trials: u32, seed: u64)
    -> u32;
}
