//! CPU kernels over the flattened component encoding.

use rayon::prelude::*;

use ds_core::alias::AliasTable;
use ds_core::dist::Dist;
use ds_core::flat::{flatten, unflatten};
use ds_core::traits::{DistKernels, RuinKernel};
use ds_core::walk::trial_rng;

/// Trials per Rayon work chunk in the ruin engine.
const RUIN_CHUNK: u32 = 256;

/// Reference CPU backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuKernels;

impl CpuKernels {
    pub fn new() -> Self {
        Self
    }
}

fn decode(a: &[f64]) -> Dist {
    Dist::from_components(unflatten(a))
}

impl DistKernels for CpuKernels {
    fn convolve(&self, a: &[f64], b: &[f64]) -> Vec<f64> {
        flatten(decode(a).convolve(&decode(b)).components())
    }

    fn mean(&self, a: &[f64]) -> f64 {
        decode(a).mean()
    }

    fn variance(&self, a: &[f64]) -> f64 {
        decode(a).variance()
    }

    fn std_dev(&self, a: &[f64]) -> f64 {
        decode(a).std_dev()
    }

    fn prob_gt(&self, a: &[f64], x: f64) -> f64 {
        decode(a).prob_gt(x)
    }

    fn scale(&self, a: &[f64], k: f64) -> Vec<f64> {
        flatten(decode(a).scale(k).components())
    }

    fn mix(&self, a: &[f64], b: &[f64], p: f64) -> Vec<f64> {
        // Weight validation happens at the evaluator; the kernel clamps so
        // a raw caller cannot produce negative masses.
        let p = p.clamp(0.0, 1.0);
        match decode(a).mix(&decode(b), p) {
            Ok(mixed) => flatten(mixed.components()),
            Err(_) => Vec::new(),
        }
    }

    fn name(&self) -> &str {
        "cpu"
    }
}

impl RuinKernel for CpuKernels {
    fn ruin_count(
        &self,
        step: &[f64],
        init_wealth: f64,
        steps: u32,
        trials: u32,
        seed: u64,
    ) -> u32 {
        let table = AliasTable::new(unflatten(step));
        if table.is_empty() || trials == 0 {
            return 0;
        }
        tracing::debug!(steps, trials, "cpu ruin kernel");

        // Chunked so rayon has coarse work items; per-trial seeding keeps
        // the count independent of the split.
        let chunk_starts: Vec<u32> = (0..trials).step_by(RUIN_CHUNK as usize).collect();
        chunk_starts
            .par_iter()
            .map(|&start| {
                let end = (start + RUIN_CHUNK).min(trials);
                let mut ruined = 0u32;
                for trial in start..end {
                    let mut rng = trial_rng(seed, trial as u64);
                    let mut wealth = init_wealth;
                    for _ in 0..steps {
                        wealth += table.sample(&mut rng);
                        if wealth <= 0.0 {
                            ruined += 1;
                            break;
                        }
                    }
                }
                ruined
            })
            .sum()
    }
}
